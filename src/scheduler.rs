//! Single-threaded cooperative executor driven by a logical clock.
//!
//! Tasks are boxed futures re-enqueued through their waker. Time only moves
//! when the run queue is empty: the executor pops the earliest pending timer,
//! advances the clock to its deadline and wakes the task that registered it.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    future::Future,
    pin::Pin,
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stop::StopFlag;

/// How logical time relates to the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Jump straight to the next deadline.
    #[default]
    Virtual,
    /// Sleep on the wall clock until each deadline is due.
    RealTime,
}

struct Task {
    name: String,
    // None once finished or torn down
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    sender: Sender<Arc<Task>>,
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let self0 = arc_self.clone();
        // the receiver only disappears together with the executor
        let _ = arc_self.sender.send(self0);
    }
}

struct TimerEntry {
    deadline: Duration,
    seq: u64,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // reversed so the BinaryHeap pops the earliest (deadline, seq) first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TimerQueue {
    now: Duration,
    next_seq: u64,
    heap: BinaryHeap<TimerEntry>,
}

impl TimerQueue {
    fn schedule(&mut self, deadline: Duration, waker: Waker) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            deadline,
            seq,
            waker,
        });
    }
}

/// Statistics of one [`Executor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub polls: u64,
    /// Tasks that never finished: still waiting on a rendezvous nobody will answer.
    pub parked: usize,
    /// Logical time at which the last timer fired.
    pub elapsed: Duration,
}

pub struct Executor {
    sender: Sender<Arc<Task>>,
    receiver: Receiver<Arc<Task>>,
    timers: Arc<Mutex<TimerQueue>>,
    tasks: Arc<Mutex<Vec<Arc<Task>>>>,
    pacing: Pacing,
    stop: Option<StopFlag>,
}

impl Executor {
    pub fn new(pacing: Pacing) -> Self {
        let (sender, receiver) = channel();
        Executor {
            sender,
            receiver,
            timers: Arc::new(Mutex::new(TimerQueue::default())),
            tasks: Arc::new(Mutex::new(Vec::new())),
            pacing,
            stop: None,
        }
    }

    /// In real-time pacing, stop sleeping on the wall clock once `stop` is raised.
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn spawner(&self) -> Spawner {
        Spawner {
            sender: self.sender.clone(),
            timers: self.timers.clone(),
            tasks: self.tasks.clone(),
        }
    }

    /// Runs until no task is runnable and no timer is pending.
    pub fn run(&self) -> RunStats {
        let started = Instant::now();
        let mut polls = 0;

        loop {
            while let Ok(task) = self.receiver.try_recv() {
                let Some(mut future) = task.future.lock().take() else {
                    continue;
                };
                let waker = waker_ref(&task);
                let mut ctx = Context::from_waker(&waker);
                polls += 1;
                if future.as_mut().poll(&mut ctx).is_pending() {
                    *task.future.lock() = Some(future);
                } else {
                    debug!(task = %task.name, "task finished");
                }
            }

            if !self.fire_next_timer(started) {
                break;
            }
        }

        let elapsed = self.timers.lock().now;
        let parked = self.shutdown();
        RunStats {
            polls,
            parked,
            elapsed,
        }
    }

    fn fire_next_timer(&self, started: Instant) -> bool {
        let Some(entry) = self.timers.lock().heap.pop() else {
            return false;
        };

        if self.pacing == Pacing::RealTime {
            let due = started + entry.deadline;
            let wait = due.saturating_duration_since(Instant::now());
            match &self.stop {
                Some(stop) => {
                    stop.sleep_unless_stopped(wait);
                }
                None => std::thread::sleep(wait),
            }
        }

        {
            let mut timers = self.timers.lock();
            if entry.deadline > timers.now {
                timers.now = entry.deadline;
            }
        }
        entry.waker.wake();
        true
    }

    // Drops every unfinished future. Parked futures hold wakers that point back
    // at their own task, so they would otherwise keep each other alive.
    fn shutdown(&self) -> usize {
        let tasks: Vec<Arc<Task>> = std::mem::take(&mut *self.tasks.lock());
        let mut parked = 0;
        for task in tasks {
            if task.future.lock().take().is_some() {
                debug!(task = %task.name, "task left parked");
                parked += 1;
            }
        }
        while self.receiver.try_recv().is_ok() {}
        self.timers.lock().heap.clear();
        parked
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle for spawning tasks and creating timers on an [`Executor`].
#[derive(Clone)]
pub struct Spawner {
    sender: Sender<Arc<Task>>,
    timers: Arc<Mutex<TimerQueue>>,
    tasks: Arc<Mutex<Vec<Arc<Task>>>>,
}

impl Spawner {
    pub fn spawn(&self, name: impl Into<String>, future: impl Future<Output = ()> + Send + 'static) {
        let name = name.into();
        debug!(task = %name, "spawn");
        let task = Arc::new(Task {
            name,
            future: Mutex::new(Some(future.boxed())),
            sender: self.sender.clone(),
        });
        self.tasks.lock().push(task.clone());
        let _ = self.sender.send(task);
    }

    /// Current logical time since the executor was created.
    pub fn now(&self) -> Duration {
        self.timers.lock().now
    }

    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep {
            timers: self.timers.clone(),
            deadline: self.now() + duration,
            registered: false,
        }
    }
}

/// Completes once the logical clock reaches its deadline.
pub struct Sleep {
    timers: Arc<Mutex<TimerQueue>>,
    deadline: Duration,
    registered: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut timers = this.timers.lock();
        if timers.now >= this.deadline {
            return Poll::Ready(());
        }
        if !this.registered {
            timers.schedule(this.deadline, cx.waker().clone());
            this.registered = true;
        }
        Poll::Pending
    }
}

/// Gives every other runnable task a turn before resuming.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            // put ourselves back at the end of the run queue
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
