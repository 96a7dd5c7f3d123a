//! Interpreter for an agent's declarative step list.
//!
//! A [`Sequence`] walks the steps one at a time and suspends only on
//! non-zero delays and handshakes.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use crate::{
    channel::{Channel, Intent},
    rendezvous::{handshake, Handshake},
    scheduler::{Sleep, Spawner},
    stop::StopFlag,
};

pub type Effect = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub enum Step {
    Delay(Duration),
    Acquire(Channel),
    Release(Channel),
    /// Runs synchronously, then the sequence moves straight on.
    Effect(Effect),
}

impl Step {
    pub fn effect(f: impl Fn() + Send + Sync + 'static) -> Self {
        Step::Effect(Arc::new(f))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Delay(d) => write!(f, "Delay({d:?})"),
            Step::Acquire(ch) => write!(f, "Acquire({})", ch.label()),
            Step::Release(ch) => write!(f, "Release({})", ch.label()),
            Step::Effect(_) => write!(f, "Effect"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    Finished,
    /// The stop flag was seen before a step started.
    Stopped,
}

enum State {
    Ready,
    Sleeping(Sleep),
    Waiting(Handshake),
}

/// Drives `steps` to completion on the scheduler behind `spawner`.
pub struct Sequence<'a> {
    steps: &'a [Step],
    cursor: usize,
    state: State,
    spawner: Spawner,
    stop: StopFlag,
}

impl<'a> Sequence<'a> {
    pub fn new(steps: &'a [Step], spawner: Spawner, stop: StopFlag) -> Self {
        Sequence {
            steps,
            cursor: 0,
            state: State::Ready,
            spawner,
            stop,
        }
    }
}

impl Future for Sequence<'_> {
    type Output = SequenceOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<SequenceOutcome> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Sleeping(sleep) => {
                    if Pin::new(sleep).poll(cx).is_pending() {
                        return Poll::Pending;
                    }
                    this.state = State::Ready;
                    this.cursor += 1;
                }
                State::Waiting(pending) => {
                    if Pin::new(pending).poll(cx).is_pending() {
                        return Poll::Pending;
                    }
                    this.state = State::Ready;
                    this.cursor += 1;
                }
                State::Ready => {
                    if this.stop.is_stopped() {
                        return Poll::Ready(SequenceOutcome::Stopped);
                    }
                    let steps = this.steps;
                    let Some(step) = steps.get(this.cursor) else {
                        return Poll::Ready(SequenceOutcome::Finished);
                    };
                    match step {
                        Step::Delay(d) if d.is_zero() => this.cursor += 1,
                        Step::Delay(d) => this.state = State::Sleeping(this.spawner.sleep(*d)),
                        Step::Acquire(ch) => {
                            this.state = State::Waiting(handshake(vec![(ch.clone(), Intent::Acquire)]))
                        }
                        Step::Release(ch) => {
                            this.state = State::Waiting(handshake(vec![(ch.clone(), Intent::Release)]))
                        }
                        Step::Effect(effect) => {
                            effect();
                            this.cursor += 1;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scheduler::{Executor, Pacing};
    use parking_lot::Mutex;

    fn log_step(log: &Arc<Mutex<Vec<String>>>, spawner: &Spawner, what: &'static str) -> Step {
        let log = log.clone();
        let spawner = spawner.clone();
        Step::effect(move || log.lock().push(format!("{what}@{}", spawner.now().as_millis())))
    }

    #[test]
    fn runs_delays_and_effects_in_order() {
        let executor = Executor::new(Pacing::Virtual);
        let spawner = executor.spawner();
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            log_step(&log, &spawner, "a"),
            Step::Delay(Duration::from_millis(100)),
            log_step(&log, &spawner, "b"),
            Step::Delay(Duration::ZERO),
            log_step(&log, &spawner, "c"),
            Step::Delay(Duration::from_millis(50)),
        ];
        let outcome = Arc::new(Mutex::new(None));

        {
            let sp = spawner.clone();
            let outcome = outcome.clone();
            spawner.spawn("seq", async move {
                let result = Sequence::new(&steps, sp, StopFlag::new()).await;
                *outcome.lock() = Some(result);
            });
        }

        let stats = executor.run();
        assert_eq!(*log.lock(), vec!["a@0", "b@100", "c@100"]);
        assert_eq!(*outcome.lock(), Some(SequenceOutcome::Finished));
        assert_eq!(stats.elapsed, Duration::from_millis(150));
    }

    #[test]
    fn stop_flag_prevents_further_effects() {
        let executor = Executor::new(Pacing::Virtual);
        let spawner = executor.spawner();
        let stop = StopFlag::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let stopper = {
            let stop = stop.clone();
            Step::effect(move || stop.stop())
        };
        let steps = vec![
            log_step(&log, &spawner, "before"),
            stopper,
            log_step(&log, &spawner, "after"),
        ];
        let outcome = Arc::new(Mutex::new(None));

        {
            let sp = spawner.clone();
            let outcome = outcome.clone();
            spawner.spawn("seq", async move {
                *outcome.lock() = Some(Sequence::new(&steps, sp, stop).await);
            });
        }

        executor.run();
        assert_eq!(*log.lock(), vec!["before@0"]);
        assert_eq!(*outcome.lock(), Some(SequenceOutcome::Stopped));
    }

    #[test]
    fn acquire_suspends_until_matched() {
        let executor = Executor::new(Pacing::Virtual);
        let spawner = executor.spawner();
        let ch = Channel::new("fork");
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            Step::Acquire(ch.clone()),
            log_step(&log, &spawner, "acquired"),
            Step::Release(ch.clone()),
            log_step(&log, &spawner, "released"),
        ];

        {
            let sp = spawner.clone();
            spawner.spawn("philosopher", async move {
                Sequence::new(&steps, sp, StopFlag::new()).await;
            });
        }
        {
            let sp = spawner.clone();
            spawner.spawn("fork", async move {
                sp.sleep(Duration::from_millis(300)).await;
                handshake(vec![(ch.clone(), Intent::Acquire)]).await;
                sp.sleep(Duration::from_millis(200)).await;
                handshake(vec![(ch, Intent::Release)]).await;
            });
        }

        let stats = executor.run();
        assert_eq!(*log.lock(), vec!["acquired@300", "released@500"]);
        assert_eq!(stats.parked, 0);
    }

    #[test]
    fn steps_debug_by_kind() {
        let steps = vec![
            Step::Delay(Duration::from_millis(5)),
            Step::Acquire(Channel::new("fork0/p0")),
            Step::effect(|| {}),
        ];
        let names: Vec<_> = steps.iter().map(|s| format!("{s:?}")).collect();
        assert_eq!(names, vec!["Delay(5ms)", "Acquire(fork0/p0)", "Effect"]);
    }
}
