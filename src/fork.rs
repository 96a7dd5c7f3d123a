use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{
    channel::{Channel, Intent},
    rendezvous::handshake,
    scheduler::yield_now,
    stop::StopFlag,
};

/// A philosopher's end of one fork: which fork, and the channel to reach it.
#[derive(Debug, Clone)]
pub struct Grip {
    pub fork: usize,
    pub channel: Channel,
}

struct Seat {
    philosopher: usize,
    channel: Channel,
}

/// Who holds a fork right now, as seen by the fork itself.
#[derive(Clone, Default)]
pub struct ForkStatus {
    holder: Arc<Mutex<Option<usize>>>,
    violations: Arc<AtomicU64>,
}

impl ForkStatus {
    pub fn holder(&self) -> Option<usize> {
        *self.holder.lock()
    }

    /// Times the fork was handed out while already held.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::SeqCst)
    }
}

/// Owner side of a fork shared by two neighbouring philosophers.
///
/// Each neighbour talks to the fork over its own channel, so every channel
/// has exactly two parties. The fork offers both channels at once, and after
/// a pickup waits for the putdown on the same channel before offering again.
pub struct Fork {
    id: usize,
    seats: [Seat; 2],
    status: ForkStatus,
    stop: StopFlag,
}

impl Fork {
    /// `left_user` holds this fork in their left hand, `right_user` in their right.
    pub fn new(id: usize, left_user: usize, right_user: usize, stop: StopFlag) -> Self {
        let seat = |philosopher: usize| Seat {
            philosopher,
            channel: Channel::new(format!("fork{id}/p{philosopher}")),
        };
        Fork {
            id,
            seats: [seat(left_user), seat(right_user)],
            status: ForkStatus::default(),
            stop,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> ForkStatus {
        self.status.clone()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.seats.iter().map(|s| &s.channel)
    }

    /// Grip of the neighbour holding this fork in their left hand.
    pub fn left_hand(&self) -> Grip {
        self.grip(&self.seats[0])
    }

    pub fn right_hand(&self) -> Grip {
        self.grip(&self.seats[1])
    }

    fn grip(&self, seat: &Seat) -> Grip {
        Grip {
            fork: self.id,
            channel: seat.channel.clone(),
        }
    }

    pub async fn run(self) {
        loop {
            if self.stop.is_stopped() {
                break;
            }
            let offers = self
                .seats
                .iter()
                .map(|s| (s.channel.clone(), Intent::Acquire))
                .collect();
            let seat = &self.seats[handshake(offers).await];
            self.picked_up(seat.philosopher);

            handshake(vec![(seat.channel.clone(), Intent::Release)]).await;
            self.put_down(seat.philosopher);

            yield_now().await;
        }
        debug!(fork = self.id, "fork retired");
    }

    fn picked_up(&self, philosopher: usize) {
        let mut holder = self.status.holder.lock();
        if let Some(current) = *holder {
            self.status.violations.fetch_add(1, Ordering::SeqCst);
            error!(fork = self.id, holder = current, taker = philosopher, "fork taken while held");
        }
        *holder = Some(philosopher);
        debug!(fork = self.id, philosopher, "fork picked up");
    }

    fn put_down(&self, philosopher: usize) {
        let mut holder = self.status.holder.lock();
        if *holder != Some(philosopher) {
            self.status.violations.fetch_add(1, Ordering::SeqCst);
            error!(fork = self.id, holder = ?*holder, philosopher, "fork put down by non-holder");
        }
        *holder = None;
        debug!(fork = self.id, philosopher, "fork put down");
    }
}
