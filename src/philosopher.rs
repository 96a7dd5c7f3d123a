use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::{
    context::SimContext,
    fork::Grip,
    journal::EventKind,
    scheduler::yield_now,
    sequencer::{Sequence, SequenceOutcome, Step},
};

/// Where a philosopher is in the pickup / eat / putdown protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Sitting,
    WaitingLeft,
    HoldingLeft,
    WaitingRight,
    Eating,
    ReleasingLeft,
    ReleasingRight,
}

impl Phase {
    pub fn holds_left(self) -> bool {
        matches!(
            self,
            Phase::HoldingLeft | Phase::WaitingRight | Phase::Eating | Phase::ReleasingLeft
        )
    }

    pub fn holds_right(self) -> bool {
        matches!(
            self,
            Phase::Eating | Phase::ReleasingLeft | Phase::ReleasingRight
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Wait before the first cycle.
    pub start_delay: Duration,
    /// Fixed pause between protocol steps.
    pub step: Duration,
}

pub struct Philosopher {
    id: usize,
    left: Grip,
    right: Grip,
    /// Drawn once at construction, applied before every attempt at the left fork.
    pause: Duration,
    timing: Timing,
    phase: Arc<Mutex<Phase>>,
    ctx: SimContext,
}

impl Philosopher {
    pub fn new(
        id: usize,
        left: Grip,
        right: Grip,
        pause: Duration,
        timing: Timing,
        ctx: SimContext,
    ) -> Self {
        ctx.ledger.register(id);
        Philosopher {
            id,
            left,
            right,
            pause,
            timing,
            phase: Arc::new(Mutex::new(Phase::Idle)),
            ctx,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Shared view of the current phase, valid after the philosopher is moved
    /// into its task.
    pub fn phase_handle(&self) -> Arc<Mutex<Phase>> {
        self.phase.clone()
    }

    /// One full cycle of the protocol.
    pub fn protocol(&self) -> Vec<Step> {
        let step = Step::Delay(self.timing.step);
        let (left, right) = (self.left.fork, self.right.fork);
        vec![
            step.clone(),
            self.mark(Phase::Sitting, EventKind::Sat { philosopher: self.id }),
            Step::Delay(self.pause),
            self.enter(Phase::WaitingLeft),
            Step::Acquire(self.left.channel.clone()),
            self.mark(
                Phase::HoldingLeft,
                EventKind::PickedLeft {
                    philosopher: self.id,
                    fork: left,
                },
            ),
            step.clone(),
            self.enter(Phase::WaitingRight),
            Step::Acquire(self.right.channel.clone()),
            self.mark(
                Phase::Eating,
                EventKind::PickedRight {
                    philosopher: self.id,
                    fork: right,
                },
            ),
            step.clone(),
            self.eat(),
            step.clone(),
            self.enter(Phase::ReleasingLeft),
            Step::Release(self.left.channel.clone()),
            self.mark(
                Phase::ReleasingRight,
                EventKind::DroppedLeft {
                    philosopher: self.id,
                    fork: left,
                },
            ),
            step.clone(),
            Step::Release(self.right.channel.clone()),
            self.mark(
                Phase::Idle,
                EventKind::DroppedRight {
                    philosopher: self.id,
                    fork: right,
                },
            ),
            step,
        ]
    }

    fn enter(&self, next: Phase) -> Step {
        let phase = self.phase.clone();
        Step::effect(move || *phase.lock() = next)
    }

    fn mark(&self, next: Phase, event: EventKind) -> Step {
        let phase = self.phase.clone();
        let ctx = self.ctx.clone();
        Step::effect(move || {
            *phase.lock() = next;
            ctx.journal.emit(ctx.spawner.now(), event);
        })
    }

    // the only writer of this philosopher's ledger entry
    fn eat(&self) -> Step {
        let id = self.id;
        let ctx = self.ctx.clone();
        Step::effect(move || {
            let meals = ctx.ledger.record_meal(id);
            ctx.journal.emit(ctx.spawner.now(), EventKind::Ate { philosopher: id, meals });
        })
    }

    pub async fn run(self) {
        let steps = self.protocol();
        self.ctx.spawner.sleep(self.timing.start_delay).await;
        loop {
            let cycle = Sequence::new(&steps, self.ctx.spawner.clone(), self.ctx.stop.clone());
            match cycle.await {
                SequenceOutcome::Finished => yield_now().await,
                SequenceOutcome::Stopped => break,
            }
        }
        debug!(philosopher = self.id, meals = self.ctx.ledger.meals(self.id), "left the table");
    }
}
