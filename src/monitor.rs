//! Periodic fairness sampling and the two terminal verdicts.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{context::SimContext, journal::EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// No progress for longer than the configured threshold.
    Deadlock,
    /// Round budget exhausted.
    Completion,
    /// Someone else raised the stop flag.
    Interrupted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Deadlock => write!(f, "deadlock"),
            Outcome::Completion => write!(f, "completion"),
            Outcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub first_sample: Duration,
    pub interval: Duration,
    /// Zero total after more than this many rounds is a deadlock.
    pub deadlock_rounds: u32,
    /// Completion after more than this many rounds.
    pub max_rounds: u32,
    /// Deadlock when the total has not moved for this many consecutive samples.
    pub stall_rounds: Option<u32>,
}

/// Decision logic, separate from the sampling loop.
#[derive(Debug)]
pub struct Judge {
    config: MonitorConfig,
    last_total: Option<u64>,
    unchanged: u32,
}

impl Judge {
    pub fn new(config: MonitorConfig) -> Self {
        Judge {
            config,
            last_total: None,
            unchanged: 0,
        }
    }

    pub fn judge(&mut self, round: u32, total: u64) -> Option<Outcome> {
        if round > self.config.deadlock_rounds && total == 0 {
            return Some(Outcome::Deadlock);
        }

        if let Some(limit) = self.config.stall_rounds {
            if self.last_total == Some(total) {
                self.unchanged += 1;
            } else {
                self.unchanged = 0;
            }
            self.last_total = Some(total);
            if total > 0 && self.unchanged >= limit {
                return Some(Outcome::Deadlock);
            }
        }

        if round > self.config.max_rounds {
            return Some(Outcome::Completion);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub round: u32,
    pub at: Duration,
}

pub struct FairnessMonitor {
    config: MonitorConfig,
    ctx: SimContext,
    verdict: Arc<Mutex<Option<Verdict>>>,
}

impl FairnessMonitor {
    pub fn new(config: MonitorConfig, ctx: SimContext) -> Self {
        FairnessMonitor {
            config,
            ctx,
            verdict: Arc::new(Mutex::new(None)),
        }
    }

    /// Filled in once the monitor reaches a verdict.
    pub fn verdict_handle(&self) -> Arc<Mutex<Option<Verdict>>> {
        self.verdict.clone()
    }

    pub async fn run(self) {
        let ctx = &self.ctx;
        let mut judge = Judge::new(self.config);
        ctx.spawner.sleep(self.config.first_sample).await;

        let mut round = 0;
        loop {
            let now = ctx.spawner.now();
            let snapshot = ctx.ledger.snapshot();
            let total = snapshot.total();
            info!(
                at_ms = now.as_millis() as u64,
                round,
                total,
                "fairness sample: {snapshot}"
            );
            ctx.journal.emit(now, EventKind::Sampled { round, total });

            let outcome = if ctx.stop.is_stopped() {
                Some(Outcome::Interrupted)
            } else {
                judge.judge(round, total)
            };

            if let Some(outcome) = outcome {
                match outcome {
                    Outcome::Deadlock => warn!(round, total, "deadlock detected, philosophers are starving"),
                    Outcome::Completion => info!(round, total, "maximum rounds reached, philosophers are done eating"),
                    Outcome::Interrupted => warn!(round, total, "interrupted"),
                }
                ctx.stop.stop();
                ctx.journal.emit(now, EventKind::Finished { outcome });
                *self.verdict.lock() = Some(Verdict { outcome, round, at: now });
                return;
            }

            round += 1;
            ctx.spawner.sleep(self.config.interval).await;
        }
    }
}
