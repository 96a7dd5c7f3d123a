//! Sets the table: forks, philosophers and the fairness monitor on one executor.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    channel::Channel,
    config::{ConfigError, SimConfig},
    context::SimContext,
    fork::{Fork, ForkStatus},
    journal::{Event, Journal},
    ledger::LedgerSnapshot,
    monitor::{FairnessMonitor, Outcome, Verdict},
    philosopher::{Phase, Philosopher},
    scheduler::Executor,
    stop::StopFlag,
};

/// What a finished run looked like.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// None only if the executor drained before the monitor decided.
    pub outcome: Option<Outcome>,
    pub rounds: u32,
    pub ledger: LedgerSnapshot,
    /// Phase each philosopher was left in.
    pub phases: BTreeMap<usize, Phase>,
    pub fork_violations: u64,
    pub parked_tasks: usize,
    pub elapsed: Duration,
    pub events: Vec<Event>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        match self.outcome {
            Some(outcome) => writeln!(f, "  Outcome:        {outcome} after {} rounds", self.rounds)?,
            None => writeln!(f, "  Outcome:        undecided")?,
        }
        writeln!(f, "  Meals:          {}", self.ledger)?;
        writeln!(f, "  Total meals:    {}", self.ledger.total())?;
        writeln!(f, "  Max meals:      {}", self.ledger.max())?;
        writeln!(f, "  Min meals:      {}", self.ledger.min())?;
        writeln!(f, "  Average meals:  {:.2}", self.ledger.mean())?;
        writeln!(f, "  Parked tasks:   {}", self.parked_tasks)?;
        if self.fork_violations > 0 {
            writeln!(f, "  Fork violations: {}", self.fork_violations)?;
        }
        write!(f, "  Elapsed:        {:.1} s", self.elapsed.as_secs_f64())
    }
}

pub struct Dinner {
    config: SimConfig,
}

impl Dinner {
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Dinner { config })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn run(&self) -> Report {
        self.run_with_stop(StopFlag::new())
    }

    /// Runs to a verdict. Raising `stop` from another thread ends the run as
    /// interrupted at the next sample.
    pub fn run_with_stop(&self, stop: StopFlag) -> Report {
        let config = &self.config;
        let n = config.philosophers;
        let executor = Executor::new(config.pacing).with_stop_flag(stop.clone());
        let journal = if config.record_events {
            Journal::recording()
        } else {
            Journal::disabled()
        };
        let ctx = SimContext::new(executor.spawner(), stop.clone(), journal);
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // fork i: left fork of philosopher i, right fork of philosopher i - 1
        let forks: Vec<Fork> = (0..n)
            .map(|i| Fork::new(i, i, (i + n - 1) % n, stop.clone()))
            .collect();
        let channels: Vec<Channel> = forks.iter().flat_map(|f| f.channels().cloned()).collect();
        let statuses: Vec<ForkStatus> = forks.iter().map(Fork::status).collect();

        let mut philosophers = Vec::with_capacity(n);
        for i in 0..n {
            let left = forks[i].left_hand();
            let right = forks[(i + 1) % n].right_hand();
            let pause = config.draw_pause(&mut rng);
            let philosopher = Philosopher::new(i, left, right, pause, config.timing(), ctx.clone());
            debug!(
                philosopher = i,
                pause_ms = philosopher.pause().as_millis() as u64,
                "seated"
            );
            philosophers.push(philosopher);
        }
        let phases: Vec<(usize, Arc<Mutex<Phase>>)> = philosophers
            .iter()
            .map(|p| (p.id(), p.phase_handle()))
            .collect();

        let monitor = FairnessMonitor::new(config.monitor(), ctx.clone());
        let verdict = monitor.verdict_handle();

        for fork in forks {
            ctx.spawner.spawn(format!("fork{}", fork.id()), fork.run());
        }
        for philosopher in philosophers {
            ctx.spawner.spawn(format!("philosopher{}", philosopher.id()), philosopher.run());
        }
        ctx.spawner.spawn("monitor", monitor.run());

        info!(philosophers = n, "dinner is served");
        let stats = executor.run();

        let abandoned: usize = channels.iter().map(Channel::clear).sum();
        debug!(abandoned, "cleared pending requests");

        let verdict: Option<Verdict> = *verdict.lock();
        Report {
            outcome: verdict.map(|v| v.outcome),
            rounds: verdict.map_or(0, |v| v.round),
            ledger: ctx.ledger.snapshot(),
            phases: phases.into_iter().map(|(id, phase)| (id, *phase.lock())).collect(),
            fork_violations: statuses.iter().map(ForkStatus::violations).sum(),
            parked_tasks: stats.parked,
            elapsed: stats.elapsed,
            events: ctx.journal.events(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invalid_config_is_refused() {
        let config = SimConfig {
            philosophers: 0,
            ..SimConfig::default()
        };
        assert!(Dinner::new(config).is_err());
    }

    #[test]
    fn lock_step_ring_deadlocks() {
        let config = SimConfig::default().fixed_pause(1_000).with_seed(1);
        let report = Dinner::new(config).unwrap().run();

        assert_eq!(report.outcome, Some(Outcome::Deadlock));
        assert_eq!(report.rounds, 4);
        assert_eq!(report.elapsed, Duration::from_millis(33_000));
        assert_eq!(report.ledger.total(), 0);
        assert!(report.phases.values().all(|p| *p == Phase::WaitingRight));
        // every philosopher and every fork is stuck on a handshake
        assert_eq!(report.parked_tasks, 10);
        assert_eq!(report.fork_violations, 0);
    }

    #[test]
    fn same_seed_same_report() {
        let config = SimConfig {
            record_events: true,
            ..SimConfig::default().with_seed(42)
        };
        let first = Dinner::new(config.clone()).unwrap().run();
        let second = Dinner::new(config).unwrap().run();
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.ledger, second.ledger);
        assert_eq!(first.events, second.events);
    }

    #[test]
    fn summary_mentions_totals() {
        let report = Dinner::new(SimConfig::default().fixed_pause(1_000).with_seed(1))
            .unwrap()
            .run();
        let text = report.to_string();
        assert!(text.contains("deadlock after 4 rounds"));
        assert!(text.contains("Total meals:    0"));
    }
}
