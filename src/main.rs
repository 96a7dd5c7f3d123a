//! CLI: configure a table, run it to a verdict, print the summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use dining_rendezvous::{logger::LoggerConfig, Dinner, Pacing, SimConfig, StopFlag};

#[derive(Parser)]
#[command(name = "dining-rendezvous")]
#[command(about = "Dining philosophers coordinated by rendezvous channels")]
struct Args {
    /// JSON file with a full or partial configuration; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of philosophers at the table
    #[arg(long, short)]
    philosophers: Option<usize>,

    /// Pause between protocol steps, in ms
    #[arg(long)]
    step_time: Option<u64>,

    /// Interval between fairness samples, in ms
    #[arg(long)]
    status_time: Option<u64>,

    /// Fairness samples before the run counts as completed
    #[arg(long)]
    iterations: Option<u32>,

    /// Samples with no meal at all before declaring deadlock
    #[arg(long)]
    deadlock_rounds: Option<u32>,

    /// Declare deadlock when the total stops moving for this many samples
    #[arg(long)]
    stall_rounds: Option<u32>,

    /// Give every philosopher the same pause, in ms (lock-step, deadlock prone)
    #[arg(long)]
    fixed_pause: Option<u64>,

    /// Seed for the pause draw; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Follow the wall clock instead of jumping between deadlines
    #[arg(long)]
    realtime: bool,

    /// Print the full report, events included, as JSON
    #[arg(long)]
    json: bool,

    /// Log level; falls back to LOG_LEVEL, then info
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SimConfig::default(),
        };
        if let Some(n) = self.philosophers {
            config.philosophers = n;
        }
        if let Some(ms) = self.step_time {
            config.step_delay_ms = ms;
        }
        if let Some(ms) = self.status_time {
            config.sample_interval_ms = ms;
        }
        if let Some(rounds) = self.iterations {
            config.max_rounds = rounds;
        }
        if let Some(rounds) = self.deadlock_rounds {
            config.deadlock_rounds = rounds;
        }
        if self.stall_rounds.is_some() {
            config.stall_rounds = self.stall_rounds;
        }
        if let Some(ms) = self.fixed_pause {
            config = config.fixed_pause(ms);
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.realtime {
            config.pacing = Pacing::RealTime;
        }
        if self.json {
            config.record_events = true;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let logger = match &args.log_level {
        Some(level) => LoggerConfig::with_level(level.as_str()),
        None => LoggerConfig::from_env(),
    };
    logger.init();

    let config = args.sim_config()?;
    let dinner = Dinner::new(config).context("invalid configuration")?;
    println!("{}", dinner.config());

    let stop = StopFlag::new();
    #[cfg(unix)]
    dining_rendezvous::signal::install(stop.clone()).context("installing signal handlers")?;

    let report = dinner.run_with_stop(stop);
    info!(outcome = ?report.outcome, "dinner is over");

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{json}");
    } else {
        println!("{report}");
    }
    Ok(())
}
