//! Dining philosophers over synchronous rendezvous channels.
//!
//! Philosophers and forks are cooperative tasks on a single-threaded
//! executor. They only ever meet through two-party handshakes on channels,
//! and a fairness monitor samples the meal counts to tell a deadlocked ring
//! from one that keeps eating.

pub mod channel;
pub mod config;
pub mod context;
pub mod dinner;
pub mod fork;
pub mod journal;
pub mod ledger;
pub mod logger;
pub mod monitor;
pub mod philosopher;
pub mod rendezvous;
pub mod scheduler;
pub mod sequencer;
#[cfg(unix)]
pub mod signal;
pub mod stop;

pub use channel::{Channel, Intent, Request};
pub use config::{ConfigError, SimConfig};
pub use dinner::{Dinner, Report};
pub use journal::{Event, EventKind};
pub use monitor::Outcome;
pub use philosopher::Phase;
pub use rendezvous::{handshake, rendezvous};
pub use scheduler::{Executor, Pacing};
pub use stop::StopFlag;
