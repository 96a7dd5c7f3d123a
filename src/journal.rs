//! Observable record of a simulation run.
//!
//! Every lifecycle event goes to `tracing`; when recording is enabled it is
//! also kept, with its logical timestamp, for inspection after the run.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::monitor::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Sat { philosopher: usize },
    PickedLeft { philosopher: usize, fork: usize },
    PickedRight { philosopher: usize, fork: usize },
    Ate { philosopher: usize, meals: u64 },
    DroppedLeft { philosopher: usize, fork: usize },
    DroppedRight { philosopher: usize, fork: usize },
    Sampled { round: u32, total: u64 },
    Finished { outcome: Outcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Event {
    pub at: Duration,
    pub kind: EventKind,
}

#[derive(Clone, Default)]
pub struct Journal {
    events: Option<Arc<Mutex<Vec<Event>>>>,
}

impl Journal {
    /// Logs only, keeps nothing.
    pub fn disabled() -> Self {
        Journal { events: None }
    }

    pub fn recording() -> Self {
        Journal {
            events: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn emit(&self, at: Duration, kind: EventKind) {
        let ms = at.as_millis() as u64;
        match kind {
            EventKind::Sat { philosopher } => info!(at_ms = ms, philosopher, "sits"),
            EventKind::PickedLeft { philosopher, fork } => {
                info!(at_ms = ms, philosopher, fork, "picked left fork")
            }
            EventKind::PickedRight { philosopher, fork } => {
                info!(at_ms = ms, philosopher, fork, "picked right fork")
            }
            EventKind::Ate { philosopher, meals } => info!(at_ms = ms, philosopher, meals, "eats"),
            EventKind::DroppedLeft { philosopher, fork } => {
                info!(at_ms = ms, philosopher, fork, "dropped left fork")
            }
            EventKind::DroppedRight { philosopher, fork } => {
                info!(at_ms = ms, philosopher, fork, "dropped right fork")
            }
            // the monitor logs its own samples and verdict with more context
            EventKind::Sampled { .. } | EventKind::Finished { .. } => {}
        }

        if let Some(events) = &self.events {
            events.lock().push(Event { at, kind });
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .as_ref()
            .map(|events| events.lock().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn disabled_journal_keeps_nothing() {
        let journal = Journal::disabled();
        journal.emit(Duration::ZERO, EventKind::Sat { philosopher: 0 });
        assert!(journal.events().is_empty());
    }

    #[test]
    fn recording_journal_keeps_order_and_time() {
        let journal = Journal::recording();
        let clone = journal.clone();
        journal.emit(Duration::from_millis(5), EventKind::Sat { philosopher: 1 });
        clone.emit(
            Duration::from_millis(9),
            EventKind::PickedLeft {
                philosopher: 1,
                fork: 1,
            },
        );

        let events = journal.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].at, Duration::from_millis(5));
        assert_eq!(
            events[1].kind,
            EventKind::PickedLeft {
                philosopher: 1,
                fork: 1
            }
        );
    }
}
