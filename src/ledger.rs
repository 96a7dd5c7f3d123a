use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;

/// Per-philosopher meal counts, shared by the philosophers (writers of their
/// own entry only) and the fairness monitor (reader).
#[derive(Clone, Default)]
pub struct FairnessLedger {
    counts: Arc<Mutex<BTreeMap<usize, u64>>>,
}

impl FairnessLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, philosopher: usize) {
        self.counts.lock().entry(philosopher).or_insert(0);
    }

    /// Returns the philosopher's new count.
    pub fn record_meal(&self, philosopher: usize) -> u64 {
        let mut counts = self.counts.lock();
        let count = counts.entry(philosopher).or_insert(0);
        *count += 1;
        *count
    }

    pub fn meals(&self, philosopher: usize) -> u64 {
        self.counts.lock().get(&philosopher).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            counts: self.counts.lock().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LedgerSnapshot {
    pub counts: BTreeMap<usize, u64>,
}

impl LedgerSnapshot {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn max(&self) -> u64 {
        self.counts.values().copied().max().unwrap_or(0)
    }

    pub fn min(&self) -> u64 {
        self.counts.values().copied().min().unwrap_or(0)
    }

    pub fn mean(&self) -> f64 {
        if self.counts.is_empty() {
            0.0
        } else {
            self.total() as f64 / self.counts.len() as f64
        }
    }
}

impl fmt::Display for LedgerSnapshot {
    // "0->3, 1->2, ..."
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (id, count) in &self.counts {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{id}->{count}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registered_philosophers_start_at_zero() {
        let ledger = FairnessLedger::new();
        for id in 0..3 {
            ledger.register(id);
        }
        let snap = ledger.snapshot();
        assert_eq!(snap.counts.len(), 3);
        assert_eq!(snap.total(), 0);
        assert_eq!(snap.to_string(), "0->0, 1->0, 2->0");
    }

    #[test]
    fn statistics_follow_meals() {
        let ledger = FairnessLedger::new();
        ledger.register(0);
        ledger.register(1);
        assert_eq!(ledger.record_meal(1), 1);
        assert_eq!(ledger.record_meal(1), 2);
        assert_eq!(ledger.record_meal(1), 3);
        assert_eq!(ledger.record_meal(0), 1);

        let snap = ledger.snapshot();
        assert_eq!(snap.total(), 4);
        assert_eq!(snap.max(), 3);
        assert_eq!(snap.min(), 1);
        assert!((snap.mean() - 2.0).abs() < f64::EPSILON);
        assert_eq!(ledger.meals(1), 3);
        assert_eq!(ledger.meals(7), 0);
    }

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snap = FairnessLedger::new().snapshot();
        assert_eq!((snap.total(), snap.max(), snap.min()), (0, 0, 0));
        assert_eq!(snap.mean(), 0.0);
    }
}
