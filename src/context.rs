use crate::{journal::Journal, ledger::FairnessLedger, scheduler::Spawner, stop::StopFlag};

/// Everything a simulation's agents share. Cloning shares, never copies.
#[derive(Clone)]
pub struct SimContext {
    pub spawner: Spawner,
    pub stop: StopFlag,
    pub ledger: FairnessLedger,
    pub journal: Journal,
}

impl SimContext {
    pub fn new(spawner: Spawner, stop: StopFlag, journal: Journal) -> Self {
        SimContext {
            spawner,
            stop,
            ledger: FairnessLedger::new(),
            journal,
        }
    }
}
