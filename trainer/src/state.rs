use std::fmt::{self, Display};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Init,
    Training,
    Completed,
    Interrupted,
    Errored,
    Finalized,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Training => "training",
            Phase::Completed => "completed",
            Phase::Interrupted => "interrupted",
            Phase::Errored => "errored",
            Phase::Finalized => "finalized",
        };
        write!(f, "{s}")
    }
}

/// Counters tracked across a run, the only state reported when a run is interrupted.
#[derive(Debug, Default, Clone)]
pub struct RunState {
    /// Global iteration index, one per training batch.
    pub iteration: u64,

    /// Index of the current epoch, the amount of completed epochs between epochs.
    pub epoch: usize,

    /// Sum of the per-row objective of the current epoch's batches.
    pub running_loss: f64,

    pub last_loss: Option<f32>,
    pub last_metric: Option<f64>,
    pub phase: Phase,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.running_loss = 0.;
    }

    #[inline]
    pub fn inc_iteration(&mut self) {
        self.iteration += 1;
    }
}
