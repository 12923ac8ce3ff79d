use std::{path::PathBuf, time::Duration};

/// How the training loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
}

/// Accounting of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: Outcome,
    pub iterations: u64,
    pub epochs: usize,

    /// The accumulated loss of the last epoch that started.
    pub train_loss: f64,

    /// Where the final weights were persisted.
    pub weights: PathBuf,

    /// `(subset, value)` of every post-training evaluation.
    pub validation: Vec<(String, f64)>,

    pub train_time: Duration,
    pub eval_time: Duration,
    pub finalize_time: Duration,
}
