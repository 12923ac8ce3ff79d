pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod loop_;
pub mod metrics;
pub mod observer;
pub mod state;

pub use config::{Device, TrainerConfig};
pub use data::{Batch, Batches, DataSource, InMemorySource, TRAIN};
pub use error::{Result, TrainerErr};
pub use loop_::{TrainLoop, Trained, evaluate};
pub use metrics::{Outcome, RunSummary};
pub use observer::{ArtifactStore, FileStorage, MemoryObserver, Observer, RunStatus, ScalarLog};
pub use state::{Phase, RunState};
