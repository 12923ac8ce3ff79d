mod file_storage;
mod memory;

use std::path::{Path, PathBuf};

pub use file_storage::{FileStorage, RunStatus};
pub use memory::{MemoryObserver, ScalarRecord};

use crate::Result;

/// Receives scalar series. Logging must never stop a run, so it can't fail.
pub trait ScalarLog {
    /// Records `value` under `tag` at the global iteration `step`.
    fn log_scalar(&mut self, tag: &str, value: f64, step: u64);
}

/// Stores the files produced by a run.
pub trait ArtifactStore {
    /// Writes `blob` to a location owned by the store.
    ///
    /// # Arguments
    /// * `blob` - The bytes of the artifact.
    /// * `name` - A file name for it.
    ///
    /// # Returns
    /// The location the artifact was written to.
    fn persist(&mut self, blob: &[u8], name: &str) -> Result<PathBuf>;

    /// Attaches a persisted artifact to the run under a logical name.
    fn register_artifact(&mut self, location: &Path, name: &str) -> Result<()>;
}

/// Everything a run reports to.
pub trait Observer: ScalarLog + ArtifactStore {}

impl<T: ScalarLog + ArtifactStore + ?Sized> Observer for T {}

impl<T: ScalarLog + ?Sized> ScalarLog for Box<T> {
    fn log_scalar(&mut self, tag: &str, value: f64, step: u64) {
        (**self).log_scalar(tag, value, step)
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for Box<T> {
    fn persist(&mut self, blob: &[u8], name: &str) -> Result<PathBuf> {
        (**self).persist(blob, name)
    }

    fn register_artifact(&mut self, location: &Path, name: &str) -> Result<()> {
        (**self).register_artifact(location, name)
    }
}
