use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{ArtifactStore, ScalarLog};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: u64,
}

/// Keeps every logged scalar in memory and writes artifacts to a plain directory.
#[derive(Debug)]
pub struct MemoryObserver {
    dir: PathBuf,
    scalars: Vec<ScalarRecord>,
    persisted: Vec<PathBuf>,
    registered: Vec<(String, PathBuf)>,
}

impl MemoryObserver {
    /// Creates a new `MemoryObserver`.
    ///
    /// # Arguments
    /// * `dir` - Where artifacts are written, created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            scalars: Vec::new(),
            persisted: Vec::new(),
            registered: Vec::new(),
        }
    }

    pub fn scalars(&self) -> &[ScalarRecord] {
        &self.scalars
    }

    /// Returns the `(step, value)` pairs logged under `tag`, in logging order.
    pub fn series(&self, tag: &str) -> Vec<(u64, f64)> {
        self.scalars
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.scalars.iter().filter(|r| r.tag == tag).count()
    }

    pub fn persisted(&self) -> &[PathBuf] {
        &self.persisted
    }

    pub fn registered(&self) -> &[(String, PathBuf)] {
        &self.registered
    }
}

impl ScalarLog for MemoryObserver {
    fn log_scalar(&mut self, tag: &str, value: f64, step: u64) {
        self.scalars.push(ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        });
    }
}

impl ArtifactStore for MemoryObserver {
    fn persist(&mut self, blob: &[u8], name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        fs::write(&path, blob)?;
        self.persisted.push(path.clone());
        Ok(path)
    }

    fn register_artifact(&mut self, location: &Path, name: &str) -> Result<()> {
        self.registered
            .push((name.to_string(), location.to_path_buf()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_filters_by_tag() {
        let mut observer = MemoryObserver::new("unused");
        observer.log_scalar("batch.loss", 0.5, 0);
        observer.log_scalar("batch.accuracy", 0.25, 0);
        observer.log_scalar("batch.loss", 0.4, 1);

        assert_eq!(observer.series("batch.loss"), [(0, 0.5), (1, 0.4)]);
        assert_eq!(observer.count("batch.accuracy"), 1);
    }

    #[test]
    fn persist_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = MemoryObserver::new(dir.path().join("artifacts"));

        let path = observer.persist(b"abc", "weights.safetensors").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"abc");
        assert_eq!(observer.persisted(), [path]);
    }
}
