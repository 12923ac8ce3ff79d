use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{ArtifactStore, ScalarLog};
use crate::Result;

const CONFIG_FILE: &str = "config.json";
const RUN_FILE: &str = "run.json";
const METRICS_FILE: &str = "metrics.json";

/// The status recorded in `run.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactEntry {
    name: String,
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunRecord {
    id: u64,
    command: String,
    status: RunStatus,
    start_time: DateTime<Utc>,
    stop_time: Option<DateTime<Utc>>,
    artifacts: Vec<ArtifactEntry>,
    result: Option<serde_json::Value>,
    fail_trace: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Series {
    steps: Vec<u64>,
    values: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
}

/// A run directory, `<root>/<id>/`, holding the configuration, the run record, every scalar series
/// and the artifacts of one run. Ids are consecutive integers starting at 1.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    run: RunRecord,
    metrics: BTreeMap<String, Series>,
}

impl FileStorage {
    /// Opens a new run under `root`.
    ///
    /// # Arguments
    /// * `root` - The directory holding every run, created if missing.
    /// * `command` - The command being run.
    /// * `config` - The configuration of the run, written to `config.json`.
    ///
    /// # Returns
    /// The storage of the new run, or an io error.
    pub fn create<C: Serialize>(root: &Path, command: &str, config: &C) -> Result<Self> {
        fs::create_dir_all(root)?;

        let id = next_run_id(root)?;
        let dir = root.join(id.to_string());
        fs::create_dir(&dir)?;

        fs::write(dir.join(CONFIG_FILE), serde_json::to_vec_pretty(config)?)?;

        let storage = Self {
            dir,
            run: RunRecord {
                id,
                command: command.to_string(),
                status: RunStatus::Running,
                start_time: Utc::now(),
                stop_time: None,
                artifacts: Vec::new(),
                result: None,
                fail_trace: None,
            },
            metrics: BTreeMap::new(),
        };

        storage.write_run()?;
        debug!(run = id; "created run directory {}", storage.dir.display());
        Ok(storage)
    }

    pub fn id(&self) -> u64 {
        self.run.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Closes the run, flushing every scalar and recording how it ended.
    ///
    /// # Arguments
    /// * `status` - How the run ended.
    /// * `result` - A json summary of the run, if any.
    /// * `fail_trace` - The error that stopped the run, if any.
    pub fn finish(
        &mut self,
        status: RunStatus,
        result: Option<serde_json::Value>,
        fail_trace: Option<String>,
    ) -> Result<()> {
        self.run.status = status;
        self.run.stop_time = Some(Utc::now());
        self.run.result = result;
        self.run.fail_trace = fail_trace;

        self.flush()?;
        self.write_run()
    }

    /// Writes every scalar logged so far to `metrics.json`.
    pub fn flush(&self) -> Result<()> {
        fs::write(
            self.dir.join(METRICS_FILE),
            serde_json::to_vec_pretty(&self.metrics)?,
        )?;
        Ok(())
    }

    fn write_run(&self) -> Result<()> {
        fs::write(
            self.dir.join(RUN_FILE),
            serde_json::to_vec_pretty(&self.run)?,
        )?;
        Ok(())
    }
}

fn next_run_id(root: &Path) -> Result<u64> {
    let mut max = 0;

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        if let Some(id) = entry.file_name().to_str().and_then(|s| s.parse::<u64>().ok()) {
            max = max.max(id);
        }
    }

    Ok(max + 1)
}

impl ScalarLog for FileStorage {
    fn log_scalar(&mut self, tag: &str, value: f64, step: u64) {
        let series = self.metrics.entry(tag.to_string()).or_default();
        series.steps.push(step);
        series.values.push(value);
        series.timestamps.push(Utc::now());
    }
}

impl ArtifactStore for FileStorage {
    fn persist(&mut self, blob: &[u8], name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, blob)?;
        Ok(path)
    }

    fn register_artifact(&mut self, location: &Path, name: &str) -> Result<()> {
        self.run.artifacts.push(ArtifactEntry {
            name: name.to_string(),
            path: location.to_path_buf(),
        });

        if let Err(e) = self.flush() {
            warn!("could not flush metrics of run {}: {e}", self.run.id);
        }

        self.write_run()
    }
}
