use std::{error::Error, fmt, io};

use machine_learning::MlErr;
use trainer::TrainerErr;

/// The experiments' result type.
pub type Result<T> = std::result::Result<T, ExperimentErr>;

/// Failures while configuring or running an experiment.
#[derive(Debug)]
pub enum ExperimentErr {
    Io(io::Error),
    Json(serde_json::Error),
    Ml(MlErr),
    Trainer(TrainerErr),
    UnknownPreset(String),
    InvalidConfig(String),
    InvalidOverride(String),
    UnknownSubset(String),
    Dataset(String),
}

impl fmt::Display for ExperimentErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentErr::Io(e) => write!(f, "io error: {e}"),
            ExperimentErr::Json(e) => write!(f, "json error: {e}"),
            ExperimentErr::Ml(e) => write!(f, "{e}"),
            ExperimentErr::Trainer(e) => write!(f, "{e}"),
            ExperimentErr::UnknownPreset(name) => write!(f, "unknown preset {name:?}"),
            ExperimentErr::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            ExperimentErr::InvalidOverride(msg) => write!(f, "invalid override: {msg}"),
            ExperimentErr::UnknownSubset(name) => write!(f, "unknown subset {name:?}"),
            ExperimentErr::Dataset(msg) => write!(f, "malformed dataset: {msg}"),
        }
    }
}

impl Error for ExperimentErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExperimentErr::Io(e) => Some(e),
            ExperimentErr::Json(e) => Some(e),
            ExperimentErr::Ml(e) => Some(e),
            ExperimentErr::Trainer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExperimentErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<walkdir::Error> for ExperimentErr {
    fn from(value: walkdir::Error) -> Self {
        Self::Io(value.into())
    }
}

impl From<serde_json::Error> for ExperimentErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<MlErr> for ExperimentErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<TrainerErr> for ExperimentErr {
    fn from(value: TrainerErr) -> Self {
        match value {
            TrainerErr::UnknownSubset(name) => Self::UnknownSubset(name),
            TrainerErr::InvalidConfig(msg) => Self::InvalidConfig(msg),
            other => Self::Trainer(other),
        }
    }
}
