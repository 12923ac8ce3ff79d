use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The trainer module's result type.
pub type Result<T> = std::result::Result<T, TrainerErr>;

/// Training run failures.
#[derive(Debug)]
pub enum TrainerErr {
    Io(io::Error),
    Ml(MlErr),
    Json(serde_json::Error),
    InvalidConfig(String),
    UnknownSubset(String),
    EmptySubset(String),
    Checkpoint(String),
    CheckpointMismatch(MlErr),
}

impl fmt::Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainerErr::Io(e) => write!(f, "io error: {e}"),
            TrainerErr::Ml(e) => write!(f, "model error: {e}"),
            TrainerErr::Json(e) => write!(f, "json error: {e}"),
            TrainerErr::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            TrainerErr::UnknownSubset(name) => write!(f, "unknown subset {name:?}"),
            TrainerErr::EmptySubset(name) => write!(f, "subset {name:?} has nothing to evaluate"),
            TrainerErr::Checkpoint(msg) => write!(f, "malformed checkpoint: {msg}"),
            TrainerErr::CheckpointMismatch(e) => {
                write!(f, "checkpoint doesn't match the model: {e}")
            }
        }
    }
}

impl Error for TrainerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainerErr::Io(e) => Some(e),
            TrainerErr::Ml(e) | TrainerErr::CheckpointMismatch(e) => Some(e),
            TrainerErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for TrainerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<serde_json::Error> for TrainerErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<safetensors::SafeTensorError> for TrainerErr {
    fn from(value: safetensors::SafeTensorError) -> Self {
        Self::Checkpoint(format!("{value:?}"))
    }
}
