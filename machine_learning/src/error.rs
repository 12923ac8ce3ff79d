use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    MissingTensor(String),
    UnexpectedTensor(String),
    NoSuchTensors(String),
    GradDisabled,
    InvalidSpec(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "The tensor {what} has shape {got:?} but the model expects {expected:?}"
            ),
            MlErr::MissingTensor(name) => write!(f, "The state is missing the tensor {name}"),
            MlErr::UnexpectedTensor(name) => {
                write!(f, "The state contains the unknown tensor {name}")
            }
            MlErr::NoSuchTensors(prefix) => {
                write!(f, "No tensor of the model starts with {prefix}")
            }
            MlErr::GradDisabled => write!(
                f,
                "Tried to backpropagate through a model in evaluation mode"
            ),
            MlErr::InvalidSpec(msg) => write!(f, "Invalid model specification: {msg}"),
        }
    }
}

impl Error for MlErr {}
