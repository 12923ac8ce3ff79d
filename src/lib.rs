pub mod builder;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datasets;
pub mod error;

pub use builder::{Experiment, ExperimentBuilder};
pub use cli::{Cli, Command};
pub use config::{ExperimentConfig, Override};
pub use error::{ExperimentErr, Result};
