use std::{
    io::{self, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::{
    Result, commands,
    config::{ExperimentConfig, Override},
};

/// Trains and inspects the classification and segmentation experiments.
#[derive(Debug, Parser)]
#[command(name = "experiments", version)]
pub struct Cli {
    /// A json file whose top level keys replace the defaults.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Applies a named preset, in the order given.
    #[arg(long = "with", value_name = "PRESET")]
    pub presets: Vec<String>,

    /// Assigns a json value to a dotted configuration path, after every preset.
    #[arg(long = "set", value_name = "KEY=JSON")]
    pub overrides: Vec<Override>,

    /// The directory holding every observed run.
    #[arg(long, value_name = "DIR", default_value = "runs")]
    pub runs: PathBuf,

    /// Keeps the run out of the runs directory.
    #[arg(long)]
    pub unobserved: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Trains a freshly initialized model, the default.
    Train,

    /// Prints the shapes of a training batch and of its prediction.
    PrintShapes,

    /// Prints the layers of the model.
    PrintArchitecture,

    /// Prints every parameter tensor with its shape.
    PrintParameters,

    /// Scores persisted weights on a subset.
    Evaluate {
        #[arg(long, value_name = "FILE")]
        weights: PathBuf,

        #[arg(long, value_name = "NAME")]
        subset: String,
    },

    /// Writes a segmentation next to every image under a directory.
    SegmentDir {
        #[arg(long, value_name = "DIR")]
        path: PathBuf,

        #[arg(long, value_name = "FILE")]
        weights: Option<PathBuf>,
    },
}

impl Cli {
    /// Resolves the configuration and runs the command.
    ///
    /// # Arguments
    /// * `cancel` - Interrupts a training run once cancelled.
    pub fn run(self, cancel: &CancellationToken) -> Result<()> {
        let config = ExperimentConfig::resolve(
            self.config.as_deref(),
            &self.presets,
            &self.overrides,
        )?;

        let stdout = io::stdout();
        let mut out = stdout.lock();

        match self.command.unwrap_or(Command::Train) {
            Command::Train => {
                let runs = (!self.unobserved).then_some(self.runs.as_path());
                commands::train(&config, runs, cancel, &mut out)?;
            }
            Command::PrintShapes => commands::print_shapes(&config, &mut out)?,
            Command::PrintArchitecture => commands::print_architecture(&config, &mut out)?,
            Command::PrintParameters => commands::print_parameters(&config, &mut out)?,
            Command::Evaluate { weights, subset } => {
                commands::evaluate(&config, &weights, &subset, &mut out)?;
            }
            Command::SegmentDir { path, weights } => {
                let segmented = commands::segment_dir(&config, &path, weights.as_deref())?;
                info!("segmented {} images", segmented.len());
            }
        }

        out.flush()?;
        Ok(())
    }
}
