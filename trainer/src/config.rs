use std::{
    fmt::{self, Display},
    num::NonZeroUsize,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{Result, TrainerErr};

/// Where the model lives while training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
}

impl FromStr for Device {
    type Err = TrainerErr;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            other => Err(TrainerErr::InvalidConfig(format!(
                "device {other:?} is not available, only \"cpu\" is supported"
            ))),
        }
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Immutable bounds and switches of a training run.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    epochs: usize,
    evaluate_on: Vec<String>,
    validate_on: Vec<String>,
    device: Device,
    log_norms: bool,
    log_gradnorms: bool,
    epochs_per_checkpoint: Option<NonZeroUsize>,
    weights_name: String,
}

impl TrainerConfig {
    /// Creates a new trainer configuration that evaluates nothing and logs no norms.
    ///
    /// # Args
    /// * `epochs` - Number of passes over the training subset.
    ///
    /// # Returns
    /// A `TrainerConfig` instance.
    pub fn new(epochs: usize) -> Self {
        Self {
            epochs,
            evaluate_on: Vec::new(),
            validate_on: Vec::new(),
            device: Device::Cpu,
            log_norms: false,
            log_gradnorms: false,
            epochs_per_checkpoint: None,
            weights_name: "weights".into(),
        }
    }

    /// Subsets evaluated at the end of every epoch.
    pub fn evaluate_on<I, S>(mut self, subsets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.evaluate_on = subsets.into_iter().map(Into::into).collect();
        self
    }

    /// Subsets evaluated once, after the final weights were persisted.
    pub fn validate_on<I, S>(mut self, subsets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validate_on = subsets.into_iter().map(Into::into).collect();
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Whether to log the norm of every parameter tensor after each batch.
    pub fn log_norms(mut self, log_norms: bool) -> Self {
        self.log_norms = log_norms;
        self
    }

    /// Whether to log the norm of every gradient tensor after each batch.
    pub fn log_gradnorms(mut self, log_gradnorms: bool) -> Self {
        self.log_gradnorms = log_gradnorms;
        self
    }

    /// Persists an intermediate checkpoint every `epochs` epochs.
    pub fn epochs_per_checkpoint(mut self, epochs: Option<NonZeroUsize>) -> Self {
        self.epochs_per_checkpoint = epochs;
        self
    }

    /// The name the final weights are registered under.
    pub fn weights_name(mut self, name: impl Into<String>) -> Self {
        self.weights_name = name.into();
        self
    }

    /// Checks the configuration can drive a run.
    ///
    /// # Errors
    /// `TrainerErr::InvalidConfig` on empty subset or artifact names.
    pub fn validate(&self) -> Result<()> {
        if let Some(subset) = self
            .evaluate_on
            .iter()
            .chain(&self.validate_on)
            .find(|s| s.trim().is_empty())
        {
            return Err(TrainerErr::InvalidConfig(format!(
                "subset names must not be empty, got {subset:?}"
            )));
        }

        if self.weights_name.trim().is_empty() || self.weights_name.contains(['/', '\\']) {
            return Err(TrainerErr::InvalidConfig(format!(
                "{:?} is not a valid artifact name",
                self.weights_name
            )));
        }

        Ok(())
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn evaluated_subsets(&self) -> &[String] {
        &self.evaluate_on
    }

    pub fn validated_subsets(&self) -> &[String] {
        &self.validate_on
    }

    pub fn target_device(&self) -> Device {
        self.device
    }

    pub fn logs_norms(&self) -> bool {
        self.log_norms
    }

    pub fn logs_gradnorms(&self) -> bool {
        self.log_gradnorms
    }

    pub fn checkpoint_every(&self) -> Option<NonZeroUsize> {
        self.epochs_per_checkpoint
    }

    pub fn weights(&self) -> &str {
        &self.weights_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuda_is_rejected() {
        assert!(matches!(
            "cuda:0".parse::<Device>(),
            Err(TrainerErr::InvalidConfig(_))
        ));
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
    }

    #[test]
    fn empty_subset_name_is_invalid() {
        let cfg = TrainerConfig::new(1).evaluate_on(["val", " "]);

        assert!(matches!(cfg.validate(), Err(TrainerErr::InvalidConfig(_))));
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = TrainerConfig::new(0);

        cfg.validate().unwrap();
        assert_eq!(cfg.weights(), "weights");
        assert!(cfg.checkpoint_every().is_none());
    }
}
