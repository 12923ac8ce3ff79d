mod overrides;
pub mod presets;

use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::debug;
use machine_learning::{
    arch::build_model,
    specs::{ActFnSpec, LayerSpec, LossFnSpec, MetricSpec, ModelSpec, OptimizerSpec},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trainer::{Device, TRAIN, TrainerConfig};

pub use overrides::Override;

use crate::{ExperimentErr, Result, datasets::DatasetSpec};

/// The whole configuration of an experiment, built once per process.
///
/// Built in defaults are a tiny-imagenet classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub dataset: DatasetSpec,

    /// The width of the model's output.
    pub n_classes: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub model: ModelSpec,
    pub optimizer: OptimizerSpec,
    pub loss: LossFnSpec,
    pub metric: MetricSpec,

    /// Seeds the parameter initialization and the shuffling.
    pub seed: Option<u64>,

    /// Reshuffles the training subset before every epoch.
    pub shuffle: bool,
    pub device: String,
    pub log_norms: bool,
    pub log_gradnorms: bool,
    pub print_architecture: bool,
    pub evaluate_on: Vec<String>,
    pub validate_on: Vec<String>,
    pub epochs_per_checkpoint: Option<usize>,
    pub weights_name: String,

    /// A checkpoint the model starts from instead of its random initialization.
    pub init_weights: Option<PathBuf>,

    /// Prefixes of the names of the tensors to train, every tensor is trained when unset.
    pub trainable_params: Option<Vec<String>>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetSpec::Tensors {
                dir: "data/tiny-imagenet".into(),
            },
            n_classes: 200,
            batch_size: 100,
            n_epochs: 10,
            model: ModelSpec::Sequential {
                layers: vec![
                    LayerSpec::Dense {
                        dim: (512, 256),
                        act_fn: Some(ActFnSpec::Relu),
                    },
                    LayerSpec::Dense {
                        dim: (256, 200),
                        act_fn: None,
                    },
                ],
            },
            optimizer: OptimizerSpec::Adam {
                learning_rate: 1e-3,
                beta1: 0.6,
                beta2: 0.999,
                epsilon: 1e-8,
            },
            loss: LossFnSpec::CrossEntropy,
            metric: MetricSpec::Accuracy,
            seed: None,
            shuffle: false,
            device: "cpu".into(),
            log_norms: false,
            log_gradnorms: false,
            print_architecture: false,
            evaluate_on: vec!["val".into()],
            validate_on: Vec::new(),
            epochs_per_checkpoint: None,
            weights_name: "weights".into(),
            init_weights: None,
            trainable_params: None,
        }
    }
}

impl ExperimentConfig {
    /// Layers the configuration sources and validates the result.
    ///
    /// Defaults come first, then the top level keys of the json `file`, then every preset in
    /// order and finally every override.
    ///
    /// # Arguments
    /// * `file` - An optional json file with top level keys to replace.
    /// * `presets` - Names of presets to apply.
    /// * `overrides` - Dotted path assignments.
    ///
    /// # Returns
    /// The validated configuration.
    pub fn resolve(
        file: Option<&Path>,
        presets: &[String],
        overrides: &[Override],
    ) -> Result<Self> {
        let mut value = serde_json::to_value(Self::default())?;

        if let Some(path) = file {
            let patch: Value = serde_json::from_slice(&fs::read(path)?)?;
            let Value::Object(patch) = patch else {
                return Err(ExperimentErr::InvalidConfig(format!(
                    "{} must hold a json object",
                    path.display()
                )));
            };
            replace_keys(&mut value, patch);
        }

        for name in presets {
            debug!(preset = name.as_str(); "applying preset");
            replace_keys(&mut value, presets::preset(name)?);
        }

        for o in overrides {
            o.apply(&mut value)?;
        }

        let config: Self = serde_json::from_value(value)
            .map_err(|e| ExperimentErr::InvalidConfig(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    /// Checks the configuration describes a runnable experiment.
    ///
    /// # Errors
    /// `ExperimentErr::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ExperimentErr::InvalidConfig(msg));

        if self.batch_size == 0 {
            return invalid("batch_size must be positive".into());
        }

        if self.epochs_per_checkpoint == Some(0) {
            return invalid("epochs_per_checkpoint must be positive".into());
        }

        self.trainer_config()?.validate()?;

        let mut model = build_model(&self.model)
            .map_err(|e| ExperimentErr::InvalidConfig(e.to_string()))?;

        if let Some(prefixes) = &self.trainable_params {
            model
                .train_only(prefixes)
                .map_err(|e| ExperimentErr::InvalidConfig(e.to_string()))?;
        }
        let outputs = model.layers().last().map_or(0, |layer| layer.dim().1);

        if outputs != self.n_classes {
            return invalid(format!(
                "the model outputs {outputs} values but n_classes is {}",
                self.n_classes
            ));
        }

        if self.loss == LossFnSpec::CrossEntropy && self.n_classes < 2 {
            return invalid("cross entropy needs at least two classes".into());
        }

        match self.metric {
            MetricSpec::Iou { threshold } if !(0. ..1.).contains(&threshold) => {
                return invalid(format!("iou threshold {threshold} is not in [0, 1)"));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn batch_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| ExperimentErr::InvalidConfig("batch_size must be positive".into()))
    }

    pub fn device(&self) -> Result<Device> {
        Ok(self.device.parse()?)
    }

    /// Derives the configuration handed to the training loop.
    pub fn trainer_config(&self) -> Result<TrainerConfig> {
        Ok(TrainerConfig::new(self.n_epochs)
            .evaluate_on(self.evaluate_on.iter().cloned())
            .validate_on(self.validate_on.iter().cloned())
            .device(self.device()?)
            .log_norms(self.log_norms)
            .log_gradnorms(self.log_gradnorms)
            .epochs_per_checkpoint(self.epochs_per_checkpoint.and_then(NonZeroUsize::new))
            .weights_name(self.weights_name.clone()))
    }

    /// Every subset a training run reads: `train` and the evaluated ones.
    pub fn run_subsets(&self) -> Vec<&str> {
        let mut subsets = vec![TRAIN];
        for subset in self.evaluate_on.iter().chain(&self.validate_on) {
            if !subsets.contains(&subset.as_str()) {
                subsets.push(subset);
            }
        }
        subsets
    }
}

fn replace_keys(target: &mut Value, patch: serde_json::Map<String, Value>) {
    if let Value::Object(target) = target {
        for (key, value) in patch {
            target.insert(key, value);
        }
    }
}
