use std::path::Path;

use log::{debug, info};
use machine_learning::{
    arch::{
        Mode, Model, Sequential, build_model,
        loss::{CrossEntropy, Dice, LossFn, Mse},
    },
    metrics::{Accuracy, Iou, Metric},
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
    specs::{LossFnSpec, MetricSpec, OptimizerSpec},
};
use ndarray::{Array2, ArrayView2};
use rand::{SeedableRng, rngs::StdRng};
use tokio_util::sync::CancellationToken;
use trainer::{
    DataSource, Observer, RunSummary, TrainLoop, TrainerConfig, TrainerErr, checkpoint,
};

use crate::{Result, config::ExperimentConfig};

/// One parameter tensor of an experiment's model.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub trainable: bool,
}

/// A model ready to be trained, inspected or evaluated, with its optimizer, loss and metric
/// already resolved.
pub trait Experiment: Send {
    /// Returns a printable description of the model's layers.
    fn architecture(&self) -> String;

    /// Returns the total amount of parameters of the model.
    fn num_params(&self) -> usize;

    /// Describes every parameter tensor, in layout order.
    fn parameters(&self) -> Vec<ParameterInfo>;

    fn input_features(&self) -> usize;

    fn output_features(&self) -> usize;

    fn metric_name(&self) -> &'static str;

    /// Runs the model forward without keeping anything for a backward pass.
    fn predict(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Replaces the model's parameters with a persisted checkpoint.
    ///
    /// # Errors
    /// If the file can't be read or its tensors don't match the model.
    fn load_weights(&mut self, path: &Path) -> Result<()>;

    /// Scores the model on a whole subset with the configured metric.
    fn evaluate(&mut self, source: &mut dyn DataSource, subset: &str) -> Result<f64>;

    /// Runs the training loop to completion or cancellation, consuming the experiment.
    ///
    /// # Arguments
    /// * `source` - Provides every subset of the run.
    /// * `observer` - Receives the scalars and the weights of the run.
    /// * `cancel` - Stops training at the next batch once cancelled.
    ///
    /// # Returns
    /// The accounting of the finished run.
    fn train(
        self: Box<Self>,
        source: &mut dyn DataSource,
        observer: &mut dyn Observer,
        cancel: &CancellationToken,
    ) -> Result<RunSummary>;
}

struct ModelExperiment<O, L> {
    model: Sequential,
    optimizer: O,
    loss: L,
    metric: Box<dyn Metric + Send>,
    trainer_config: TrainerConfig,
}

impl<O, L> Experiment for ModelExperiment<O, L>
where
    O: Optimizer + Send + 'static,
    L: LossFn + Send + 'static,
{
    fn architecture(&self) -> String {
        self.model.to_string()
    }

    fn num_params(&self) -> usize {
        self.model.size()
    }

    fn parameters(&self) -> Vec<ParameterInfo> {
        self.model
            .named_tensors()
            .into_iter()
            .map(|tensor| ParameterInfo {
                name: tensor.name,
                shape: tensor.shape,
                trainable: tensor.trainable,
            })
            .collect()
    }

    fn input_features(&self) -> usize {
        self.model.layers().first().map_or(0, |layer| layer.dim().0)
    }

    fn output_features(&self) -> usize {
        self.model.layers().last().map_or(0, |layer| layer.dim().1)
    }

    fn metric_name(&self) -> &'static str {
        self.metric.name()
    }

    fn predict(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.model.set_mode(Mode::Eval);
        Ok(self.model.forward(x)?)
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        let state = checkpoint::load(path)?;
        self.model
            .load_state(&state)
            .map_err(TrainerErr::CheckpointMismatch)?;

        debug!(tensors = state.len(); "loaded weights from {}", path.display());
        Ok(())
    }

    fn evaluate(&mut self, source: &mut dyn DataSource, subset: &str) -> Result<f64> {
        Ok(trainer::evaluate(
            &mut self.model,
            source,
            subset,
            &*self.metric,
        )?)
    }

    fn train(
        self: Box<Self>,
        source: &mut dyn DataSource,
        observer: &mut dyn Observer,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let Self {
            model,
            optimizer,
            loss,
            metric,
            trainer_config,
        } = *self;

        let train_loop = TrainLoop::new(trainer_config, model, optimizer, loss, metric)?;
        let trained = train_loop.run(source, observer, cancel)?;
        Ok(trained.summary)
    }
}

/// Builds `Experiment`s given a configuration.
pub struct ExperimentBuilder;

impl ExperimentBuilder {
    /// Creates a new `ExperimentBuilder`.
    ///
    /// # Returns
    /// A new `ExperimentBuilder` instance.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `Experiment` following a configuration.
    ///
    /// The model parameters are sampled from the configured seed, or from the os when there's
    /// none. Then the initial weights are loaded, if any, and the tensors that are not trainable
    /// are frozen.
    ///
    /// # Arguments
    /// * `config` - The configuration of the experiment.
    ///
    /// # Returns
    /// A new experiment or an error if the model can't be built or the initial weights don't
    /// match it.
    pub fn build(&self, config: &ExperimentConfig) -> Result<Box<dyn Experiment>> {
        let mut model = build_model(&config.model)?;
        model.initialize(&mut self.generate_rng(config.seed))?;

        if let Some(path) = &config.init_weights {
            info!("loading initial weights from {}", path.display());
            let state = checkpoint::load(path)?;
            model
                .load_state(&state)
                .map_err(TrainerErr::CheckpointMismatch)?;
        }

        if let Some(prefixes) = &config.trainable_params {
            model.train_only(prefixes)?;
        }

        self.resolve_optimizer(config, model)
    }

    /// Generates a random number generator given (or not) a seed.
    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Resolves the `Optimizer` for this experiment.
    ///
    /// # Arguments
    /// * `config` - The configuration of the experiment.
    /// * `model` - The initialized model.
    fn resolve_optimizer(
        &self,
        config: &ExperimentConfig,
        model: Sequential,
    ) -> Result<Box<dyn Experiment>> {
        let len = model.size();

        match config.optimizer {
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                let optimizer = Adam::new(len, learning_rate, beta1, beta2, epsilon);
                self.resolve_loss(config, model, optimizer)
            }
            OptimizerSpec::GradientDescent { learning_rate } => {
                let optimizer = GradientDescent::new(learning_rate);
                self.resolve_loss(config, model, optimizer)
            }
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
                nesterov,
            } => {
                let optimizer =
                    GradientDescentWithMomentum::new(len, learning_rate, momentum, nesterov);
                self.resolve_loss(config, model, optimizer)
            }
        }
    }

    /// Resolves the `LossFn` for this experiment.
    ///
    /// # Arguments
    /// * `config` - The configuration of the experiment.
    /// * `model` - The initialized model.
    /// * `optimizer` - A resolved optimizer.
    fn resolve_loss<O>(
        &self,
        config: &ExperimentConfig,
        model: Sequential,
        optimizer: O,
    ) -> Result<Box<dyn Experiment>>
    where
        O: Optimizer + Send + 'static,
    {
        match config.loss {
            LossFnSpec::Mse => self.terminate_build(config, model, optimizer, Mse::new()),
            LossFnSpec::CrossEntropy => {
                self.terminate_build(config, model, optimizer, CrossEntropy::new())
            }
            LossFnSpec::Dice { smooth } => {
                self.terminate_build(config, model, optimizer, Dice::new(smooth))
            }
        }
    }

    /// Terminates the entire build for this experiment.
    ///
    /// # Arguments
    /// * `config` - The configuration of the experiment.
    /// * `model` - The initialized model.
    /// * `optimizer` - A resolved optimizer.
    /// * `loss` - A resolved loss function.
    fn terminate_build<O, L>(
        &self,
        config: &ExperimentConfig,
        model: Sequential,
        optimizer: O,
        loss: L,
    ) -> Result<Box<dyn Experiment>>
    where
        O: Optimizer + Send + 'static,
        L: LossFn + Send + 'static,
    {
        let metric: Box<dyn Metric + Send> = match config.metric {
            MetricSpec::Accuracy => Box::new(Accuracy),
            MetricSpec::Iou { threshold } => Box::new(Iou::new(threshold)),
        };

        Ok(Box::new(ModelExperiment {
            model,
            optimizer,
            loss,
            metric,
            trainer_config: config.trainer_config()?,
        }))
    }
}

impl Default for ExperimentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::specs::{ActFnSpec, LayerSpec, ModelSpec};
    use ndarray::array;

    use super::*;
    use crate::ExperimentErr;

    fn config(seed: Option<u64>) -> ExperimentConfig {
        ExperimentConfig {
            n_classes: 2,
            model: ModelSpec::Sequential {
                layers: vec![
                    LayerSpec::Dense {
                        dim: (3, 4),
                        act_fn: Some(ActFnSpec::Tanh),
                    },
                    LayerSpec::Dense {
                        dim: (4, 2),
                        act_fn: None,
                    },
                ],
            },
            seed,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn inspection_follows_the_model() {
        let experiment = ExperimentBuilder::new().build(&config(Some(1))).unwrap();

        assert_eq!(experiment.num_params(), 3 * 4 + 4 + 4 * 2 + 2);
        assert_eq!(experiment.input_features(), 3);
        assert_eq!(experiment.output_features(), 2);
        assert_eq!(experiment.metric_name(), "accuracy");
        let shapes: Vec<(String, Vec<usize>)> = experiment
            .parameters()
            .into_iter()
            .map(|p| (p.name, p.shape))
            .collect();
        assert_eq!(
            shapes,
            [
                ("layers.0.weight".to_string(), vec![3, 4]),
                ("layers.0.bias".to_string(), vec![4]),
                ("layers.1.weight".to_string(), vec![4, 2]),
                ("layers.1.bias".to_string(), vec![2]),
            ]
        );
        assert!(experiment.parameters().iter().all(|p| p.trainable));
        assert!(experiment.architecture().starts_with("Sequential("));
    }

    #[test]
    fn seeded_builds_are_reproducible() {
        let x = array![[0.5, -1.0, 2.0], [1.0, 1.0, 1.0]];
        let builder = ExperimentBuilder::new();

        let a = builder.build(&config(Some(9))).unwrap().predict(x.view()).unwrap();
        let b = builder.build(&config(Some(9))).unwrap().predict(x.view()).unwrap();
        let c = builder.build(&config(Some(10))).unwrap().predict(x.view()).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn missing_weights_fail_to_load() {
        let mut experiment = ExperimentBuilder::new().build(&config(None)).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = experiment
            .load_weights(&dir.path().join("weights.safetensors"))
            .unwrap_err();

        assert!(matches!(err, ExperimentErr::Trainer(TrainerErr::Io(_))));
    }

    #[test]
    fn initial_weights_replace_the_random_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("start.safetensors");
        let x = array![[0.5, -1.0, 2.0]];

        let mut source = build_model(&config(None).model).unwrap();
        source.initialize(&mut StdRng::seed_from_u64(3)).unwrap();
        let blob = checkpoint::encode(&source.state(), Default::default()).unwrap();
        std::fs::write(&path, blob).unwrap();

        let mut config = config(Some(1));
        config.init_weights = Some(path);
        let mut experiment = ExperimentBuilder::new().build(&config).unwrap();

        source.set_mode(Mode::Eval);
        assert_eq!(
            experiment.predict(x.view()).unwrap(),
            source.forward(x.view()).unwrap()
        );
    }

    #[test]
    fn initial_weights_must_match_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("start.safetensors");
        let other = Sequential::new([machine_learning::arch::layers::Layer::dense((3, 2), None)]);
        std::fs::write(&path, checkpoint::encode(&other.state(), Default::default()).unwrap())
            .unwrap();

        let mut config = config(None);
        config.init_weights = Some(path);
        let err = ExperimentBuilder::new().build(&config).err().unwrap();

        assert!(matches!(
            err,
            ExperimentErr::Trainer(TrainerErr::CheckpointMismatch(_))
        ));
    }

    #[test]
    fn trainable_params_freeze_the_rest() {
        let mut config = config(Some(1));
        config.trainable_params = Some(vec!["layers.1".into()]);

        let experiment = ExperimentBuilder::new().build(&config).unwrap();

        let trainable: Vec<bool> = experiment.parameters().iter().map(|p| p.trainable).collect();
        assert_eq!(trainable, [false, false, true, true]);
    }
}
