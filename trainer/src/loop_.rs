use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use machine_learning::{
    arch::{Mode, Model, loss::LossFn},
    metrics::{Metric, Score},
    optimization::Optimizer,
};
use ndarray::ArrayView2;
use tokio_util::sync::CancellationToken;

use crate::{
    Result, TrainerErr,
    checkpoint::{self, CheckpointMeta},
    config::TrainerConfig,
    data::{DataSource, TRAIN},
    metrics::{Outcome, RunSummary},
    observer::{Observer, ScalarLog},
    state::{Phase, RunState},
};

/// The model of a finished run together with its accounting.
#[derive(Debug)]
pub struct Trained<M> {
    pub model: M,
    pub summary: RunSummary,
}

/// Drives the epochs and batches of a training run.
///
/// Every run ends with the final weights persisted, reloaded into the model and registered, be
/// it completed, interrupted or failed. `run` consumes the loop so this happens once.
pub struct TrainLoop<M, O, L> {
    cfg: TrainerConfig,
    model: M,
    optimizer: O,
    loss: L,
    metric: Box<dyn Metric + Send>,
    state: RunState,
    eval_time: Duration,
}

impl<M, O, L> TrainLoop<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Creates a new `TrainLoop`.
    ///
    /// # Args
    /// * `cfg` - The bounds and switches of the run.
    /// * `model` - The model to train, already initialized.
    /// * `optimizer` - Updates the model's parameters after each batch.
    /// * `loss` - The objective to minimize.
    /// * `metric` - Scored on every batch and on every evaluated subset.
    ///
    /// # Returns
    /// A new `TrainLoop` or `TrainerErr::InvalidConfig`.
    pub fn new(
        cfg: TrainerConfig,
        model: M,
        optimizer: O,
        loss: L,
        metric: Box<dyn Metric + Send>,
    ) -> Result<Self> {
        cfg.validate()?;

        Ok(Self {
            cfg,
            model,
            optimizer,
            loss,
            metric,
            state: RunState::new(),
            eval_time: Duration::ZERO,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn run_state(&self) -> &RunState {
        &self.state
    }

    /// Trains the model for the configured amount of epochs and finalizes the run.
    ///
    /// # Args
    /// * `source` - Provides the `train` subset and every evaluated subset.
    /// * `observer` - Receives the scalars and artifacts of the run.
    /// * `cancel` - Stops the run at the next batch or epoch boundary once cancelled.
    ///
    /// # Returns
    /// The trained model and the run summary. An interrupted run is not an error.
    ///
    /// # Errors
    /// The first error raised while training, after finalizing. If training succeeded, any error
    /// raised while finalizing.
    pub fn run<S, B>(
        mut self,
        source: &mut S,
        observer: &mut B,
        cancel: &CancellationToken,
    ) -> Result<Trained<M>>
    where
        S: DataSource + ?Sized,
        B: Observer + ?Sized,
    {
        info!(epochs = self.cfg.epochs(), params = self.model.size(); "entering train loop");

        let start = Instant::now();
        self.state.phase = Phase::Training;
        let trained = self.train(source, observer, cancel);
        let train_time = start.elapsed();

        match &trained {
            Ok(Outcome::Completed) => self.state.phase = Phase::Completed,
            Ok(Outcome::Interrupted) => {
                self.state.phase = Phase::Interrupted;
                self.report_interruption();
            }
            Err(e) => {
                self.state.phase = Phase::Errored;
                error!(iteration = self.state.iteration; "training failed: {e}");
            }
        }

        let start = Instant::now();
        let finalized = self.finalize(source, observer);
        let finalize_time = start.elapsed();

        let outcome = match (trained, finalized) {
            (Ok(outcome), Ok(finalized)) => (outcome, finalized),
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), Ok(_)) => return Err(e),
            (Err(e), Err(fin_e)) => {
                warn!("finalizing the failed run also failed: {fin_e}");
                return Err(e);
            }
        };
        let (outcome, (weights, validation)) = outcome;

        info!(iteration = self.state.iteration; "run {}", self.state.phase);

        let summary = RunSummary {
            outcome,
            iterations: self.state.iteration,
            epochs: self.state.epoch,
            train_loss: self.state.running_loss,
            weights,
            validation,
            train_time,
            eval_time: self.eval_time,
            finalize_time,
        };

        Ok(Trained {
            model: self.model,
            summary,
        })
    }

    fn train<S, B>(
        &mut self,
        source: &mut S,
        observer: &mut B,
        cancel: &CancellationToken,
    ) -> Result<Outcome>
    where
        S: DataSource + ?Sized,
        B: Observer + ?Sized,
    {
        let epochs = self.cfg.epochs();

        for epoch in 0..epochs {
            if cancel.is_cancelled() {
                return Ok(Outcome::Interrupted);
            }

            self.state.start_epoch(epoch);
            info!(epoch = epoch + 1; "[{}/{}]", epoch + 1, epochs);

            for batch in source.batches(TRAIN)? {
                if cancel.is_cancelled() {
                    return Ok(Outcome::Interrupted);
                }

                let (x, y) = batch?;
                self.train_batch(x, y, observer)?;
            }

            observer.log_scalar("train.loss", self.state.running_loss, self.state.iteration);

            let start = Instant::now();
            self.model.set_mode(Mode::Eval);
            for subset in self.cfg.evaluated_subsets() {
                let value = evaluate(&mut self.model, source, subset, &*self.metric)?;
                report_evaluation(observer, subset, self.metric.name(), value, &self.state);
            }
            self.eval_time += start.elapsed();

            self.state.epoch = epoch + 1;

            let checkpoint_due = self
                .cfg
                .checkpoint_every()
                .is_some_and(|every| (epoch + 1) % every.get() == 0);

            if checkpoint_due {
                let name = format!("{}_epoch_{}", self.cfg.weights(), epoch + 1);
                self.save_weights(observer, &name)?;
            }
        }

        if cancel.is_cancelled() {
            return Ok(Outcome::Interrupted);
        }

        Ok(Outcome::Completed)
    }

    fn train_batch<B>(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        observer: &mut B,
    ) -> Result<()>
    where
        B: ScalarLog + ?Sized,
    {
        self.model.set_mode(Mode::Train);
        self.model.zero_grad();

        let y_pred = self.model.forward(x)?;
        let obj = self.loss.loss(y_pred.view(), y)?;
        let d = self.loss.loss_prime(y_pred.view(), y)?;
        self.model.backward(d)?;
        self.model.step(&mut self.optimizer)?;

        let aux = self.after_batch(obj, y_pred.view(), y, observer);
        self.state.inc_iteration();
        aux
    }

    /// Scores and logs a batch the model was just trained on.
    fn after_batch<B>(
        &mut self,
        obj: f32,
        y_pred: ArrayView2<f32>,
        y: ArrayView2<f32>,
        observer: &mut B,
    ) -> Result<()>
    where
        B: ScalarLog + ?Sized,
    {
        let it = self.state.iteration;
        let rows = y_pred.nrows().max(1) as f64;

        self.state.last_loss = Some(obj);
        self.state.running_loss += obj as f64 / rows;
        observer.log_scalar("batch.loss", obj as f64, it);

        let score = self.metric.score(y_pred, y)?;
        let value = score.value();
        self.state.last_metric = Some(value);
        observer.log_scalar(&format!("batch.{}", self.metric.name()), value, it);

        debug!(iteration = it; "batch.loss: {obj:.5} batch.{}: {value:.5}", self.metric.name());

        let (log_norms, log_gradnorms) = (self.cfg.logs_norms(), self.cfg.logs_gradnorms());
        if !(log_norms || log_gradnorms) {
            return Ok(());
        }

        for tensor in self.model.named_tensors() {
            if log_gradnorms {
                observer.log_scalar(&format!("gradnorm__{}", tensor.name), l2(tensor.grad), it);
            }
            if log_norms {
                observer.log_scalar(&format!("norm__{}", tensor.name), l2(tensor.params), it);
            }
        }

        Ok(())
    }

    /// Persists the current weights and registers them under `name`.
    fn save_weights<B>(&self, observer: &mut B, name: &str) -> Result<PathBuf>
    where
        B: Observer + ?Sized,
    {
        let meta = CheckpointMeta {
            epoch: self.state.epoch,
            iteration: self.state.iteration,
        };

        let blob = checkpoint::encode(&self.model.state(), meta)?;
        let location = observer.persist(&blob, &format!("{name}.safetensors"))?;
        observer.register_artifact(&location, name)?;

        debug!(iteration = meta.iteration; "saved {name} to {}", location.display());
        Ok(location)
    }

    fn finalize<S, B>(
        &mut self,
        source: &mut S,
        observer: &mut B,
    ) -> Result<(PathBuf, Vec<(String, f64)>)>
    where
        S: DataSource + ?Sized,
        B: Observer + ?Sized,
    {
        // The only device is the cpu, so the snapshot is already in host memory.
        let meta = CheckpointMeta {
            epoch: self.state.epoch,
            iteration: self.state.iteration,
        };
        let blob = checkpoint::encode(&self.model.state(), meta)?;
        let name = self.cfg.weights();
        let location = observer.persist(&blob, &format!("{name}.safetensors"))?;

        let reloaded = checkpoint::load(&location)?;
        self.model
            .load_state(&reloaded)
            .map_err(TrainerErr::CheckpointMismatch)?;
        observer.register_artifact(&location, name)?;

        info!("weights saved to {}", location.display());

        let mut validation = Vec::new();
        let start = Instant::now();
        self.model.set_mode(Mode::Eval);

        for subset in self.cfg.validated_subsets() {
            let value = evaluate(&mut self.model, source, subset, &*self.metric)?;
            report_evaluation(observer, subset, self.metric.name(), value, &self.state);
            validation.push((subset.clone(), value));
        }

        self.eval_time += start.elapsed();
        self.state.phase = Phase::Finalized;
        Ok((location, validation))
    }

    fn report_interruption(&self) {
        let RunState {
            epoch,
            iteration,
            running_loss,
            last_metric,
            ..
        } = self.state;

        warn!(
            epoch = epoch + 1, iteration = iteration;
            "interrupted at epoch {}/{}", (epoch + 1).min(self.cfg.epochs()), self.cfg.epochs()
        );
        warn!("currently accumulated loss: {running_loss:.5}");

        if let Some(value) = last_metric {
            warn!("last batch.{}: {value:.5}", self.metric.name());
        }
    }
}

/// Scores a model over every batch of a subset.
///
/// The model is switched to `Mode::Eval` and nothing but its forward pass is used, so its
/// parameters and gradient are left untouched.
///
/// # Args
/// * `model` - The model to score.
/// * `source` - Provides the batches of `subset`.
/// * `subset` - The name of the subset.
/// * `metric` - Accumulated over every batch.
///
/// # Returns
/// The ratio of hits over the whole subset, in `[0, 1]`.
///
/// # Errors
/// `TrainerErr::UnknownSubset`, or `TrainerErr::EmptySubset` when the subset has no rows.
pub fn evaluate<M, S>(
    model: &mut M,
    source: &mut S,
    subset: &str,
    metric: &dyn Metric,
) -> Result<f64>
where
    M: Model,
    S: DataSource + ?Sized,
{
    model.set_mode(Mode::Eval);

    let mut score = Score::default();
    let mut rows = 0;
    for batch in source.batches(subset)? {
        let (x, y) = batch?;
        rows += x.nrows();
        let y_pred = model.forward(x)?;
        score += metric.score(y_pred.view(), y)?;
    }

    if rows == 0 {
        return Err(TrainerErr::EmptySubset(subset.to_string()));
    }

    Ok(score.value())
}

fn report_evaluation<B>(observer: &mut B, subset: &str, metric: &str, value: f64, state: &RunState)
where
    B: ScalarLog + ?Sized,
{
    let it = state.iteration;
    observer.log_scalar(&format!("{subset}.{metric}"), value, it);
    info!(iteration = it; "[{it:>5}] {subset}.{metric}: {value:.5}");
}

fn l2(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|&v| (v as f64) * (v as f64))
        .sum::<f64>()
        .sqrt()
}
