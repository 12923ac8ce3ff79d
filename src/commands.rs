use std::{
    env,
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
    process,
};

use log::{info, warn};
use ndarray::Axis;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use trainer::{
    DataSource, FileStorage, MemoryObserver, Outcome, RunStatus, RunSummary, TRAIN, TrainerErr,
};

use crate::{
    ExperimentErr, Result,
    builder::ExperimentBuilder,
    config::ExperimentConfig,
    datasets::{
        cells::{self, SEGMENTED_SUFFIX},
        netpbm,
    },
};

/// Trains a freshly initialized model.
///
/// # Arguments
/// * `config` - The configuration of the experiment.
/// * `runs` - The directory holding observed runs, `None` for an unobserved run.
/// * `cancel` - Stops training at the next batch once cancelled.
/// * `out` - Receives the human readable report.
///
/// # Returns
/// The summary of the run, be it completed or interrupted.
pub fn train(
    config: &ExperimentConfig,
    runs: Option<&Path>,
    cancel: &CancellationToken,
    out: &mut dyn Write,
) -> Result<RunSummary> {
    let experiment = ExperimentBuilder::new().build(config)?;

    writeln!(out, "Using device {}", config.device()?)?;
    if config.print_architecture {
        writeln!(out, "Architecture:")?;
        writeln!(out, "{}", experiment.architecture())?;
    }
    writeln!(out, "Number of parameters: {}", experiment.num_params())?;

    let seed = config
        .shuffle
        .then(|| config.seed.unwrap_or_else(rand::random));
    let mut source = config
        .dataset
        .source(config.run_subsets(), config.batch_size()?, seed)?;

    let summary = match runs {
        Some(root) => {
            let mut storage = FileStorage::create(root, "train", config)?;
            info!(run = storage.id(); "observing run in {}", storage.dir().display());

            let trained = experiment.train(&mut source, &mut storage, cancel);
            let finished = match &trained {
                Ok(summary) => storage.finish(status(summary), Some(result(summary)), None),
                Err(e) => storage.finish(RunStatus::Failed, None, Some(e.to_string())),
            };

            match (trained, finished) {
                (Ok(summary), Ok(())) => summary,
                (Ok(_), Err(e)) => return Err(e.into()),
                (Err(e), finished) => {
                    if let Err(fin_e) = finished {
                        warn!("could not close run {}: {fin_e}", storage.id());
                    }
                    return Err(e);
                }
            }
        }
        None => {
            let dir = env::temp_dir().join(format!("experiments-{}", process::id()));
            let mut observer = MemoryObserver::new(dir);
            experiment.train(&mut source, &mut observer, cancel)?
        }
    };

    writeln!(
        out,
        "Run {} after {} epochs and {} iterations, weights at {}",
        match summary.outcome {
            Outcome::Completed => "completed",
            Outcome::Interrupted => "interrupted",
        },
        summary.epochs,
        summary.iterations,
        summary.weights.display()
    )?;

    Ok(summary)
}

fn status(summary: &RunSummary) -> RunStatus {
    match summary.outcome {
        Outcome::Completed => RunStatus::Completed,
        Outcome::Interrupted => RunStatus::Interrupted,
    }
}

fn result(summary: &RunSummary) -> Value {
    let validation: serde_json::Map<String, Value> = summary
        .validation
        .iter()
        .map(|(subset, value)| (subset.clone(), json!(value)))
        .collect();

    json!({
        "iterations": summary.iterations,
        "epochs": summary.epochs,
        "train_loss": summary.train_loss,
        "weights": summary.weights.display().to_string(),
        "validation": validation,
        "train_time": summary.train_time.as_secs_f64(),
        "eval_time": summary.eval_time.as_secs_f64(),
        "finalize_time": summary.finalize_time.as_secs_f64(),
    })
}

fn shape(dim: (usize, usize)) -> String {
    format!("({}, {})", dim.0, dim.1)
}

/// Prints the shape of the first training batch and of the model's prediction for it.
pub fn print_shapes(config: &ExperimentConfig, out: &mut dyn Write) -> Result<()> {
    let mut experiment = ExperimentBuilder::new().build(config)?;
    let mut source = config.dataset.source([TRAIN], config.batch_size()?, None)?;

    let mut batches = source.batches(TRAIN)?;
    let (x, _) = batches
        .next()
        .ok_or_else(|| TrainerErr::EmptySubset(TRAIN.to_string()))??;
    let y_pred = experiment.predict(x)?;

    writeln!(out, "Input shapes are {}", shape(x.dim()))?;
    writeln!(out, "Output shapes are {}", shape(y_pred.dim()))?;
    Ok(())
}

pub fn print_architecture(config: &ExperimentConfig, out: &mut dyn Write) -> Result<()> {
    let experiment = ExperimentBuilder::new().build(config)?;
    writeln!(out, "{}", experiment.architecture())?;
    Ok(())
}

/// Prints the name and shape of every parameter tensor of the model, and whether it's trained.
pub fn print_parameters(config: &ExperimentConfig, out: &mut dyn Write) -> Result<()> {
    let experiment = ExperimentBuilder::new().build(config)?;

    for param in experiment.parameters() {
        let state = if param.trainable { "trainable" } else { "frozen" };
        writeln!(out, "{:40}: {:?} {state}", param.name, param.shape)?;
    }

    Ok(())
}

/// Scores persisted weights on a subset.
///
/// # Arguments
/// * `config` - The configuration of the experiment, the model must match the weights.
/// * `weights` - A checkpoint written by a training run.
/// * `subset` - The subset to score.
/// * `out` - Receives `<subset>.<metric>: <value>`.
///
/// # Returns
/// The value of the metric.
pub fn evaluate(
    config: &ExperimentConfig,
    weights: &Path,
    subset: &str,
    out: &mut dyn Write,
) -> Result<f64> {
    let mut experiment = ExperimentBuilder::new().build(config)?;
    experiment.load_weights(weights)?;

    let mut source = config.dataset.source([subset], config.batch_size()?, None)?;
    let value = experiment.evaluate(&mut source, subset)?;

    writeln!(out, "{subset}.{}: {value:.5}", experiment.metric_name())?;
    Ok(value)
}

/// Segments every image under a directory, writing the prediction of each pixel scaled to
/// `[0, 255]` next to the image as `<file>.segmented.pgm`.
///
/// # Arguments
/// * `config` - The configuration of a segmentation experiment.
/// * `path` - The directory to walk.
/// * `weights` - A checkpoint to load, the fresh initialization is used otherwise.
///
/// # Returns
/// The segmented images, in walking order.
pub fn segment_dir(
    config: &ExperimentConfig,
    path: &Path,
    weights: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let mut experiment = ExperimentBuilder::new().build(config)?;

    if (experiment.input_features(), experiment.output_features()) != (3, 1) {
        return Err(ExperimentErr::InvalidConfig(format!(
            "segmentation needs a model from 3 features to 1, this one goes from {} to {}",
            experiment.input_features(),
            experiment.output_features()
        )));
    }

    if let Some(weights) = weights {
        experiment.load_weights(weights)?;
    }

    let batch_size = config.batch_size()?.get();
    let images = cells::find_images(path, usize::MAX)?;

    let mut segmented = Vec::with_capacity(images.len());

    for image_path in images {
        let image = netpbm::read(&image_path)?;
        let rows = image.rgb_rows();

        let mut samples = Vec::with_capacity(image.pixels());
        for x in rows.axis_chunks_iter(Axis(0), batch_size) {
            let y_pred = experiment.predict(x)?;
            samples.extend(
                y_pred
                    .column(0)
                    .iter()
                    .map(|&p| (p.clamp(0., 1.) * 255.) as u8),
            );
        }

        let mut name = OsString::from(image_path.as_os_str());
        name.push(SEGMENTED_SUFFIX);
        let output = PathBuf::from(name);

        fs::write(&output, netpbm::encode_pgm(image.width, image.height, &samples))?;
        info!("segmented {} into {}", image_path.display(), output.display());
        segmented.push(output);
    }

    Ok(segmented)
}
