use std::{collections::BTreeMap, fs, io, path::Path};

use experiments::{
    ExperimentConfig, ExperimentErr, commands,
    datasets::{DatasetSpec, InlineSubset, netpbm},
};
use machine_learning::specs::{ActFnSpec, LayerSpec, ModelSpec, OptimizerSpec};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use trainer::{Outcome, checkpoint};

fn blobs(n: usize) -> InlineSubset {
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);

    for i in 0..n {
        let class = i % 2;
        let sign = if class == 0 { -1. } else { 1. };
        let jitter = (i as f32 * 0.37).sin() * 0.2;
        x.push(vec![sign + jitter, sign - jitter]);
        y.push(vec![class as f32]);
    }

    InlineSubset { x, y }
}

fn config() -> ExperimentConfig {
    ExperimentConfig {
        dataset: DatasetSpec::Inline {
            subsets: BTreeMap::from([
                ("train".to_string(), blobs(8)),
                ("val".to_string(), blobs(4)),
                ("test".to_string(), blobs(6)),
            ]),
        },
        n_classes: 2,
        batch_size: 4,
        n_epochs: 3,
        model: ModelSpec::Sequential {
            layers: vec![
                LayerSpec::Dense {
                    dim: (2, 4),
                    act_fn: Some(ActFnSpec::Tanh),
                },
                LayerSpec::Dense {
                    dim: (4, 2),
                    act_fn: None,
                },
            ],
        },
        optimizer: OptimizerSpec::GradientDescent { learning_rate: 0.1 },
        seed: Some(11),
        validate_on: vec!["test".into()],
        ..ExperimentConfig::default()
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn observed_training_fills_a_run_directory() {
    let runs = tempfile::tempdir().unwrap();
    let mut out: Vec<u8> = Vec::new();

    let summary = commands::train(
        &config(),
        Some(runs.path()),
        &CancellationToken::new(),
        &mut out,
    )
    .unwrap();

    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.iterations, 6);
    assert_eq!(summary.epochs, 3);
    assert_eq!(summary.validation.len(), 1);
    assert_eq!(summary.validation[0].0, "test");

    let dir = runs.path().join("1");
    assert_eq!(summary.weights, dir.join("weights.safetensors"));
    assert!(summary.weights.is_file());

    let run = read_json(&dir.join("run.json"));
    assert_eq!(run["status"], "COMPLETED");
    assert_eq!(run["command"], "train");
    assert_eq!(run["artifacts"][0]["name"], "weights");
    assert_eq!(run["result"]["iterations"], 6);

    let metrics = read_json(&dir.join("metrics.json"));
    assert_eq!(metrics["val.accuracy"]["steps"], serde_json::json!([2, 4, 6]));
    assert_eq!(metrics["test.accuracy"]["steps"], serde_json::json!([6]));
    assert_eq!(metrics["batch.loss"]["values"].as_array().unwrap().len(), 6);

    let config = read_json(&dir.join("config.json"));
    assert_eq!(config["n_epochs"], 3);

    let report = String::from_utf8(out).unwrap();
    assert!(report.starts_with("Using device cpu\n"));
    assert!(report.contains("Number of parameters: 22\n"));
}

#[test]
fn runs_get_consecutive_ids() {
    let runs = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        commands::train(&config(), Some(runs.path()), &cancel, &mut io::sink()).unwrap();
    }

    assert!(runs.path().join("1/run.json").is_file());
    assert!(runs.path().join("2/run.json").is_file());
}

#[test]
fn interrupted_runs_are_recorded_as_such() {
    let runs = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = commands::train(&config(), Some(runs.path()), &cancel, &mut io::sink()).unwrap();

    assert_eq!(summary.outcome, Outcome::Interrupted);
    assert_eq!(summary.iterations, 0);
    assert!(summary.weights.is_file());

    let run = read_json(&runs.path().join("1/run.json"));
    assert_eq!(run["status"], "INTERRUPTED");
}

#[test]
fn failed_runs_are_recorded_with_their_error() {
    let runs = tempfile::tempdir().unwrap();
    let mut config = config();
    let DatasetSpec::Inline { subsets } = &mut config.dataset else {
        unreachable!()
    };
    subsets.insert(
        "test".into(),
        InlineSubset {
            x: vec![vec![0., 0., 0.]],
            y: vec![vec![1.]],
        },
    );

    let err = commands::train(
        &config,
        Some(runs.path()),
        &CancellationToken::new(),
        &mut io::sink(),
    )
    .unwrap_err();

    assert!(matches!(err, ExperimentErr::Trainer(_)));

    let run = read_json(&runs.path().join("1/run.json"));
    assert_eq!(run["status"], "FAILED");
    assert!(run["fail_trace"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(run["artifacts"][0]["name"], "weights");
}

#[test]
fn unobserved_training_leaves_the_runs_directory_alone() {
    let runs = tempfile::tempdir().unwrap();

    let summary =
        commands::train(&config(), None, &CancellationToken::new(), &mut io::sink()).unwrap();

    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(fs::read_dir(runs.path()).unwrap().count(), 0);
}

#[test]
fn evaluate_scores_trained_weights() {
    let runs = tempfile::tempdir().unwrap();
    let config = config();
    let summary = commands::train(
        &config,
        Some(runs.path()),
        &CancellationToken::new(),
        &mut io::sink(),
    )
    .unwrap();

    let mut out: Vec<u8> = Vec::new();
    let value = commands::evaluate(&config, &summary.weights, "test", &mut out).unwrap();

    assert_eq!(value, summary.validation[0].1);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        format!("test.accuracy: {value:.5}\n")
    );
}

#[test]
fn evaluate_rejects_weights_of_another_model() {
    let runs = tempfile::tempdir().unwrap();
    let summary = commands::train(
        &config(),
        Some(runs.path()),
        &CancellationToken::new(),
        &mut io::sink(),
    )
    .unwrap();

    let mut other = config();
    other.model = ModelSpec::Sequential {
        layers: vec![LayerSpec::Dense {
            dim: (2, 2),
            act_fn: None,
        }],
    };

    let err = commands::evaluate(&other, &summary.weights, "test", &mut io::sink()).unwrap_err();

    assert!(matches!(err, ExperimentErr::Trainer(_)));
}

#[test]
fn print_commands_describe_the_model() {
    let config = config();

    let mut out: Vec<u8> = Vec::new();
    commands::print_shapes(&config, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Input shapes are (4, 2)\nOutput shapes are (4, 2)\n"
    );

    let mut out: Vec<u8> = Vec::new();
    commands::print_parameters(&config, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], format!("{:40}: [2, 4] trainable", "layers.0.weight"));
    assert_eq!(lines[3], format!("{:40}: [2] trainable", "layers.1.bias"));

    let mut out: Vec<u8> = Vec::new();
    commands::print_architecture(&config, &mut out).unwrap();
    assert!(String::from_utf8(out).unwrap().starts_with("Sequential("));
}

#[test]
fn frozen_tensors_are_reported_and_kept() {
    let runs = tempfile::tempdir().unwrap();
    let mut config = config();
    config.trainable_params = Some(vec!["layers.1.".into()]);

    let mut out: Vec<u8> = Vec::new();
    commands::print_parameters(&config, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let states: Vec<&str> = out
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .collect();
    assert_eq!(states, ["frozen", "frozen", "trainable", "trainable"]);

    let mut untrained = config.clone();
    untrained.n_epochs = 0;
    let mut weights = Vec::new();
    for config in [&untrained, &config] {
        let summary = commands::train(
            config,
            Some(runs.path()),
            &CancellationToken::new(),
            &mut io::sink(),
        )
        .unwrap();
        weights.push(checkpoint::load(&summary.weights).unwrap());
    }

    let (fresh, trained) = (&weights[0], &weights[1]);
    for name in ["layers.0.weight", "layers.0.bias"] {
        assert_eq!(trained.get(name).unwrap().data, fresh.get(name).unwrap().data);
    }
    assert_ne!(
        trained.get("layers.1.weight").unwrap().data,
        fresh.get("layers.1.weight").unwrap().data
    );
}

#[test]
fn training_resumes_from_initial_weights() {
    let runs = tempfile::tempdir().unwrap();
    let first = commands::train(
        &config(),
        Some(runs.path()),
        &CancellationToken::new(),
        &mut io::sink(),
    )
    .unwrap();

    let mut resumed = config();
    resumed.init_weights = Some(first.weights.clone());
    resumed.n_epochs = 0;
    let second = commands::train(
        &resumed,
        Some(runs.path()),
        &CancellationToken::new(),
        &mut io::sink(),
    )
    .unwrap();

    assert_eq!(
        checkpoint::load(&second.weights).unwrap(),
        checkpoint::load(&first.weights).unwrap()
    );
}

fn cells_config() -> ExperimentConfig {
    let mut config = ExperimentConfig::resolve(None, &["cells".to_string()], &[]).unwrap();
    config.seed = Some(2);
    config
}

#[test]
fn segment_dir_writes_a_graymap_per_image() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(
        dir.path().join("a.ppm"),
        "P3\n2 1\n255\n255 0 0 0 0 255\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("nested/b.pgm"),
        netpbm::encode_pgm(1, 3, &[0, 128, 255]),
    )
    .unwrap();
    fs::write(
        dir.path().join("a.mask.pgm"),
        netpbm::encode_pgm(2, 1, &[0, 255]),
    )
    .unwrap();

    let segmented = commands::segment_dir(&cells_config(), dir.path(), None).unwrap();

    assert_eq!(
        segmented,
        [
            dir.path().join("a.ppm.segmented.pgm"),
            dir.path().join("nested/b.pgm.segmented.pgm"),
        ]
    );

    let a = netpbm::read(&segmented[0]).unwrap();
    assert_eq!((a.width, a.height, a.channels), (2, 1, 1));
    let b = netpbm::read(&segmented[1]).unwrap();
    assert_eq!((b.width, b.height, b.channels), (1, 3, 1));

    let again = commands::segment_dir(&cells_config(), dir.path(), None).unwrap();
    assert_eq!(again, segmented);
}

#[test]
fn segment_dir_needs_a_per_pixel_model() {
    let dir = tempfile::tempdir().unwrap();

    let err = commands::segment_dir(&config(), dir.path(), None).unwrap_err();

    assert!(matches!(err, ExperimentErr::InvalidConfig(_)));
}
