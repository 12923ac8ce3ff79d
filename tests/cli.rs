use std::path::PathBuf;

use clap::Parser;
use experiments::{Cli, Command};

#[test]
fn defaults_to_an_observed_training_run() {
    let cli = Cli::try_parse_from(["experiments"]).unwrap();

    assert_eq!(cli.command, None);
    assert_eq!(cli.runs, PathBuf::from("runs"));
    assert!(!cli.unobserved);
    assert!(cli.presets.is_empty());
}

#[test]
fn presets_and_overrides_keep_their_order() {
    let cli = Cli::try_parse_from([
        "experiments",
        "--with",
        "cifar10",
        "--with",
        "use_sgd",
        "--set",
        "n_epochs=3",
        "--set",
        "dataset.root=\"/data/cifar\"",
        "--unobserved",
        "train",
    ])
    .unwrap();

    assert_eq!(cli.presets, ["cifar10", "use_sgd"]);
    let paths: Vec<&str> = cli.overrides.iter().map(|o| o.path()).collect();
    assert_eq!(paths, ["n_epochs", "dataset.root"]);
    assert!(cli.unobserved);
    assert_eq!(cli.command, Some(Command::Train));
}

#[test]
fn evaluate_needs_weights_and_a_subset() {
    let cli = Cli::try_parse_from([
        "experiments",
        "evaluate",
        "--weights",
        "runs/1/weights.safetensors",
        "--subset",
        "val",
    ])
    .unwrap();

    assert_eq!(
        cli.command,
        Some(Command::Evaluate {
            weights: "runs/1/weights.safetensors".into(),
            subset: "val".into(),
        })
    );

    assert!(Cli::try_parse_from(["experiments", "evaluate", "--subset", "val"]).is_err());
}

#[test]
fn segment_dir_weights_are_optional() {
    let cli =
        Cli::try_parse_from(["experiments", "--with", "cells", "segment-dir", "--path", "imgs"])
            .unwrap();

    assert_eq!(
        cli.command,
        Some(Command::SegmentDir {
            path: "imgs".into(),
            weights: None,
        })
    );
}

#[test]
fn malformed_overrides_are_rejected() {
    assert!(Cli::try_parse_from(["experiments", "--set", "n_epochs"]).is_err());
}
