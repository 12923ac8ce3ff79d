use serde_json::{Map, Value, json};

use crate::{ExperimentErr, Result};

/// Every preset that can be applied with `--with`.
pub const PRESETS: [&str; 5] = ["classification", "use_sgd", "cifar10", "cifar100", "cells"];

fn classifier(inputs: usize, classes: usize) -> Value {
    json!({
        "sequential": {
            "layers": [
                { "dense": { "dim": [inputs, 256], "act_fn": "relu" } },
                { "dense": { "dim": [256, classes], "act_fn": null } }
            ]
        }
    })
}

fn classification() -> Value {
    json!({
        "dataset": { "kind": "tensors", "dir": "data/tiny-imagenet" },
        "n_classes": 200,
        "batch_size": 100,
        "n_epochs": 10,
        "model": classifier(512, 200),
        "optimizer": {
            "adam": { "learning_rate": 1e-3, "beta1": 0.6, "beta2": 0.999, "epsilon": 1e-8 }
        },
        "loss": "cross_entropy",
        "metric": "accuracy",
        "evaluate_on": ["val"],
        "validate_on": [],
        "epochs_per_checkpoint": null
    })
}

fn use_sgd() -> Value {
    json!({
        "optimizer": {
            "gradient_descent_with_momentum": {
                "learning_rate": 3e-3,
                "momentum": 0.9,
                "nesterov": true
            }
        }
    })
}

fn cifar10() -> Value {
    json!({
        "dataset": { "kind": "cifar10", "root": "data/cifar-10-batches-bin" },
        "n_classes": 10,
        "model": classifier(3072, 10),
        "evaluate_on": ["test"],
        "validate_on": []
    })
}

fn cifar100() -> Value {
    json!({
        "dataset": { "kind": "cifar100", "root": "data/cifar-100-binary", "coarse": false },
        "n_classes": 100,
        "model": classifier(3072, 100),
        "evaluate_on": ["test"],
        "validate_on": []
    })
}

fn cells() -> Value {
    json!({
        "dataset": { "kind": "cells", "dir": "data/cells" },
        "n_classes": 1,
        "batch_size": 50,
        "n_epochs": 5,
        "model": {
            "sequential": {
                "layers": [
                    { "dense": { "dim": [3, 16], "act_fn": "relu" } },
                    { "dense": { "dim": [16, 1], "act_fn": { "sigmoid": { "amp": 1.0 } } } }
                ]
            }
        },
        "optimizer": {
            "adam": { "learning_rate": 1e-3, "beta1": 0.9, "beta2": 0.99, "epsilon": 1e-8 }
        },
        "loss": { "dice": { "smooth": 1.0 } },
        "metric": { "iou": { "threshold": 0.49 } },
        "evaluate_on": ["val"],
        "validate_on": [],
        "epochs_per_checkpoint": 2
    })
}

/// Returns the top level keys a named preset replaces.
///
/// # Errors
/// `ExperimentErr::UnknownPreset` if there's no preset with that name.
pub fn preset(name: &str) -> Result<Map<String, Value>> {
    let value = match name {
        "classification" => classification(),
        "use_sgd" => use_sgd(),
        "cifar10" => cifar10(),
        "cifar100" => cifar100(),
        "cells" => cells(),
        other => return Err(ExperimentErr::UnknownPreset(other.to_string())),
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ExperimentErr::UnknownPreset(name.to_string())),
    }
}
