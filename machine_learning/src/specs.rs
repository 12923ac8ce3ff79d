use serde::{Deserialize, Serialize};

/// The specification for the `ActFn` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnSpec {
    Sigmoid { amp: f32 },
    Relu,
    Tanh,
}

/// The specification for the `Layer` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        dim: (usize, usize),
        act_fn: Option<ActFnSpec>,
    },
}

/// The specification for the `Model` trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Sequential { layers: Vec<LayerSpec> },
}

/// The specification for the `Optimizer` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
        #[serde(default)]
        nesterov: bool,
    },
}

/// The specification for the `LossFn` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnSpec {
    Mse,
    CrossEntropy,
    Dice { smooth: f32 },
}

/// The specification for the `Metric` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSpec {
    Accuracy,
    Iou { threshold: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_spec_from_json() {
        let json = r#"{
            "sequential": {
                "layers": [
                    { "dense": { "dim": [4, 8], "act_fn": { "sigmoid": { "amp": 1.0 } } } },
                    { "dense": { "dim": [8, 2], "act_fn": "relu" } },
                    { "dense": { "dim": [2, 1], "act_fn": null } }
                ]
            }
        }"#;

        let spec: ModelSpec = serde_json::from_str(json).unwrap();

        let ModelSpec::Sequential { layers } = spec;
        assert_eq!(layers.len(), 3);
        assert_eq!(
            layers[1],
            LayerSpec::Dense {
                dim: (8, 2),
                act_fn: Some(ActFnSpec::Relu)
            }
        );
    }

    #[test]
    fn nesterov_defaults_to_false() {
        let json = r#"{ "gradient_descent_with_momentum": { "learning_rate": 0.1, "momentum": 0.9 } }"#;

        let spec: OptimizerSpec = serde_json::from_str(json).unwrap();

        assert_eq!(
            spec,
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate: 0.1,
                momentum: 0.9,
                nesterov: false
            }
        );
    }
}
