use std::fmt::{self, Display};

use ndarray::{Array2, ArrayView2};

use super::Dense;
use crate::{arch::activations::ActFn, error::Result};

/// The layers a `Sequential` can be built from.
#[derive(Clone, Debug)]
pub enum Layer {
    Dense(Dense),
}

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn size(&self) -> usize {
        match self {
            Layer::Dense(l) => l.size(),
        }
    }

    /// Returns the amount of input and output features of the layer.
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Layer::Dense(l) => l.dim(),
        }
    }

    /// Returns the name suffix and shape of each parameter tensor of the layer, in the order
    /// they are laid out in its parameter slice.
    pub fn tensors(&self) -> Vec<(&'static str, Vec<usize>)> {
        match self {
            Layer::Dense(l) => {
                let (fan_in, fan_out) = l.dim();
                vec![("weight", vec![fan_in, fan_out]), ("bias", vec![fan_out])]
            }
        }
    }

    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        keep: bool,
    ) -> Result<Array2<f32>> {
        match self {
            Layer::Dense(l) => l.forward(params, x, keep),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Layer::Dense(l) => l.backward(params, grad, d),
        }
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Dense(l) => {
                let (fan_in, fan_out) = l.dim();
                write!(f, "Dense(in_features={fan_in}, out_features={fan_out})")?;
                match l.act_fn() {
                    Some(act_fn) => write!(f, " -> {act_fn}"),
                    None => Ok(()),
                }
            }
        }
    }
}
