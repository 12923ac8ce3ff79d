use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{MlErr, Result};

/// How the initial values of one parameter tensor are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// `U(low, high)`.
    Uniform { low: f32, high: f32 },

    /// `U(-a, a)` with `a = sqrt(6 / (fan_in + fan_out))`.
    XavierUniform { fan_in: usize, fan_out: usize },
}

impl Init {
    /// Picks the initialization of a tensor from its shape: Xavier uniform for matrices and
    /// `U(-1/sqrt(n), 1/sqrt(n))` for any other tensor of `n` values.
    pub fn for_shape(shape: &[usize]) -> Self {
        match *shape {
            [fan_in, fan_out] => Init::XavierUniform { fan_in, fan_out },
            _ => {
                let a = 1. / (shape.iter().product::<usize>() as f32).sqrt();
                Init::Uniform { low: -a, high: a }
            }
        }
    }

    /// Returns the `(low, high)` range values are drawn from.
    pub fn bounds(&self) -> (f32, f32) {
        match *self {
            Init::Uniform { low, high } => (low, high),
            Init::XavierUniform { fan_in, fan_out } => {
                let a = (6. / (fan_in + fan_out) as f32).sqrt();
                (-a, a)
            }
        }
    }

    /// Overwrites every value of `out` with a fresh sample.
    ///
    /// # Arguments
    /// * `rng` - The random number generator shared by every tensor of a model.
    /// * `out` - The tensor's slice of the parameter buffer.
    ///
    /// # Errors
    /// `MlErr::InvalidSpec` if the range is empty or not finite.
    pub fn fill<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut [f32]) -> Result<()> {
        let (low, high) = self.bounds();
        let distribution = Uniform::new(low, high)
            .map_err(|e| MlErr::InvalidSpec(format!("cannot sample from [{low}, {high}): {e}")))?;

        for v in out.iter_mut() {
            *v = distribution.sample(rng);
        }

        Ok(())
    }
}
