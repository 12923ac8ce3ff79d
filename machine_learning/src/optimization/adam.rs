use super::{Optimizer, check_sizes};
use crate::Result;

/// Adam, with bias corrected first and second moment estimates.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    steps: i32,
    mean: Vec<f32>,
    variance: Vec<f32>,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters of the model it will update.
    /// * `learning_rate` - The length of a step with a steady gradient.
    /// * `beta1` - Decay of the running gradient mean.
    /// * `beta2` - Decay of the running squared gradient mean.
    /// * `epsilon` - Added to the denominator to keep it away from zero.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            steps: 0,
            mean: vec![0.; len],
            variance: vec![0.; len],
        }
    }

    /// Returns the amount of updates made so far.
    pub fn steps(&self) -> i32 {
        self.steps
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(&self.mean, params)?;

        self.steps = self.steps.saturating_add(1);
        let mean_correction = 1. - self.beta1.powi(self.steps);
        let variance_correction = 1. - self.beta2.powi(self.steps);

        for (i, (p, &g)) in params.iter_mut().zip(grad).enumerate() {
            let m = &mut self.mean[i];
            let v = &mut self.variance[i];

            *m = self.beta1 * *m + (1. - self.beta1) * g;
            *v = self.beta2 * *v + (1. - self.beta2) * g * g;

            let m_hat = *m / mean_correction;
            let v_hat = *v / variance_correction;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }

        Ok(())
    }
}
