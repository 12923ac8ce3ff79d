use ndarray::{Array2, ArrayView2, Zip};

use super::{LossFn, loss_fn::check_same_shape};
use crate::Result;

/// Soft dice loss for probabilistic masks, `1 - (2·Σpy + s) / (Σp + Σy + s)`.
///
/// The sums run over the whole batch, `s` smooths empty masks.
#[derive(Clone, Copy, Debug)]
pub struct Dice {
    smooth: f32,
}

impl Dice {
    /// Returns a new `Dice`.
    ///
    /// # Arguments
    /// * `smooth` - The additive smoothing term.
    pub fn new(smooth: f32) -> Self {
        Self { smooth }
    }

    fn sums(&self, y_pred: &ArrayView2<f32>, y: &ArrayView2<f32>) -> (f32, f32) {
        let intersection = Zip::from(y_pred).and(y).fold(0., |acc, &p, &t| acc + p * t);
        let cardinality = y_pred.sum() + y.sum();
        (intersection, cardinality)
    }
}

impl Default for Dice {
    fn default() -> Self {
        Self::new(1.)
    }
}

impl LossFn for Dice {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        check_same_shape(&y_pred, &y)?;

        let (intersection, cardinality) = self.sums(&y_pred, &y);
        Ok(1. - (2. * intersection + self.smooth) / (cardinality + self.smooth))
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_same_shape(&y_pred, &y)?;

        let (intersection, cardinality) = self.sums(&y_pred, &y);
        let num = 2. * intersection + self.smooth;
        let den = cardinality + self.smooth;

        Ok(y.mapv(|t| -(2. * t * den - num) / den.powi(2)))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn perfect_mask_costs_nothing() {
        let y = array![[1.0], [0.0], [1.0]];

        let loss = Dice::default().loss(y.view(), y.view()).unwrap();

        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn disjoint_mask_costs_almost_one() {
        let y_pred = array![[1.0, 1.0, 0.0, 0.0]];
        let y = array![[0.0, 0.0, 1.0, 1.0]];

        let loss = Dice::new(1e-3).loss(y_pred.view(), y.view()).unwrap();

        assert!(loss > 0.99);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let dice = Dice::default();
        let y_pred = array![[0.2, 0.9], [0.6, 0.1]];
        let y = array![[0.0, 1.0], [1.0, 0.0]];
        let d = dice.loss_prime(y_pred.view(), y.view()).unwrap();

        let h = 1e-2;
        for i in 0..2 {
            for j in 0..2 {
                let mut plus = y_pred.clone();
                let mut minus = y_pred.clone();
                plus[[i, j]] += h;
                minus[[i, j]] -= h;

                let numeric = (dice.loss(plus.view(), y.view()).unwrap()
                    - dice.loss(minus.view(), y.view()).unwrap())
                    / (2. * h);
                assert!((numeric - d[[i, j]]).abs() < 1e-3, "({i}, {j})");
            }
        }
    }
}
