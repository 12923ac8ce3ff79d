use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::{LossFn, loss_fn::check_rows};
use crate::{MlErr, Result, metrics::target_class};

/// Softmax cross entropy over raw class scores.
///
/// The target of each row is either the class index in its single column or a one-hot row with
/// as many columns as the prediction.
#[derive(Default, Clone, Copy, Debug)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    fn classes(&self, y_pred: &ArrayView2<f32>, y: &ArrayView2<f32>) -> Result<Vec<usize>> {
        check_rows(y_pred, y)?;

        let nclasses = y_pred.ncols();
        y.rows()
            .into_iter()
            .map(|row| {
                let class = target_class(row, nclasses)?;
                if class >= nclasses {
                    return Err(MlErr::SizeMismatch {
                        what: "class label",
                        got: class,
                        expected: nclasses,
                    });
                }
                Ok(class)
            })
            .collect()
    }
}

/// Numerically stable softmax of a row of scores.
fn softmax(scores: ArrayView1<f32>) -> Vec<f32> {
    let max = scores.fold(f32::NEG_INFINITY, |m, &s| m.max(s));
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        let classes = self.classes(&y_pred, &y)?;
        if classes.is_empty() {
            return Ok(0.);
        }

        let total: f32 = y_pred
            .axis_iter(Axis(0))
            .zip(&classes)
            .map(|(scores, &class)| {
                let max = scores.fold(f32::NEG_INFINITY, |m, &s| m.max(s));
                let log_sum = scores.iter().map(|&s| (s - max).exp()).sum::<f32>().ln();
                log_sum + max - scores[class]
            })
            .sum();

        Ok(total / classes.len() as f32)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Array2<f32>> {
        let classes = self.classes(&y_pred, &y)?;
        let n = classes.len().max(1) as f32;
        let mut d = Array2::zeros(y_pred.dim());

        for ((scores, mut d_row), &class) in y_pred
            .axis_iter(Axis(0))
            .zip(d.axis_iter_mut(Axis(0)))
            .zip(&classes)
        {
            for (g, p) in d_row.iter_mut().zip(softmax(scores)) {
                *g = p / n;
            }
            d_row[class] -= 1. / n;
        }

        Ok(d)
    }
}
