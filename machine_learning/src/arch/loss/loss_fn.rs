use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A differentiable objective comparing a model's prediction with the expected output.
pub trait LossFn {
    /// Computes the scalar objective of a batch.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32>;

    /// Computes the derivative of the objective with respect to every value of `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Array2<f32>>;
}

/// Checks that the prediction and the target of a batch have the same amount of rows.
pub(super) fn check_rows(y_pred: &ArrayView2<f32>, y: &ArrayView2<f32>) -> Result<()> {
    if y_pred.nrows() != y.nrows() {
        return Err(crate::MlErr::SizeMismatch {
            what: "target rows",
            got: y.nrows(),
            expected: y_pred.nrows(),
        });
    }

    Ok(())
}

/// Checks that the prediction and the target of a batch have the same shape.
pub(super) fn check_same_shape(y_pred: &ArrayView2<f32>, y: &ArrayView2<f32>) -> Result<()> {
    check_rows(y_pred, y)?;

    if y_pred.ncols() != y.ncols() {
        return Err(crate::MlErr::SizeMismatch {
            what: "target columns",
            got: y.ncols(),
            expected: y_pred.ncols(),
        });
    }

    Ok(())
}
