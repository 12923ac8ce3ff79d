use std::ops::AddAssign;

use ndarray::{ArrayView1, ArrayView2, Axis, Zip};

use crate::{MlErr, Result};

/// The outcome of a metric over some examples: `hits` out of `total`.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct Score {
    pub hits: usize,
    pub total: usize,
}

impl Score {
    pub fn new(hits: usize, total: usize) -> Self {
        Self { hits, total }
    }

    /// The ratio of hits, `1.0` when there was nothing to score.
    pub fn value(&self) -> f64 {
        if self.total == 0 {
            return 1.;
        }

        self.hits as f64 / self.total as f64
    }
}

impl AddAssign for Score {
    fn add_assign(&mut self, rhs: Self) {
        self.hits += rhs.hits;
        self.total += rhs.total;
    }
}

/// A batch metric computed from a prediction that was already made.
pub trait Metric {
    /// The name the metric is logged under.
    fn name(&self) -> &'static str;

    /// Scores a batch.
    ///
    /// # Arguments
    /// * `y_pred` - The output of the model for the batch.
    /// * `y` - The expected output.
    ///
    /// # Returns
    /// The hits and total of this batch, or an error if the shapes don't line up.
    fn score(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Score>;
}

impl<M: Metric + ?Sized> Metric for Box<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn score(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Score> {
        (**self).score(y_pred, y)
    }
}

/// The index of the largest value of a row, the first one on ties.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}

/// Reads the class of a target row.
///
/// # Arguments
/// * `row` - Either a single column holding the class index or a one-hot row.
/// * `nclasses` - The amount of classes of the prediction.
///
/// # Returns
/// The class index, or an error if the row is neither of the accepted layouts.
pub fn target_class(row: ArrayView1<f32>, nclasses: usize) -> Result<usize> {
    match row.len() {
        1 if nclasses != 1 => {
            let label = row[0];
            if !label.is_finite() || label < 0. {
                return Err(MlErr::InvalidSpec(format!("{label} is not a class label")));
            }
            Ok(label.round() as usize)
        }
        n if n == nclasses => Ok(argmax(row)),
        n => Err(MlErr::SizeMismatch {
            what: "target columns",
            got: n,
            expected: nclasses,
        }),
    }
}

fn check_rows(y_pred: &ArrayView2<f32>, y: &ArrayView2<f32>) -> Result<()> {
    if y_pred.nrows() != y.nrows() {
        return Err(MlErr::SizeMismatch {
            what: "target rows",
            got: y.nrows(),
            expected: y_pred.nrows(),
        });
    }

    Ok(())
}

/// Classification accuracy: the rows whose highest score is the target class.
#[derive(Default, Clone, Copy, Debug)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn score(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Score> {
        check_rows(&y_pred, &y)?;

        let nclasses = y_pred.ncols();
        let mut hits = 0;

        for (scores, target) in y_pred.axis_iter(Axis(0)).zip(y.axis_iter(Axis(0))) {
            if argmax(scores) == target_class(target, nclasses)? {
                hits += 1;
            }
        }

        Ok(Score::new(hits, y_pred.nrows()))
    }
}

/// Intersection over union of the thresholded prediction and the positive targets.
#[derive(Clone, Copy, Debug)]
pub struct Iou {
    threshold: f32,
}

impl Iou {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for Iou {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Metric for Iou {
    fn name(&self) -> &'static str {
        "iou"
    }

    fn score(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Score> {
        if y_pred.dim() != y.dim() {
            check_rows(&y_pred, &y)?;
            return Err(MlErr::SizeMismatch {
                what: "target columns",
                got: y.ncols(),
                expected: y_pred.ncols(),
            });
        }

        let mut score = Score::default();
        Zip::from(&y_pred).and(&y).for_each(|&p, &t| {
            let (p, t) = (p > self.threshold, t > 0.);
            score.hits += (p && t) as usize;
            score.total += (p || t) as usize;
        });

        Ok(score)
    }
}
