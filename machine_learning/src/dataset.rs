use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayView2, Axis, s};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// An in-memory supervised dataset: one row of `x_size` features and `y_size` targets per example.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl Dataset {
    /// Creates a new `Dataset` from interleaved rows.
    ///
    /// # Arguments
    /// * `data` - Every example laid out as its features followed by its targets.
    /// * `x_size` - The amount of features per example.
    /// * `y_size` - The amount of targets per example.
    ///
    /// # Returns
    /// A new `Dataset` or an error if `data` doesn't hold a whole amount of rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let row = x_size + y_size;
        if row == 0 || data.len() % row != 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset rows",
                got: data.len(),
                expected: row,
            });
        }

        let rows = Array2::from_shape_vec((data.len() / row, row), data).map_err(|_| {
            MlErr::InvalidSpec("the dataset buffer cannot be viewed as rows".into())
        })?;

        Ok(Self {
            x: rows.slice(s![.., ..x_size]).to_owned(),
            y: rows.slice(s![.., x_size..]).to_owned(),
        })
    }

    /// Creates a new `Dataset` from separate features and targets.
    ///
    /// # Errors
    /// If `x` and `y` don't have the same amount of rows.
    pub fn from_parts(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "dataset targets",
                got: y.nrows(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn x_size(&self) -> usize {
        self.x.ncols()
    }

    pub fn y_size(&self) -> usize {
        self.y.ncols()
    }

    /// Views the whole dataset as a single `(x, y)` batch.
    pub fn views(&self) -> (ArrayView2<'_, f32>, ArrayView2<'_, f32>) {
        (self.x.view(), self.y.view())
    }

    /// Permutes the examples in place, keeping every `x` with its `y`.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);

        self.x = self.x.select(Axis(0), &order);
        self.y = self.y.select(Axis(0), &order);
    }

    /// Splits the dataset in consecutive batches, the last one possibly smaller.
    ///
    /// # Arguments
    /// * `batch_size` - The amount of examples per batch.
    ///
    /// # Returns
    /// An iterator over borrowed `(x, y)` batches.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let n = batch_size.get();
        self.x
            .axis_chunks_iter(Axis(0), n)
            .zip(self.y.axis_chunks_iter(Axis(0), n))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn dataset() -> Dataset {
        let data = (0..10).flat_map(|i| [i as f32, i as f32 + 100.]).collect();
        Dataset::new(data, 1, 1).unwrap()
    }

    #[test]
    fn new_splits_features_and_targets() {
        let dataset = Dataset::new(vec![1., 2., 3., 4., 5., 6.], 2, 1).unwrap();

        let (x, y) = dataset.views();

        assert_eq!(x, array![[1., 2.], [4., 5.]]);
        assert_eq!(y, array![[3.], [6.]]);
    }

    #[test]
    fn new_rejects_partial_rows() {
        let err = Dataset::new(vec![1., 2., 3., 4.], 2, 1).unwrap_err();

        assert!(matches!(err, MlErr::SizeMismatch { got: 4, expected: 3, .. }));
    }

    #[test]
    fn batches_cover_every_row_once() {
        let dataset = dataset();
        let batches: Vec<_> = dataset.batches(NonZeroUsize::new(4).unwrap()).collect();

        let sizes: Vec<_> = batches.iter().map(|(x, _)| x.nrows()).collect();
        assert_eq!(sizes, [4, 4, 2]);
        assert_eq!(batches[2].0, array![[8.], [9.]]);
        assert_eq!(batches[2].1, array![[108.], [109.]]);
    }

    #[test]
    fn shuffle_keeps_pairs_together() {
        let mut dataset = dataset();
        dataset.shuffle(&mut StdRng::seed_from_u64(7));

        let (x, y) = dataset.views();
        let mut seen: Vec<f32> = x.iter().copied().collect();
        seen.sort_by(f32::total_cmp);

        assert_eq!(seen, (0..10).map(|i| i as f32).collect::<Vec<_>>());
        for (x, y) in x.iter().zip(y.iter()) {
            assert_eq!(*y, x + 100.);
        }
    }

    #[test]
    fn from_parts_rejects_row_mismatch() {
        let err = Dataset::from_parts(Array2::zeros((3, 2)), Array2::zeros((2, 1))).unwrap_err();

        assert!(matches!(err, MlErr::SizeMismatch { got: 2, expected: 3, .. }));
    }
}
