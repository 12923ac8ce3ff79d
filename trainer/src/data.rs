use std::{collections::BTreeMap, num::NonZeroUsize};

use machine_learning::dataset::Dataset;
use ndarray::ArrayView2;
use rand::{SeedableRng, rngs::StdRng};

use crate::{Result, TrainerErr};

/// The subset iterated by the training loop.
pub const TRAIN: &str = "train";

/// A borrowed `(x, y)` batch.
pub type Batch<'a> = (ArrayView2<'a, f32>, ArrayView2<'a, f32>);

/// A finite pass over the batches of a subset.
pub type Batches<'a> = Box<dyn Iterator<Item = Result<Batch<'a>>> + 'a>;

/// Provides the batches of named subsets (`train`, `val`, `test`, ...).
pub trait DataSource {
    /// Starts a new pass over a subset.
    ///
    /// # Arguments
    /// * `subset` - The name of the subset.
    ///
    /// # Returns
    /// The batches of the subset, or `TrainerErr::UnknownSubset`.
    fn batches(&mut self, subset: &str) -> Result<Batches<'_>>;
}

impl<D: DataSource + ?Sized> DataSource for Box<D> {
    fn batches(&mut self, subset: &str) -> Result<Batches<'_>> {
        (**self).batches(subset)
    }
}

/// Named in-memory datasets split in fixed size batches.
///
/// The training subset is reshuffled at the start of every pass when a seed was given.
#[derive(Debug)]
pub struct InMemorySource {
    subsets: BTreeMap<String, Dataset>,
    batch_size: NonZeroUsize,
    rng: Option<StdRng>,
}

impl InMemorySource {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        Self {
            subsets: BTreeMap::new(),
            batch_size,
            rng: None,
        }
    }

    /// Adds or replaces a subset.
    pub fn with_subset(mut self, name: impl Into<String>, dataset: Dataset) -> Self {
        self.subsets.insert(name.into(), dataset);
        self
    }

    /// Shuffles the training subset before every pass.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn subset(&self, name: &str) -> Option<&Dataset> {
        self.subsets.get(name)
    }

    pub fn subset_names(&self) -> impl Iterator<Item = &str> {
        self.subsets.keys().map(String::as_str)
    }
}

impl DataSource for InMemorySource {
    fn batches(&mut self, subset: &str) -> Result<Batches<'_>> {
        let dataset = self
            .subsets
            .get_mut(subset)
            .ok_or_else(|| TrainerErr::UnknownSubset(subset.to_string()))?;

        if let (TRAIN, Some(rng)) = (subset, self.rng.as_mut()) {
            dataset.shuffle(rng);
        }

        Ok(Box::new(dataset.batches(self.batch_size).map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Dataset {
        let data = (0..n).flat_map(|i| [i as f32, 0.]).collect();
        Dataset::new(data, 1, 1).unwrap()
    }

    #[test]
    fn unknown_subset_is_an_error() {
        let mut source = InMemorySource::new(NonZeroUsize::new(2).unwrap());

        assert!(matches!(
            source.batches("val"),
            Err(TrainerErr::UnknownSubset(name)) if name == "val"
        ));
    }

    #[test]
    fn passes_are_restartable() {
        let mut source = InMemorySource::new(NonZeroUsize::new(2).unwrap())
            .with_subset(TRAIN, dataset(5))
            .shuffled(3);

        for _ in 0..2 {
            let rows: usize = source
                .batches(TRAIN)
                .unwrap()
                .map(|batch| batch.unwrap().0.nrows())
                .sum();
            assert_eq!(rows, 5);
        }
    }

    #[test]
    fn evaluation_subsets_keep_their_order() {
        let mut source = InMemorySource::new(NonZeroUsize::new(10).unwrap())
            .with_subset("test", dataset(4))
            .shuffled(3);

        let (x, _) = source.batches("test").unwrap().next().unwrap().unwrap();

        assert_eq!(x.column(0).to_vec(), [0., 1., 2., 3.]);
    }
}
