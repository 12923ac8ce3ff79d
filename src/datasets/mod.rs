pub mod cells;
pub mod cifar;
pub mod netpbm;
pub mod tensors;

use std::{collections::BTreeMap, num::NonZeroUsize, path::PathBuf};

use machine_learning::dataset::Dataset;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use trainer::InMemorySource;

use crate::{ExperimentErr, Result};

/// The examples of an inline subset, one inner vector per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineSubset {
    pub x: Vec<Vec<f32>>,
    pub y: Vec<Vec<f32>>,
}

/// Where the examples of every subset come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetSpec {
    Cifar10 {
        root: PathBuf,
    },
    Cifar100 {
        root: PathBuf,
        #[serde(default)]
        coarse: bool,
    },
    Tensors {
        dir: PathBuf,
    },
    Cells {
        dir: PathBuf,
    },
    Inline {
        subsets: BTreeMap<String, InlineSubset>,
    },
}

fn rows(name: &str, rows: &[Vec<f32>]) -> Result<Array2<f32>> {
    let cols = rows.first().map_or(0, Vec::len);
    if let Some(row) = rows.iter().find(|r| r.len() != cols) {
        return Err(ExperimentErr::Dataset(format!(
            "{name} mixes rows of {cols} and {} values",
            row.len()
        )));
    }

    let data = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), cols), data)
        .map_err(|e| ExperimentErr::Dataset(format!("{name}: {e}")))
}

impl DatasetSpec {
    /// Loads a whole subset in memory.
    ///
    /// # Errors
    /// `ExperimentErr::UnknownSubset` if the dataset has no such subset.
    pub fn load(&self, subset: &str) -> Result<Dataset> {
        match self {
            DatasetSpec::Cifar10 { root } => cifar::load_cifar10(root, subset),
            DatasetSpec::Cifar100 { root, coarse } => cifar::load_cifar100(root, subset, *coarse),
            DatasetSpec::Tensors { dir } => tensors::load(dir, subset),
            DatasetSpec::Cells { dir } => cells::load(dir, subset),
            DatasetSpec::Inline { subsets } => {
                let inline = subsets
                    .get(subset)
                    .ok_or_else(|| ExperimentErr::UnknownSubset(subset.to_string()))?;
                let x = rows(&format!("{subset}.x"), &inline.x)?;
                let y = rows(&format!("{subset}.y"), &inline.y)?;
                Ok(Dataset::from_parts(x, y)?)
            }
        }
    }

    /// Loads the given subsets into a batched source.
    ///
    /// # Arguments
    /// * `subsets` - Every subset the source must provide, duplicates are loaded once.
    /// * `batch_size` - The amount of examples per batch.
    /// * `seed` - Shuffles the training subset on every pass when present.
    pub fn source<'a, I>(
        &self,
        subsets: I,
        batch_size: NonZeroUsize,
        seed: Option<u64>,
    ) -> Result<InMemorySource>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut source = InMemorySource::new(batch_size);

        for subset in subsets {
            if source.subset(subset).is_none() {
                source = source.with_subset(subset, self.load(subset)?);
            }
        }

        if let Some(seed) = seed {
            source = source.shuffled(seed);
        }

        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use trainer::{DataSource, TRAIN};

    use super::*;

    fn inline() -> DatasetSpec {
        let subset = InlineSubset {
            x: vec![vec![0., 1.], vec![1., 0.], vec![1., 1.]],
            y: vec![vec![1.], vec![1.], vec![0.]],
        };
        DatasetSpec::Inline {
            subsets: BTreeMap::from([(TRAIN.to_string(), subset)]),
        }
    }

    #[test]
    fn spec_is_tagged_by_kind() {
        let spec: DatasetSpec =
            serde_json::from_str(r#"{ "kind": "cifar100", "root": "data" }"#).unwrap();

        assert_eq!(
            spec,
            DatasetSpec::Cifar100 {
                root: "data".into(),
                coarse: false
            }
        );
    }

    #[test]
    fn inline_source_batches() {
        let mut source = inline()
            .source([TRAIN, TRAIN], NonZeroUsize::new(2).unwrap(), None)
            .unwrap();

        let sizes: Vec<usize> = source
            .batches(TRAIN)
            .unwrap()
            .map(|b| b.unwrap().0.nrows())
            .collect();
        assert_eq!(sizes, [2, 1]);
    }

    #[test]
    fn ragged_inline_rows_are_rejected() {
        let spec = DatasetSpec::Inline {
            subsets: BTreeMap::from([(
                "val".to_string(),
                InlineSubset {
                    x: vec![vec![0., 1.], vec![1.]],
                    y: vec![vec![1.], vec![0.]],
                },
            )]),
        };

        assert!(matches!(spec.load("val"), Err(ExperimentErr::Dataset(_))));
        assert!(matches!(inline().load("val"), Err(ExperimentErr::UnknownSubset(_))));
    }
}
