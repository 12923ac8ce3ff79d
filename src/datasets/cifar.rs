use std::{fs, io, path::Path};

use machine_learning::dataset::Dataset;
use ndarray::Array2;

use crate::{ExperimentErr, Result};

/// Bytes of a 32x32 RGB image, channel planes one after the other.
pub const IMAGE_BYTES: usize = 32 * 32 * 3;

const CIFAR10_TRAIN: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const CIFAR10_TEST: &str = "test_batch.bin";

/// Parses fixed size CIFAR records: `label_bytes` label bytes followed by the image.
///
/// # Arguments
/// * `bytes` - The whole content of one or more binary batch files.
/// * `label_bytes` - The amount of label bytes per record.
/// * `label` - Which of them is the target.
///
/// # Returns
/// The images as rows of `IMAGE_BYTES` values in `[0, 1]` and their labels in a single column.
pub fn parse_records(bytes: &[u8], label_bytes: usize, label: usize) -> Result<Dataset> {
    let record = label_bytes + IMAGE_BYTES;
    if bytes.len() % record != 0 {
        return Err(ExperimentErr::Dataset(format!(
            "{} bytes is not a whole amount of {record} byte records",
            bytes.len()
        )));
    }

    let n = bytes.len() / record;
    let mut x = Array2::zeros((n, IMAGE_BYTES));
    let mut y = Array2::zeros((n, 1));

    for (i, chunk) in bytes.chunks_exact(record).enumerate() {
        y[[i, 0]] = chunk[label] as f32;
        for (v, &b) in x.row_mut(i).iter_mut().zip(&chunk[label_bytes..]) {
            *v = b as f32 / 255.;
        }
    }

    Ok(Dataset::from_parts(x, y)?)
}

fn read_files(root: &Path, files: &[&str], subset: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    for file in files {
        match fs::read(root.join(file)) {
            Ok(content) => bytes.extend(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ExperimentErr::Dataset(format!(
                    "{subset} needs {}",
                    root.join(file).display()
                )));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(bytes)
}

/// Loads a subset of the CIFAR-10 binary version, `train` or `test`.
pub fn load_cifar10(root: &Path, subset: &str) -> Result<Dataset> {
    let files: &[&str] = match subset {
        "train" => &CIFAR10_TRAIN,
        "test" => &[CIFAR10_TEST],
        other => return Err(ExperimentErr::UnknownSubset(other.to_string())),
    };

    parse_records(&read_files(root, files, subset)?, 1, 0)
}

/// Loads a subset of the CIFAR-100 binary version, `train` or `test`, with its fine or coarse
/// labels.
pub fn load_cifar100(root: &Path, subset: &str, coarse: bool) -> Result<Dataset> {
    let file = match subset {
        "train" => "train.bin",
        "test" => "test.bin",
        other => return Err(ExperimentErr::UnknownSubset(other.to_string())),
    };

    let label = if coarse { 0 } else { 1 };
    parse_records(&read_files(root, &[file], subset)?, 2, label)
}
