use std::path::Path;

use machine_learning::{arch::Tensor, dataset::Dataset};
use ndarray::Array2;

use crate::{ExperimentErr, Result};

fn matrix(tensor: &Tensor) -> Result<Array2<f32>> {
    let shape = match tensor.shape[..] {
        [rows] => (rows, 1),
        [rows, cols] => (rows, cols),
        _ => {
            return Err(ExperimentErr::Dataset(format!(
                "tensor {} has shape {:?}, expected one or two dimensions",
                tensor.name, tensor.shape
            )));
        }
    };

    Array2::from_shape_vec(shape, tensor.data.clone())
        .map_err(|e| ExperimentErr::Dataset(format!("tensor {}: {e}", tensor.name)))
}

/// Loads `<dir>/<subset>.safetensors`, holding the features in `x` and the targets in `y`.
pub fn load(dir: &Path, subset: &str) -> Result<Dataset> {
    let path = dir.join(format!("{subset}.safetensors"));
    if !path.is_file() {
        return Err(ExperimentErr::UnknownSubset(subset.to_string()));
    }

    let state = trainer::checkpoint::load(&path)?;
    let get = |name: &str| {
        state.get(name).ok_or_else(|| {
            ExperimentErr::Dataset(format!("{} has no tensor {name:?}", path.display()))
        })
    };

    Ok(Dataset::from_parts(matrix(get("x")?)?, matrix(get("y")?)?)?)
}
