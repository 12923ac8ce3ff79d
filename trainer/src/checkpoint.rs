use std::{collections::HashMap, fs, path::Path};

use machine_learning::arch::StateDict;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, TrainerErr};

const EPOCH_KEY: &str = "epoch";
const ITERATION_KEY: &str = "iteration";

/// Where in a run a checkpoint was taken.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub iteration: u64,
}

/// Serializes a snapshot as safetensors, one `F32` tensor per entry.
///
/// # Arguments
/// * `state` - The snapshot of the model.
/// * `meta` - Stored in the safetensors header.
///
/// # Returns
/// The bytes of the safetensors file.
pub fn encode(state: &StateDict, meta: CheckpointMeta) -> Result<Vec<u8>> {
    let views = state
        .tensors()
        .iter()
        .map(|tensor| {
            let bytes: &[u8] = bytemuck::cast_slice(&tensor.data);
            let view = TensorView::new(Dtype::F32, tensor.shape.clone(), bytes)?;
            Ok((tensor.name.as_str(), view))
        })
        .collect::<Result<Vec<_>>>()?;

    let metadata = HashMap::from([
        (EPOCH_KEY.to_string(), meta.epoch.to_string()),
        (ITERATION_KEY.to_string(), meta.iteration.to_string()),
    ]);

    Ok(safetensors::serialize(views, &Some(metadata))?)
}

/// Parses a safetensors blob back into a snapshot.
///
/// # Errors
/// `TrainerErr::Checkpoint` if the blob is malformed or holds anything but `F32` tensors.
pub fn decode(bytes: &[u8]) -> Result<(StateDict, CheckpointMeta)> {
    let (_, header) = SafeTensors::read_metadata(bytes)?;
    let meta = header
        .metadata()
        .as_ref()
        .map(|m| CheckpointMeta {
            epoch: m.get(EPOCH_KEY).and_then(|v| v.parse().ok()).unwrap_or_default(),
            iteration: m
                .get(ITERATION_KEY)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        })
        .unwrap_or_default();

    let tensors = SafeTensors::deserialize(bytes)?;
    let mut named = tensors.tensors();
    named.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut state = StateDict::new();
    for (name, view) in named {
        if view.dtype() != Dtype::F32 {
            return Err(TrainerErr::Checkpoint(format!(
                "tensor {name} is {:?}, expected F32",
                view.dtype()
            )));
        }

        let data = bytemuck::pod_collect_to_vec::<u8, f32>(view.data());
        state.push(name, view.shape().to_vec(), data);
    }

    Ok((state, meta))
}

/// Reads a snapshot from a safetensors file.
pub fn load(path: &Path) -> Result<StateDict> {
    let bytes = fs::read(path)?;
    let (state, _) = decode(&bytes)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StateDict {
        let mut state = StateDict::new();
        state.push("layers.0.weight", vec![2, 3], vec![0.5, -1., 2., 3., 4.25, -0.125]);
        state.push("layers.0.bias", vec![3], vec![1., 2., 3.]);
        state
    }

    #[test]
    fn decode_restores_tensors_and_metadata() {
        let meta = CheckpointMeta {
            epoch: 3,
            iteration: 42,
        };

        let bytes = encode(&state(), meta).unwrap();
        let (decoded, decoded_meta) = decode(&bytes).unwrap();

        assert_eq!(decoded_meta, meta);
        assert_eq!(decoded.len(), 2);
        for tensor in state().tensors() {
            assert_eq!(decoded.get(&tensor.name), Some(tensor));
        }
    }

    #[test]
    fn decodes_from_unaligned_buffers() {
        let mut shifted = vec![0u8];
        shifted.extend(encode(&state(), CheckpointMeta::default()).unwrap());

        let (decoded, _) = decode(&shifted[1..]).unwrap();

        assert_eq!(
            decoded.get("layers.0.weight").unwrap().data,
            [0.5, -1., 2., 3., 4.25, -0.125]
        );
    }

    #[test]
    fn garbage_is_a_checkpoint_error() {
        let err = decode(b"not a safetensors file").unwrap_err();

        assert!(matches!(err, TrainerErr::Checkpoint(_)));
    }
}
