use super::{activations::ActFn, layers::Layer, sequential::Sequential};
use crate::{
    MlErr, Result,
    specs::{ActFnSpec, LayerSpec, ModelSpec},
};

fn build_act_fn(spec: ActFnSpec) -> ActFn {
    match spec {
        ActFnSpec::Sigmoid { amp } => ActFn::sigmoid(amp),
        ActFnSpec::Relu => ActFn::relu(),
        ActFnSpec::Tanh => ActFn::tanh(),
    }
}

fn build_layer(spec: LayerSpec) -> Result<Layer> {
    match spec {
        LayerSpec::Dense { dim, act_fn } => {
            if dim.0 == 0 || dim.1 == 0 {
                return Err(MlErr::InvalidSpec(format!(
                    "dense layer with dimensions {dim:?}"
                )));
            }

            Ok(Layer::dense(dim, act_fn.map(build_act_fn)))
        }
    }
}

/// Builds a zero initialized model from its specification.
///
/// # Arguments
/// * `spec` - The specification of the model.
///
/// # Returns
/// The model, or an error if it has no layers or the output of a layer doesn't feed the next one.
pub fn build_model(spec: &ModelSpec) -> Result<Sequential> {
    let ModelSpec::Sequential { layers } = spec;

    if layers.is_empty() {
        return Err(MlErr::InvalidSpec("the model has no layers".into()));
    }

    let layers = layers
        .iter()
        .map(|&layer| build_layer(layer))
        .collect::<Result<Vec<_>>>()?;

    for (i, pair) in layers.windows(2).enumerate() {
        let (out, next_in) = (pair[0].dim().1, pair[1].dim().0);
        if out != next_in {
            return Err(MlErr::InvalidSpec(format!(
                "layer {i} outputs {out} features but layer {} takes {next_in}",
                i + 1
            )));
        }
    }

    Ok(Sequential::new(layers))
}
