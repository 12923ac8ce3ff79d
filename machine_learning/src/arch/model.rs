use ndarray::{Array2, ArrayView2};

use super::StateDict;
use crate::{error::Result, optimization::Optimizer};

/// Whether the model is being trained or only observed.
///
/// In `Eval` mode the forward pass keeps no metadata, so no gradient can be computed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// A named parameter tensor of a model together with its gradient.
#[derive(Debug, Clone)]
pub struct NamedTensor<'a> {
    pub name: String,
    pub shape: Vec<usize>,
    pub params: &'a [f32],
    pub grad: &'a [f32],

    /// Frozen tensors are left untouched by `Model::step`.
    pub trainable: bool,
}

/// A trainable model that owns its parameters and the gradient accumulated for them.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Returns the current mode of the model.
    fn mode(&self) -> Mode;

    /// Switches the model between training and evaluation.
    fn set_mode(&mut self, mode: Mode);

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// The prediction for every row of `x` or an error if occurred.
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Propagates the derivative of the loss with respect to the last prediction back through
    /// the model, **adding** the resulting gradient to the accumulated one.
    ///
    /// # Arguments
    /// * `d` - The derivative of the loss with respect to the output of the last `forward`.
    ///
    /// # Errors
    /// `MlErr::GradDisabled` if the last forward pass was made in `Mode::Eval`.
    fn backward(&mut self, d: Array2<f32>) -> Result<()>;

    /// Clears the accumulated gradient.
    fn zero_grad(&mut self);

    /// Updates the trainable parameters with the accumulated gradient following `optimizer`.
    fn step<O: Optimizer>(&mut self, optimizer: &mut O) -> Result<()>;

    /// Returns every parameter tensor of the model, in a stable order.
    fn named_tensors(&self) -> Vec<NamedTensor<'_>>;

    /// Replaces every parameter of the model with the ones in `state`.
    ///
    /// # Errors
    /// If `state` does not contain exactly the tensors of this model with the same shapes.
    fn load_state(&mut self, state: &StateDict) -> Result<()>;

    /// Takes a snapshot of the model's parameters.
    fn state(&self) -> StateDict {
        let mut state = StateDict::new();

        for tensor in self.named_tensors() {
            state.push(tensor.name, tensor.shape, tensor.params.to_vec());
        }

        state
    }
}
