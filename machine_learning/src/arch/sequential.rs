use std::{
    fmt::{self, Display},
    ops::Range,
};

use log::debug;
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{Mode, Model, NamedTensor, StateDict, layers::Layer};
use crate::{
    MlErr, Result,
    initialization::Init,
    optimization::Optimizer,
};

/// Where a named tensor lives inside the flat parameter buffer.
struct TensorLayout {
    name: String,
    shape: Vec<usize>,
    range: Range<usize>,
}

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The parameters of every layer live contiguously in a single flat buffer, in layer order, and
/// so does the gradient.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    params: Vec<f32>,
    grad: Vec<f32>,
    mode: Mode,

    /// Names of the tensors `step` leaves untouched.
    frozen: Vec<String>,
}

impl Sequential {
    /// Creates a new `Sequential` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<Layer> = layers.into_iter().collect();
        let size = layers.iter().map(|layer| layer.size()).sum();

        Self {
            layers,
            params: vec![0.; size],
            grad: vec![0.; size],
            mode: Mode::Train,
            frozen: Vec::new(),
        }
    }

    /// Replaces the flat parameter buffer of the model.
    ///
    /// # Errors
    /// If `params` doesn't have exactly `self.size()` values.
    pub fn with_params(mut self, params: Vec<f32>) -> Result<Self> {
        if params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "model parameters",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params = params;
        Ok(self)
    }

    /// Samples fresh parameters: Xavier uniform for weight matrices and
    /// `U(-1/sqrt(n), 1/sqrt(n))` for the `n` values of a bias vector.
    ///
    /// # Arguments
    /// * `rng` - The random number generator shared by every tensor.
    pub fn initialize<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        for tensor in self.layout() {
            let init = Init::for_shape(&tensor.shape);
            init.fill(rng, &mut self.params[tensor.range])?;

            let (low, high) = init.bounds();
            debug!(tensor = tensor.name.as_str(); "initialized from U({low:.4}, {high:.4})");
        }

        Ok(())
    }

    /// Freezes every tensor whose name doesn't start with one of `prefixes`.
    ///
    /// An empty list of prefixes freezes the whole model.
    ///
    /// # Errors
    /// `MlErr::NoSuchTensors` if a prefix matches no tensor, nothing is frozen then.
    pub fn train_only<S: AsRef<str>>(&mut self, prefixes: &[S]) -> Result<()> {
        let layout = self.layout();

        for prefix in prefixes.iter().map(|prefix| prefix.as_ref()) {
            if !layout.iter().any(|tensor| tensor.name.starts_with(prefix)) {
                return Err(MlErr::NoSuchTensors(prefix.to_string()));
            }
        }

        self.frozen = layout
            .into_iter()
            .map(|tensor| tensor.name)
            .filter(|name| {
                !prefixes
                    .iter()
                    .any(|prefix| name.starts_with(prefix.as_ref()))
            })
            .collect();

        for name in &self.frozen {
            debug!(tensor = name.as_str(); "frozen");
        }

        Ok(())
    }

    pub fn is_trainable(&self, name: &str) -> bool {
        !self.frozen.iter().any(|frozen| frozen == name)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    fn layout(&self) -> Vec<TensorLayout> {
        let mut offset = 0;
        let mut layout = Vec::new();

        for (i, layer) in self.layers.iter().enumerate() {
            for (suffix, shape) in layer.tensors() {
                let numel: usize = shape.iter().product();
                layout.push(TensorLayout {
                    name: format!("layers.{i}.{suffix}"),
                    shape,
                    range: offset..offset + numel,
                });
                offset += numel;
            }
        }

        layout
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let keep = self.mode == Mode::Train;
        let mut offset = 0;
        let mut out: Option<Array2<f32>> = None;

        for layer in self.layers.iter_mut() {
            let size = layer.size();
            let params = &self.params[offset..offset + size];
            let input = match &out {
                Some(a) => a.view(),
                None => x.view(),
            };

            out = Some(layer.forward(params, input, keep)?);
            offset += size;
        }

        out.ok_or_else(|| MlErr::InvalidSpec("the model has no layers".into()))
    }

    fn backward(&mut self, mut d: Array2<f32>) -> Result<()> {
        if self.mode == Mode::Eval {
            return Err(MlErr::GradDisabled);
        }

        let mut end = self.params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&self.params[start..end], &mut self.grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    fn step<O: Optimizer>(&mut self, optimizer: &mut O) -> Result<()> {
        if self.frozen.is_empty() {
            return optimizer.update_params(&self.grad, &mut self.params);
        }

        let frozen: Vec<(Range<usize>, Vec<f32>)> = self
            .layout()
            .into_iter()
            .filter(|tensor| !self.is_trainable(&tensor.name))
            .map(|tensor| {
                let values = self.params[tensor.range.clone()].to_vec();
                (tensor.range, values)
            })
            .collect();

        optimizer.update_params(&self.grad, &mut self.params)?;

        for (range, values) in frozen {
            self.params[range].copy_from_slice(&values);
        }

        Ok(())
    }

    fn named_tensors(&self) -> Vec<NamedTensor<'_>> {
        self.layout()
            .into_iter()
            .map(|tensor| NamedTensor {
                params: &self.params[tensor.range.clone()],
                grad: &self.grad[tensor.range],
                trainable: self.is_trainable(&tensor.name),
                name: tensor.name,
                shape: tensor.shape,
            })
            .collect()
    }

    fn load_state(&mut self, state: &StateDict) -> Result<()> {
        let layout = self.layout();

        for tensor in &layout {
            let loaded = state
                .get(&tensor.name)
                .ok_or_else(|| MlErr::MissingTensor(tensor.name.clone()))?;

            if loaded.shape != tensor.shape || loaded.data.len() != tensor.range.len() {
                return Err(MlErr::ShapeMismatch {
                    what: tensor.name.clone(),
                    got: loaded.shape.clone(),
                    expected: tensor.shape.clone(),
                });
            }
        }

        if let Some(extra) = state
            .tensors()
            .iter()
            .find(|loaded| !layout.iter().any(|tensor| tensor.name == loaded.name))
        {
            return Err(MlErr::UnexpectedTensor(extra.name.clone()));
        }

        for tensor in layout {
            if let Some(loaded) = state.get(&tensor.name) {
                self.params[tensor.range].copy_from_slice(&loaded.data);
            }
        }

        Ok(())
    }
}

impl Display for Sequential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sequential(")?;
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(f, "  ({i}): {layer}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        arch::{
            activations::ActFn,
            loss::{LossFn, Mse},
        },
        dataset::Dataset,
        optimization::GradientDescent,
    };

    fn and2() -> Dataset {
        let and2 = [
            0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 1.0, //
        ];

        Dataset::new(and2.into(), 2, 1).unwrap()
    }

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn model() -> Sequential {
        Sequential::new([
            Layer::dense((2, 3), Some(ActFn::sigmoid(1.))),
            Layer::dense((3, 1), Some(ActFn::sigmoid(1.))),
        ])
    }

    fn epoch_loss(model: &mut Sequential, dataset: &Dataset) -> f32 {
        let (x, y) = dataset.views();
        let y_pred = model.forward(x).unwrap();
        Mse.loss(y_pred.view(), y).unwrap()
    }

    #[test]
    fn and2_gate_loss_decreases() {
        let dataset = and2();
        let mut model = model();
        model.initialize(&mut seeded_rng()).unwrap();
        let mut optimizer = GradientDescent::new(5.);

        let before = epoch_loss(&mut model, &dataset);

        for _ in 0..2000 {
            let (x, y) = dataset.views();
            model.zero_grad();
            let y_pred = model.forward(x).unwrap();
            let d = Mse.loss_prime(y_pred.view(), y).unwrap();
            model.backward(d).unwrap();
            model.step(&mut optimizer).unwrap();
        }

        let after = epoch_loss(&mut model, &dataset);
        assert!(after < before / 4., "loss went from {before} to {after}");
    }

    #[test]
    fn eval_mode_disables_backward() {
        let mut model = model();
        model.set_mode(Mode::Eval);

        let y_pred = model.forward(array![[1.0, 0.0]].view()).unwrap();
        let err = model.backward(Array2::ones(y_pred.dim())).unwrap_err();

        assert!(matches!(err, MlErr::GradDisabled));
        assert!(model.grad().iter().all(|&g| g == 0.));
    }

    #[test]
    fn named_tensors_follow_layer_layout() {
        let model = model();
        let tensors = model.named_tensors();

        let names: Vec<_> = tensors.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            ["layers.0.weight", "layers.0.bias", "layers.1.weight", "layers.1.bias"]
        );
        assert_eq!(tensors[0].shape, vec![2, 3]);
        assert_eq!(tensors[3].shape, vec![1]);
        assert_eq!(tensors.iter().map(|t| t.params.len()).sum::<usize>(), model.size());
    }

    #[test]
    fn state_round_trip_restores_parameters() {
        let mut trained = model();
        trained.initialize(&mut seeded_rng()).unwrap();
        let state = trained.state();

        let mut fresh = model();
        fresh.load_state(&state).unwrap();

        assert_eq!(fresh.params(), trained.params());
    }

    #[test]
    fn load_state_rejects_other_architecture() {
        let other = Sequential::new([Layer::dense((2, 4), None), Layer::dense((4, 1), None)]);
        let mut model = model();

        let err = model.load_state(&other.state()).unwrap_err();

        assert!(matches!(err, MlErr::ShapeMismatch { .. }));
        assert!(model.params().iter().all(|&p| p == 0.));
    }

    #[test]
    fn load_state_rejects_unknown_tensor() {
        let mut state = model().state();
        state.push("layers.2.weight", vec![1, 1], vec![0.]);

        let err = model().load_state(&state).unwrap_err();

        assert!(matches!(err, MlErr::UnexpectedTensor(name) if name == "layers.2.weight"));
    }

    #[test]
    fn frozen_tensors_survive_a_step() {
        let dataset = and2();
        let mut model = model();
        model.initialize(&mut seeded_rng()).unwrap();
        model.train_only(&["layers.1"]).unwrap();
        let before = model.params().to_vec();

        let (x, y) = dataset.views();
        let y_pred = model.forward(x).unwrap();
        model.backward(Mse.loss_prime(y_pred.view(), y).unwrap()).unwrap();
        model.step(&mut GradientDescent::new(1.)).unwrap();

        let tensors = model.named_tensors();
        let trainable: Vec<bool> = tensors.iter().map(|t| t.trainable).collect();
        assert_eq!(trainable, [false, false, true, true]);
        // layers.0 holds the first 9 parameters.
        assert_eq!(&model.params()[..9], &before[..9]);
        assert_ne!(&model.params()[9..], &before[9..]);
    }

    #[test]
    fn unmatched_trainable_prefix_is_rejected() {
        let mut model = model();

        let err = model.train_only(&["layers.0", "encoder"]).unwrap_err();

        assert!(matches!(err, MlErr::NoSuchTensors(prefix) if prefix == "encoder"));
        assert!(model.named_tensors().iter().all(|t| t.trainable));
    }

    #[test]
    fn initialize_respects_bias_bound() {
        let mut model = model();
        model.initialize(&mut seeded_rng()).unwrap();

        let bias = &model.named_tensors()[1];
        let bound = 1. / 3f32.sqrt();
        assert!(bias.params.iter().all(|b| b.abs() <= bound));
        assert!(model.params().iter().any(|&p| p != 0.));
    }
}
