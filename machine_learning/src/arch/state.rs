/// A single named tensor of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// An ordered snapshot of a model's parameters, keyed by tensor name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: Vec<Tensor>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tensor to the snapshot.
    ///
    /// # Arguments
    /// * `name` - The name of the tensor, unique inside a model.
    /// * `shape` - Its dimensions, their product must be `data.len()`.
    /// * `data` - The values, in row major order.
    pub fn push(&mut self, name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());

        self.tensors.push(Tensor {
            name: name.into(),
            shape,
            data,
        });
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Returns the total amount of scalars in the snapshot.
    pub fn numel(&self) -> usize {
        self.tensors.iter().map(|t| t.data.len()).sum()
    }
}

impl FromIterator<Tensor> for StateDict {
    fn from_iter<I: IntoIterator<Item = Tensor>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}
