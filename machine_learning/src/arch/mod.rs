mod builder;
pub mod activations;
pub mod layers;
pub mod loss;
mod model;
mod sequential;
mod state;

pub use builder::build_model;
pub use model::{Mode, Model, NamedTensor};
pub use sequential::Sequential;
pub use state::{StateDict, Tensor};
