mod cross_entropy;
mod dice;
mod loss_fn;
mod mse;

pub use cross_entropy::CrossEntropy;
pub use dice::Dice;
pub use loss_fn::LossFn;
pub use mse::Mse;
