use std::fmt::{self, Display};

use super::{Relu, Sigmoid, Tanh};

/// An element-wise activation function applied at the output of a layer.
#[derive(Clone, Debug)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Relu(Relu),
    Tanh(Tanh),
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        ActFn::Sigmoid(Sigmoid::new(amp))
    }

    pub fn relu() -> Self {
        ActFn::Relu(Relu)
    }

    pub fn tanh() -> Self {
        ActFn::Tanh(Tanh)
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            ActFn::Sigmoid(a) => a.f(x),
            ActFn::Relu(a) => a.f(x),
            ActFn::Tanh(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            ActFn::Sigmoid(a) => a.df(x),
            ActFn::Relu(a) => a.df(x),
            ActFn::Tanh(a) => a.df(x),
        }
    }
}

impl Display for ActFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActFn::Sigmoid(a) => write!(f, "Sigmoid(amp={})", a.amp()),
            ActFn::Relu(_) => write!(f, "ReLU"),
            ActFn::Tanh(_) => write!(f, "Tanh"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_df(act_fn: &ActFn, x: f32) -> f32 {
        let h = 1e-3;
        (act_fn.f(x + h) - act_fn.f(x - h)) / (2. * h)
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let act_fns = [ActFn::sigmoid(1.), ActFn::sigmoid(2.5), ActFn::tanh()];

        for act_fn in &act_fns {
            for x in [-2.0, -0.5, 0.0, 0.3, 1.7] {
                let diff = (act_fn.df(x) - numeric_df(act_fn, x)).abs();
                assert!(diff < 1e-2, "{act_fn} at {x}: diff {diff}");
            }
        }
    }

    #[test]
    fn relu_clamps_negatives() {
        let relu = ActFn::relu();

        assert_eq!(relu.f(-3.), 0.);
        assert_eq!(relu.f(2.), 2.);
        assert_eq!(relu.df(-3.), 0.);
        assert_eq!(relu.df(2.), 1.);
    }
}
