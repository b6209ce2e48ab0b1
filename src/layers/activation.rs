//! Activation functions for graph layers.

use burn::tensor::{Tensor, backend::Backend};

use crate::errors::Result;
use crate::graph::GraphBuilder;

/// Supported activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// No activation (identity function).
    #[default]
    None,
    /// Rectified Linear Unit: f(x) = max(0, x)
    Relu,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
}

impl Activation {
    /// Applies the activation function to a tensor.
    pub fn apply<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::None => tensor,
            Activation::Relu => burn::tensor::activation::relu(tensor),
            Activation::Tanh => burn::tensor::activation::tanh(tensor),
        }
    }

    /// Emits the activation op after `input` and returns the new tensor name.
    ///
    /// `None` emits nothing and returns `input` unchanged.
    pub fn emit(&self, builder: &mut GraphBuilder, input: &str) -> Result<String> {
        match self {
            Activation::None => Ok(input.to_string()),
            Activation::Relu => builder.relu(input),
            Activation::Tanh => builder.tanh(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend;

    type TestBackend = NdArray;

    #[test]
    fn test_activation_apply() {
        let device = <TestBackend as Backend>::Device::default();
        let input = Tensor::<TestBackend, 1>::from_floats([-1.0, 0.0, 2.0], &device);

        let relu: Vec<f32> = Activation::Relu
            .apply(input.clone())
            .to_data()
            .to_vec()
            .unwrap();
        assert_eq!(relu, vec![0.0, 0.0, 2.0]);

        let tanh: Vec<f32> = Activation::Tanh.apply(input).to_data().to_vec().unwrap();
        assert!((tanh[0] - (-1.0_f32).tanh()).abs() < 1e-5);
        assert!((tanh[2] - 2.0_f32.tanh()).abs() < 1e-5);
    }

    #[test]
    fn test_emit_names_ops_in_scope() {
        let mut builder = GraphBuilder::new();
        let x = builder.placeholder("x", vec![None]).unwrap();

        let out = builder
            .with_scope("out", |b| Activation::Tanh.emit(b, &x))
            .unwrap();
        assert_eq!(out, "out/Tanh");

        let same = Activation::None.emit(&mut builder, &x).unwrap();
        assert_eq!(same, x);
        assert_eq!(builder.graph().len(), 2);
    }
}
