//! 2D convolution layer.

use crate::errors::Result;
use crate::graph::{GraphBuilder, Initializer};
use crate::layers::{Activation, LayerOutput};
use crate::session::Padding;

/// Configuration for a Conv2d layer.
///
/// Creates an HWIO kernel `W_conv2d` and, when enabled, a bias `b_conv2d`.
#[derive(Debug, Clone)]
pub struct Conv2dConfig {
    /// Number of output channels.
    pub filters: usize,
    /// Square kernel side.
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: Padding,
    pub activation: Activation,
    pub use_bias: bool,
    pub weight_init: Initializer,
    pub bias_init: Initializer,
}

impl Conv2dConfig {
    /// Creates a stride-1 SAME convolution with bias and no activation.
    pub fn new(filters: usize, kernel_size: usize) -> Self {
        Self {
            filters,
            kernel_size,
            stride: 1,
            padding: Padding::Same,
            activation: Activation::None,
            use_bias: true,
            weight_init: Initializer::RandomNormal {
                mean: 0.0,
                stddev: 0.02,
            },
            bias_init: Initializer::Constant(0.0),
        }
    }

    /// Sets the activation function.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Disables the bias variable.
    pub fn without_bias(mut self) -> Self {
        self.use_bias = false;
        self
    }

    pub fn with_weight_init(mut self, init: Initializer) -> Self {
        self.weight_init = init;
        self
    }

    /// Adds the layer to the graph under the scope `name`.
    pub fn build(
        &self,
        builder: &mut GraphBuilder,
        input: &LayerOutput,
        name: &str,
    ) -> Result<LayerOutput> {
        builder.with_variable_scope(name, false, |b| {
            let scope = b.scope();
            let mut params = Vec::new();

            let kernel = b.variable(
                "W_conv2d",
                vec![self.kernel_size, self.kernel_size, input.channels, self.filters],
                self.weight_init,
                true,
            )?;
            params.push(format!("{scope}/W_conv2d"));

            let mut output = b.conv2d(
                &input.output,
                &kernel,
                (self.stride, self.stride),
                self.padding.as_str(),
            )?;

            if self.use_bias {
                let bias = b.variable("b_conv2d", vec![self.filters], self.bias_init, true)?;
                params.push(format!("{scope}/b_conv2d"));
                output = b.bias_add(&output, &bias)?;
            }

            let output = self.activation.emit(b, &output)?;
            Ok(LayerOutput {
                output,
                channels: self.filters,
                params,
            })
        })
    }
}
