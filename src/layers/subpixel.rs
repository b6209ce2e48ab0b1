//! Sub-pixel upsampling (pixel shuffle) layer.

use crate::errors::{ExportError, Result};
use crate::graph::GraphBuilder;
use crate::layers::{Activation, LayerOutput};

/// Configuration for a Subpixel layer.
///
/// Rearranges `C * scale^2` channels into a `scale`-times larger image with
/// `C` channels. Has no variables.
#[derive(Debug, Clone)]
pub struct SubpixelConfig {
    pub scale: usize,
    pub activation: Activation,
}

impl SubpixelConfig {
    pub fn new(scale: usize) -> Self {
        Self {
            scale,
            activation: Activation::None,
        }
    }

    /// Sets the activation function.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Adds the layer to the graph under the scope `name`.
    pub fn build(
        &self,
        builder: &mut GraphBuilder,
        input: &LayerOutput,
        name: &str,
    ) -> Result<LayerOutput> {
        let block = self.scale * self.scale;
        if block == 0 || input.channels % block != 0 {
            return Err(ExportError::InvalidGraph(format!(
                "{name}: {} channels cannot be shuffled by a factor of {}",
                input.channels, self.scale
            )));
        }
        builder.with_scope(name, |b| {
            let shuffled = b.depth_to_space(&input.output, self.scale)?;
            let output = self.activation.emit(b, &shuffled)?;
            Ok(LayerOutput {
                output,
                channels: input.channels / block,
                params: Vec::new(),
            })
        })
    }
}
