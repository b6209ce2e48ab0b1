//! Graph-emitting network layers.
//!
//! Each layer adds its variables and ops to a `GraphBuilder` under its own
//! name scope and reports the resulting tensor name, its channel count, and
//! the variables it created. Parameter lists are what the weights archive
//! is matched against, so their order is the creation order.

pub mod activation;
pub mod batch_norm;
pub mod conv;
pub mod subpixel;

pub use activation::Activation;
pub use batch_norm::BatchNormConfig;
pub use conv::Conv2dConfig;
pub use subpixel::SubpixelConfig;

use crate::errors::{ExportError, Result};
use crate::graph::GraphBuilder;

/// The result of adding a layer to a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOutput {
    /// Name of the tensor the layer produced.
    pub output: String,
    /// Channel count of that tensor (last NHWC axis).
    pub channels: usize,
    /// Variables created by this layer, in creation order.
    pub params: Vec<String>,
}

impl LayerOutput {
    /// Wraps an existing tensor, such as a placeholder, as a layer input.
    pub fn input(name: impl Into<String>, channels: usize) -> Self {
        Self {
            output: name.into(),
            channels,
            params: Vec::new(),
        }
    }
}

/// Adds two layer outputs element-wise under the scope `name`.
pub fn elementwise_add(
    builder: &mut GraphBuilder,
    name: &str,
    a: &LayerOutput,
    b: &LayerOutput,
) -> Result<LayerOutput> {
    if a.channels != b.channels {
        return Err(ExportError::InvalidGraph(format!(
            "{name}: cannot add {} channels to {} channels",
            a.channels, b.channels
        )));
    }
    let output = builder.with_scope(name, |s| s.add("Add", &a.output, &b.output))?;
    Ok(LayerOutput {
        output,
        channels: a.channels,
        params: Vec::new(),
    })
}
