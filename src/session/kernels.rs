//! Tensor kernels for the ops a session can execute.
//!
//! Activations are NHWC `Tensor<B, 4>`; kernels are HWIO, matching the
//! layout of the weights archives the exporter reads.

use burn::tensor::module::conv2d as burn_conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Tensor, backend::Backend};

use crate::errors::{ExportError, Result};

/// Padding scheme of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Same,
    Valid,
}

impl Padding {
    /// Parses `SAME` or `VALID`.
    pub fn parse(node: &str, value: &str) -> Result<Self> {
        match value {
            "SAME" => Ok(Padding::Same),
            "VALID" => Ok(Padding::Valid),
            other => Err(ExportError::InvalidInput {
                node: node.to_string(),
                message: format!("unknown padding {other}"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Padding::Same => "SAME",
            Padding::Valid => "VALID",
        }
    }

    /// Returns (before, after) padding along one spatial axis.
    pub fn amounts(&self, input: usize, kernel: usize, stride: usize) -> (usize, usize) {
        match self {
            Padding::Valid => (0, 0),
            Padding::Same => {
                let output = input.div_ceil(stride);
                let needed = ((output.saturating_sub(1)) * stride + kernel).saturating_sub(input);
                let before = needed / 2;
                (before, needed - before)
            }
        }
    }
}

/// NHWC convolution with an HWIO kernel.
pub fn conv2d<B: Backend>(
    input: Tensor<B, 4>,
    kernel: Tensor<B, 4>,
    strides: [usize; 2],
    padding: Padding,
) -> Tensor<B, 4> {
    let [_, height, width, _] = input.dims();
    let [kernel_h, kernel_w, _, _] = kernel.dims();

    let (top, bottom) = padding.amounts(height, kernel_h, strides[0]);
    let (left, right) = padding.amounts(width, kernel_w, strides[1]);

    // NHWC -> NCHW and HWIO -> OIHW
    let mut x = input.permute([0, 3, 1, 2]);
    let weight = kernel.permute([3, 2, 0, 1]);

    let symmetric = top == bottom && left == right;
    let conv_padding = if symmetric {
        [top, left]
    } else {
        x = x.pad((left, right, top, bottom), 0.0);
        [0, 0]
    };

    let options = ConvOptions::new(strides, conv_padding, [1, 1], 1);
    burn_conv2d(x, weight, None, options).permute([0, 2, 3, 1])
}

/// Adds a per-channel bias to an NHWC tensor.
pub fn bias_add<B: Backend>(input: Tensor<B, 4>, bias: Tensor<B, 1>) -> Tensor<B, 4> {
    let [channels] = bias.dims();
    input + bias.reshape([1, 1, 1, channels])
}

/// Batch normalization over the channel axis of an NHWC tensor.
///
/// In inference mode the supplied moving statistics are used; in training
/// mode the statistics of the batch itself are used instead.
pub fn batch_norm<B: Backend>(
    input: Tensor<B, 4>,
    scale: Tensor<B, 1>,
    offset: Tensor<B, 1>,
    mean: Tensor<B, 1>,
    variance: Tensor<B, 1>,
    epsilon: f32,
    is_training: bool,
) -> Tensor<B, 4> {
    let [channels] = scale.dims();
    let (mean, variance) = if is_training {
        let batch_mean = input.clone().mean_dim(0).mean_dim(1).mean_dim(2);
        let centered = input.clone() - batch_mean.clone();
        let batch_var = centered.powf_scalar(2.0).mean_dim(0).mean_dim(1).mean_dim(2);
        (batch_mean, batch_var)
    } else {
        (
            mean.reshape([1, 1, 1, channels]),
            variance.reshape([1, 1, 1, channels]),
        )
    };

    let inv_std = (variance + epsilon).sqrt().recip();
    let normalized = (input - mean) * inv_std;
    normalized * scale.reshape([1, 1, 1, channels]) + offset.reshape([1, 1, 1, channels])
}

/// Moves `block_size x block_size` groups of channels into spatial blocks.
///
/// `out[n, h*r + i, w*r + j, c] = in[n, h, w, (i*r + j)*C + c]`.
pub fn depth_to_space<B: Backend>(input: Tensor<B, 4>, block_size: usize) -> Result<Tensor<B, 4>> {
    let [batch, height, width, depth] = input.dims();
    let block_area = block_size
        .checked_mul(block_size)
        .filter(|area| *area > 0 && depth % area == 0)
        .ok_or_else(|| ExportError::TensorData {
            message: format!("depth {depth} does not split into {block_size}x{block_size} blocks"),
        })?;
    let channels = depth / block_area;

    let expanded: Tensor<B, 6> =
        input.reshape([batch, height, width, block_size, block_size, channels]);
    Ok(expanded.permute([0, 1, 3, 2, 4, 5]).reshape([
        batch,
        height * block_size,
        width * block_size,
        channels,
    ]))
}
