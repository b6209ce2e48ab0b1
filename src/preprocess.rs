//! Pixel scaling between [0, 255] and the generator's [-1, 1] range.

use burn::tensor::{Tensor, backend::Backend};

const HALF_RANGE: f32 = 255.0 / 2.0;

/// Maps a pixel value from [0, 255] to [-1, 1].
pub fn preprocess(value: f32) -> f32 {
    value / HALF_RANGE - 1.0
}

/// Maps a generator output from [-1, 1] back to [0, 255].
pub fn postprocess(value: f32) -> f32 {
    (value + 1.0) * HALF_RANGE
}

/// Tensor form of [`preprocess`].
pub fn preprocess_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor / HALF_RANGE - 1.0
}

/// Tensor form of [`postprocess`].
pub fn postprocess_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    (tensor + 1.0) * HALF_RANGE
}
