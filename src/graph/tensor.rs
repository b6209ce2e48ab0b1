//! Host-side tensor values stored in graphs, checkpoints and sessions.

use burn::tensor::{Tensor, TensorData, backend::Backend};
use serde::{Deserialize, Serialize};

use crate::errors::{ExportError, Result};

/// A dense, row-major f32 tensor living outside any backend.
///
/// Used for constants inside a `GraphDef`, variable values held by a
/// `Session`, and tensors read from or written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorValue {
    shape: Vec<usize>,
    values: Vec<f32>,
}

impl TensorValue {
    /// Creates a tensor, checking that the value count matches the shape.
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let expected = num_elements(&shape);
        if expected != values.len() {
            return Err(ExportError::InvalidTensor {
                shape,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { shape, values })
    }

    /// Creates a tensor with every element set to `value`.
    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let values = vec![value; num_elements(&shape)];
        Self { shape, values }
    }

    /// Creates a zero tensor.
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Creates a rank-0 tensor.
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            values: vec![value],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        self.values.len()
    }

    /// Consumes the tensor and returns its flat values.
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    /// Converts backend tensor data into a host tensor.
    pub fn from_data(data: TensorData) -> Result<Self> {
        let shape = data.shape.clone();
        let values: Vec<f32> = data.to_vec().map_err(|e| ExportError::TensorData {
            message: format!("{e:?}"),
        })?;
        Self::new(shape, values)
    }

    /// Converts the host tensor into backend tensor data.
    pub fn to_data(&self) -> TensorData {
        TensorData::new(self.values.clone(), self.shape.clone())
    }

    /// Uploads the tensor to a device with the given static rank.
    pub fn to_tensor<B: Backend, const D: usize>(&self, device: &B::Device) -> Result<Tensor<B, D>> {
        if self.rank() != D {
            return Err(ExportError::TensorData {
                message: format!("expected rank {D}, tensor has shape {:?}", self.shape),
            });
        }
        Ok(Tensor::from_data(self.to_data(), device))
    }

    /// Downloads a backend tensor into a host tensor.
    pub fn from_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Self> {
        Self::from_data(tensor.into_data())
    }
}

/// Product of the dimensions (1 for a scalar).
pub fn num_elements(shape: &[usize]) -> usize {
    shape.iter().product()
}
