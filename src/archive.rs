//! Trained weights stored as a numpy `.npz` archive.
//!
//! Arrays are matched to graph variables by name, with or without the `:0`
//! output suffix. Archives written with positional names (`arr_0`,
//! `arr_1`, ...) are matched by order instead.

use std::fs::File;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use ndarray::{ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::NpzReader;

use crate::errors::{ExportError, Result};
use crate::graph::TensorValue;
use crate::session::Session;

/// All f32 arrays of one archive, in file order.
#[derive(Debug, Clone)]
pub struct WeightArchive {
    path: PathBuf,
    arrays: Vec<(String, TensorValue)>,
}

impl WeightArchive {
    /// Reads every array of the archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ExportError::io(path, e))?;
        let archive_error = |message: String| ExportError::ArchiveError {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = NpzReader::new(file).map_err(|e| archive_error(e.to_string()))?;
        let names = reader.names().map_err(|e| archive_error(e.to_string()))?;

        let mut arrays = Vec::with_capacity(names.len());
        for name in names {
            let array: ArrayD<f32> = reader
                .by_name::<OwnedRepr<f32>, IxDyn>(&name)
                .map_err(|e| archive_error(format!("array {name}: {e}")))?;
            let shape = array.shape().to_vec();
            let values = array.iter().copied().collect();
            let key = name.strip_suffix(".npy").unwrap_or(&name).to_string();
            arrays.push((key, TensorValue::new(shape, values)?));
        }

        log::debug!("Read {} arrays from {}", arrays.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            arrays,
        })
    }

    /// Wraps arrays that are already in memory.
    pub fn from_arrays(path: impl Into<PathBuf>, arrays: Vec<(String, TensorValue)>) -> Self {
        Self {
            path: path.into(),
            arrays,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.iter().map(|(name, _)| name.as_str())
    }

    /// Looks up the array for a variable, as `name` or `name:0`.
    pub fn get(&self, variable: &str) -> Option<&TensorValue> {
        let tensor_name = format!("{variable}:0");
        self.arrays
            .iter()
            .find(|(name, _)| name == variable || *name == tensor_name)
            .map(|(_, value)| value)
    }

    /// Returns positional arrays sorted by index, if every key is `arr_<i>`.
    fn positional(&self) -> Option<Vec<&TensorValue>> {
        let mut indexed = self
            .arrays
            .iter()
            .map(|(name, value)| {
                name.strip_prefix("arr_")
                    .and_then(|i| i.parse::<usize>().ok())
                    .map(|i| (i, value))
            })
            .collect::<Option<Vec<_>>>()?;
        indexed.sort_by_key(|(i, _)| *i);
        Some(indexed.into_iter().map(|(_, value)| value).collect())
    }

    /// Pairs each parameter with its array.
    pub fn resolve(&self, parameters: &[String]) -> Result<Vec<(String, TensorValue)>> {
        let any_named = parameters.iter().any(|p| self.get(p).is_some());
        if !any_named && !self.is_empty() {
            if let Some(values) = self.positional() {
                if values.len() != parameters.len() {
                    return Err(ExportError::ArchiveMismatch {
                        expected: parameters.len(),
                        actual: values.len(),
                    });
                }
                return Ok(parameters
                    .iter()
                    .cloned()
                    .zip(values.into_iter().cloned())
                    .collect());
            }
        }

        parameters
            .iter()
            .map(|p| {
                self.get(p)
                    .cloned()
                    .map(|value| (p.clone(), value))
                    .ok_or_else(|| ExportError::MissingParameter { name: p.clone() })
            })
            .collect()
    }

    /// Overwrites `parameters` in the session with the archive's arrays.
    ///
    /// Every shape is checked before any variable is written.
    pub fn assign_to<B: Backend>(
        &self,
        session: &mut Session<B>,
        parameters: &[String],
    ) -> Result<usize> {
        let resolved = self.resolve(parameters)?;
        for (name, value) in &resolved {
            let expected = session.graph().require(name)?.variable_shape()?;
            if expected != value.shape() {
                return Err(ExportError::ShapeMismatch {
                    name: name.clone(),
                    expected: expected.into_iter().map(Some).collect(),
                    actual: value.shape().to_vec(),
                });
            }
        }

        let count = resolved.len();
        for (name, value) in resolved {
            log::debug!("Assigning {name} {:?}", value.shape());
            session.assign(&name, value)?;
        }
        Ok(count)
    }
}
