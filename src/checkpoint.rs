//! Variable checkpoints.
//!
//! A checkpoint is addressed by a prefix (`meta/srgan`) and stored as one
//! SafeTensors file next to it (`meta/srgan.safetensors`). The `Saver` adds
//! the ops that write and read it to a graph, so saving and restoring are
//! ordinary graph runs.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use safetensors::SafeTensors;
use safetensors::tensor::{Dtype, TensorView};
use serde::{Deserialize, Serialize};

use crate::errors::{ExportError, Result};
use crate::graph::{AttrValue, GraphBuilder, OpType, TensorValue};
use crate::session::{Session, Value};

/// File extension appended to a checkpoint prefix.
pub const CHECKPOINT_EXTENSION: &str = "safetensors";

/// Returns the file a checkpoint prefix resolves to.
pub fn checkpoint_path(prefix: impl AsRef<Path>) -> PathBuf {
    let prefix = prefix.as_ref();
    let mut file: OsString = prefix.as_os_str().to_owned();
    file.push(".");
    file.push(CHECKPOINT_EXTENSION);
    PathBuf::from(file)
}

/// Returns true if a checkpoint exists for the prefix.
pub fn checkpoint_exists(prefix: impl AsRef<Path>) -> bool {
    checkpoint_path(prefix).is_file()
}

/// Writes named tensors to `<prefix>.safetensors`, creating parent directories.
pub fn write_checkpoint(
    prefix: impl AsRef<Path>,
    tensors: &[(String, TensorValue)],
) -> Result<PathBuf> {
    let path = checkpoint_path(prefix);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))?;
    }

    let views = tensors
        .iter()
        .map(|(name, value)| {
            let bytes: &[u8] = bytemuck::cast_slice(value.values());
            TensorView::new(Dtype::F32, value.shape().to_vec(), bytes)
                .map(|view| (name.as_str(), view))
                .map_err(|e| ExportError::CheckpointError {
                    message: format!("tensor {name}: {e}"),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = HashMap::new();
    metadata.insert("format".to_string(), "graphfreeze-checkpoint".to_string());
    metadata.insert("tensors".to_string(), tensors.len().to_string());

    let bytes = safetensors::serialize(views, Some(metadata)).map_err(|e| {
        ExportError::CheckpointError {
            message: format!("SafeTensors serialization failed: {e}"),
        }
    })?;
    fs::write(&path, bytes).map_err(|e| ExportError::io(&path, e))?;

    log::debug!("Wrote {} tensors to {}", tensors.len(), path.display());
    Ok(path)
}

/// Tensors read back from a checkpoint file.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    tensors: BTreeMap<String, TensorValue>,
}

impl Checkpoint {
    pub fn get(&self, name: &str) -> Option<&TensorValue> {
        self.tensors.get(name)
    }

    /// Returns the tensor or a `TensorNotFound` error.
    pub fn require(&self, name: &str) -> Result<&TensorValue> {
        self.get(name).ok_or_else(|| ExportError::TensorNotFound {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Reads `<prefix>.safetensors`.
pub fn read_checkpoint(prefix: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = checkpoint_path(prefix);
    if !path.is_file() {
        return Err(ExportError::CheckpointNotFound { path });
    }
    let data = fs::read(&path).map_err(|e| ExportError::io(&path, e))?;
    let parsed = SafeTensors::deserialize(&data).map_err(|e| ExportError::CheckpointError {
        message: format!("SafeTensors parsing failed for {}: {e}", path.display()),
    })?;

    let mut tensors = BTreeMap::new();
    for (name, view) in parsed.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(ExportError::CheckpointError {
                message: format!("tensor {name} has dtype {:?}, expected F32", view.dtype()),
            });
        }
        // Read byte-wise, the buffer carries no alignment guarantee.
        let values = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        tensors.insert(name, TensorValue::new(view.shape().to_vec(), values)?);
    }
    Ok(Checkpoint { tensors })
}

/// Names of the tensors and ops a saver added to a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaverDef {
    /// Tensor fed with the checkpoint prefix.
    pub filename_tensor_name: String,
    /// Op that writes the checkpoint.
    pub save_tensor_name: String,
    /// Op that restores every variable from the checkpoint.
    pub restore_op_name: String,
}

impl SaverDef {
    /// Feeds `prefix` and runs the restore op.
    pub fn restore<B: Backend>(&self, session: &mut Session<B>, prefix: impl AsRef<Path>) -> Result<()> {
        let prefix = prefix.as_ref();
        if !checkpoint_exists(prefix) {
            return Err(ExportError::CheckpointNotFound {
                path: checkpoint_path(prefix),
            });
        }
        let feed = Value::Text(prefix.to_string_lossy().into_owned());
        session.run_target(&[(&self.filename_tensor_name, feed)], &self.restore_op_name)
    }

    /// Feeds `prefix` and runs the save op.
    pub fn save<B: Backend>(&self, session: &mut Session<B>, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        let prefix = prefix.as_ref();
        let feed = Value::Text(prefix.to_string_lossy().into_owned());
        session.run_target(&[(&self.filename_tensor_name, feed)], &self.save_tensor_name)?;
        Ok(checkpoint_path(prefix))
    }
}

/// Adds save and restore ops for a set of variables to a graph.
#[derive(Debug, Clone)]
pub struct Saver {
    def: SaverDef,
    variables: Vec<String>,
}

impl Saver {
    /// Builds a saver over every global variable created so far.
    pub fn build(builder: &mut GraphBuilder) -> Result<Self> {
        let variables = builder.global_variables().to_vec();
        Self::build_for(builder, variables)
    }

    /// Builds a saver over the given variables, under the `save` scope.
    pub fn build_for(builder: &mut GraphBuilder, variables: Vec<String>) -> Result<Self> {
        let def = builder.with_scope("save", |b| {
            let filename = b.constant("Const", AttrValue::Str("model".to_string()))?;

            let save_names = b.with_scope("SaveV2", |b| {
                b.constant("tensor_names", AttrValue::Strs(variables.clone()))
            })?;
            let mut save_inputs = vec![filename.clone(), save_names];
            save_inputs.extend(variables.iter().cloned());
            let save = b.op(OpType::SaveV2, "SaveV2", save_inputs, vec![])?;
            let control = b.op(
                OpType::Identity,
                "control_dependency",
                vec![filename.clone(), format!("^{save}")],
                vec![],
            )?;

            let restore_names = b.with_scope("RestoreV2", |b| {
                b.constant("tensor_names", AttrValue::Strs(variables.clone()))
            })?;
            let restore = b.op(
                OpType::RestoreV2,
                "RestoreV2",
                vec![filename.clone(), restore_names],
                vec![],
            )?;

            let mut assigns = Vec::with_capacity(variables.len());
            for (i, variable) in variables.iter().enumerate() {
                let assign = b.op(
                    OpType::Assign,
                    "Assign",
                    vec![variable.clone(), format!("{restore}:{i}")],
                    vec![("validate_shape", AttrValue::Bool(true))],
                )?;
                assigns.push(assign);
            }
            let restore_all = b.group("restore_all", &assigns)?;

            Ok(SaverDef {
                filename_tensor_name: format!("{filename}:0"),
                save_tensor_name: control,
                restore_op_name: restore_all,
            })
        })?;

        Ok(Self { def, variables })
    }

    pub fn saver_def(&self) -> &SaverDef {
        &self.def
    }

    /// Variables covered by this saver.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Writes the current variable values to `<prefix>.safetensors`.
    pub fn save<B: Backend>(&self, session: &mut Session<B>, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        self.def.save(session, prefix)
    }

    /// Restores every covered variable from `<prefix>.safetensors`.
    pub fn restore<B: Backend>(&self, session: &mut Session<B>, prefix: impl AsRef<Path>) -> Result<()> {
        self.def.restore(session, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Initializer;
    use burn::backend::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        <TestBackend as Backend>::Device::default()
    }

    #[test]
    fn test_checkpoint_path_appends_extension() {
        assert_eq!(
            checkpoint_path("meta/srgan"),
            PathBuf::from("meta/srgan.safetensors")
        );
    }

    #[test]
    fn test_write_then_read_checkpoint() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("nested/model");
        let tensors = vec![
            (
                "layer/W".to_string(),
                TensorValue::new(vec![2, 2], vec![1.0, -2.0, 3.5, 0.25]).unwrap(),
            ),
            ("layer/b".to_string(), TensorValue::zeros(vec![2])),
        ];

        let path = write_checkpoint(&prefix, &tensors).unwrap();
        assert!(path.is_file());

        let ckpt = read_checkpoint(&prefix).unwrap();
        assert_eq!(ckpt.len(), 2);
        assert_eq!(ckpt.require("layer/W").unwrap(), &tensors[0].1);
        assert!(matches!(
            ckpt.require("layer/missing"),
            Err(ExportError::TensorNotFound { .. })
        ));
    }

    #[test]
    fn test_read_missing_checkpoint() {
        let dir = tempdir().unwrap();
        let result = read_checkpoint(dir.path().join("absent"));
        assert!(matches!(result, Err(ExportError::CheckpointNotFound { .. })));
    }

    #[test]
    fn test_saver_op_names() {
        let mut builder = GraphBuilder::new();
        builder
            .variable("a", vec![1], Initializer::Constant(1.0), true)
            .unwrap();
        builder
            .variable("b", vec![1], Initializer::Constant(2.0), true)
            .unwrap();
        let saver = Saver::build(&mut builder).unwrap();

        let def = saver.saver_def();
        assert_eq!(def.filename_tensor_name, "save/Const:0");
        assert_eq!(def.restore_op_name, "save/restore_all");
        assert_eq!(def.save_tensor_name, "save/control_dependency");

        let graph = builder.graph();
        assert!(graph.contains("save/Assign"));
        assert!(graph.contains("save/Assign_1"));
        assert_eq!(graph.require("save/restore_all").unwrap().op, OpType::NoOp);
    }

    #[test]
    fn test_save_and_restore_through_graph() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("ckpt/model");

        let mut builder = GraphBuilder::new();
        builder
            .variable("w", vec![3], Initializer::Constant(7.0), true)
            .unwrap();
        let saver = Saver::build(&mut builder).unwrap();
        let graph = builder.finish();

        let mut session = Session::<TestBackend>::new(graph.clone(), device());
        session.initialize_global_variables().unwrap();
        saver.save(&mut session, &prefix).unwrap();

        let mut restored = Session::<TestBackend>::new(graph, device());
        assert!(restored.variable("w").is_none());
        saver.restore(&mut restored, &prefix).unwrap();
        assert_eq!(restored.variable("w").unwrap().values(), &[7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_restore_missing_checkpoint_fails() {
        let dir = tempdir().unwrap();
        let mut builder = GraphBuilder::new();
        builder
            .variable("w", vec![1], Initializer::Constant(0.0), true)
            .unwrap();
        let saver = Saver::build(&mut builder).unwrap();
        let mut session = Session::<TestBackend>::new(builder.finish(), device());

        let result = saver.restore(&mut session, dir.path().join("nothing"));
        assert!(matches!(result, Err(ExportError::CheckpointNotFound { .. })));
    }
}
