//! End-to-end export of the SRGAN generator.
//!
//! Builds the generator graph, loads trained weights from a `.npz` archive,
//! writes a checkpoint and a text graph, and optionally freezes both into a
//! single binary graph.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;

use crate::archive::WeightArchive;
use crate::checkpoint::{Saver, SaverDef};
use crate::errors::Result;
use crate::freeze::{self, DEFAULT_FILENAME_TENSOR, DEFAULT_RESTORE_OP, FreezeConfig};
use crate::graph::GraphBuilder;
use crate::models::srgan::{self, SrganConfig, srgan_generator};
use crate::saved_model::SavedModelBuilder;
use crate::saved_model::tag_constants::{SERVING, TRAINING};
use crate::session::Session;

/// Paths and names used by an export.
///
/// `Default` reproduces the standard layout: weights in
/// `checkpoint/g_srgan.npz`, checkpoint and text graph under `meta/`, and
/// the frozen graph at `../frozen_model.pb`. The name is kept
/// for existing consumers; the contents are bincode.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub archive: PathBuf,
    pub meta_dir: PathBuf,
    /// File stem of the checkpoint and text graph.
    pub model_name: String,
    pub output_graph: PathBuf,
    pub input_name: String,
    pub output_node: String,
    pub restore_op_name: String,
    pub filename_tensor_name: String,
    pub clear_devices: bool,
    /// Also write a saved model bundle here.
    pub saved_model_dir: Option<PathBuf>,
    pub generator: SrganConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from("checkpoint/g_srgan.npz"),
            meta_dir: PathBuf::from("meta"),
            model_name: "srgan".to_string(),
            output_graph: PathBuf::from("../frozen_model.pb"),
            input_name: srgan::INPUT_NAME.to_string(),
            output_node: srgan::OUTPUT_NAME.to_string(),
            restore_op_name: DEFAULT_RESTORE_OP.to_string(),
            filename_tensor_name: DEFAULT_FILENAME_TENSOR.to_string(),
            clear_devices: true,
            saved_model_dir: None,
            generator: SrganConfig::default(),
        }
    }
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive = path.into();
        self
    }

    pub fn with_meta_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.meta_dir = path.into();
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_output_graph(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_graph = path.into();
        self
    }

    pub fn with_clear_devices(mut self, clear_devices: bool) -> Self {
        self.clear_devices = clear_devices;
        self
    }

    pub fn with_saved_model_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.saved_model_dir = Some(path.into());
        self
    }

    pub fn with_generator(mut self, generator: SrganConfig) -> Self {
        self.generator = generator;
        self
    }

    /// Checkpoint prefix, `meta/srgan` by default.
    pub fn checkpoint_prefix(&self) -> PathBuf {
        self.meta_dir.join(&self.model_name)
    }

    /// Text graph path, `meta/srgan.graph.json` by default.
    pub fn graph_path(&self) -> PathBuf {
        self.meta_dir.join(format!("{}.graph.json", self.model_name))
    }

    /// Freeze parameters matching this export.
    pub fn freeze_config(&self) -> FreezeConfig {
        FreezeConfig::new(
            self.graph_path(),
            self.checkpoint_prefix(),
            &self.output_graph,
            &self.output_node,
        )
        .with_restore_op(self.restore_op_name.clone())
        .with_filename_tensor(self.filename_tensor_name.clone())
        .with_clear_devices(self.clear_devices)
    }
}

/// Files produced by an export.
#[derive(Debug, Clone)]
pub struct ExportArtifacts {
    pub checkpoint: PathBuf,
    pub graph: PathBuf,
    pub frozen_graph: Option<PathBuf>,
    pub saved_model: Option<PathBuf>,
    pub saver_def: SaverDef,
    /// Number of generator variables restored from the archive.
    pub parameters: usize,
}

/// Builds the generator, restores its weights, and writes the checkpoint
/// and text graph (plus a saved model bundle when configured).
///
/// The archive and the bundle directory are checked before anything is
/// written.
pub fn export_model<B: Backend>(config: &ExportConfig, device: &B::Device) -> Result<ExportArtifacts> {
    let archive = WeightArchive::open(&config.archive)?;
    let bundle = config
        .saved_model_dir
        .as_ref()
        .map(SavedModelBuilder::new)
        .transpose()?;

    log::info!("Building {} topology", srgan::SCOPE);
    let mut builder = GraphBuilder::new();
    let image = builder.placeholder(
        &config.input_name,
        vec![None, None, None, Some(config.generator.image_channels)],
    )?;
    let generator = srgan_generator(&mut builder, &image, &config.generator, false, false)?;
    let saver = Saver::build(&mut builder)?;
    let graph = builder.finish();

    log::info!("Initializing {} variables", graph.variables().count());
    let mut session = Session::<B>::new(graph, device.clone());
    session.initialize_global_variables()?;

    log::info!("Restoring generator weights from {}", archive.path().display());
    let parameters = archive.assign_to(&mut session, &generator.parameters)?;

    let checkpoint = saver.save(&mut session, config.checkpoint_prefix())?;
    log::info!("Checkpoint written to {}", checkpoint.display());

    let graph_path = config.graph_path();
    session.graph().write(&graph_path, true)?;
    log::info!("Graph written to {}", graph_path.display());

    let saved_model = match bundle {
        Some(mut bundle) => {
            bundle.add_meta_graph_and_variables(
                &mut session,
                &[TRAINING, SERVING],
                saver.saver_def(),
            )?;
            Some(bundle.save()?)
        }
        None => None,
    };

    Ok(ExportArtifacts {
        checkpoint,
        graph: graph_path,
        frozen_graph: None,
        saved_model,
        saver_def: saver.saver_def().clone(),
        parameters,
    })
}

/// Runs [`export_model`] and freezes the result into `output_graph`.
pub fn export_and_freeze<B: Backend>(
    config: &ExportConfig,
    device: &B::Device,
) -> Result<ExportArtifacts> {
    let mut artifacts = export_model::<B>(config, device)?;

    log::info!("Freezing graph to {}", config.output_graph.display());
    let frozen = freeze::freeze_graph::<B>(&config.freeze_config(), device)?;
    freeze::verify_frozen(&frozen, &config.input_name, &config.output_node)?;

    artifacts.frozen_graph = Some(config.output_graph.clone());
    Ok(artifacts)
}

/// Returns true if every file of `artifacts` exists and is non-empty.
pub fn artifacts_complete(artifacts: &ExportArtifacts) -> bool {
    let non_empty = |path: &Path| path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    non_empty(&artifacts.checkpoint)
        && non_empty(&artifacts.graph)
        && artifacts.frozen_graph.as_deref().is_none_or(non_empty)
}
