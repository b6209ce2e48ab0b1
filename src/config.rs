//! Command-line arguments of the two binaries.
//!
//! # Usage
//!
//! ```bash
//! inspect_bundle
//! inspect_bundle --export-dir ./savedmodel --tags train,serve
//! export_srgan
//! export_srgan --archive checkpoint/g_srgan.npz --output-graph frozen_model.pb
//! ```
//!
//! With no flags both binaries use the standard paths and names.

use std::path::PathBuf;

use clap::Parser;

use crate::export::ExportConfig;
use crate::saved_model::tag_constants::{SERVING, TRAINING};

/// Load a saved model bundle and print every operation of its graph
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "inspect_bundle")]
#[command(version)]
pub struct InspectArgs {
    /// Bundle directory
    #[arg(short, long, default_value = "savedmodel")]
    pub export_dir: PathBuf,

    /// Tag set of the meta graph to load
    #[arg(short, long, value_delimiter = ',', default_values_t = [TRAINING.to_string(), SERVING.to_string()])]
    pub tags: Vec<String>,

    /// Print each operation's type next to its name
    #[arg(long)]
    pub with_types: bool,
}

/// Export the SRGAN generator and freeze it into a single graph file
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "export_srgan")]
#[command(version)]
pub struct ExportArgs {
    /// Generator weights archive
    #[arg(short, long, default_value = "checkpoint/g_srgan.npz")]
    pub archive: PathBuf,

    /// Directory for the checkpoint and text graph
    #[arg(short, long, default_value = "meta")]
    pub meta_dir: PathBuf,

    /// File stem of the checkpoint and text graph
    #[arg(short = 'n', long, default_value = "srgan")]
    pub model_name: String,

    /// Frozen graph destination (bincode-encoded, whatever the extension)
    #[arg(short, long, default_value = "../frozen_model.pb")]
    pub output_graph: PathBuf,

    /// Also write a saved model bundle to this directory
    #[arg(long)]
    pub saved_model_dir: Option<PathBuf>,

    /// Keep device placements in the frozen graph
    #[arg(long)]
    pub keep_devices: bool,

    /// Only write the checkpoint and text graph
    #[arg(long)]
    pub skip_freeze: bool,
}

impl ExportArgs {
    /// Applies the flags on top of the default export configuration.
    pub fn to_config(&self) -> ExportConfig {
        let config = ExportConfig::default()
            .with_archive(&self.archive)
            .with_meta_dir(&self.meta_dir)
            .with_model_name(&self.model_name)
            .with_output_graph(&self.output_graph)
            .with_clear_devices(!self.keep_devices);
        match &self.saved_model_dir {
            Some(dir) => config.with_saved_model_dir(dir),
            None => config,
        }
    }
}
