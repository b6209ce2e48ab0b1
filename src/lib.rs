//! # graphfreeze
//!
//! Build inference graphs, restore trained weights into them, and freeze the
//! result into a single portable file.
//!
//! The crate ships two tools:
//!
//! - **inspect_bundle** loads a saved model bundle by tag set and lists every
//!   operation of its graph.
//! - **export_srgan** builds the SRGAN generator, loads its weights from a
//!   `.npz` archive, writes a checkpoint plus a text graph, and freezes both
//!   into one binary graph.
//!
//! ## Features
//!
//! - **Burn Backend**: tensor math runs on any Burn backend. `NdArray` is the
//!   default; the `wgpu` feature switches the [`Backend`] alias to WGPU.
//! - **Portable artifacts**: graphs encode as JSON text or compact bincode,
//!   checkpoints as SafeTensors.
//!
//! ## Example
//!
//! ```
//! use graphfreeze::prelude::*;
//! use burn::backend::NdArray;
//!
//! type Backend = NdArray;
//!
//! let device = <Backend as burn::tensor::backend::Backend>::Device::default();
//!
//! // A tiny generator: 4 filters, 1 residual block, one 2x upsampling stage
//! let config = SrganConfig {
//!     filters: 4,
//!     residual_blocks: 1,
//!     upsample_filters: 8,
//!     upsample_stages: 1,
//!     ..SrganConfig::default()
//! };
//!
//! let mut builder = GraphBuilder::new();
//! let image = builder.placeholder("input_image", vec![None, None, None, Some(3)]).unwrap();
//! let generator = srgan_generator(&mut builder, &image, &config, false, false).unwrap();
//!
//! let mut session = Session::<Backend>::new(builder.finish(), device);
//! session.initialize_global_variables().unwrap();
//!
//! let input = TensorValue::zeros(vec![1, 4, 4, 3]);
//! let output = session
//!     .run_host(&[("input_image", Value::Host(input))], &generator.output)
//!     .unwrap();
//! assert_eq!(output.shape(), &[1, 8, 8, 3]);
//! ```

pub mod archive;
pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod export;
pub mod freeze;
pub mod graph;
pub mod inspect;
pub mod layers;
pub mod models;
pub mod preprocess;
pub mod saved_model;
pub mod session;

// Re-exports for convenience
pub use errors::{ExportError, Result};
pub use export::{ExportConfig, export_and_freeze, export_model};
pub use freeze::{FreezeConfig, FrozenModel, freeze_graph};
pub use graph::{GraphBuilder, GraphDef};
pub use session::Session;

/// Default backend for the binaries.
#[cfg(not(feature = "wgpu"))]
pub type Backend = burn::backend::NdArray;

/// Default backend for the binaries.
#[cfg(feature = "wgpu")]
pub type Backend = burn::backend::Wgpu;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::Backend;
    pub use crate::checkpoint::{Saver, SaverDef};
    pub use crate::errors::{ExportError, Result};
    pub use crate::export::{ExportArtifacts, ExportConfig, export_and_freeze, export_model};
    pub use crate::freeze::{FreezeConfig, FrozenModel, freeze_graph, verify_frozen};
    pub use crate::graph::{GraphBuilder, GraphDef, Initializer, OpType, TensorValue};
    pub use crate::inspect::{OperationSummary, inspect_bundle, list_operations};
    pub use crate::layers::Activation;
    pub use crate::models::{SrganConfig, srgan_generator};
    pub use crate::saved_model::{SavedModelBuilder, SavedModelBundle};
    pub use crate::session::{Session, Value};
}
