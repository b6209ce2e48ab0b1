//! Saved model bundles.
//!
//! A bundle is a directory with a `saved_model.json` manifest and a
//! `variables/` checkpoint:
//!
//! ```text
//! export_dir/
//!   saved_model.json
//!   variables/
//!     variables.safetensors
//! ```
//!
//! The manifest holds one or more meta graphs. Each has a tag set, such as
//! `["train", "serve"]`, that a loader must request exactly.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{self, SaverDef};
use crate::errors::{ExportError, Result};
use crate::graph::GraphDef;
use crate::session::Session;

/// Standard meta graph tags.
pub mod tag_constants {
    /// Graph used for training.
    pub const TRAINING: &str = "train";
    /// Graph used for serving.
    pub const SERVING: &str = "serve";
}

pub const SAVED_MODEL_FILENAME: &str = "saved_model.json";
pub const SAVED_MODEL_SCHEMA_VERSION: u32 = 1;
pub const VARIABLES_DIRECTORY: &str = "variables";
pub const VARIABLES_FILENAME: &str = "variables";

/// Checkpoint prefix of a bundle's variables.
pub fn variables_prefix(export_dir: impl AsRef<Path>) -> PathBuf {
    export_dir
        .as_ref()
        .join(VARIABLES_DIRECTORY)
        .join(VARIABLES_FILENAME)
}

/// Returns true if `export_dir` holds a bundle manifest.
pub fn is_saved_model(export_dir: impl AsRef<Path>) -> bool {
    export_dir.as_ref().join(SAVED_MODEL_FILENAME).is_file()
}

fn tag_set<S: AsRef<str>>(tags: &[S]) -> BTreeSet<&str> {
    tags.iter().map(|t| t.as_ref()).collect()
}

/// One graph in a bundle and the tags that select it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaGraphDef {
    pub tags: Vec<String>,
    pub graph_def: GraphDef,
    pub saver_def: Option<SaverDef>,
}

impl MetaGraphDef {
    /// True if the tag set equals `tags`, ignoring order and duplicates.
    pub fn matches<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tag_set(&self.tags) == tag_set(tags)
    }
}

/// The bundle manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub schema_version: u32,
    pub meta_graphs: Vec<MetaGraphDef>,
}

impl SavedModel {
    /// Reads the manifest of the bundle at `export_dir`.
    pub fn read(export_dir: impl AsRef<Path>) -> Result<Self> {
        let export_dir = export_dir.as_ref();
        if !is_saved_model(export_dir) {
            return Err(ExportError::SavedModelNotFound {
                path: export_dir.to_path_buf(),
            });
        }
        let path = export_dir.join(SAVED_MODEL_FILENAME);
        let text = fs::read_to_string(&path).map_err(|e| ExportError::io(&path, e))?;
        let model: SavedModel = serde_json::from_str(&text)?;
        if model.schema_version != SAVED_MODEL_SCHEMA_VERSION {
            return Err(ExportError::InvalidGraph(format!(
                "unsupported saved model schema {}",
                model.schema_version
            )));
        }
        Ok(model)
    }

    /// Finds the meta graph whose tag set equals `tags`.
    pub fn meta_graph<S: AsRef<str>>(&self, tags: &[S]) -> Result<&MetaGraphDef> {
        self.meta_graphs
            .iter()
            .find(|m| m.matches(tags))
            .ok_or_else(|| ExportError::TagsNotFound {
                tags: tags.iter().map(|t| t.as_ref().to_string()).collect(),
                available: self.meta_graphs.iter().map(|m| m.tags.clone()).collect(),
            })
    }
}

/// Writes a bundle: variables first, then the manifest on `save`.
#[derive(Debug)]
pub struct SavedModelBuilder {
    export_dir: PathBuf,
    meta_graphs: Vec<MetaGraphDef>,
    has_saved_variables: bool,
}

impl SavedModelBuilder {
    /// Fails if `export_dir` already exists with content.
    pub fn new(export_dir: impl Into<PathBuf>) -> Result<Self> {
        let export_dir = export_dir.into();
        if export_dir.exists() {
            let mut entries =
                fs::read_dir(&export_dir).map_err(|e| ExportError::io(&export_dir, e))?;
            if entries.next().is_some() {
                return Err(ExportError::ExportDirExists { path: export_dir });
            }
        }
        Ok(Self {
            export_dir,
            meta_graphs: Vec::new(),
            has_saved_variables: false,
        })
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Saves the session's variables and records its graph under `tags`.
    pub fn add_meta_graph_and_variables<B: Backend>(
        &mut self,
        session: &mut Session<B>,
        tags: &[&str],
        saver_def: &SaverDef,
    ) -> Result<&mut Self> {
        if self.has_saved_variables {
            return Err(ExportError::InvalidGraph(
                "variables were already saved to this bundle".to_string(),
            ));
        }
        self.check_tags(tags)?;
        let path = saver_def.save(session, variables_prefix(&self.export_dir))?;
        log::info!("SavedModel variables written to {}", path.display());

        self.has_saved_variables = true;
        self.push(tags, session.graph().clone(), Some(saver_def.clone()));
        Ok(self)
    }

    /// Records an additional graph sharing the saved variables.
    pub fn add_meta_graph(
        &mut self,
        graph: GraphDef,
        tags: &[&str],
        saver_def: Option<SaverDef>,
    ) -> Result<&mut Self> {
        if !self.has_saved_variables {
            return Err(ExportError::InvalidGraph(
                "add_meta_graph_and_variables must be called first".to_string(),
            ));
        }
        self.check_tags(tags)?;
        self.push(tags, graph, saver_def);
        Ok(self)
    }

    fn check_tags(&self, tags: &[&str]) -> Result<()> {
        if self.meta_graphs.iter().any(|m| m.matches(tags)) {
            return Err(ExportError::InvalidGraph(format!(
                "a meta graph with tags {tags:?} was already added"
            )));
        }
        Ok(())
    }

    fn push(&mut self, tags: &[&str], graph_def: GraphDef, saver_def: Option<SaverDef>) {
        self.meta_graphs.push(MetaGraphDef {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            graph_def,
            saver_def,
        });
    }

    /// Writes the manifest and returns its path.
    pub fn save(self) -> Result<PathBuf> {
        fs::create_dir_all(&self.export_dir).map_err(|e| ExportError::io(&self.export_dir, e))?;
        let model = SavedModel {
            schema_version: SAVED_MODEL_SCHEMA_VERSION,
            meta_graphs: self.meta_graphs,
        };
        let path = self.export_dir.join(SAVED_MODEL_FILENAME);
        let text = serde_json::to_string_pretty(&model)?;
        fs::write(&path, text).map_err(|e| ExportError::io(&path, e))?;
        log::info!("SavedModel written to: {}", path.display());
        Ok(path)
    }
}

/// A bundle loaded into a session with its variables restored.
#[derive(Debug)]
pub struct SavedModelBundle<B: Backend> {
    meta_graph: MetaGraphDef,
    session: Session<B>,
}

impl<B: Backend> SavedModelBundle<B> {
    /// Loads the meta graph tagged exactly `tags` and restores its variables.
    pub fn load<S: AsRef<str>>(
        export_dir: impl AsRef<Path>,
        tags: &[S],
        device: &B::Device,
    ) -> Result<Self> {
        let export_dir = export_dir.as_ref();
        let model = SavedModel::read(export_dir)?;
        let meta_graph = model.meta_graph(tags)?.clone();

        let mut session = Session::new(meta_graph.graph_def.clone(), device.clone());
        let prefix = variables_prefix(export_dir);
        match &meta_graph.saver_def {
            Some(saver_def) if checkpoint::checkpoint_exists(&prefix) => {
                saver_def.restore(&mut session, &prefix)?;
                log::info!(
                    "Restored {} variables from {}",
                    session.initialized_count(),
                    export_dir.display()
                );
            }
            Some(_) => log::warn!(
                "No variables found in {}, graph loaded without restoring",
                export_dir.display()
            ),
            None => log::debug!("Meta graph has no saver, nothing to restore"),
        }

        Ok(Self {
            meta_graph,
            session,
        })
    }

    pub fn meta_graph(&self) -> &MetaGraphDef {
        &self.meta_graph
    }

    pub fn graph(&self) -> &GraphDef {
        self.session.graph()
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<B> {
        &mut self.session
    }

    pub fn into_session(self) -> Session<B> {
        self.session
    }
}
