//! Export-related error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, running, saving, or freezing a graph.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    EncodingError(#[from] bincode::Error),

    #[error("Node already exists in graph: {name}")]
    DuplicateNode { name: String },

    #[error("Node not found in graph: {name}")]
    NodeNotFound { name: String },

    #[error("Node {node} is missing attribute {attr}")]
    MissingAttr { node: String, attr: String },

    #[error("Node {node} has attribute {attr} of the wrong kind, expected {expected}")]
    InvalidAttr {
        node: String,
        attr: String,
        expected: &'static str,
    },

    #[error("Node {node} received an invalid input: {message}")]
    InvalidInput { node: String, message: String },

    #[error("You must feed a value for placeholder {name}")]
    MissingFeed { name: String },

    #[error("Attempting to use uninitialized variable {name}")]
    UninitializedVariable { name: String },

    #[error("Variable {name} already exists, disallowed without reuse")]
    VariableExists { name: String },

    #[error("Variable {name} does not exist, disallowed with reuse")]
    VariableNotFound { name: String },

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<Option<usize>>,
        actual: Vec<usize>,
    },

    #[error("Tensor has {actual} values but shape {shape:?} needs {expected}")]
    InvalidTensor {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Tensor data error: {message}")]
    TensorData { message: String },

    #[error("Archive error in {path}: {message}")]
    ArchiveError { path: PathBuf, message: String },

    #[error("Parameter {name} not found in weights archive")]
    MissingParameter { name: String },

    #[error("Archive holds {actual} arrays but the network has {expected} parameters")]
    ArchiveMismatch { expected: usize, actual: usize },

    #[error("Checkpoint not found: {path}")]
    CheckpointNotFound { path: PathBuf },

    #[error("Checkpoint error: {message}")]
    CheckpointError { message: String },

    #[error("Tensor {name} not found in checkpoint")]
    TensorNotFound { name: String },

    #[error("SavedModel file does not exist at: {path}")]
    SavedModelNotFound { path: PathBuf },

    #[error("MetaGraphDef associated with tags {tags:?} could not be found, available tag-sets: {available:?}")]
    TagsNotFound {
        tags: Vec<String>,
        available: Vec<Vec<String>>,
    },

    #[error("Export directory already exists and is not empty: {path}")]
    ExportDirExists { path: PathBuf },

    #[error("Graph still holds {count} variable(s), first is {first}")]
    UnfrozenGraph { count: usize, first: String },

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),
}

impl ExportError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ExportError>;
