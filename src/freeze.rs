//! Freezing: folding checkpointed variable values into a graph.
//!
//! The input graph still refers to variables and to the saver ops that load
//! them. Freezing restores a checkpoint into a session, keeps only the
//! nodes the requested outputs depend on, and turns each variable into a
//! `Const` holding its restored value. The result is self-contained and is
//! written in the binary graph encoding.

use std::path::{Path, PathBuf};

use burn::tensor::{Tensor, backend::Backend};

use crate::checkpoint::{self, SaverDef};
use crate::errors::{ExportError, Result};
use crate::graph::{AttrValue, GraphDef, NodeDef, OpType, TensorValue, node_name};
use crate::models::srgan;
use crate::preprocess::{postprocess_tensor, preprocess_tensor};
use crate::session::{Session, Value};

/// Default restore op created by `Saver`.
pub const DEFAULT_RESTORE_OP: &str = "save/restore_all";

/// Default filename tensor created by `Saver`.
pub const DEFAULT_FILENAME_TENSOR: &str = "save/Const:0";

/// Parameters of [`freeze_graph`].
#[derive(Debug, Clone)]
pub struct FreezeConfig {
    /// Graph with variables and saver ops.
    pub input_graph: PathBuf,
    /// Whether `input_graph` uses the binary encoding instead of text.
    pub input_binary: bool,
    /// Checkpoint prefix holding the variable values.
    pub input_checkpoint: PathBuf,
    /// Nodes the frozen graph must compute.
    pub output_node_names: Vec<String>,
    pub restore_op_name: String,
    pub filename_tensor_name: String,
    pub output_graph: PathBuf,
    /// Strip device placements before restoring.
    pub clear_devices: bool,
    /// Nodes run after the restore, such as table initializers.
    pub initializer_nodes: Vec<String>,
    /// When set, only these variables are converted.
    pub variable_names_whitelist: Option<Vec<String>>,
    /// Variables that are never converted.
    pub variable_names_blacklist: Vec<String>,
}

impl FreezeConfig {
    /// Creates a config for a text input graph with the default saver names.
    pub fn new(
        input_graph: impl Into<PathBuf>,
        input_checkpoint: impl Into<PathBuf>,
        output_graph: impl Into<PathBuf>,
        output_node_names: &str,
    ) -> Self {
        Self {
            input_graph: input_graph.into(),
            input_binary: false,
            input_checkpoint: input_checkpoint.into(),
            output_node_names: parse_node_names(output_node_names),
            restore_op_name: DEFAULT_RESTORE_OP.to_string(),
            filename_tensor_name: DEFAULT_FILENAME_TENSOR.to_string(),
            output_graph: output_graph.into(),
            clear_devices: true,
            initializer_nodes: Vec::new(),
            variable_names_whitelist: None,
            variable_names_blacklist: Vec::new(),
        }
    }

    pub fn with_input_binary(mut self, input_binary: bool) -> Self {
        self.input_binary = input_binary;
        self
    }

    /// Uses the op and tensor names of an existing saver.
    pub fn with_saver_def(mut self, saver_def: &SaverDef) -> Self {
        self.restore_op_name = saver_def.restore_op_name.clone();
        self.filename_tensor_name = saver_def.filename_tensor_name.clone();
        self
    }

    pub fn with_restore_op(mut self, name: impl Into<String>) -> Self {
        self.restore_op_name = name.into();
        self
    }

    pub fn with_filename_tensor(mut self, name: impl Into<String>) -> Self {
        self.filename_tensor_name = name.into();
        self
    }

    pub fn with_clear_devices(mut self, clear_devices: bool) -> Self {
        self.clear_devices = clear_devices;
        self
    }

    /// Sets initializer nodes from a comma separated list.
    pub fn with_initializer_nodes(mut self, names: &str) -> Self {
        self.initializer_nodes = parse_node_names(names);
        self
    }

    pub fn with_whitelist(mut self, names: &str) -> Self {
        self.variable_names_whitelist = Some(parse_node_names(names));
        self
    }

    pub fn with_blacklist(mut self, names: &str) -> Self {
        self.variable_names_blacklist = parse_node_names(names);
        self
    }
}

/// Splits a comma separated node list, ignoring blanks.
pub fn parse_node_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect()
}

/// Restores `input_checkpoint` into `input_graph` and writes the frozen
/// graph to `output_graph`.
pub fn freeze_graph<B: Backend>(config: &FreezeConfig, device: &B::Device) -> Result<GraphDef> {
    if !checkpoint::checkpoint_exists(&config.input_checkpoint) {
        return Err(ExportError::CheckpointNotFound {
            path: checkpoint::checkpoint_path(&config.input_checkpoint),
        });
    }
    if config.output_node_names.is_empty() {
        return Err(ExportError::InvalidGraph(
            "at least one output node is required".to_string(),
        ));
    }

    let mut graph = GraphDef::read(&config.input_graph, config.input_binary)?;
    graph.require(&config.restore_op_name)?;
    graph.require(node_name(&config.filename_tensor_name))?;
    for output in &config.output_node_names {
        graph.require(node_name(output))?;
    }
    if config.clear_devices {
        graph.clear_devices();
    }

    let mut session = Session::<B>::new(graph, device.clone());
    let saver_def = SaverDef {
        filename_tensor_name: config.filename_tensor_name.clone(),
        save_tensor_name: String::new(),
        restore_op_name: config.restore_op_name.clone(),
    };
    saver_def.restore(&mut session, &config.input_checkpoint)?;
    for node in &config.initializer_nodes {
        session.run_target(&[], node)?;
    }
    log::info!(
        "Restored {} variables from {}",
        session.initialized_count(),
        checkpoint::checkpoint_path(&config.input_checkpoint).display()
    );

    let outputs: Vec<&str> = config.output_node_names.iter().map(String::as_str).collect();
    let frozen = convert_variables_to_constants(
        &session,
        &outputs,
        config.variable_names_whitelist.as_deref(),
        &config.variable_names_blacklist,
    )?;

    frozen.write(&config.output_graph, false)?;
    log::info!(
        "{} ops written to {}",
        frozen.len(),
        config.output_graph.display()
    );
    Ok(frozen)
}

/// Returns the subgraph for `outputs` with variables replaced by constants.
///
/// A variable is converted when it is in `whitelist` (or no whitelist is
/// given) and not in `blacklist`.
pub fn convert_variables_to_constants<B: Backend>(
    session: &Session<B>,
    outputs: &[&str],
    whitelist: Option<&[String]>,
    blacklist: &[String],
) -> Result<GraphDef> {
    let subgraph = session.graph().extract_subgraph(outputs)?;
    let allowed = |name: &str| {
        whitelist.is_none_or(|w| w.iter().any(|n| n == name))
            && !blacklist.iter().any(|n| n == name)
    };

    let mut converted = 0;
    let mut nodes = Vec::with_capacity(subgraph.len());
    for node in subgraph.nodes() {
        if node.op.is_variable() && allowed(&node.name) {
            let value = session.variable(&node.name).cloned().ok_or_else(|| {
                ExportError::UninitializedVariable {
                    name: node.name.clone(),
                }
            })?;
            let mut constant = NodeDef::new(node.name.clone(), OpType::Const)
                .with_attr("dtype", AttrValue::Str("float32".to_string()))
                .with_attr("value", AttrValue::Tensor(value));
            constant.device = node.device.clone();
            nodes.push(constant);
            converted += 1;
        } else {
            nodes.push(node.clone());
        }
    }

    log::info!("Converted {converted} variables to const ops.");
    GraphDef::from_nodes(nodes)
}

/// Checks that `output` exists, depends on `input`, and that no variables
/// are left in the graph.
pub fn verify_frozen(graph: &GraphDef, input: &str, output: &str) -> Result<()> {
    let input = node_name(input);
    let output = node_name(output);
    graph.require(input)?;
    graph.require(output)?;
    if !graph.depends_on(output, input) {
        return Err(ExportError::InvalidGraph(format!(
            "{output} does not depend on {input}"
        )));
    }
    check_no_variables(graph)
}

fn check_no_variables(graph: &GraphDef) -> Result<()> {
    let mut variables = graph.variables();
    if let Some(first) = variables.next() {
        return Err(ExportError::UnfrozenGraph {
            count: 1 + variables.count(),
            first: first.name.clone(),
        });
    }
    Ok(())
}

/// A frozen graph loaded for inference.
#[derive(Debug)]
pub struct FrozenModel<B: Backend> {
    session: Session<B>,
}

impl<B: Backend> FrozenModel<B> {
    /// Loads a binary frozen graph. Graphs that still hold variables are
    /// rejected.
    pub fn load(path: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let graph = GraphDef::read(path, true)?;
        Self::from_graph(graph, device)
    }

    pub fn from_graph(graph: GraphDef, device: &B::Device) -> Result<Self> {
        check_no_variables(&graph)?;
        Ok(Self {
            session: Session::new(graph, device.clone()),
        })
    }

    pub fn graph(&self) -> &GraphDef {
        self.session.graph()
    }

    /// Feeds `tensor` to `input` and evaluates `output`.
    pub fn run(&mut self, input: &str, output: &str, tensor: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self.session.run_tensor(&[(input, Value::Tensor(tensor))], output)
    }

    /// Host-tensor form of [`FrozenModel::run`].
    pub fn run_host(&mut self, input: &str, output: &str, tensor: TensorValue) -> Result<TensorValue> {
        self.session.run_host(&[(input, Value::Host(tensor))], output)
    }

    /// Upscales an NHWC image with pixel values in [0, 255].
    ///
    /// Uses the generator's default input and output names; the result is
    /// clamped back to [0, 255].
    pub fn enhance(&mut self, image: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let output = self.run(
            srgan::INPUT_NAME,
            srgan::OUTPUT_NAME,
            preprocess_tensor(image),
        )?;
        Ok(postprocess_tensor(output).clamp(0.0, 255.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Saver;
    use crate::graph::{GraphBuilder, Initializer};
    use burn::backend::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        <TestBackend as Backend>::Device::default()
    }

    /// x -> BiasAdd(b) -> Relu, with a second unused variable and a saver.
    fn graph_with_saver() -> (GraphBuilder, Saver, String) {
        let mut builder = GraphBuilder::new();
        let x = builder
            .placeholder("x", vec![None, None, None, Some(2)])
            .unwrap();
        let b = builder
            .variable("b", vec![2], Initializer::Constant(0.0), true)
            .unwrap();
        builder
            .variable("unused", vec![1], Initializer::Constant(0.0), true)
            .unwrap();
        let y = builder.bias_add(&x, &b).unwrap();
        let out = builder.relu(&y).unwrap();
        let saver = Saver::build(&mut builder).unwrap();
        (builder, saver, out)
    }

    fn export(dir: &Path) -> (FreezeConfig, String) {
        let (builder, saver, out) = graph_with_saver();
        let graph = builder.finish();
        let mut session = Session::<TestBackend>::new(graph.clone(), device());
        session.initialize_global_variables().unwrap();
        session
            .assign("b", TensorValue::new(vec![2], vec![1.0, -1.0]).unwrap())
            .unwrap();

        let prefix = dir.join("meta/model");
        saver.save(&mut session, &prefix).unwrap();
        let graph_path = dir.join("meta/model.graph.json");
        graph.write(&graph_path, true).unwrap();

        let config = FreezeConfig::new(graph_path, prefix, dir.join("frozen.bin"), &out)
            .with_saver_def(saver.saver_def());
        (config, out)
    }

    #[test]
    fn test_parse_node_names() {
        assert_eq!(parse_node_names("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_node_names("").is_empty());
    }

    #[test]
    fn test_freeze_graph_replaces_variables() {
        let dir = tempdir().unwrap();
        let (config, out) = export(dir.path());

        let frozen = freeze_graph::<TestBackend>(&config, &device()).unwrap();
        assert!(config.output_graph.is_file());
        assert_eq!(frozen.variables().count(), 0);
        assert!(!frozen.contains("unused"));
        assert!(frozen.nodes().iter().all(|n| !n.name.starts_with("save/")));
        assert_eq!(frozen.require("b").unwrap().op, OpType::Const);
        verify_frozen(&frozen, "x", &out).unwrap();
    }

    #[test]
    fn test_frozen_model_runs() {
        let dir = tempdir().unwrap();
        let (config, out) = export(dir.path());
        freeze_graph::<TestBackend>(&config, &device()).unwrap();

        let mut model = FrozenModel::<TestBackend>::load(&config.output_graph, &device()).unwrap();
        let input = TensorValue::new(vec![1, 1, 1, 2], vec![0.5, 0.5]).unwrap();
        let output = model.run_host("x", &out, input).unwrap();
        assert_eq!(output.values(), &[1.5, 0.0]);
    }

    #[test]
    fn test_freeze_missing_checkpoint() {
        let dir = tempdir().unwrap();
        let (mut config, _) = export(dir.path());
        config.input_checkpoint = dir.path().join("meta/missing");

        let result = freeze_graph::<TestBackend>(&config, &device());
        assert!(matches!(result, Err(ExportError::CheckpointNotFound { .. })));
        assert!(!config.output_graph.exists());
    }

    #[test]
    fn test_freeze_unknown_restore_op() {
        let dir = tempdir().unwrap();
        let (config, _) = export(dir.path());
        let config = config.with_restore_op("save/nothing");

        let result = freeze_graph::<TestBackend>(&config, &device());
        assert!(matches!(result, Err(ExportError::NodeNotFound { .. })));
    }

    #[test]
    fn test_blacklist_keeps_variable() {
        let dir = tempdir().unwrap();
        let (config, out) = export(dir.path());
        let config = config.with_blacklist("b");

        let frozen = freeze_graph::<TestBackend>(&config, &device()).unwrap();
        assert_eq!(frozen.require("b").unwrap().op, OpType::VariableV2);
        assert!(matches!(
            verify_frozen(&frozen, "x", &out),
            Err(ExportError::UnfrozenGraph { count: 1, .. })
        ));
        assert!(FrozenModel::<TestBackend>::load(&config.output_graph, &device()).is_err());
    }

    #[test]
    fn test_whitelist_limits_conversion() {
        let dir = tempdir().unwrap();
        let (config, _) = export(dir.path());
        let config = config.with_whitelist("other");

        let frozen = freeze_graph::<TestBackend>(&config, &device()).unwrap();
        assert_eq!(frozen.variables().count(), 1);
    }

    #[test]
    fn test_freeze_binary_graph_with_initializers() {
        let dir = tempdir().unwrap();
        let (config, out) = export(dir.path());
        let binary_path = dir.path().join("meta/model.graph.bin");
        GraphDef::read(&config.input_graph, false)
            .unwrap()
            .write(&binary_path, false)
            .unwrap();

        let mut config = config
            .with_input_binary(true)
            .with_initializer_nodes("b/read");
        config.input_graph = binary_path;
        let frozen = freeze_graph::<TestBackend>(&config, &device()).unwrap();
        verify_frozen(&frozen, "x", &out).unwrap();

        let config = config.with_initializer_nodes("b/read, init_all_tables");
        let result = freeze_graph::<TestBackend>(&config, &device());
        assert!(matches!(result, Err(ExportError::NodeNotFound { .. })));
    }

    #[test]
    fn test_verify_frozen_requires_dependency() {
        let graph = GraphDef::from_nodes(vec![
            NodeDef::new("x", OpType::Placeholder),
            NodeDef::new("c", OpType::Const).with_attr("value", AttrValue::Float(1.0)),
            NodeDef::new("out", OpType::Identity).with_inputs(["c"]),
        ])
        .unwrap();
        assert!(matches!(
            verify_frozen(&graph, "x", "out"),
            Err(ExportError::InvalidGraph(_))
        ));
    }
}
