//! Graph execution.
//!
//! A `Session` owns a `GraphDef` and the current value of every variable in
//! it. Running a node evaluates its inputs recursively, memoising results for
//! the duration of one `run` call.
//!
//! # Example
//!
//! ```
//! use graphfreeze::graph::{GraphBuilder, Initializer, TensorValue};
//! use graphfreeze::session::{Session, Value};
//! use burn::backend::NdArray;
//! use burn::tensor::backend::Backend;
//!
//! let device = <NdArray as Backend>::Device::default();
//!
//! let mut builder = GraphBuilder::new();
//! let x = builder.placeholder("x", vec![None, None, None, Some(2)]).unwrap();
//! let b = builder.variable("b", vec![2], Initializer::Constant(1.0), true).unwrap();
//! let y = builder.bias_add(&x, &b).unwrap();
//!
//! let mut session = Session::<NdArray>::new(builder.finish(), device);
//! session.initialize_global_variables().unwrap();
//!
//! let input = TensorValue::zeros(vec![1, 1, 1, 2]);
//! let output = session.run_host(&[("x", Value::Host(input))], &y).unwrap();
//! assert_eq!(output.values(), &[1.0, 1.0]);
//! ```

mod kernels;

use std::collections::HashMap;
use std::path::PathBuf;

use burn::tensor::{Distribution, Tensor, backend::Backend};

use crate::checkpoint;
use crate::errors::{ExportError, Result};
use crate::graph::{AttrValue, GraphDef, InputRef, Initializer, NodeDef, OpType, TensorValue};
use crate::layers::Activation;

pub use kernels::{Padding, batch_norm, bias_add, conv2d, depth_to_space};

/// A value flowing along a graph edge.
#[derive(Debug, Clone)]
pub enum Value<B: Backend> {
    /// NHWC activation on the session device.
    Tensor(Tensor<B, 4>),
    /// Host tensor of any rank (parameters, constants).
    Host(TensorValue),
    /// Scalar string (checkpoint filenames).
    Text(String),
    /// List of strings (checkpoint tensor names).
    TextList(Vec<String>),
    /// Several outputs of one node, addressed with `node:k`.
    Multi(Vec<TensorValue>),
    /// Ops that only have side effects.
    Unit,
}

impl<B: Backend> Value<B> {
    fn kind(&self) -> &'static str {
        match self {
            Value::Tensor(_) => "device tensor",
            Value::Host(_) => "host tensor",
            Value::Text(_) => "string",
            Value::TextList(_) => "string list",
            Value::Multi(_) => "multiple outputs",
            Value::Unit => "no value",
        }
    }

    /// Returns the value as a rank-4 device tensor.
    pub fn into_tensor(self, node: &str, device: &B::Device) -> Result<Tensor<B, 4>> {
        match self {
            Value::Tensor(t) => Ok(t),
            Value::Host(v) => v.to_tensor(device),
            other => Err(unexpected(node, "rank-4 tensor", other.kind())),
        }
    }

    /// Returns the value as a rank-1 device tensor.
    pub fn into_vector(self, node: &str, device: &B::Device) -> Result<Tensor<B, 1>> {
        match self {
            Value::Host(v) => v.to_tensor(device),
            other => Err(unexpected(node, "rank-1 tensor", other.kind())),
        }
    }

    /// Returns the value as a host tensor, downloading device tensors.
    pub fn into_host(self, node: &str) -> Result<TensorValue> {
        match self {
            Value::Host(v) => Ok(v),
            Value::Tensor(t) => TensorValue::from_tensor(t),
            other => Err(unexpected(node, "tensor", other.kind())),
        }
    }

    fn into_text(self, node: &str) -> Result<String> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(unexpected(node, "string", other.kind())),
        }
    }

    fn into_text_list(self, node: &str) -> Result<Vec<String>> {
        match self {
            Value::TextList(s) => Ok(s),
            other => Err(unexpected(node, "string list", other.kind())),
        }
    }
}

fn unexpected(node: &str, expected: &str, actual: &str) -> ExportError {
    ExportError::InvalidInput {
        node: node.to_string(),
        message: format!("expected {expected}, got {actual}"),
    }
}

/// Executes a graph against a set of variable values.
#[derive(Debug)]
pub struct Session<B: Backend> {
    graph: GraphDef,
    variables: HashMap<String, TensorValue>,
    device: B::Device,
}

impl<B: Backend> Session<B> {
    /// Creates a session bound to `graph`. No variable is initialized.
    pub fn new(graph: GraphDef, device: B::Device) -> Self {
        Self {
            graph,
            variables: HashMap::new(),
            device,
        }
    }

    pub fn graph(&self) -> &GraphDef {
        &self.graph
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Returns the current value of a variable, if initialized.
    pub fn variable(&self, name: &str) -> Option<&TensorValue> {
        self.variables.get(name)
    }

    /// Returns the number of initialized variables.
    pub fn initialized_count(&self) -> usize {
        self.variables.len()
    }

    /// Gives every variable in the graph a value drawn from its initializer.
    pub fn initialize_global_variables(&mut self) -> Result<()> {
        let mut initialized = HashMap::new();
        for node in self.graph.variables() {
            let shape = node.variable_shape()?;
            let value = match node.attr_initializer("initializer")? {
                Initializer::Constant(v) => TensorValue::filled(shape, v),
                Initializer::RandomNormal { mean, stddev } => {
                    let count = shape.iter().product::<usize>();
                    let sample = Tensor::<B, 1>::random(
                        [count],
                        Distribution::Normal(mean as f64, stddev as f64),
                        &self.device,
                    );
                    let values = TensorValue::from_tensor(sample)?.into_values();
                    TensorValue::new(shape, values)?
                }
            };
            initialized.insert(node.name.clone(), value);
        }
        log::debug!("Initialized {} variables", initialized.len());
        self.variables.extend(initialized);
        Ok(())
    }

    /// Overwrites a variable, checking the value against the declared shape.
    pub fn assign(&mut self, name: &str, value: TensorValue) -> Result<()> {
        let node = self.graph.require(name)?;
        if !node.op.is_variable() {
            return Err(ExportError::InvalidInput {
                node: name.to_string(),
                message: format!("cannot assign to a {} node", node.op),
            });
        }
        let shape = node.variable_shape()?;
        if shape != value.shape() {
            return Err(ExportError::ShapeMismatch {
                name: name.to_string(),
                expected: shape.into_iter().map(Some).collect(),
                actual: value.shape().to_vec(),
            });
        }
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    /// Evaluates `fetch` (a node or `node:k` tensor name).
    ///
    /// Any node may be fed, not only placeholders.
    pub fn run(&mut self, feeds: &[(&str, Value<B>)], fetch: &str) -> Result<Value<B>> {
        let mut run = Run {
            feeds: feeds
                .iter()
                .map(|(name, value)| (crate::graph::node_name(name).to_string(), value.clone()))
                .collect(),
            memo: HashMap::new(),
        };
        let input = InputRef::parse(fetch);
        let value = self.evaluate(&mut run, input.node)?;
        select_output(value, input.node, input.index)
    }

    /// Evaluates `fetch` and returns it as a device tensor.
    pub fn run_tensor(&mut self, feeds: &[(&str, Value<B>)], fetch: &str) -> Result<Tensor<B, 4>> {
        let device = self.device.clone();
        self.run(feeds, fetch)?.into_tensor(fetch, &device)
    }

    /// Evaluates `fetch` and returns it as a host tensor.
    pub fn run_host(&mut self, feeds: &[(&str, Value<B>)], fetch: &str) -> Result<TensorValue> {
        self.run(feeds, fetch)?.into_host(fetch)
    }

    /// Runs `target` for its side effects only.
    pub fn run_target(&mut self, feeds: &[(&str, Value<B>)], target: &str) -> Result<()> {
        self.run(feeds, target).map(|_| ())
    }

    fn evaluate(&mut self, run: &mut Run<B>, name: &str) -> Result<Value<B>> {
        if let Some(value) = run.feeds.get(name) {
            let node = self.graph.require(name)?;
            if node.op == OpType::Placeholder {
                check_placeholder_shape(node, value)?;
            }
            return Ok(value.clone());
        }
        if let Some(value) = run.memo.get(name) {
            return Ok(value.clone());
        }

        let node = self.graph.require(name)?;
        let op = node.op;
        let controls: Vec<String> = node.control_inputs().map(|i| i.node.to_string()).collect();
        let data: Vec<(String, usize)> = node
            .data_inputs()
            .map(|i| (i.node.to_string(), i.index))
            .collect();

        for control in &controls {
            self.evaluate(run, control)?;
        }

        let mut inputs = Vec::with_capacity(data.len());
        for (position, (producer, index)) in data.iter().enumerate() {
            if op == OpType::Assign && position == 0 {
                // ref input: the variable may not hold a value yet
                inputs.push(Value::Unit);
                continue;
            }
            let value = self.evaluate(run, producer)?;
            inputs.push(select_output(value, producer, *index)?);
        }

        let value = self.compute(self.graph.require(name)?, inputs)?;
        if let (OpType::Assign, Some((target, _))) = (op, data.first()) {
            let assigned = value.clone().into_host(name)?;
            self.assign(target, assigned)?;
        }

        run.memo.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn compute(&self, node: &NodeDef, inputs: Vec<Value<B>>) -> Result<Value<B>> {
        let name = node.name.as_str();
        let mut inputs = inputs.into_iter();
        let mut next = || {
            inputs.next().ok_or_else(|| ExportError::InvalidInput {
                node: name.to_string(),
                message: format!("{} is missing an input", node.op),
            })
        };

        match node.op {
            OpType::Placeholder => Err(ExportError::MissingFeed {
                name: name.to_string(),
            }),
            OpType::VariableV2 => self
                .variables
                .get(name)
                .cloned()
                .map(Value::Host)
                .ok_or_else(|| ExportError::UninitializedVariable {
                    name: name.to_string(),
                }),
            OpType::Const => match node.attr("value")? {
                AttrValue::Tensor(t) => Ok(Value::Host(t.clone())),
                AttrValue::Str(s) => Ok(Value::Text(s.clone())),
                AttrValue::Strs(s) => Ok(Value::TextList(s.clone())),
                AttrValue::Float(f) => Ok(Value::Host(TensorValue::scalar(*f))),
                _ => Err(ExportError::InvalidAttr {
                    node: name.to_string(),
                    attr: "value".to_string(),
                    expected: "tensor, string, or string list",
                }),
            },
            OpType::Identity => next(),
            OpType::Conv2D => {
                let x = next()?.into_tensor(name, &self.device)?;
                let kernel = next()?.into_tensor(name, &self.device)?;
                let strides = node.attr_ints("strides")?;
                if strides.len() != 4 {
                    return Err(ExportError::InvalidInput {
                        node: name.to_string(),
                        message: format!("strides must have 4 entries, got {strides:?}"),
                    });
                }
                let padding = Padding::parse(name, node.attr_str("padding")?)?;
                let strides = [
                    positive_attr(name, "strides", strides[1])?,
                    positive_attr(name, "strides", strides[2])?,
                ];
                check_channels(name, x.dims()[3], kernel.dims()[2])?;
                check_kernel_fits(name, padding, x.dims(), kernel.dims())?;
                Ok(Value::Tensor(conv2d(x, kernel, strides, padding)))
            }
            OpType::BiasAdd => {
                let x = next()?.into_tensor(name, &self.device)?;
                let bias = next()?.into_vector(name, &self.device)?;
                check_channels(name, x.dims()[3], bias.dims()[0])?;
                Ok(Value::Tensor(bias_add(x, bias)))
            }
            OpType::FusedBatchNorm => {
                let x = next()?.into_tensor(name, &self.device)?;
                let scale = next()?.into_vector(name, &self.device)?;
                let offset = next()?.into_vector(name, &self.device)?;
                let mean = next()?.into_vector(name, &self.device)?;
                let variance = next()?.into_vector(name, &self.device)?;
                let channels = x.dims()[3];
                for param in [&scale, &offset, &mean, &variance] {
                    check_channels(name, channels, param.dims()[0])?;
                }
                let epsilon = node.attr_float("epsilon")?;
                let is_training = match node.attr_bool("is_training") {
                    Ok(flag) => flag,
                    Err(ExportError::MissingAttr { .. }) => false,
                    Err(e) => return Err(e),
                };
                Ok(Value::Tensor(batch_norm(
                    x,
                    scale,
                    offset,
                    mean,
                    variance,
                    epsilon,
                    is_training,
                )))
            }
            OpType::Relu => {
                let x = next()?.into_tensor(name, &self.device)?;
                Ok(Value::Tensor(Activation::Relu.apply(x)))
            }
            OpType::Tanh => {
                let x = next()?.into_tensor(name, &self.device)?;
                Ok(Value::Tensor(Activation::Tanh.apply(x)))
            }
            OpType::Add => {
                let a = next()?.into_tensor(name, &self.device)?;
                let b = next()?.into_tensor(name, &self.device)?;
                if a.dims() != b.dims() {
                    return Err(ExportError::InvalidInput {
                        node: name.to_string(),
                        message: format!("cannot add {:?} and {:?}", a.dims(), b.dims()),
                    });
                }
                Ok(Value::Tensor(a + b))
            }
            OpType::DepthToSpace => {
                let x = next()?.into_tensor(name, &self.device)?;
                let block_size = positive_attr(name, "block_size", node.attr_int("block_size")?)?;
                Ok(Value::Tensor(depth_to_space(x, block_size)?))
            }
            OpType::Assign => {
                next()?;
                let value = next()?.into_host(name)?;
                Ok(Value::Host(value))
            }
            OpType::SaveV2 => {
                let prefix = next()?.into_text(name)?;
                let names = next()?.into_text_list(name)?;
                let mut tensors = Vec::with_capacity(names.len());
                for tensor_name in names {
                    let value = next()?.into_host(name)?;
                    tensors.push((tensor_name, value));
                }
                checkpoint::write_checkpoint(&prefix, &tensors)?;
                Ok(Value::Unit)
            }
            OpType::RestoreV2 => {
                let prefix = next()?.into_text(name)?;
                let names = next()?.into_text_list(name)?;
                let ckpt = checkpoint::read_checkpoint(PathBuf::from(prefix))?;
                let values = names
                    .iter()
                    .map(|n| ckpt.require(n).cloned())
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Multi(values))
            }
            OpType::NoOp => Ok(Value::Unit),
        }
    }
}

struct Run<B: Backend> {
    feeds: HashMap<String, Value<B>>,
    memo: HashMap<String, Value<B>>,
}

fn select_output<B: Backend>(value: Value<B>, node: &str, index: usize) -> Result<Value<B>> {
    match value {
        Value::Multi(mut values) => {
            if index >= values.len() {
                return Err(ExportError::InvalidInput {
                    node: node.to_string(),
                    message: format!("output {index} requested, node has {}", values.len()),
                });
            }
            Ok(Value::Host(values.swap_remove(index)))
        }
        other if index == 0 => Ok(other),
        _ => Err(ExportError::InvalidInput {
            node: node.to_string(),
            message: format!("output {index} requested on a single-output node"),
        }),
    }
}

fn check_channels(node: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(ExportError::InvalidInput {
            node: node.to_string(),
            message: format!("input has {actual} channels, parameters expect {expected}"),
        });
    }
    Ok(())
}

/// Converts an integer attribute that must be at least 1.
fn positive_attr(node: &str, attr: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ExportError::InvalidInput {
            node: node.to_string(),
            message: format!("{attr} must be positive, got {value}"),
        })
}

fn check_kernel_fits(
    node: &str,
    padding: Padding,
    input: [usize; 4],
    kernel: [usize; 4],
) -> Result<()> {
    if padding == Padding::Valid && (kernel[0] > input[1] || kernel[1] > input[2]) {
        return Err(ExportError::InvalidInput {
            node: node.to_string(),
            message: format!(
                "{}x{} kernel does not fit a {}x{} input with VALID padding",
                kernel[0], kernel[1], input[1], input[2]
            ),
        });
    }
    Ok(())
}

fn check_placeholder_shape<B: Backend>(node: &NodeDef, value: &Value<B>) -> Result<()> {
    let Ok(expected) = node.attr_shape("shape") else {
        return Ok(());
    };
    let actual: Vec<usize> = match value {
        Value::Tensor(t) => t.dims().to_vec(),
        Value::Host(v) => v.shape().to_vec(),
        _ => return Ok(()),
    };
    let matches = expected.len() == actual.len()
        && expected
            .iter()
            .zip(&actual)
            .all(|(e, a)| e.is_none_or(|e| e == *a));
    if !matches {
        return Err(ExportError::ShapeMismatch {
            name: node.name.clone(),
            expected: expected.to_vec(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        <TestBackend as Backend>::Device::default()
    }

    fn bias_graph() -> (GraphDef, String) {
        let mut builder = GraphBuilder::new();
        let x = builder
            .placeholder("x", vec![None, None, None, Some(2)])
            .unwrap();
        let b = builder
            .variable("b", vec![2], Initializer::Constant(0.5), true)
            .unwrap();
        let y = builder.bias_add(&x, &b).unwrap();
        let out = builder.relu(&y).unwrap();
        (builder.finish(), out)
    }

    #[test]
    fn test_run_requires_feed() {
        let (graph, out) = bias_graph();
        let mut session = Session::<TestBackend>::new(graph, device());
        session.initialize_global_variables().unwrap();

        let result = session.run(&[], &out);
        assert!(matches!(result, Err(ExportError::MissingFeed { .. })));
    }

    #[test]
    fn test_run_uninitialized_variable() {
        let (graph, out) = bias_graph();
        let mut session = Session::<TestBackend>::new(graph, device());
        let input = TensorValue::zeros(vec![1, 1, 1, 2]);

        let result = session.run(&[("x", Value::Host(input))], &out);
        assert!(matches!(
            result,
            Err(ExportError::UninitializedVariable { .. })
        ));
    }

    #[test]
    fn test_run_bias_relu() {
        let (graph, out) = bias_graph();
        let mut session = Session::<TestBackend>::new(graph, device());
        session.initialize_global_variables().unwrap();

        let input = TensorValue::new(vec![1, 1, 1, 2], vec![-2.0, 1.0]).unwrap();
        let output = session
            .run_host(&[("x:0", Value::Host(input))], &out)
            .unwrap();
        assert_eq!(output.values(), &[0.0, 1.5]);
    }

    #[test]
    fn test_placeholder_shape_checked() {
        let (graph, out) = bias_graph();
        let mut session = Session::<TestBackend>::new(graph, device());
        session.initialize_global_variables().unwrap();

        let input = TensorValue::zeros(vec![1, 1, 1, 3]);
        let result = session.run(&[("x", Value::Host(input))], &out);
        assert!(matches!(result, Err(ExportError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_assign_checks_shape() {
        let (graph, _) = bias_graph();
        let mut session = Session::<TestBackend>::new(graph, device());

        assert!(session.assign("b", TensorValue::zeros(vec![2])).is_ok());
        assert!(matches!(
            session.assign("b", TensorValue::zeros(vec![3])),
            Err(ExportError::ShapeMismatch { .. })
        ));
        assert!(session.assign("x", TensorValue::zeros(vec![2])).is_err());
    }

    #[test]
    fn test_random_normal_initializer_shape() {
        let mut builder = GraphBuilder::new();
        builder
            .variable(
                "w",
                vec![3, 3, 2, 4],
                Initializer::RandomNormal {
                    mean: 0.0,
                    stddev: 0.02,
                },
                true,
            )
            .unwrap();
        let mut session = Session::<TestBackend>::new(builder.finish(), device());
        session.initialize_global_variables().unwrap();

        let value = session.variable("w").unwrap();
        assert_eq!(value.shape(), &[3, 3, 2, 4]);
        assert!(value.values().iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_feeding_non_placeholder_overrides_it() {
        let (graph, out) = bias_graph();
        let mut session = Session::<TestBackend>::new(graph, device());
        session.initialize_global_variables().unwrap();

        let input = TensorValue::zeros(vec![1, 1, 1, 2]);
        let bias = TensorValue::new(vec![2], vec![3.0, -3.0]).unwrap();
        let output = session
            .run_host(
                &[("x", Value::Host(input)), ("b/read", Value::Host(bias))],
                &out,
            )
            .unwrap();
        assert_eq!(output.values(), &[3.0, 0.0]);
    }

    fn constant(name: &str, shape: Vec<usize>, values: Vec<f32>) -> NodeDef {
        let value = TensorValue::new(shape, values).unwrap();
        NodeDef::new(name, OpType::Const).with_attr("value", AttrValue::Tensor(value))
    }

    /// `x -> Conv2D` with an all-ones 3x3 kernel.
    fn conv_session(strides: Vec<i64>, padding: &str) -> Session<TestBackend> {
        let graph = GraphDef::from_nodes(vec![
            NodeDef::new("x", OpType::Placeholder),
            constant("w", vec![3, 3, 1, 1], vec![1.0; 9]),
            NodeDef::new("conv", OpType::Conv2D)
                .with_inputs(["x", "w"])
                .with_attr("strides", AttrValue::Ints(strides))
                .with_attr("padding", AttrValue::Str(padding.to_string())),
        ])
        .unwrap();
        Session::new(graph, device())
    }

    fn image(height: usize, width: usize, channels: usize) -> Value<TestBackend> {
        Value::Host(TensorValue::zeros(vec![1, height, width, channels]))
    }

    #[test]
    fn test_conv_rejects_zero_stride() {
        let mut session = conv_session(vec![1, 0, 0, 1], "SAME");
        let result = session.run(&[("x", image(4, 4, 1))], "conv");
        assert!(matches!(result, Err(ExportError::InvalidInput { .. })));
    }

    #[test]
    fn test_conv_rejects_negative_stride() {
        let mut session = conv_session(vec![1, -2, 1, 1], "SAME");
        let result = session.run(&[("x", image(4, 4, 1))], "conv");
        assert!(matches!(result, Err(ExportError::InvalidInput { .. })));
    }

    #[test]
    fn test_conv_valid_kernel_must_fit_input() {
        let mut session = conv_session(vec![1, 1, 1, 1], "VALID");
        let result = session.run(&[("x", image(2, 2, 1))], "conv");
        assert!(matches!(result, Err(ExportError::InvalidInput { .. })));

        let mut session = conv_session(vec![1, 1, 1, 1], "SAME");
        let output = session.run_host(&[("x", image(2, 2, 1))], "conv").unwrap();
        assert_eq!(output.shape(), &[1, 2, 2, 1]);
    }

    #[test]
    fn test_depth_to_space_rejects_bad_block_size() {
        for block_size in [-1, 0] {
            let graph = GraphDef::from_nodes(vec![
                NodeDef::new("x", OpType::Placeholder),
                NodeDef::new("d2s", OpType::DepthToSpace)
                    .with_inputs(["x"])
                    .with_attr("block_size", AttrValue::Int(block_size)),
            ])
            .unwrap();
            let mut session = Session::<TestBackend>::new(graph, device());
            let result = session.run(&[("x", image(1, 1, 4))], "d2s");
            assert!(matches!(result, Err(ExportError::InvalidInput { .. })));
        }
    }

    /// `x -> FusedBatchNorm` over two channels; `offset` may have another length.
    fn batch_norm_graph(offset_len: usize, is_training: Option<AttrValue>) -> GraphDef {
        let mut norm = NodeDef::new("bn", OpType::FusedBatchNorm)
            .with_inputs(["x", "scale", "offset", "mean", "variance"])
            .with_attr("epsilon", AttrValue::Float(0.0));
        if let Some(flag) = is_training {
            norm = norm.with_attr("is_training", flag);
        }
        GraphDef::from_nodes(vec![
            NodeDef::new("x", OpType::Placeholder),
            constant("scale", vec![2], vec![2.0, 1.0]),
            constant("offset", vec![offset_len], vec![0.5; offset_len]),
            constant("mean", vec![2], vec![1.0, 0.0]),
            constant("variance", vec![2], vec![4.0, 1.0]),
            norm,
        ])
        .unwrap()
    }

    #[test]
    fn test_batch_norm_checks_every_parameter_length() {
        let graph = batch_norm_graph(3, Some(AttrValue::Bool(false)));
        let mut session = Session::<TestBackend>::new(graph, device());
        let result = session.run(&[("x", image(1, 1, 2))], "bn");
        assert!(matches!(result, Err(ExportError::InvalidInput { .. })));
    }

    #[test]
    fn test_batch_norm_rejects_mistyped_training_flag() {
        let graph = batch_norm_graph(2, Some(AttrValue::Str("false".to_string())));
        let mut session = Session::<TestBackend>::new(graph, device());
        let result = session.run(&[("x", image(1, 1, 2))], "bn");
        assert!(matches!(result, Err(ExportError::InvalidAttr { .. })));
    }

    #[test]
    fn test_batch_norm_defaults_to_inference() {
        let graph = batch_norm_graph(2, None);
        let mut session = Session::<TestBackend>::new(graph, device());
        let input = TensorValue::new(vec![1, 1, 1, 2], vec![3.0, 2.0]).unwrap();
        let output = session
            .run_host(&[("x", Value::Host(input))], "bn")
            .unwrap();
        // (3 - 1) / 2 * 2 + 0.5 = 2.5, (2 - 0) / 1 * 1 + 0.5 = 2.5
        for v in output.values() {
            assert!((v - 2.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_select_output_out_of_range() {
        let value: Value<TestBackend> = Value::Multi(vec![TensorValue::scalar(1.0)]);
        let result = select_output(value, "restore", 2);
        assert!(result.is_err());
    }
}
