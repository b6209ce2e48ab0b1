//! Incremental graph construction with name scopes and variable collections.

use std::collections::HashMap;

use super::core::GraphDef;
use super::operation::{AttrValue, Initializer, NodeDef, OpType};
use crate::errors::{ExportError, Result};

/// Context for building a `GraphDef` node by node.
///
/// Tracks the active name scope, hands out unique op names inside it, and
/// records which variables were created so savers and weight loaders can
/// find them later.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: GraphDef,
    scopes: Vec<String>,
    reuse: Vec<bool>,
    name_counts: HashMap<String, usize>,
    global_variables: Vec<String>,
    trainable_variables: Vec<String>,
}

impl GraphBuilder {
    /// Creates a builder over an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the graph built so far.
    pub fn graph(&self) -> &GraphDef {
        &self.graph
    }

    /// Consumes the builder and returns the graph.
    pub fn finish(self) -> GraphDef {
        self.graph
    }

    /// Names of all variables, in creation order.
    pub fn global_variables(&self) -> &[String] {
        &self.global_variables
    }

    /// Names of trainable variables, in creation order.
    pub fn trainable_variables(&self) -> &[String] {
        &self.trainable_variables
    }

    /// Current scope prefix, empty at the root.
    pub fn scope(&self) -> String {
        self.scopes.join("/")
    }

    /// Runs `f` inside a nested name scope.
    pub fn with_scope<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let reuse = self.reuse.last().copied().unwrap_or(false);
        self.enter(name, reuse);
        let result = f(self);
        self.exit();
        result
    }

    /// Runs `f` inside a variable scope with an explicit reuse flag.
    ///
    /// Reuse is inherited by nested scopes.
    pub fn with_variable_scope<T>(
        &mut self,
        name: &str,
        reuse: bool,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let inherited = self.reuse.last().copied().unwrap_or(false);
        self.enter(name, reuse || inherited);
        let result = f(self);
        self.exit();
        result
    }

    fn enter(&mut self, name: &str, reuse: bool) {
        self.scopes.push(name.to_string());
        self.reuse.push(reuse);
    }

    fn exit(&mut self) {
        self.scopes.pop();
        self.reuse.pop();
    }

    fn scoped(&self, name: &str) -> String {
        if self.scopes.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.scope(), name)
        }
    }

    /// Returns a unique, fully scoped op name (`Add`, `Add_1`, ...).
    pub fn unique_name(&mut self, base: &str) -> String {
        let full = self.scoped(base);
        let count = self.name_counts.entry(full.clone()).or_insert(0);
        let mut candidate = if *count == 0 {
            full.clone()
        } else {
            format!("{full}_{count}")
        };
        *count += 1;
        while self.graph.contains(&candidate) {
            candidate = format!("{full}_{count}");
            *count += 1;
        }
        candidate
    }

    /// Adds a node with a unique scoped name and returns that name.
    pub fn op(
        &mut self,
        op: OpType,
        base: &str,
        inputs: Vec<String>,
        attrs: Vec<(&str, AttrValue)>,
    ) -> Result<String> {
        let name = self.unique_name(base);
        let mut node = NodeDef::new(name.clone(), op).with_inputs(inputs);
        for (key, value) in attrs {
            node = node.with_attr(key, value);
        }
        self.graph.add_node(node)?;
        Ok(name)
    }

    /// Adds a float placeholder with a partially known shape.
    pub fn placeholder(&mut self, name: &str, shape: Vec<Option<usize>>) -> Result<String> {
        self.op(
            OpType::Placeholder,
            name,
            vec![],
            vec![
                ("dtype", AttrValue::Str("float32".to_string())),
                ("shape", AttrValue::Shape(shape)),
            ],
        )
    }

    /// Gets or creates a variable and returns the name of its `read` tensor.
    ///
    /// Without reuse an existing variable is an error; with reuse a missing
    /// variable is an error.
    pub fn variable(
        &mut self,
        name: &str,
        shape: Vec<usize>,
        initializer: Initializer,
        trainable: bool,
    ) -> Result<String> {
        let full = self.scoped(name);
        let reuse = self.reuse.last().copied().unwrap_or(false);
        let read = format!("{full}/read");

        match (self.graph.contains(&full), reuse) {
            (true, true) => return Ok(read),
            (true, false) => return Err(ExportError::VariableExists { name: full }),
            (false, true) => return Err(ExportError::VariableNotFound { name: full }),
            (false, false) => {}
        }

        let variable = NodeDef::new(full.clone(), OpType::VariableV2)
            .with_attr(
                "shape",
                AttrValue::Shape(shape.into_iter().map(Some).collect()),
            )
            .with_attr("initializer", AttrValue::Initializer(initializer))
            .with_attr("trainable", AttrValue::Bool(trainable));
        self.graph.add_node(variable)?;
        self.graph
            .add_node(NodeDef::new(read.clone(), OpType::Identity).with_inputs([full.clone()]))?;

        self.global_variables.push(full.clone());
        if trainable {
            self.trainable_variables.push(full);
        }
        Ok(read)
    }

    /// Adds a constant node.
    pub fn constant(&mut self, name: &str, value: AttrValue) -> Result<String> {
        self.op(OpType::Const, name, vec![], vec![("value", value)])
    }

    /// Adds an NHWC convolution of `input` with an HWIO `kernel`.
    pub fn conv2d(
        &mut self,
        input: &str,
        kernel: &str,
        strides: (usize, usize),
        padding: &str,
    ) -> Result<String> {
        self.op(
            OpType::Conv2D,
            "Conv2D",
            vec![input.to_string(), kernel.to_string()],
            vec![
                (
                    "strides",
                    AttrValue::Ints(vec![1, strides.0 as i64, strides.1 as i64, 1]),
                ),
                ("padding", AttrValue::Str(padding.to_string())),
                ("data_format", AttrValue::Str("NHWC".to_string())),
            ],
        )
    }

    pub fn bias_add(&mut self, input: &str, bias: &str) -> Result<String> {
        self.op(
            OpType::BiasAdd,
            "BiasAdd",
            vec![input.to_string(), bias.to_string()],
            vec![],
        )
    }

    /// Adds batch normalization with scale, offset, mean and variance inputs.
    pub fn fused_batch_norm(
        &mut self,
        input: &str,
        params: [&str; 4],
        epsilon: f32,
        is_training: bool,
    ) -> Result<String> {
        let mut inputs = vec![input.to_string()];
        inputs.extend(params.iter().map(|p| p.to_string()));
        self.op(
            OpType::FusedBatchNorm,
            "FusedBatchNorm",
            inputs,
            vec![
                ("epsilon", AttrValue::Float(epsilon)),
                ("is_training", AttrValue::Bool(is_training)),
            ],
        )
    }

    pub fn relu(&mut self, input: &str) -> Result<String> {
        self.op(OpType::Relu, "Relu", vec![input.to_string()], vec![])
    }

    pub fn tanh(&mut self, input: &str) -> Result<String> {
        self.op(OpType::Tanh, "Tanh", vec![input.to_string()], vec![])
    }

    pub fn identity(&mut self, name: &str, input: &str) -> Result<String> {
        self.op(OpType::Identity, name, vec![input.to_string()], vec![])
    }

    /// Adds two tensors under the given op name.
    pub fn add(&mut self, name: &str, a: &str, b: &str) -> Result<String> {
        self.op(
            OpType::Add,
            name,
            vec![a.to_string(), b.to_string()],
            vec![],
        )
    }

    pub fn depth_to_space(&mut self, input: &str, block_size: usize) -> Result<String> {
        self.op(
            OpType::DepthToSpace,
            "DepthToSpace",
            vec![input.to_string()],
            vec![("block_size", AttrValue::Int(block_size as i64))],
        )
    }

    /// Adds a `NoOp` that groups the given nodes as control dependencies.
    pub fn group(&mut self, name: &str, dependencies: &[String]) -> Result<String> {
        let inputs = dependencies.iter().map(|d| format!("^{d}")).collect();
        self.op(OpType::NoOp, name, inputs, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_within_scope() {
        let mut builder = GraphBuilder::new();
        let x = builder.placeholder("x", vec![None]).unwrap();
        let (a, b) = builder
            .with_scope("block", |b| {
                let first = b.relu(&x)?;
                let second = b.relu(&first)?;
                Ok((first, second))
            })
            .unwrap();

        assert_eq!(a, "block/Relu");
        assert_eq!(b, "block/Relu_1");
    }

    #[test]
    fn test_nested_scopes() {
        let mut builder = GraphBuilder::new();
        let name = builder
            .with_scope("SRGAN_g", |b| {
                b.with_scope("out", |b| b.op(OpType::NoOp, "Tanh", vec![], vec![]))
            })
            .unwrap();
        assert_eq!(name, "SRGAN_g/out/Tanh");
        assert_eq!(builder.scope(), "");
    }

    #[test]
    fn test_variable_creates_read_identity() {
        let mut builder = GraphBuilder::new();
        let read = builder
            .with_scope("layer", |b| {
                b.variable("W", vec![3, 3], Initializer::Constant(0.0), true)
            })
            .unwrap();

        assert_eq!(read, "layer/W/read");
        let graph = builder.graph();
        assert_eq!(graph.require("layer/W").unwrap().op, OpType::VariableV2);
        assert_eq!(graph.require("layer/W/read").unwrap().op, OpType::Identity);
        assert_eq!(builder.global_variables(), &["layer/W".to_string()]);
        assert_eq!(builder.trainable_variables(), &["layer/W".to_string()]);
    }

    #[test]
    fn test_non_trainable_variable_not_in_trainable_collection() {
        let mut builder = GraphBuilder::new();
        builder
            .variable("moving_mean", vec![4], Initializer::Constant(0.0), false)
            .unwrap();
        assert_eq!(builder.global_variables().len(), 1);
        assert!(builder.trainable_variables().is_empty());
    }

    #[test]
    fn test_variable_without_reuse_fails_when_existing() {
        let mut builder = GraphBuilder::new();
        builder
            .variable("w", vec![1], Initializer::Constant(0.0), true)
            .unwrap();
        let result = builder.variable("w", vec![1], Initializer::Constant(0.0), true);
        assert!(matches!(result, Err(ExportError::VariableExists { .. })));
    }

    #[test]
    fn test_variable_reuse() {
        let mut builder = GraphBuilder::new();
        builder
            .with_variable_scope("net", false, |b| {
                b.variable("w", vec![1], Initializer::Constant(0.0), true)
            })
            .unwrap();

        let reused = builder
            .with_variable_scope("net", true, |b| {
                b.variable("w", vec![1], Initializer::Constant(0.0), true)
            })
            .unwrap();
        assert_eq!(reused, "net/w/read");
        assert_eq!(builder.global_variables().len(), 1);

        let missing = builder.with_variable_scope("net", true, |b| {
            b.variable("v", vec![1], Initializer::Constant(0.0), true)
        });
        assert!(matches!(missing, Err(ExportError::VariableNotFound { .. })));
    }

    #[test]
    fn test_group_uses_control_inputs() {
        let mut builder = GraphBuilder::new();
        let a = builder.op(OpType::NoOp, "a", vec![], vec![]).unwrap();
        let b = builder.op(OpType::NoOp, "b", vec![], vec![]).unwrap();
        let group = builder.group("all", &[a, b]).unwrap();

        let node = builder.graph().require(&group).unwrap();
        assert_eq!(node.inputs, vec!["^a".to_string(), "^b".to_string()]);
    }

    #[test]
    fn test_conv2d_attributes() {
        let mut builder = GraphBuilder::new();
        let x = builder.placeholder("x", vec![None, None, None, Some(3)]).unwrap();
        let w = builder
            .variable("w", vec![3, 3, 3, 8], Initializer::Constant(0.0), true)
            .unwrap();
        let conv = builder.conv2d(&x, &w, (1, 1), "SAME").unwrap();

        let node = builder.graph().require(&conv).unwrap();
        assert_eq!(node.attr_ints("strides").unwrap(), &[1, 1, 1, 1]);
        assert_eq!(node.attr_str("padding").unwrap(), "SAME");
    }
}
