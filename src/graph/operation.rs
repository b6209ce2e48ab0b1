//! Nodes of the computation graph.
//!
//! Uses a simple enum for op types instead of trait objects for clarity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::tensor::TensorValue;
use crate::errors::{ExportError, Result};

/// The kind of computation a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    /// Value supplied by the caller at run time.
    Placeholder,
    /// Mutable, checkpointed parameter.
    VariableV2,
    /// Value embedded in the graph.
    Const,
    /// Passes its input through unchanged.
    Identity,
    /// NHWC convolution with an HWIO kernel.
    Conv2D,
    /// Adds a per-channel bias.
    BiasAdd,
    /// Batch normalization over the channel axis.
    FusedBatchNorm,
    Relu,
    Tanh,
    /// Element-wise addition of two tensors.
    Add,
    /// Rearranges channel blocks into spatial blocks (pixel shuffle).
    DepthToSpace,
    /// Writes a value into a variable.
    Assign,
    /// Writes tensors to a checkpoint.
    SaveV2,
    /// Reads tensors from a checkpoint.
    RestoreV2,
    /// Does nothing besides running its control dependencies.
    NoOp,
}

impl OpType {
    /// Returns the op type name as written in graph listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Placeholder => "Placeholder",
            OpType::VariableV2 => "VariableV2",
            OpType::Const => "Const",
            OpType::Identity => "Identity",
            OpType::Conv2D => "Conv2D",
            OpType::BiasAdd => "BiasAdd",
            OpType::FusedBatchNorm => "FusedBatchNorm",
            OpType::Relu => "Relu",
            OpType::Tanh => "Tanh",
            OpType::Add => "Add",
            OpType::DepthToSpace => "DepthToSpace",
            OpType::Assign => "Assign",
            OpType::SaveV2 => "SaveV2",
            OpType::RestoreV2 => "RestoreV2",
            OpType::NoOp => "NoOp",
        }
    }

    /// Returns true for ops that hold mutable state.
    pub fn is_variable(&self) -> bool {
        matches!(self, OpType::VariableV2)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a variable gets its first value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    /// Every element set to the same value.
    Constant(f32),
    /// Elements drawn from a normal distribution.
    RandomNormal { mean: f32, stddev: f32 },
}

/// A node attribute.
///
/// Externally tagged so that both the JSON and the bincode encodings
/// round-trip without a self-describing format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Float(f32),
    Bool(bool),
    Str(String),
    Ints(Vec<i64>),
    Strs(Vec<String>),
    /// Partially known shape, `None` marks an unknown dimension.
    Shape(Vec<Option<usize>>),
    Tensor(TensorValue),
    Initializer(Initializer),
}

/// A reference to one output of a node, as written in `NodeDef::inputs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRef<'a> {
    /// Name of the producing node.
    pub node: &'a str,
    /// Output index on the producing node.
    pub index: usize,
    /// True for a `^node` control dependency.
    pub control: bool,
}

impl<'a> InputRef<'a> {
    /// Parses `node`, `node:k` or `^node`.
    pub fn parse(input: &'a str) -> Self {
        if let Some(node) = input.strip_prefix('^') {
            return Self {
                node,
                index: 0,
                control: true,
            };
        }
        match input.rsplit_once(':') {
            Some((node, index)) => match index.parse() {
                Ok(index) => Self {
                    node,
                    index,
                    control: false,
                },
                Err(_) => Self {
                    node: input,
                    index: 0,
                    control: false,
                },
            },
            None => Self {
                node: input,
                index: 0,
                control: false,
            },
        }
    }
}

/// Strips an output suffix from a tensor name (`save/Const:0` -> `save/Const`).
pub fn node_name(tensor_name: &str) -> &str {
    InputRef::parse(tensor_name).node
}

/// A single named operation in a `GraphDef`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: OpType,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
}

impl NodeDef {
    /// Creates a node without inputs or attributes.
    pub fn new(name: impl Into<String>, op: OpType) -> Self {
        Self {
            name: name.into(),
            op,
            inputs: Vec::new(),
            device: String::new(),
            attrs: BTreeMap::new(),
        }
    }

    /// Sets the node inputs.
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Iterates over data inputs, skipping control dependencies.
    pub fn data_inputs(&self) -> impl Iterator<Item = InputRef<'_>> {
        self.inputs
            .iter()
            .map(|i| InputRef::parse(i))
            .filter(|i| !i.control)
    }

    /// Iterates over control dependencies.
    pub fn control_inputs(&self) -> impl Iterator<Item = InputRef<'_>> {
        self.inputs
            .iter()
            .map(|i| InputRef::parse(i))
            .filter(|i| i.control)
    }

    /// Returns the attribute or a `MissingAttr` error.
    pub fn attr(&self, key: &str) -> Result<&AttrValue> {
        self.attrs.get(key).ok_or_else(|| ExportError::MissingAttr {
            node: self.name.clone(),
            attr: key.to_string(),
        })
    }

    pub fn attr_int(&self, key: &str) -> Result<i64> {
        match self.attr(key)? {
            AttrValue::Int(v) => Ok(*v),
            _ => Err(self.invalid_attr(key, "int")),
        }
    }

    pub fn attr_float(&self, key: &str) -> Result<f32> {
        match self.attr(key)? {
            AttrValue::Float(v) => Ok(*v),
            _ => Err(self.invalid_attr(key, "float")),
        }
    }

    pub fn attr_bool(&self, key: &str) -> Result<bool> {
        match self.attr(key)? {
            AttrValue::Bool(v) => Ok(*v),
            _ => Err(self.invalid_attr(key, "bool")),
        }
    }

    pub fn attr_str(&self, key: &str) -> Result<&str> {
        match self.attr(key)? {
            AttrValue::Str(v) => Ok(v),
            _ => Err(self.invalid_attr(key, "string")),
        }
    }

    pub fn attr_ints(&self, key: &str) -> Result<&[i64]> {
        match self.attr(key)? {
            AttrValue::Ints(v) => Ok(v),
            _ => Err(self.invalid_attr(key, "int list")),
        }
    }

    pub fn attr_strs(&self, key: &str) -> Result<&[String]> {
        match self.attr(key)? {
            AttrValue::Strs(v) => Ok(v),
            _ => Err(self.invalid_attr(key, "string list")),
        }
    }

    pub fn attr_shape(&self, key: &str) -> Result<&[Option<usize>]> {
        match self.attr(key)? {
            AttrValue::Shape(v) => Ok(v),
            _ => Err(self.invalid_attr(key, "shape")),
        }
    }

    pub fn attr_tensor(&self, key: &str) -> Result<&TensorValue> {
        match self.attr(key)? {
            AttrValue::Tensor(v) => Ok(v),
            _ => Err(self.invalid_attr(key, "tensor")),
        }
    }

    pub fn attr_initializer(&self, key: &str) -> Result<Initializer> {
        match self.attr(key)? {
            AttrValue::Initializer(v) => Ok(*v),
            _ => Err(self.invalid_attr(key, "initializer")),
        }
    }

    /// Returns the fully known shape of a variable node.
    pub fn variable_shape(&self) -> Result<Vec<usize>> {
        self.attr_shape("shape")?
            .iter()
            .map(|dim| dim.ok_or_else(|| self.invalid_attr("shape", "fully defined shape")))
            .collect()
    }

    fn invalid_attr(&self, key: &str, expected: &'static str) -> ExportError {
        ExportError::InvalidAttr {
            node: self.name.clone(),
            attr: key.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_input() {
        let input = InputRef::parse("SRGAN_g/n64s1/c/Conv2D");
        assert_eq!(input.node, "SRGAN_g/n64s1/c/Conv2D");
        assert_eq!(input.index, 0);
        assert!(!input.control);
    }

    #[test]
    fn test_parse_indexed_input() {
        let input = InputRef::parse("save/RestoreV2:7");
        assert_eq!(input.node, "save/RestoreV2");
        assert_eq!(input.index, 7);
    }

    #[test]
    fn test_parse_control_input() {
        let input = InputRef::parse("^save/Assign_3");
        assert_eq!(input.node, "save/Assign_3");
        assert!(input.control);
    }

    #[test]
    fn test_node_name_strips_output_suffix() {
        assert_eq!(node_name("save/Const:0"), "save/Const");
        assert_eq!(node_name("input_image"), "input_image");
    }

    #[test]
    fn test_data_and_control_inputs_split() {
        let node = NodeDef::new("save/restore_all", OpType::NoOp).with_inputs([
            "^save/Assign",
            "^save/Assign_1",
        ]);
        assert_eq!(node.data_inputs().count(), 0);
        assert_eq!(node.control_inputs().count(), 2);
    }

    #[test]
    fn test_attr_accessors() {
        let node = NodeDef::new("conv", OpType::Conv2D)
            .with_attr("padding", AttrValue::Str("SAME".to_string()))
            .with_attr("strides", AttrValue::Ints(vec![1, 1, 1, 1]));

        assert_eq!(node.attr_str("padding").unwrap(), "SAME");
        assert_eq!(node.attr_ints("strides").unwrap(), &[1, 1, 1, 1]);
        assert!(matches!(
            node.attr_int("padding"),
            Err(ExportError::InvalidAttr { .. })
        ));
        assert!(matches!(
            node.attr_str("data_format"),
            Err(ExportError::MissingAttr { .. })
        ));
    }

    #[test]
    fn test_variable_shape_requires_known_dims() {
        let known = NodeDef::new("w", OpType::VariableV2)
            .with_attr("shape", AttrValue::Shape(vec![Some(3), Some(3)]));
        assert_eq!(known.variable_shape().unwrap(), vec![3, 3]);

        let partial = NodeDef::new("w", OpType::VariableV2)
            .with_attr("shape", AttrValue::Shape(vec![None, Some(3)]));
        assert!(partial.variable_shape().is_err());
    }
}
