//! GraphDef - serializable graph structure.
//!
//! A `GraphDef` holds nodes in insertion order together with a name index.
//! It carries no variable values; those live in a `Session` or, after
//! freezing, in `Const` nodes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::operation::{InputRef, NodeDef, OpType};
use crate::errors::{ExportError, Result};

/// Version stamped into every encoded graph.
pub const GRAPH_DEF_VERSION: u32 = 1;

/// A directed graph of named operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EncodedGraph")]
pub struct GraphDef {
    version: u32,
    nodes: Vec<NodeDef>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Wire form of a `GraphDef`; decoding rebuilds the name index.
#[derive(Deserialize)]
struct EncodedGraph {
    version: u32,
    nodes: Vec<NodeDef>,
}

impl TryFrom<EncodedGraph> for GraphDef {
    type Error = ExportError;

    fn try_from(encoded: EncodedGraph) -> Result<Self> {
        if encoded.version != GRAPH_DEF_VERSION {
            return Err(ExportError::InvalidGraph(format!(
                "unsupported graph version {}",
                encoded.version
            )));
        }
        GraphDef::from_nodes(encoded.nodes)
    }
}

impl Default for GraphDef {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphDef {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            version: GRAPH_DEF_VERSION,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a graph from nodes, rejecting duplicate names.
    pub fn from_nodes(nodes: Vec<NodeDef>) -> Result<Self> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        Ok(graph)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Appends a node.
    pub fn add_node(&mut self, node: NodeDef) -> Result<()> {
        if self.index.contains_key(&node.name) {
            return Err(ExportError::DuplicateNode { name: node.name });
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Returns the node with the given name, if present.
    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Returns the node with the given name or a `NodeNotFound` error.
    pub fn require(&self, name: &str) -> Result<&NodeDef> {
        self.node(name).ok_or_else(|| ExportError::NodeNotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn nodes(&self) -> &[NodeDef] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all variable nodes.
    pub fn variables(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.iter().filter(|n| n.op.is_variable())
    }

    /// Iterates over nodes of a given op type.
    pub fn nodes_of(&self, op: OpType) -> impl Iterator<Item = &NodeDef> {
        self.nodes.iter().filter(move |n| n.op == op)
    }

    /// Removes the device placement from every node.
    pub fn clear_devices(&mut self) {
        for node in &mut self.nodes {
            node.device.clear();
        }
    }

    /// Returns the subgraph needed to compute `outputs`, keeping node order.
    ///
    /// Both data and control dependencies are followed.
    pub fn extract_subgraph(&self, outputs: &[&str]) -> Result<GraphDef> {
        let mut keep: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        for output in outputs {
            let node = self.require(super::operation::node_name(output))?;
            if keep.insert(node.name.as_str()) {
                queue.push_back(node.name.as_str());
            }
        }

        while let Some(name) = queue.pop_front() {
            let node = self.require(name)?;
            for input in &node.inputs {
                let input = InputRef::parse(input);
                let producer = self.require(input.node)?;
                if keep.insert(producer.name.as_str()) {
                    queue.push_back(producer.name.as_str());
                }
            }
        }

        let nodes = self
            .nodes
            .iter()
            .filter(|n| keep.contains(n.name.as_str()))
            .cloned()
            .collect();
        GraphDef::from_nodes(nodes)
    }

    /// Returns true if `target` depends, directly or not, on `source`.
    pub fn depends_on(&self, target: &str, source: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![target];
        while let Some(name) = stack.pop() {
            if name == source {
                return true;
            }
            if !seen.insert(name) {
                continue;
            }
            if let Some(node) = self.node(name) {
                stack.extend(node.inputs.iter().map(|i| InputRef::parse(i).node));
            }
        }
        false
    }

    /// Encodes the graph as human-readable text.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes a graph from its text encoding.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encodes the graph in its compact binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a graph from its binary form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Writes the graph to `path`, creating parent directories.
    pub fn write(&self, path: impl AsRef<Path>, as_text: bool) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))?;
        }
        let bytes = if as_text {
            self.to_text()?.into_bytes()
        } else {
            self.to_bytes()?
        };
        fs::write(path, bytes).map_err(|e| ExportError::io(path, e))
    }

    /// Reads a graph previously written with [`GraphDef::write`].
    pub fn read(path: impl AsRef<Path>, binary: bool) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ExportError::io(path, e))?;
        if binary {
            Self::from_bytes(&bytes)
        } else {
            let text = String::from_utf8(bytes).map_err(|e| {
                ExportError::InvalidGraph(format!("{} is not UTF-8 text: {e}", path.display()))
            })?;
            Self::from_text(&text)
        }
    }
}
