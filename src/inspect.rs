//! Listing the operations of a loaded bundle.

use std::fmt;
use std::path::Path;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::graph::{GraphDef, OpType};
use crate::saved_model::SavedModelBundle;

/// Name and type of one graph operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub name: String,
    pub op: OpType,
    pub inputs: usize,
}

impl fmt::Display for OperationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.op)
    }
}

/// Returns every operation of `graph`, in graph order.
pub fn list_operations(graph: &GraphDef) -> Vec<OperationSummary> {
    graph
        .nodes()
        .iter()
        .map(|node| OperationSummary {
            name: node.name.clone(),
            op: node.op,
            inputs: node.inputs.len(),
        })
        .collect()
}

/// Loads the bundle at `export_dir` tagged exactly `tags` and lists its
/// operations.
pub fn inspect_bundle<B: Backend, S: AsRef<str>>(
    export_dir: impl AsRef<Path>,
    tags: &[S],
    device: &B::Device,
) -> Result<Vec<OperationSummary>> {
    let bundle = SavedModelBundle::<B>::load(export_dir, tags, device)?;
    let operations = list_operations(bundle.graph());
    log::info!("Bundle holds {} operations", operations.len());
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeDef;

    #[test]
    fn test_list_operations_in_graph_order() {
        let graph = GraphDef::from_nodes(vec![
            NodeDef::new("input_image", OpType::Placeholder),
            NodeDef::new("w", OpType::VariableV2),
            NodeDef::new("w/read", OpType::Identity).with_inputs(["w"]),
        ])
        .unwrap();

        let ops = list_operations(&graph);
        let names: Vec<&str> = ops.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["input_image", "w", "w/read"]);
        assert_eq!(ops[2].op, OpType::Identity);
        assert_eq!(ops[2].inputs, 1);
    }

    #[test]
    fn test_summary_display() {
        let summary = OperationSummary {
            name: "SRGAN_g/out/Tanh".to_string(),
            op: OpType::Tanh,
            inputs: 1,
        };
        assert_eq!(summary.to_string(), "SRGAN_g/out/Tanh (Tanh)");
    }

    #[test]
    fn test_empty_graph_has_no_operations() {
        assert!(list_operations(&GraphDef::new()).is_empty());
    }
}
