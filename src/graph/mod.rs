//! Serializable dataflow graphs.
//!
//! A graph is a flat list of named nodes (`NodeDef`) wired together by
//! tensor names (`node`, `node:1`, `^node` for control edges). Graphs are
//! built with `GraphBuilder`, executed by a `Session`, and written either as
//! readable text or as a compact binary file.
//!
//! # Example
//!
//! ```
//! use graphfreeze::graph::{GraphBuilder, GraphDef, Initializer};
//!
//! let mut builder = GraphBuilder::new();
//! let x = builder.placeholder("x", vec![None, None, None, Some(3)]).unwrap();
//! let out = builder
//!     .with_scope("net", |b| {
//!         let w = b.variable("W", vec![1, 1, 3, 3], Initializer::Constant(0.0), true)?;
//!         let y = b.conv2d(&x, &w, (1, 1), "SAME")?;
//!         b.tanh(&y)
//!     })
//!     .unwrap();
//! assert_eq!(out, "net/Tanh");
//!
//! let graph = builder.finish();
//! let text = graph.to_text().unwrap();
//! assert_eq!(GraphDef::from_text(&text).unwrap(), graph);
//! ```

mod builder;
mod core;
mod operation;
mod tensor;

pub use builder::GraphBuilder;
pub use core::{GRAPH_DEF_VERSION, GraphDef};
pub use operation::{AttrValue, Initializer, InputRef, NodeDef, OpType, node_name};
pub use tensor::{TensorValue, num_elements};
