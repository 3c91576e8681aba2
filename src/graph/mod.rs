//! Graph model, Context IR and the graph compiler.
//!
//! A graph is a set of typed nodes connected output → input. Compiling it
//! walks upstream from every output node and produces, per output root, an
//! ordered execution queue plus the Context the nodes contributed to.
//!
//! # Architecture
//!
//! ```text
//! [BlenderPass] ──┐
//! [BakeSetting] ──┼──► [Bake] ──► [ImageCombine] ──► [SaveToImage]   (output root)
//! [SingleMesh]  ──┘
//! ```
//!
//! compiles to
//!
//! ```text
//! { "SaveToImage": { "ExecutionQueue": [["BlenderPass", ...], ..., ["SaveToImage", ...]],
//!                    "Pass": {"Internal": ["COMBINED"]}, "BakeSettings": {...}, ... } }
//! ```
//!
//! # Design
//!
//! - **Visited set per root**: threaded through the traversal instead of
//!   stored on nodes, so compilation borrows the graph immutably.
//! - **No cycle detection**: revisits are suppressed; a depth bound turns a
//!   cyclic graph into a `CompileError` for that root.
//! - **Per-root failure isolation**: one bad root never blocks the others.
//! - **No scene access**: scene/collection lookups are deferred to execution.

pub mod compiler;
pub mod context;
pub mod error;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod id;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod socket;

pub use compiler::{CompileOutput, CompileStats, GraphCompiler, DEFAULT_MAX_DEPTH};
pub use context::{Context, QueueEntry, EXECUTION_QUEUE};
pub use error::{CompileError, CompileResult, GraphError, GraphResult};
pub use graph::{Endpoint, GraphDocument, Link, LinkDocument, NodeGraph, SocketSelector};
pub use id::{LinkId, NodeId, SocketId};
pub use node::{Node, NodeKind};
pub use node_type::NodeType;
pub use socket::{SocketDescriptor, SocketDirection, SocketKind};
