//! Graph-specific error types.

use crate::graph::socket::SocketKind;
use thiserror::Error;

/// Structural errors raised while building or linking a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Node {node} has no {direction} socket {socket}")]
    UnknownSocket {
        node: String,
        direction: &'static str,
        socket: String,
    },

    #[error("Cannot link {from_kind} socket {from} into {to_kind} socket {to}")]
    KindMismatch {
        from: String,
        from_kind: SocketKind,
        to: String,
        to_kind: SocketKind,
    },

    #[error("Cannot link a node to itself: {0}")]
    SelfLink(String),

    #[error("Invalid graph document: {0}")]
    Document(String),
}

/// Errors raised while flattening one output root.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Traversal from {root} exceeded depth {limit} at node {node}")]
    DepthExceeded {
        root: String,
        node: String,
        limit: usize,
    },

    #[error("Node {node}: {message}")]
    InvalidSetting { node: String, message: String },
}

impl CompileError {
    pub fn invalid(node: &str, message: impl Into<String>) -> Self {
        CompileError::InvalidSetting {
            node: node.to_string(),
            message: message.into(),
        }
    }
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
pub type CompileResult<T> = std::result::Result<T, CompileError>;
