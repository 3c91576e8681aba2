//! Handles into a [`NodeGraph`](super::NodeGraph).
//!
//! Node and link handles are plain indices into the graph's vectors; they are
//! only meaningful for the graph that issued them.

use std::fmt;

/// Position of a node in `NodeGraph::nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One socket of one node. Whether it is an input or an output follows from
/// which end of a [`Link`](super::Link) it sits on.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId {
    node: NodeId,
    index: u16,
}

impl SocketId {
    pub fn new(node: NodeId, socket_index: u16) -> Self {
        Self {
            node,
            index: socket_index,
        }
    }

    #[inline]
    pub fn node(self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn socket_index(self) -> u16 {
        self.index
    }
}

impl fmt::Debug for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.index)
    }
}

/// Position of a link in `NodeGraph::links`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LinkId(pub u32);
