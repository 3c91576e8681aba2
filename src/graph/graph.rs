//! The node graph: nodes, typed sockets and links. Purely structural.
//!
//! Graphs are built in code with [`NodeGraph::add_node`] / [`NodeGraph::link`]
//! or loaded from a JSON [`GraphDocument`]:
//!
//! ```json
//! {
//!   "name": "BakeNodes",
//!   "nodes": [
//!     {"name": "Pass", "type": "BlenderPass", "passes": ["COMBINED"]},
//!     {"name": "Bake", "type": "Bake"}
//!   ],
//!   "links": [{"from": ["Pass", "Pass"], "to": ["Bake", 0]}]
//! }
//! ```

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::id::{LinkId, NodeId, SocketId};
use crate::graph::node::{Node, NodeKind};
use crate::graph::node_type::NodeType;
use crate::graph::nodes::{BakeSetting, BlenderPass, MeshConfig, MeshList};
use crate::graph::socket::SocketDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A directed edge from an output socket to an input socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from: SocketId,
    pub to: SocketId,
}

/// Socket reference in a document: by name or by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SocketSelector {
    Index(u16),
    Name(String),
}

/// `[node name, socket]` endpoint of a document link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint(pub String, pub SocketSelector);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDocument {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// Serialized form of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<LinkDocument>,
}

/// Nodes, links and a name index.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    name: String,
    nodes: Vec<Node>,
    links: Vec<Link>,
    by_name: HashMap<String, NodeId>,
}

impl NodeGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Starter graph: pass, settings and one mesh feeding a bake that is saved.
    pub fn default_bake_graph(name: impl Into<String>) -> Self {
        let mut graph = Self::new(name);
        let build = |graph: &mut NodeGraph| -> GraphResult<()> {
            graph.add_node("Pass", NodeKind::BlenderPass(BlenderPass::default()))?;
            graph.add_node("Bake Setting", NodeKind::BakeSetting(BakeSetting::default()))?;
            graph.add_node(
                "Mesh",
                NodeKind::SingleMesh(MeshList {
                    meshes: vec![MeshConfig::default()],
                }),
            )?;
            graph.add_node("Bake", NodeKind::default_for(NodeType::Bake))?;
            graph.add_node("Save", NodeKind::default_for(NodeType::SaveToImage))?;
            graph.link("Pass", 0, "Bake", 0)?;
            graph.link("Bake Setting", 0, "Bake", 1)?;
            graph.link("Mesh", 0, "Bake", 2)?;
            graph.link("Bake", 0, "Save", 0)?;
            Ok(())
        };
        if let Err(e) = build(&mut graph) {
            tracing::error!("Default graph is inconsistent: {}", e);
        }
        graph
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> GraphResult<NodeId> {
        self.insert(Node::new(name, kind))
    }

    pub fn insert(&mut self, node: Node) -> GraphResult<NodeId> {
        if self.by_name.contains_key(&node.name) {
            return Err(GraphError::DuplicateNode(node.name));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.by_name.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Link `from_node`'s output socket into `to_node`'s input socket, by index.
    ///
    /// Linking into an occupied single input replaces the existing link.
    pub fn link(
        &mut self,
        from_node: &str,
        from_socket: u16,
        to_node: &str,
        to_socket: u16,
    ) -> GraphResult<LinkId> {
        self.link_selected(
            from_node,
            &SocketSelector::Index(from_socket),
            to_node,
            &SocketSelector::Index(to_socket),
        )
    }

    /// Same as [`NodeGraph::link`] with sockets given by name.
    pub fn link_by_name(
        &mut self,
        from_node: &str,
        from_socket: &str,
        to_node: &str,
        to_socket: &str,
    ) -> GraphResult<LinkId> {
        self.link_selected(
            from_node,
            &SocketSelector::Name(from_socket.to_string()),
            to_node,
            &SocketSelector::Name(to_socket.to_string()),
        )
    }

    fn link_selected(
        &mut self,
        from_node: &str,
        from_socket: &SocketSelector,
        to_node: &str,
        to_socket: &SocketSelector,
    ) -> GraphResult<LinkId> {
        let from_id = self.require(from_node)?;
        let to_id = self.require(to_node)?;
        if from_id == to_id {
            return Err(GraphError::SelfLink(from_node.to_string()));
        }
        let from_kind = &self.nodes[from_id.index()].kind;
        let to_kind = &self.nodes[to_id.index()].kind;
        let (out_idx, out_desc) = resolve_socket(from_node, "output", from_kind.outputs(), from_socket)?;
        let (in_idx, in_desc) = resolve_socket(to_node, "input", to_kind.inputs(), to_socket)?;

        if !out_desc.kind.accepts(in_desc.kind) {
            return Err(GraphError::KindMismatch {
                from: format!("{from_node}.{}", out_desc.name),
                from_kind: out_desc.kind,
                to: format!("{to_node}.{}", in_desc.name),
                to_kind: in_desc.kind,
            });
        }

        let link = Link {
            from: SocketId::new(from_id, out_idx),
            to: SocketId::new(to_id, in_idx),
        };
        if let Some(existing) = self.links.iter().position(|l| *l == link) {
            return Ok(LinkId(existing as u32));
        }
        if !in_desc.multi {
            self.links.retain(|l| l.to != link.to);
        }
        self.links.push(link);
        Ok(LinkId(self.links.len() as u32 - 1))
    }

    /// Remove every link touching the given input socket.
    pub fn unlink_input(&mut self, node: NodeId, input: u16) {
        let target = SocketId::new(node, input);
        self.links.retain(|l| l.to != target);
    }

    /// Whether anything is linked into the given input socket.
    pub fn is_linked(&self, node: NodeId, input: u16) -> bool {
        let target = SocketId::new(node, input);
        self.links.iter().any(|l| l.to == target)
    }

    /// Output nodes in graph order.
    pub fn outputs(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_output())
            .map(|(i, _)| NodeId(i as u32))
            .collect()
    }

    /// Resolve the nodes feeding one input socket.
    ///
    /// Multi inputs yield every linked source in link order; single inputs
    /// yield at most one. Relay nodes are looked through by following their
    /// own input further upstream.
    pub fn upstream(&self, node: NodeId, input: u16) -> Vec<NodeId> {
        let multi = self
            .node(node)
            .and_then(|n| n.kind.inputs().get(input as usize))
            .map(|d| d.multi)
            .unwrap_or(false);
        let mut found = Vec::new();
        self.collect_upstream(SocketId::new(node, input), multi, &mut found, 0);
        found
    }

    fn collect_upstream(&self, target: SocketId, multi: bool, found: &mut Vec<NodeId>, hops: usize) {
        // A relay loop would otherwise never terminate.
        if hops > self.nodes.len() {
            tracing::warn!("Relay chain into {:?} does not terminate", target);
            return;
        }
        let incoming = self.links.iter().filter(|l| l.to == target);
        let incoming: Vec<&Link> = if multi {
            incoming.collect()
        } else {
            incoming.take(1).collect()
        };
        for link in incoming {
            let source = link.from.node();
            let is_relay = self
                .node(source)
                .map(|n| n.kind.node_type().is_relay())
                .unwrap_or(false);
            if is_relay {
                self.collect_upstream(SocketId::new(source, 0), multi, found, hops + 1);
            } else {
                found.push(source);
            }
        }
    }

    fn require(&self, name: &str) -> GraphResult<NodeId> {
        self.find(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    // ==================== Documents ====================

    pub fn from_document(doc: GraphDocument) -> GraphResult<Self> {
        let mut graph = Self::new(doc.name);
        for node in doc.nodes {
            graph.insert(node)?;
        }
        for link in doc.links {
            graph.link_selected(&link.from.0, &link.from.1, &link.to.0, &link.to.1)?;
        }
        Ok(graph)
    }

    pub fn from_json_str(json: &str) -> GraphResult<Self> {
        let doc: GraphDocument =
            serde_json::from_str(json).map_err(|e| GraphError::Document(e.to_string()))?;
        Self::from_document(doc)
    }

    pub fn load(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Document(format!("{}: {}", path.display(), e)))?;
        let mut graph = Self::from_json_str(&text)?;
        if graph.name.is_empty() {
            graph.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(graph)
    }

    pub fn to_document(&self) -> GraphDocument {
        let endpoint = |socket: SocketId| {
            Endpoint(
                self.nodes[socket.node().index()].name.clone(),
                SocketSelector::Index(socket.socket_index()),
            )
        };
        GraphDocument {
            name: self.name.clone(),
            nodes: self.nodes.clone(),
            links: self
                .links
                .iter()
                .map(|l| LinkDocument {
                    from: endpoint(l.from),
                    to: endpoint(l.to),
                })
                .collect(),
        }
    }
}

fn resolve_socket<'d>(
    node: &str,
    direction: &'static str,
    sockets: &'d [SocketDescriptor],
    selector: &SocketSelector,
) -> GraphResult<(u16, &'d SocketDescriptor)> {
    let found = match selector {
        SocketSelector::Index(i) => sockets.get(*i as usize).map(|d| (*i, d)),
        SocketSelector::Name(name) => sockets
            .iter()
            .enumerate()
            .find(|(_, d)| d.name == name)
            .map(|(i, d)| (i as u16, d)),
    };
    found.ok_or_else(|| GraphError::UnknownSocket {
        node: node.to_string(),
        direction,
        socket: match selector {
            SocketSelector::Index(i) => i.to_string(),
            SocketSelector::Name(n) => n.clone(),
        },
    })
}
