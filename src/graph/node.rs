//! Graph nodes: an instance name plus per-type settings.
//!
//! `NodeKind` is the tagged union of every built-in node's settings. It
//! knows its sockets and dispatches the compile-time contribution step by
//! matching on the variant.

use crate::graph::context::Context;
use crate::graph::error::CompileResult;
use crate::graph::node_type::NodeType;
use crate::graph::nodes::{
    bake, mesh, output, pass, settings, BakeNode, BakeSetting, BlenderPass, CollectionMeshes,
    Contribution, CustomPass, ImageCombine, MeshList, PbrPass, SaveToImage, SceneMeshes,
    REROUTE_INPUTS, REROUTE_OUTPUTS,
};
use crate::graph::socket::SocketDescriptor;
use serde::{Deserialize, Serialize};

/// Settings of one node, tagged by type label in graph documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    BlenderPass(BlenderPass),
    #[serde(rename = "PBRPass")]
    PbrPass(PbrPass),
    CustomPass(CustomPass),
    BakeSetting(BakeSetting),
    SingleMesh(MeshList),
    Mesh(MeshList),
    SceneMeshes(SceneMeshes),
    CollectionMeshes(CollectionMeshes),
    Bake(BakeNode),
    ImageCombine(ImageCombine),
    SaveToImage(SaveToImage),
    Reroute,
}

static NO_SOCKETS: &[SocketDescriptor] = &[];

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::BlenderPass(_) => NodeType::BlenderPass,
            NodeKind::PbrPass(_) => NodeType::PbrPass,
            NodeKind::CustomPass(_) => NodeType::CustomPass,
            NodeKind::BakeSetting(_) => NodeType::BakeSetting,
            NodeKind::SingleMesh(_) => NodeType::SingleMesh,
            NodeKind::Mesh(_) => NodeType::Mesh,
            NodeKind::SceneMeshes(_) => NodeType::SceneMeshes,
            NodeKind::CollectionMeshes(_) => NodeType::CollectionMeshes,
            NodeKind::Bake(_) => NodeType::Bake,
            NodeKind::ImageCombine(_) => NodeType::ImageCombine,
            NodeKind::SaveToImage(_) => NodeType::SaveToImage,
            NodeKind::Reroute => NodeType::Reroute,
        }
    }

    /// Default settings for a node type.
    pub fn default_for(ty: NodeType) -> NodeKind {
        match ty {
            NodeType::BlenderPass => NodeKind::BlenderPass(Default::default()),
            NodeType::PbrPass => NodeKind::PbrPass(Default::default()),
            NodeType::CustomPass => NodeKind::CustomPass(Default::default()),
            NodeType::BakeSetting => NodeKind::BakeSetting(Default::default()),
            NodeType::SingleMesh => NodeKind::SingleMesh(Default::default()),
            NodeType::Mesh => NodeKind::Mesh(Default::default()),
            NodeType::SceneMeshes => NodeKind::SceneMeshes(Default::default()),
            NodeType::CollectionMeshes => NodeKind::CollectionMeshes(Default::default()),
            NodeType::Bake => NodeKind::Bake(Default::default()),
            NodeType::ImageCombine => NodeKind::ImageCombine(Default::default()),
            NodeType::SaveToImage => NodeKind::SaveToImage(Default::default()),
            NodeType::Reroute => NodeKind::Reroute,
        }
    }

    pub fn label(&self) -> &'static str {
        self.node_type().label()
    }

    pub fn inputs(&self) -> &'static [SocketDescriptor] {
        match self {
            NodeKind::Bake(_) => bake::INPUTS,
            NodeKind::ImageCombine(_) => output::COMBINE_INPUTS,
            NodeKind::SaveToImage(_) => output::SAVE_INPUTS,
            NodeKind::Reroute => REROUTE_INPUTS,
            _ => NO_SOCKETS,
        }
    }

    pub fn outputs(&self) -> &'static [SocketDescriptor] {
        match self {
            NodeKind::BlenderPass(_) | NodeKind::PbrPass(_) | NodeKind::CustomPass(_) => {
                pass::OUTPUTS
            }
            NodeKind::BakeSetting(_) => settings::OUTPUTS,
            NodeKind::SingleMesh(_)
            | NodeKind::Mesh(_)
            | NodeKind::SceneMeshes(_)
            | NodeKind::CollectionMeshes(_) => mesh::OUTPUTS,
            NodeKind::Bake(_) => bake::OUTPUTS,
            NodeKind::ImageCombine(_) => output::COMBINE_OUTPUTS,
            NodeKind::SaveToImage(_) => NO_SOCKETS,
            NodeKind::Reroute => REROUTE_OUTPUTS,
        }
    }

    /// Mutate the root's Context with this node's share of the task.
    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        match self {
            NodeKind::BlenderPass(n) => n.contribute(site, ctx),
            NodeKind::PbrPass(n) => n.contribute(site, ctx),
            NodeKind::CustomPass(n) => n.contribute(site, ctx),
            NodeKind::BakeSetting(n) => n.contribute(site, ctx),
            NodeKind::SingleMesh(n) => n.contribute(site, ctx, false),
            NodeKind::Mesh(n) => n.contribute(site, ctx, true),
            NodeKind::SceneMeshes(n) => n.contribute(site, ctx),
            NodeKind::CollectionMeshes(n) => n.contribute(site, ctx),
            NodeKind::Bake(n) => n.contribute(site, ctx),
            NodeKind::ImageCombine(n) => n.contribute(site, ctx),
            NodeKind::SaveToImage(n) => n.contribute(site, ctx),
            NodeKind::Reroute => Ok(()),
        }
    }
}

/// A node instance owned by one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Instance name, unique within the graph.
    pub name: String,
    /// Overrides whether this node roots a task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<bool>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            output: None,
            kind,
        }
    }

    pub fn is_output(&self) -> bool {
        self.output
            .unwrap_or_else(|| self.kind.node_type().is_output())
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_document_shape() {
        let node: Node = serde_json::from_value(json!({
            "name": "Settings",
            "type": "BakeSetting",
            "resolution": [64, 64]
        }))
        .unwrap();
        assert_eq!(node.label(), "BakeSetting");
        match &node.kind {
            NodeKind::BakeSetting(s) => {
                assert_eq!(s.resolution, [64, 64]);
                assert_eq!(s.samples, 1);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_reroute_and_defaults() {
        let node: Node = serde_json::from_value(json!({"name": "r", "type": "Reroute"})).unwrap();
        assert_eq!(node.kind, NodeKind::Reroute);
        let bake: Node = serde_json::from_value(json!({"name": "b", "type": "Bake"})).unwrap();
        assert_eq!(bake.kind.inputs().len(), 3);
        assert!(!bake.is_output());
    }

    #[test]
    fn test_output_override() {
        let mut node = Node::new("Bake", NodeKind::default_for(NodeType::Bake));
        assert!(!node.is_output());
        node.output = Some(true);
        assert!(node.is_output());
        assert!(Node::new("Save", NodeKind::default_for(NodeType::SaveToImage)).is_output());
    }

    #[test]
    fn test_default_for_matches_type() {
        for ty in NodeType::all() {
            assert_eq!(NodeKind::default_for(*ty).node_type(), *ty);
        }
    }
}
