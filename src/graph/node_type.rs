//! Node type enumeration.
//!
//! `NodeType` is the settings-free tag of a node. Its label is what the
//! compiler writes into the execution queue and what the execution
//! registry is keyed by.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every node type a graph may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    // Pass selection
    BlenderPass,
    #[serde(rename = "PBRPass")]
    PbrPass,
    CustomPass,

    // Settings
    BakeSetting,

    // Mesh inputs
    SingleMesh,
    Mesh,
    SceneMeshes,
    CollectionMeshes,

    // Work
    Bake,
    ImageCombine,

    // Output
    SaveToImage,

    // Layout helper
    Reroute,
}

impl NodeType {
    /// Label stored in the execution queue.
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::BlenderPass => "BlenderPass",
            NodeType::PbrPass => "PBRPass",
            NodeType::CustomPass => "CustomPass",
            NodeType::BakeSetting => "BakeSetting",
            NodeType::SingleMesh => "SingleMesh",
            NodeType::Mesh => "Mesh",
            NodeType::SceneMeshes => "SceneMeshes",
            NodeType::CollectionMeshes => "CollectionMeshes",
            NodeType::Bake => "Bake",
            NodeType::ImageCombine => "ImageCombine",
            NodeType::SaveToImage => "SaveToImage",
            NodeType::Reroute => "Reroute",
        }
    }

    /// Look a type up by its label.
    pub fn from_label(label: &str) -> Option<NodeType> {
        Self::all().iter().copied().find(|t| t.label() == label)
    }

    /// Get all node types.
    pub fn all() -> &'static [NodeType] {
        &[
            NodeType::BlenderPass,
            NodeType::PbrPass,
            NodeType::CustomPass,
            NodeType::BakeSetting,
            NodeType::SingleMesh,
            NodeType::Mesh,
            NodeType::SceneMeshes,
            NodeType::CollectionMeshes,
            NodeType::Bake,
            NodeType::ImageCombine,
            NodeType::SaveToImage,
            NodeType::Reroute,
        ]
    }

    /// Output nodes root a compiled task.
    pub fn is_output(&self) -> bool {
        matches!(self, NodeType::SaveToImage)
    }

    /// Relay nodes are skipped when resolving upstream nodes.
    pub fn is_relay(&self) -> bool {
        matches!(self, NodeType::Reroute)
    }

    /// Get a short description of what this node does.
    pub fn description(&self) -> &'static str {
        match self {
            NodeType::BlenderPass => "Selects renderer bake passes (Combined, AO, Normal, ...).",
            NodeType::PbrPass => "Selects PBR channels extracted from the material.",
            NodeType::CustomPass => "Selects preset-driven passes and their parameters.",
            NodeType::BakeSetting => "Resolution and sampling for the bake.",
            NodeType::SingleMesh => "Bake targets without a source mesh.",
            NodeType::Mesh => "Bake targets with optional high-poly sources.",
            NodeType::SceneMeshes => "Every mesh object of a scene.",
            NodeType::CollectionMeshes => "Every mesh object of a collection.",
            NodeType::Bake => "Runs one worker process per (mesh, category, pass).",
            NodeType::ImageCombine => "Composites per-target images of the same pass.",
            NodeType::SaveToImage => "Writes baked images to a directory.",
            NodeType::Reroute => "Transparent relay.",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
