//! Built-in node kinds.
//!
//! Each file declares the sockets of its node kinds as static
//! `SocketDescriptor` arrays, the serde-backed settings a graph document
//! carries for them, and the contribution step the compiler runs after the
//! node's upstream nodes have been visited.

pub mod bake;
pub mod mesh;
pub mod output;
pub mod pass;
pub mod settings;

pub use bake::BakeNode;
pub use mesh::{CollectionMeshes, MeshConfig, MeshList, SceneMeshes};
pub use output::{ImageCombine, SaveToImage};
pub use pass::{BlenderPass, CustomPass, InternalPass, PbrChannel, PbrPass};
pub use settings::BakeSetting;

use crate::config::PresetTable;
use crate::graph::socket::{SocketDescriptor, SocketKind};

/// Reroute sockets: one input, one output, any kind.
pub static REROUTE_INPUTS: &[SocketDescriptor] = &[SocketDescriptor::input("Input", SocketKind::Any)];
pub static REROUTE_OUTPUTS: &[SocketDescriptor] =
    &[SocketDescriptor::output("Output", SocketKind::Any)];

/// What a node sees while contributing to its root's Context.
pub struct Contribution<'a> {
    /// Instance name of the contributing node.
    pub node: &'a str,
    /// Link state of each input socket, by index.
    pub linked: &'a [bool],
    /// Validated preset table, when the compiler was given one.
    pub presets: Option<&'a PresetTable>,
}

impl Contribution<'_> {
    pub fn is_linked(&self, input: usize) -> bool {
        self.linked.get(input).copied().unwrap_or(false)
    }
}
