//! `Bake` node: the compute-heavy step. At compile time it only supplies a
//! fallback pass when nothing is linked into its Pass input.

use super::pass::{push_pass, InternalPass, CATEGORY_INTERNAL};
use super::Contribution;
use crate::graph::context::Context;
use crate::graph::error::CompileResult;
use crate::graph::socket::{SocketDescriptor, SocketKind};
use serde::{Deserialize, Serialize};

pub static INPUTS: &[SocketDescriptor] = &[
    SocketDescriptor::multi_input("Pass", SocketKind::Pass),
    SocketDescriptor::input("Bake Setting", SocketKind::BakeSetting),
    SocketDescriptor::multi_input("Meshes", SocketKind::Mesh),
];

pub static OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::output("Image", SocketKind::Image)];

/// Index of the Pass input in [`INPUTS`].
const PASS_INPUT: usize = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BakeNode {
    /// Used only while the Pass input is unlinked.
    pub bake_pass: InternalPass,
}

impl BakeNode {
    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        if !site.is_linked(PASS_INPUT) {
            push_pass(ctx, CATEGORY_INTERNAL, self.bake_pass.as_str());
        }
        Ok(())
    }
}
