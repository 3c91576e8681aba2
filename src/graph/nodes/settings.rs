//! `BakeSetting` node: resolution and sampling for the bake.

use super::Contribution;
use crate::graph::context::Context;
use crate::graph::error::{CompileError, CompileResult};
use crate::graph::socket::{SocketDescriptor, SocketKind};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Context key of the settings mapping.
pub const BAKE_SETTINGS: &str = "BakeSettings";

/// Smallest accepted side length.
pub const MIN_RESOLUTION: u32 = 32;
/// Largest accepted side length.
pub const MAX_RESOLUTION: u32 = 16384;
/// Largest accepted sample count.
pub const MAX_SAMPLES: u32 = 4096;

pub static OUTPUTS: &[SocketDescriptor] =
    &[SocketDescriptor::output("Bake Setting", SocketKind::BakeSetting)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSetting {
    /// Output size in pixels, `[width, height]`.
    pub resolution: [u32; 2],
    pub bake_samples: u32,
    pub samples: u32,
    pub use_adaptive_sampling: bool,
    pub adaptive_threshold: f32,
    /// Fallback UV layer index when a mesh names none.
    pub uv_layer: u32,
}

impl Default for BakeSetting {
    fn default() -> Self {
        Self {
            resolution: [512, 512],
            bake_samples: 1,
            samples: 1,
            use_adaptive_sampling: true,
            adaptive_threshold: 0.0,
            uv_layer: 0,
        }
    }
}

impl BakeSetting {
    pub fn validate(&self, node: &str) -> CompileResult<()> {
        for side in self.resolution {
            if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&side) {
                return Err(CompileError::invalid(
                    node,
                    format!("resolution {side} outside {MIN_RESOLUTION}..={MAX_RESOLUTION}"),
                ));
            }
        }
        for (what, value) in [("bake_samples", self.bake_samples), ("samples", self.samples)] {
            if !(1..=MAX_SAMPLES).contains(&value) {
                return Err(CompileError::invalid(
                    node,
                    format!("{what} {value} outside 1..={MAX_SAMPLES}"),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.adaptive_threshold) {
            return Err(CompileError::invalid(node, "adaptive_threshold outside 0..=1"));
        }
        Ok(())
    }

    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        self.validate(site.node)?;
        ctx.insert(
            BAKE_SETTINGS,
            json!({
                "resolution": self.resolution,
                "bake_samples": self.bake_samples,
                "samples": self.samples,
                "use_adaptive_sampling": self.use_adaptive_sampling,
                "adaptive_threshold": self.adaptive_threshold,
                "uv_layer": self.uv_layer,
            }),
        );
        Ok(())
    }
}

/// Resolution recorded in a compiled Context, if any.
pub fn resolution_of(ctx: &Context) -> Option<(u32, u32)> {
    let res = ctx.get_path(&[BAKE_SETTINGS, "resolution"])?.as_array()?;
    let w = res.first()?.as_u64()?;
    let h = res.get(1)?.as_u64()?;
    Some((u32::try_from(w).ok()?, u32::try_from(h).ok()?))
}
