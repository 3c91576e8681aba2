//! Pass nodes: pick which channels get baked.
//!
//! All three write into the `Pass` mapping of the Context, one list per
//! category (`Internal`, `PBR`, `Advanced`), never appending a pass twice.

use super::Contribution;
use crate::graph::context::{ensure_list_in, push_unique_in, Context};
use crate::graph::error::{CompileError, CompileResult};
use crate::graph::socket::{SocketDescriptor, SocketKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Context key of the pass mapping.
pub const PASS: &str = "Pass";
/// Renderer-native passes.
pub const CATEGORY_INTERNAL: &str = "Internal";
/// Physically based channels extracted from the material.
pub const CATEGORY_PBR: &str = "PBR";
/// Preset-driven passes.
pub const CATEGORY_ADVANCED: &str = "Advanced";
/// Context key of the per-preset parameter values.
pub const ADVANCED_BAKE_PARAMS: &str = "AdvancedBakeParams";

pub static OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::output("Pass", SocketKind::Pass)];

/// Renderer bake types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalPass {
    #[default]
    Combined,
    Ao,
    Shadow,
    Position,
    Normal,
    Uv,
    Roughness,
    Emit,
    Environment,
    Diffuse,
    Glossy,
    Transmission,
}

impl InternalPass {
    pub fn as_str(self) -> &'static str {
        match self {
            InternalPass::Combined => "COMBINED",
            InternalPass::Ao => "AO",
            InternalPass::Shadow => "SHADOW",
            InternalPass::Position => "POSITION",
            InternalPass::Normal => "NORMAL",
            InternalPass::Uv => "UV",
            InternalPass::Roughness => "ROUGHNESS",
            InternalPass::Emit => "EMIT",
            InternalPass::Environment => "ENVIRONMENT",
            InternalPass::Diffuse => "DIFFUSE",
            InternalPass::Glossy => "GLOSSY",
            InternalPass::Transmission => "TRANSMISSION",
        }
    }
}

/// Material channels for PBR extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PbrChannel {
    Albedo,
    Metallic,
    Roughness,
    Normal,
    Emission,
    #[serde(rename = "AO")]
    Ao,
    #[serde(rename = "IOR")]
    Ior,
}

impl PbrChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            PbrChannel::Albedo => "Albedo",
            PbrChannel::Metallic => "Metallic",
            PbrChannel::Roughness => "Roughness",
            PbrChannel::Normal => "Normal",
            PbrChannel::Emission => "Emission",
            PbrChannel::Ao => "AO",
            PbrChannel::Ior => "IOR",
        }
    }
}

/// `BlenderPass` node settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlenderPass {
    pub passes: Vec<InternalPass>,
}

impl Default for BlenderPass {
    fn default() -> Self {
        Self {
            passes: vec![InternalPass::Combined],
        }
    }
}

impl BlenderPass {
    pub fn contribute(&self, _site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        for pass in &self.passes {
            push_pass(ctx, CATEGORY_INTERNAL, pass.as_str());
        }
        Ok(())
    }
}

/// `PBRPass` node settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PbrPass {
    pub passes: Vec<PbrChannel>,
}

impl PbrPass {
    pub fn contribute(&self, _site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        for pass in &self.passes {
            push_pass(ctx, CATEGORY_PBR, pass.as_str());
        }
        Ok(())
    }
}

/// `CustomPass` node settings: preset names plus per-preset overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CustomPass {
    pub presets: Vec<String>,
    pub params: BTreeMap<String, Map<String, Value>>,
}

impl CustomPass {
    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        for preset in &self.presets {
            if !push_pass(ctx, CATEGORY_ADVANCED, preset) {
                continue;
            }
            let overrides = self.params.get(preset.as_str());
            let values = resolve_params(site, preset, overrides)?;
            let slot = ctx.ensure_path(&[ADVANCED_BAKE_PARAMS, preset.as_str()]);
            for (key, value) in values {
                slot.insert(key, value);
            }
        }
        Ok(())
    }
}

/// Fill a preset's parameters from overrides and schema defaults.
///
/// Without a preset table the overrides are written through unchecked.
fn resolve_params(
    site: &Contribution,
    preset: &str,
    overrides: Option<&Map<String, Value>>,
) -> CompileResult<Map<String, Value>> {
    let Some(table) = site.presets else {
        return Ok(overrides.cloned().unwrap_or_default());
    };
    let descriptor = table
        .get(preset)
        .ok_or_else(|| CompileError::invalid(site.node, format!("unknown preset {preset}")))?;

    if let Some(overrides) = overrides {
        if let Some(unknown) = overrides.keys().find(|k| descriptor.param(k).is_none()) {
            return Err(CompileError::invalid(
                site.node,
                format!("preset {preset} has no parameter {unknown}"),
            ));
        }
    }

    let mut values = Map::new();
    for param in &descriptor.params {
        let value = match overrides.and_then(|o| o.get(&param.key)) {
            Some(v) => param
                .coerce(v)
                .map_err(|e| CompileError::invalid(site.node, e.to_string()))?,
            None => param.default_value(),
        };
        values.insert(param.key.clone(), value);
    }
    Ok(values)
}

/// Append `pass` to `Pass.<category>` unless present. Returns whether it was added.
pub(crate) fn push_pass(ctx: &mut Context, category: &str, pass: &str) -> bool {
    let passes = ctx.ensure_map(PASS);
    push_unique_in(ensure_list_in(passes, category), Value::String(pass.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site<'a>(linked: &'a [bool]) -> Contribution<'a> {
        Contribution {
            node: "Pass",
            linked,
            presets: None,
        }
    }

    #[test]
    fn test_blender_pass_default_is_combined() {
        let mut ctx = Context::new();
        BlenderPass::default().contribute(&site(&[]), &mut ctx).unwrap();
        assert_eq!(ctx.get(PASS), Some(&json!({"Internal": ["COMBINED"]})));
    }

    #[test]
    fn test_pass_dedup_across_nodes() {
        let mut ctx = Context::new();
        let a = BlenderPass {
            passes: vec![InternalPass::Ao, InternalPass::Combined],
        };
        let b = BlenderPass {
            passes: vec![InternalPass::Combined, InternalPass::Uv],
        };
        a.contribute(&site(&[]), &mut ctx).unwrap();
        b.contribute(&site(&[]), &mut ctx).unwrap();
        assert_eq!(
            ctx.get_path(&[PASS, CATEGORY_INTERNAL]),
            Some(&json!(["AO", "COMBINED", "UV"]))
        );
    }

    #[test]
    fn test_pbr_serde_names() {
        let pass: PbrPass = serde_json::from_value(json!({"passes": ["Albedo", "AO", "IOR"]})).unwrap();
        let mut ctx = Context::new();
        pass.contribute(&site(&[]), &mut ctx).unwrap();
        assert_eq!(ctx.get_path(&[PASS, CATEGORY_PBR]), Some(&json!(["Albedo", "AO", "IOR"])));
    }

    #[test]
    fn test_custom_pass_without_table_writes_overrides() {
        let mut params = BTreeMap::new();
        let mut ov = Map::new();
        ov.insert("distance".into(), json!(0.25));
        params.insert("ElementID".to_string(), ov);
        let node = CustomPass {
            presets: vec!["ElementID".into()],
            params,
        };
        let mut ctx = Context::new();
        node.contribute(&site(&[]), &mut ctx).unwrap();
        assert_eq!(ctx.get_path(&[PASS, CATEGORY_ADVANCED]), Some(&json!(["ElementID"])));
        assert_eq!(
            ctx.get_path(&[ADVANCED_BAKE_PARAMS, "ElementID", "distance"]),
            Some(&json!(0.25))
        );
    }
}
