//! Mesh input nodes.
//!
//! Explicit lists contribute `[target, source, uv]` triples to `Meshes`.
//! Scene and collection nodes only record a lookup in `MeshSources`; the
//! Bake executor resolves it against the scene store at run time.

use super::Contribution;
use crate::graph::context::Context;
use crate::graph::error::{CompileError, CompileResult};
use crate::graph::socket::{SocketDescriptor, SocketKind};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Context key of the explicit mesh triples.
pub const MESHES: &str = "Meshes";
/// Context key of the deferred scene/collection lookups.
pub const MESH_SOURCES: &str = "MeshSources";

pub static OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::output("Mesh", SocketKind::Mesh)];

/// One bake target, with an optional high-poly source and UV map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MeshConfig {
    pub target: String,
    pub source: String,
    pub uv: String,
}

/// Settings shared by `SingleMesh` and `Mesh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MeshList {
    pub meshes: Vec<MeshConfig>,
}

impl MeshList {
    /// `keep_source` is false for `SingleMesh`, which bakes without a source.
    pub fn contribute(
        &self,
        _site: &Contribution,
        ctx: &mut Context,
        keep_source: bool,
    ) -> CompileResult<()> {
        let meshes = ctx.ensure_list(MESHES);
        for mesh in self.meshes.iter().filter(|m| !m.target.is_empty()) {
            let source = if keep_source { mesh.source.as_str() } else { "" };
            meshes.push(json!([mesh.target, source, mesh.uv]));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SceneMeshes {
    pub scene: String,
}

impl SceneMeshes {
    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        if self.scene.is_empty() {
            return Err(CompileError::invalid(site.node, "no scene selected"));
        }
        ctx.ensure_list(MESH_SOURCES)
            .push(json!({ "scene": self.scene }));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CollectionMeshes {
    pub collection: String,
}

impl CollectionMeshes {
    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        if self.collection.is_empty() {
            return Err(CompileError::invalid(site.node, "no collection selected"));
        }
        ctx.ensure_list(MESH_SOURCES)
            .push(json!({ "collection": self.collection }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Contribution<'static> {
        Contribution {
            node: "Mesh",
            linked: &[],
            presets: None,
        }
    }

    fn list() -> MeshList {
        MeshList {
            meshes: vec![
                MeshConfig {
                    target: "Low".into(),
                    source: "High".into(),
                    uv: "UVMap".into(),
                },
                MeshConfig::default(),
            ],
        }
    }

    #[test]
    fn test_mesh_keeps_source_and_skips_empty() {
        let mut ctx = Context::new();
        list().contribute(&site(), &mut ctx, true).unwrap();
        assert_eq!(ctx.get(MESHES), Some(&json!([["Low", "High", "UVMap"]])));
    }

    #[test]
    fn test_single_mesh_drops_source() {
        let mut ctx = Context::new();
        list().contribute(&site(), &mut ctx, false).unwrap();
        assert_eq!(ctx.get(MESHES), Some(&json!([["Low", "", "UVMap"]])));
    }

    #[test]
    fn test_scene_meshes_requires_scene() {
        let mut ctx = Context::new();
        assert!(SceneMeshes::default().contribute(&site(), &mut ctx).is_err());
        SceneMeshes {
            scene: "Scene".into(),
        }
        .contribute(&site(), &mut ctx)
        .unwrap();
        assert_eq!(ctx.get(MESH_SOURCES), Some(&json!([{"scene": "Scene"}])));
    }
}
