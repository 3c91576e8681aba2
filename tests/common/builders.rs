//! Test data builders for graphs and scenes

use serde_json::{json, Value};
use texbake::graph::NodeGraph;
use texbake::host::{MemoryScene, SceneObject};

/// Builder for graph documents, linked by socket name or index
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Value>,
    links: Vec<Value>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Add a node; `settings` is merged next to `name` and `type`.
    pub fn node(mut self, name: &str, ty: &str, settings: Value) -> Self {
        let mut node = json!({ "name": name, "type": ty });
        if let (Some(node), Value::Object(extra)) = (node.as_object_mut(), settings) {
            node.extend(extra);
        }
        self.nodes.push(node);
        self
    }

    pub fn link(mut self, from: &str, from_socket: Value, to: &str, to_socket: Value) -> Self {
        self.links
            .push(json!({ "from": [from, from_socket], "to": [to, to_socket] }));
        self
    }

    pub fn document(&self) -> Value {
        json!({ "name": self.name, "nodes": self.nodes, "links": self.links })
    }

    pub fn build(self) -> NodeGraph {
        NodeGraph::from_json_str(&self.document().to_string()).expect("test graph is valid")
    }
}

/// Pass {COMBINED} + 64x64 settings + one mesh "Cube" → Bake → Save.
pub fn single_cube_graph() -> GraphBuilder {
    GraphBuilder::new("cube")
        .node("Pass", "BlenderPass", json!({ "passes": ["COMBINED"] }))
        .node(
            "Settings",
            "BakeSetting",
            json!({ "resolution": [64, 64], "samples": 1 }),
        )
        .node(
            "Mesh",
            "SingleMesh",
            json!({ "meshes": [{ "target": "Cube" }] }),
        )
        .node("Bake", "Bake", json!({}))
        .node("Out", "SaveToImage", json!({}))
        .link("Pass", json!(0), "Bake", json!("Pass"))
        .link("Settings", json!(0), "Bake", json!("Bake Setting"))
        .link("Mesh", json!(0), "Bake", json!("Meshes"))
        .link("Bake", json!(0), "Out", json!(0))
}

/// Scene with mesh objects in a "Props" collection.
pub fn scene_with(objects: &[&str]) -> MemoryScene {
    objects.iter().fold(MemoryScene::new("Scene"), |scene, name| {
        scene.with_object(SceneObject::mesh(*name).in_collection("Props"))
    })
}
