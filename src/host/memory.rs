//! JSON-backed scene store.
//!
//! ```json
//! {
//!     "name": "Scene",
//!     "objects": [
//!         {"name": "Cube", "kind": "MESH", "collections": ["Props"]},
//!         {"name": "Light", "kind": "LIGHT"}
//!     ]
//! }
//! ```
//!
//! Snapshots are the same document plus a `saved_at` timestamp; images are
//! not part of them since workers write pixels through the shared buffer.

use super::image::ImageBuffer;
use super::SceneStore;
use crate::error::{BakeError, Result, ResultExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    #[default]
    Mesh,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(default)]
    pub kind: ObjectKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
}

impl SceneObject {
    pub fn mesh(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Mesh,
            collections: Vec::new(),
        }
    }

    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.collections.push(collection.into());
        self
    }
}

/// In-memory scene with a single named scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryScene {
    #[serde(default = "default_scene_name")]
    pub name: String,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
    #[serde(skip)]
    images: BTreeMap<String, ImageBuffer>,
}

fn default_scene_name() -> String {
    "Scene".to_string()
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new(default_scene_name())
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    scene: &'a MemoryScene,
}

impl MemoryScene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            images: BTreeMap::new(),
        }
    }

    pub fn with_object(mut self, object: SceneObject) -> Self {
        self.objects.push(object);
        self
    }

    /// Load a scene document or a snapshot.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene {:?}", path))?;
        serde_json::from_str(&content)
            .map_err(|e| BakeError::Serialization(format!("scene {:?}: {}", path, e)))
    }

    pub fn image_names(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    fn meshes(&self, filter: impl Fn(&SceneObject) -> bool) -> Vec<String> {
        self.objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Mesh && filter(o))
            .map(|o| o.name.clone())
            .collect()
    }
}

impl SceneStore for MemoryScene {
    fn has_object(&self, name: &str) -> bool {
        self.objects.iter().any(|o| o.name == name)
    }

    fn mesh_objects_in_scene(&self, scene: &str) -> Option<Vec<String>> {
        (scene == self.name).then(|| self.meshes(|_| true))
    }

    fn mesh_objects_in_collection(&self, collection: &str) -> Option<Vec<String>> {
        let exists = self
            .objects
            .iter()
            .any(|o| o.collections.iter().any(|c| c == collection));
        exists.then(|| self.meshes(|o| o.collections.iter().any(|c| c == collection)))
    }

    fn image(&self, name: &str) -> Option<&ImageBuffer> {
        self.images.get(name)
    }

    fn insert_image(&mut self, image: ImageBuffer) {
        self.images.insert(image.name.clone(), image);
    }

    fn save_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            scene: self,
        };
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write snapshot {:?}", path))
    }
}
