//! Host scene/data store seam.
//!
//! Node executors look up objects and read/write images through
//! [`SceneStore`]. The scheduler and compiler never touch it. A JSON-backed
//! [`MemoryScene`] stands in for the host application outside of it.

pub mod image;
pub mod memory;

pub use image::{ColorMode, ImageBuffer, ImageFileFormat, ImageSettings};
pub use memory::{MemoryScene, ObjectKind, SceneObject};

use crate::error::Result;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Named lookup of objects and images in the host scene.
pub trait SceneStore: Send {
    fn has_object(&self, name: &str) -> bool;

    /// Mesh objects of a scene, or `None` if the scene does not exist.
    fn mesh_objects_in_scene(&self, scene: &str) -> Option<Vec<String>>;

    /// Mesh objects of a collection and its children, or `None` if absent.
    fn mesh_objects_in_collection(&self, collection: &str) -> Option<Vec<String>>;

    fn image(&self, name: &str) -> Option<&ImageBuffer>;

    /// Insert or replace an image by name.
    fn insert_image(&mut self, image: ImageBuffer);

    /// Write a snapshot a worker process can open.
    fn save_snapshot(&self, path: &Path) -> Result<()>;
}

/// Scene store shared between the presentation side and the scheduler thread.
pub type SharedScene = Arc<Mutex<dyn SceneStore>>;

/// Wrap a store for sharing.
pub fn shared<S: SceneStore + 'static>(scene: S) -> SharedScene {
    Arc::new(Mutex::new(scene))
}
