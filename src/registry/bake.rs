//! `Bake` executor.
//!
//! Enumerates the task's bake units, runs each one through a worker process
//! and publishes the pixels it left in the shared buffer as a scene image.
//! Units run strictly one after another; the run-params bag a worker emits
//! is handed to the next unit of the same node.

use super::{ExecutionEnv, ScopeTimer};
use crate::error::{BakeError, Result};
use crate::graph::nodes::mesh::{MESHES, MESH_SOURCES};
use crate::graph::nodes::pass::{CATEGORY_ADVANCED, PASS};
use crate::graph::nodes::settings::resolution_of;
use crate::graph::Context;
use crate::host::{ImageBuffer, SceneStore};
use crate::worker::shm::{buffer_size, segment_dir, SharedBuffer};
use crate::worker::{BakeUnit, MeshTriple, UnitRequest, WorkerDescriptor};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Results key: `OutImages.<dst>.<cat>.<pass> = image name`.
pub const OUT_IMAGES: &str = "OutImages";
/// Results key: list of `{unit, reason}` for units that did not publish.
pub const FAILED_UNITS: &str = "FailedUnits";

/// Resolution used when the task carries no `BakeSettings`.
const FALLBACK_RESOLUTION: (u32, u32) = (512, 512);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BakeExecutor;

impl BakeExecutor {
    pub fn execute(
        &self,
        env: &mut ExecutionEnv<'_>,
        ctx: &mut Context,
        _previous: Context,
    ) -> Result<Context> {
        let (width, height) = resolution_of(ctx).unwrap_or(FALLBACK_RESOLUTION);

        let (units, snapshot) = {
            let scene = env.scene()?;
            let units = enumerate_units(ctx, &*scene);
            if units.is_empty() {
                tracing::warn!("{}: nothing to bake", env.node_name);
                return Ok(Context::new());
            }
            let snapshot = snapshot_path(env);
            scene.save_snapshot(&snapshot)?;
            (units, snapshot)
        };
        tracing::info!(
            "{}: {} units at {}x{}",
            env.node_name,
            units.len(),
            width,
            height
        );

        let mut buffer = env.buffers.allocate(buffer_size(width, height))?;
        let shm_dir = (env.buffers.dir() != segment_dir()).then(|| env.buffers.dir().to_path_buf());
        let mut run_params = Map::new();
        let total = units.len();

        for (index, unit) in units.iter().enumerate() {
            let span = tracing::info_span!(
                "unit",
                index,
                dst = unit.mesh.target(),
                cat = unit.category.as_str(),
                pass = unit.pass.as_str()
            );
            let _enter = span.enter();
            env.progress.node_progress(index as f32 / total as f32);
            let _timer = ScopeTimer::new(format!("Bake {}", unit));

            let request = UnitRequest {
                descriptor: WorkerDescriptor {
                    ctx: ctx.clone(),
                    bake_params: unit.clone(),
                    shm_name: buffer.name().to_string(),
                    shm_dir: shm_dir.clone(),
                    shm_size: buffer.len(),
                    resolution: [width, height],
                    run_params: run_params.clone(),
                    preset: None,
                },
                snapshot: snapshot.clone(),
            };

            let outcome = run_one(env, request, &mut run_params)
                .and_then(|()| publish(env, unit, &buffer, width, height));
            match outcome {
                Ok(name) => {
                    ctx.ensure_path(&[OUT_IMAGES, unit.mesh.target(), unit.category.as_str()])
                        .insert(unit.pass.clone(), Value::String(name));
                }
                Err(e) => {
                    tracing::error!("{} failed: {}", unit, e);
                    ctx.ensure_list(FAILED_UNITS).push(json!({
                        "unit": unit,
                        "reason": e.to_string(),
                    }));
                }
            }
            buffer.zero();
        }

        env.progress.node_progress(1.0);
        if let Err(e) = buffer.release() {
            tracing::warn!("{}", e);
        }

        let mut out = Context::new();
        for key in [OUT_IMAGES, FAILED_UNITS] {
            if let Some(value) = ctx.get(key) {
                out.insert(key, value.clone());
            }
        }
        Ok(out)
    }
}

/// Launch one unit. `run_params` is replaced only when the worker emitted a bag.
fn run_one(
    env: &ExecutionEnv<'_>,
    mut request: UnitRequest,
    run_params: &mut Map<String, Value>,
) -> Result<()> {
    let unit = &request.descriptor.bake_params;
    if unit.category == CATEGORY_ADVANCED {
        let preset = env
            .presets
            .get(&unit.pass)
            .ok_or_else(|| BakeError::missing("preset", unit.pass.clone()))?;
        request.descriptor.preset = Some(preset.clone());
    }

    let report = env.runner.run_unit(&request)?;
    if let Some(params) = report.run_params.clone() {
        *run_params = params;
    }
    match report.failure_reason() {
        Some(reason) => Err(BakeError::Worker(reason)),
        None => Ok(()),
    }
}

/// Copy the buffer into the unit's scene image.
fn publish(
    env: &ExecutionEnv<'_>,
    unit: &BakeUnit,
    buffer: &SharedBuffer,
    width: u32,
    height: u32,
) -> Result<String> {
    let name = unit.image_name();
    let image = ImageBuffer::from_pixels(name.clone(), width, height, buffer.read_pixels())?;
    env.scene()?.insert_image(image);
    tracing::debug!("Published {}", name);
    Ok(name)
}

fn snapshot_path(env: &ExecutionEnv<'_>) -> PathBuf {
    let safe: String = env
        .node_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    env.worker
        .snapshot_dir()
        .join(format!("BAKE_NODE_{}.json", safe))
}

/// Every (mesh, category, pass) combination of the task, in bake order.
pub fn enumerate_units(ctx: &Context, scene: &dyn SceneStore) -> Vec<BakeUnit> {
    let mut meshes: Vec<MeshTriple> = Vec::new();
    let mut push = |triple: MeshTriple| {
        if !meshes.contains(&triple) {
            meshes.push(triple);
        }
    };

    for value in ctx.get(MESHES).and_then(Value::as_array).into_iter().flatten() {
        match serde_json::from_value::<MeshTriple>(value.clone()) {
            Ok(triple) => push(triple),
            Err(e) => tracing::warn!("Skipping malformed mesh entry {}: {}", value, e),
        }
    }

    for source in ctx.get(MESH_SOURCES).and_then(Value::as_array).into_iter().flatten() {
        let resolved = if let Some(name) = source.get("scene").and_then(Value::as_str) {
            scene.mesh_objects_in_scene(name)
        } else if let Some(name) = source.get("collection").and_then(Value::as_str) {
            scene.mesh_objects_in_collection(name)
        } else {
            tracing::warn!("Skipping malformed mesh source {}", source);
            continue;
        };
        match resolved {
            Some(objects) => objects
                .into_iter()
                .for_each(|name| push(MeshTriple::new(name, "", ""))),
            None => tracing::warn!("Mesh source {} not found in scene", source),
        }
    }

    let passes: Vec<(String, String)> = ctx
        .get(PASS)
        .and_then(Value::as_object)
        .map(|categories| {
            categories
                .iter()
                .flat_map(|(cat, list)| {
                    list.as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(Value::as_str)
                        .map(move |pass| (cat.clone(), pass.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut units = Vec::new();
    for mesh in meshes {
        if !scene.has_object(mesh.target()) {
            tracing::warn!("Object {} not in scene, skipping", mesh.target());
            continue;
        }
        for (cat, pass) in &passes {
            units.push(BakeUnit::new(mesh.clone(), cat.clone(), pass.clone()));
        }
    }
    units
}
