//! The launcher against the reference worker binary

mod common;

use common::builders::{scene_with, single_cube_graph};
use common::wait_until;
use serde_json::{json, Map, Value};
use serial_test::serial;
use std::path::Path;
use std::sync::Arc;
use texbake::config::{PresetDescriptor, PresetTable, SchedulerConfig, WorkerConfig};
use texbake::graph::{Context, GraphCompiler};
use texbake::host::{self, SceneStore};
use texbake::registry::NodeRegistry;
use texbake::scheduler::{SchedulerDeps, TaskScheduler};
use texbake::worker::client::fill_pixels;
use texbake::worker::{
    buffer_size, BakeUnit, MeshTriple, ProcessLauncher, SharedBufferPool, UnitRequest, UnitRunner,
    WorkerDescriptor,
};

const RESOLUTION: u32 = 32;

fn worker_config(dir: &Path) -> WorkerConfig {
    WorkerConfig {
        snapshot_dir: Some(dir.to_path_buf()),
        ..WorkerConfig::direct(env!("CARGO_BIN_EXE_texbake-worker"))
    }
}

/// Snapshot with a single `Cube`, written into `dir`.
fn snapshot(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("scene.json");
    scene_with(&["Cube"]).save_snapshot(&path).unwrap();
    path
}

fn descriptor(
    unit: BakeUnit,
    pool: &SharedBufferPool,
    shm_name: &str,
    run_params: Map<String, Value>,
    preset: Option<PresetDescriptor>,
) -> WorkerDescriptor {
    WorkerDescriptor {
        ctx: Context::new(),
        bake_params: unit,
        shm_name: shm_name.to_string(),
        shm_dir: Some(pool.dir().to_path_buf()),
        shm_size: buffer_size(RESOLUTION, RESOLUTION),
        resolution: [RESOLUTION, RESOLUTION],
        run_params,
        preset,
    }
}

#[test]
#[serial]
fn test_worker_fills_shared_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let pool = SharedBufferPool::in_dir(dir.path());
    let buffer = pool.allocate(buffer_size(RESOLUTION, RESOLUTION)).unwrap();
    let unit = BakeUnit::new(MeshTriple::new("Cube", "", ""), "Internal", "COMBINED");

    let launcher = ProcessLauncher::new(worker_config(dir.path())).unwrap();
    let report = launcher
        .run_unit(&UnitRequest {
            descriptor: descriptor(unit.clone(), &pool, buffer.name(), Map::new(), None),
            snapshot: snapshot(dir.path()),
        })
        .unwrap();

    assert!(report.succeeded(), "report: {:?}", report);
    assert!(report.completed);
    assert!(report.run_params.is_none());
    assert_eq!(buffer.read_pixels(), fill_pixels(&unit, RESOLUTION, RESOLUTION));
    pool.release(buffer).unwrap();
}

#[test]
#[serial]
fn test_advanced_unit_counts_elements() {
    let dir = tempfile::tempdir().unwrap();
    let pool = SharedBufferPool::in_dir(dir.path());
    let buffer = pool.allocate(buffer_size(RESOLUTION, RESOLUTION)).unwrap();
    let unit = BakeUnit::new(MeshTriple::new("Cube", "", ""), "Advanced", "ElementID");
    let preset = PresetDescriptor::from_json_str("ElementID", r#"{"Name": "ElementID"}"#).unwrap();

    let mut params = Map::new();
    params.insert("elementsCount".into(), json!(7));
    let launcher = ProcessLauncher::new(worker_config(dir.path())).unwrap();
    let report = launcher
        .run_unit(&UnitRequest {
            descriptor: descriptor(unit, &pool, buffer.name(), params, Some(preset)),
            snapshot: snapshot(dir.path()),
        })
        .unwrap();

    assert!(report.succeeded(), "report: {:?}", report);
    let carried = report.run_params.expect("run params emitted");
    assert_eq!(carried.get("elementsCount"), Some(&json!(8)));
    pool.release(buffer).unwrap();
}

#[test]
#[serial]
fn test_missing_target_fails_with_status_two() {
    let dir = tempfile::tempdir().unwrap();
    let pool = SharedBufferPool::in_dir(dir.path());
    let buffer = pool.allocate(buffer_size(RESOLUTION, RESOLUTION)).unwrap();
    let unit = BakeUnit::new(MeshTriple::new("Torus", "", ""), "Internal", "AO");

    let launcher = ProcessLauncher::new(worker_config(dir.path())).unwrap();
    let report = launcher
        .run_unit(&UnitRequest {
            descriptor: descriptor(unit, &pool, buffer.name(), Map::new(), None),
            snapshot: snapshot(dir.path()),
        })
        .unwrap();

    assert!(!report.succeeded());
    assert!(!report.exit_ok);
    assert_eq!(report.exit_code, Some(2));
    let reason = report.failure_reason().unwrap();
    assert!(reason.contains("Torus"), "reason: {}", reason);
    // Untouched buffer stays zeroed.
    assert!(buffer.read_pixels().iter().all(|&v| v == 0.0));
    pool.release(buffer).unwrap();
}

#[test]
#[serial]
fn test_scheduler_with_worker_processes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pool = SharedBufferPool::in_dir(dir.path().join("shm"));
    std::fs::create_dir_all(pool.dir()).unwrap();
    let scene = host::shared(scene_with(&["Cube"]));
    let worker = worker_config(dir.path());

    let graph = single_cube_graph().build();
    let mut tasks = GraphCompiler::new().compile(&graph).into_tasks(graph.name());
    tasks[0]
        .context
        .ensure_map("SaveConfig")
        .insert("Directory".into(), json!(out.to_string_lossy()));

    let mut scheduler = TaskScheduler::new(SchedulerDeps {
        registry: NodeRegistry::shared(),
        scene: scene.clone(),
        runner: Arc::new(ProcessLauncher::new(worker.clone()).unwrap()),
        buffers: pool,
        presets: Arc::new(PresetTable::new()),
        worker,
        config: SchedulerConfig::default(),
    });
    let mut bridge = scheduler.start().unwrap();
    scheduler.submit_all(tasks);

    wait_until(&mut bridge, |s| s.finished.len() == 1);
    assert!(bridge.state().finished[0].ok);
    scheduler.shutdown();

    let image = scene
        .lock()
        .unwrap()
        .image("Cube_Internal_COMBINED")
        .cloned()
        .expect("pixels published to the scene");
    assert_eq!(image.size(), (64, 64));
    assert!(out.join("Cube_COMBINED.png").exists());
}
