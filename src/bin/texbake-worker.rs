//! Reference bake worker.
//!
//! Speaks the worker protocol without a renderer: it checks the unit's
//! target exists in the scene snapshot, fills the shared buffer with a color
//! derived from the unit, and for `Advanced` units counts processed elements
//! through the run-params bag.
//!
//! Usage: `texbake-worker <snapshot.json> -- -bnc <descriptor>`
//!
//! Exit codes: 0 success, 1 protocol or IO error, 2 target not in snapshot.

use serde_json::{Map, Value};
use std::io::Write;
use std::process::ExitCode;
use texbake::graph::nodes::pass::CATEGORY_ADVANCED;
use texbake::host::{MemoryScene, SceneStore};
use texbake::worker::client::{self, ControlWriter, WorkerSession};
use texbake::Result;

/// Run-params key carried between Advanced units.
const ELEMENTS_COUNT: &str = "elementsCount";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut control = ControlWriter::new(std::io::stderr());

    match run(&args, &mut control) {
        Ok(code) => code,
        Err(e) => {
            // Nothing else to report to if stderr itself is gone.
            let _ = control.failed(e.to_string());
            ExitCode::from(1)
        }
    }
}

fn run<W: Write>(args: &[String], control: &mut ControlWriter<W>) -> Result<ExitCode> {
    let descriptor = client::descriptor_from_args(args)?;
    let snapshot = client::snapshot_from_args(args).ok_or_else(|| {
        texbake::BakeError::Worker("missing snapshot argument".to_string())
    })?;
    let scene = MemoryScene::load(&snapshot)?;

    let unit = descriptor.bake_params.clone();
    if !scene.has_object(unit.mesh.target()) {
        control.failed(format!("object {} not in snapshot", unit.mesh.target()))?;
        return Ok(ExitCode::from(2));
    }

    let mut session = WorkerSession::open(descriptor)?;
    let (width, height) = session.resolution();
    session.write_pixels(&client::fill_pixels(&unit, width, height))?;

    let mem = width as f64 * height as f64 * 16.0 / 1_048_576.0;
    let mut stdout = std::io::stdout();
    writeln!(
        stdout,
        "Fra:1 Mem:{:.2}M (Peak {:.2}M) | Time:00:00.01 | Mem:0.00M, Peak:0.00M | Scene Baked {}",
        mem, mem, unit
    )?;
    stdout.flush()?;

    if unit.category == CATEGORY_ADVANCED {
        let count = session
            .run_params()
            .get(ELEMENTS_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let mut params = Map::new();
        params.insert(ELEMENTS_COUNT.to_string(), Value::from(count + 1));
        control.legacy_run_params(&params)?;
    }

    control.completed()?;
    Ok(ExitCode::SUCCESS)
}
