//! In-process `UnitRunner`s for driving the scheduler without worker processes

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use texbake::worker::client::fill_pixels;
use texbake::worker::shm::segment_dir;
use texbake::worker::{SharedBuffer, UnitReport, UnitRequest, UnitRunner};
use texbake::Result;

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct RecordedUnit {
    pub image_name: String,
    pub run_params: Map<String, Value>,
    pub resolution: [u32; 2],
}

/// Writes deterministic pixels like the reference worker and records every call.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<RecordedUnit>>>,
    /// Image names whose unit reports a failed exit.
    failing: Arc<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(names: &[&str]) -> Self {
        Self {
            calls: Arc::default(),
            failing: Arc::new(names.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedUnit> {
        self.calls.lock().unwrap().clone()
    }
}

impl UnitRunner for RecordingRunner {
    fn run_unit(&self, request: &UnitRequest) -> Result<UnitReport> {
        let d = &request.descriptor;
        let image_name = d.bake_params.image_name();
        self.calls.lock().unwrap().push(RecordedUnit {
            image_name: image_name.clone(),
            run_params: d.run_params.clone(),
            resolution: d.resolution,
        });

        if self.failing.contains(&image_name) {
            return Ok(UnitReport {
                exit_ok: false,
                exit_code: Some(2),
                ..Default::default()
            });
        }

        let dir = d.shm_dir.clone().unwrap_or_else(segment_dir);
        let mut buffer = SharedBuffer::attach_in(&dir, &d.shm_name)?;
        let [w, h] = d.resolution;
        buffer.write_pixels(&fill_pixels(&d.bake_params, w, h))?;
        buffer.flush()?;

        let count = d
            .run_params
            .get("elementsCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let mut params = Map::new();
        params.insert("elementsCount".into(), Value::from(count + 1));
        Ok(UnitReport {
            run_params: Some(params),
            completed: true,
            ..UnitReport::success()
        })
    }
}
