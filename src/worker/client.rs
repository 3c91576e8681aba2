//! Worker side of the protocol.
//!
//! A worker process reads its descriptor from the command line, attaches to
//! the shared buffer the orchestrator allocated, writes exactly one unit's
//! pixels and reports back through control frames on stderr.

use super::protocol::{BakeUnit, ControlMessage, WorkerDescriptor, DESCRIPTOR_FLAG, RUN_PARAMS_MARKER};
use super::shm::{segment_dir, SharedBuffer};
use crate::error::{BakeError, Result};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;

/// Find and parse the descriptor following `-bnc`.
pub fn descriptor_from_args<S: AsRef<str>>(args: &[S]) -> Result<WorkerDescriptor> {
    let position = args
        .iter()
        .position(|a| a.as_ref() == DESCRIPTOR_FLAG)
        .ok_or_else(|| BakeError::Worker(format!("missing {} argument", DESCRIPTOR_FLAG)))?;
    let arg = args
        .get(position + 1)
        .ok_or_else(|| BakeError::Worker(format!("{} without a descriptor", DESCRIPTOR_FLAG)))?;
    WorkerDescriptor::from_arg(arg.as_ref())
}

/// The snapshot path: the first positional argument before `--`.
pub fn snapshot_from_args<S: AsRef<str>>(args: &[S]) -> Option<PathBuf> {
    args.iter()
        .map(AsRef::as_ref)
        .take_while(|a| *a != "--")
        .find(|a| !a.starts_with('-'))
        .map(PathBuf::from)
}

/// An attached unit of work.
#[derive(Debug)]
pub struct WorkerSession {
    descriptor: WorkerDescriptor,
    buffer: SharedBuffer,
}

impl WorkerSession {
    /// Attach to the descriptor's buffer and check it fits the resolution.
    pub fn open(descriptor: WorkerDescriptor) -> Result<Self> {
        let dir = descriptor.shm_dir.clone().unwrap_or_else(segment_dir);
        let buffer = SharedBuffer::attach_in(&dir, &descriptor.shm_name)?;
        let [w, h] = descriptor.resolution;
        let needed = super::shm::buffer_size(w, h);
        if buffer.len() < needed || buffer.len() != descriptor.shm_size {
            return Err(BakeError::SharedBuffer(format!(
                "segment {} is {} bytes, descriptor expects {} for {}x{}",
                descriptor.shm_name,
                buffer.len(),
                descriptor.shm_size,
                w,
                h
            )));
        }
        Ok(Self { descriptor, buffer })
    }

    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    pub fn unit(&self) -> &BakeUnit {
        &self.descriptor.bake_params
    }

    pub fn resolution(&self) -> (u32, u32) {
        let [w, h] = self.descriptor.resolution;
        (w, h)
    }

    pub fn run_params(&self) -> &Map<String, Value> {
        &self.descriptor.run_params
    }

    /// Write the unit's RGBA float pixels and flush them to the segment.
    pub fn write_pixels(&mut self, pixels: &[f32]) -> Result<()> {
        self.buffer.write_pixels(pixels)?;
        self.buffer.flush()
    }
}

/// Writes control frames, one per line, flushing after each.
#[derive(Debug)]
pub struct ControlWriter<W: Write> {
    out: W,
}

impl<W: Write> ControlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn send(&mut self, message: &ControlMessage) -> Result<()> {
        let line = message.encode()?;
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn run_params(&mut self, params: Map<String, Value>) -> Result<()> {
        self.send(&ControlMessage::RunParams { params })
    }

    /// Emit the bare `[RUN_PARAMS]: {json}` marker older scripts use.
    pub fn legacy_run_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        writeln!(self.out, "{} {}", RUN_PARAMS_MARKER, Value::Object(params.clone()))?;
        self.out.flush()?;
        Ok(())
    }

    pub fn completed(&mut self) -> Result<()> {
        self.send(&ControlMessage::Completed)
    }

    pub fn failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.send(&ControlMessage::Failed {
            reason: reason.into(),
        })
    }
}

/// Deterministic opaque color for a unit, derived from its image name.
pub fn unit_color(unit: &BakeUnit) -> [f32; 4] {
    let hash = unit
        .image_name()
        .bytes()
        .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
    let channel = |shift: u32| ((hash >> shift) & 0xff) as f32 / 255.0;
    [channel(0), channel(8), channel(16), 1.0]
}

/// A full frame of [`unit_color`].
pub fn fill_pixels(unit: &BakeUnit, width: u32, height: u32) -> Vec<f32> {
    let color = unit_color(unit);
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..width as usize * height as usize {
        pixels.extend_from_slice(&color);
    }
    pixels
}
