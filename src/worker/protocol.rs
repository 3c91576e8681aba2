//! Worker descriptor and output line protocol.
//!
//! The orchestrator hands each worker one JSON descriptor on the command
//! line. While the worker runs, every line it writes on stdout or stderr is
//! classified:
//!
//! | Line                                  | Meaning                          |
//! |---------------------------------------|----------------------------------|
//! | configured noise prefix, `Blender x.y.z` | dropped                       |
//! | `[CONTROL] <len>:<json>`              | structured [`ControlMessage`]    |
//! | `[RUN_PARAMS]: {json}`                | run-params bag for the next unit |
//! | `Fra:.. Mem:..M (Peak ..M) \| Time:..`  | render telemetry                 |
//! | anything else                         | diagnostic, logged at error      |
//!
//! Pixels never travel over these lines; they go through the shared buffer.

use crate::config::PresetDescriptor;
use crate::error::{BakeError, Result};
use crate::graph::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Command-line flag preceding the descriptor.
pub const DESCRIPTOR_FLAG: &str = "-bnc";
/// Legacy run-params sideband prefix.
pub const RUN_PARAMS_MARKER: &str = "[RUN_PARAMS]:";
/// Structured control frame prefix.
pub const CONTROL_MARKER: &str = "[CONTROL]";

/// `[target, source, uv]`; empty strings mean "none".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct MeshTriple(pub String, pub String, pub String);

impl MeshTriple {
    pub fn new(target: impl Into<String>, source: impl Into<String>, uv: impl Into<String>) -> Self {
        Self(target.into(), source.into(), uv.into())
    }

    pub fn target(&self) -> &str {
        &self.0
    }

    pub fn source(&self) -> &str {
        &self.1
    }

    pub fn uv(&self) -> &str {
        &self.2
    }
}

/// One (mesh, category, pass) piece of work. Serializes as `[[dst, src, uv], cat, pass]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(MeshTriple, String, String)", into = "(MeshTriple, String, String)")]
pub struct BakeUnit {
    pub mesh: MeshTriple,
    pub category: String,
    pub pass: String,
}

impl BakeUnit {
    pub fn new(mesh: MeshTriple, category: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            mesh,
            category: category.into(),
            pass: pass.into(),
        }
    }

    /// Name of the image this unit's pixels land in.
    pub fn image_name(&self) -> String {
        format!("{}_{}_{}", self.mesh.target(), self.category, self.pass)
    }
}

impl From<(MeshTriple, String, String)> for BakeUnit {
    fn from((mesh, category, pass): (MeshTriple, String, String)) -> Self {
        Self {
            mesh,
            category,
            pass,
        }
    }
}

impl From<BakeUnit> for (MeshTriple, String, String) {
    fn from(unit: BakeUnit) -> Self {
        (unit.mesh, unit.category, unit.pass)
    }
}

impl fmt::Display for BakeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}/{}]", self.mesh.target(), self.category, self.pass)
    }
}

/// Everything a worker needs for one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// The running task Context.
    pub ctx: Context,
    pub bake_params: BakeUnit,
    pub shm_name: String,
    /// Segment directory when not the platform default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shm_dir: Option<PathBuf>,
    pub shm_size: usize,
    pub resolution: [u32; 2],
    /// Carry-over bag from the previous unit of the batch.
    #[serde(default)]
    pub run_params: Map<String, Value>,
    /// Custom pass preset for `Advanced` units.
    #[serde(default)]
    pub preset: Option<PresetDescriptor>,
}

impl WorkerDescriptor {
    pub fn to_arg(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_arg(arg: &str) -> Result<Self> {
        serde_json::from_str(arg).map_err(|e| BakeError::Worker(format!("bad descriptor: {}", e)))
    }
}

// ==================== Control frames ====================

/// Structured worker → orchestrator message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Replace the run-params bag for the next unit.
    RunParams { params: Map<String, Value> },
    /// Pixels are in the shared buffer.
    Completed,
    Failed { reason: String },
}

impl ControlMessage {
    /// Encode as one `[CONTROL] <len>:<json>` line (no newline).
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{} {}:{}", CONTROL_MARKER, json.len(), json))
    }

    /// Decode the `<len>:<json>` part of a control line.
    pub fn decode(frame: &str) -> Result<Self> {
        let (len, body) = frame
            .split_once(':')
            .ok_or_else(|| BakeError::Worker(format!("control frame without length: {}", frame)))?;
        let len: usize = len
            .trim()
            .parse()
            .map_err(|_| BakeError::Worker(format!("bad control frame length: {}", len)))?;
        if body.len() != len {
            return Err(BakeError::Worker(format!(
                "control frame length {} does not match payload ({} bytes)",
                len,
                body.len()
            )));
        }
        serde_json::from_str(body)
            .map_err(|e| BakeError::Worker(format!("bad control frame: {}", e)))
    }
}

// ==================== Line classification ====================

/// What one worker output line means.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerLine {
    Noise,
    RunParams(Map<String, Value>),
    Control(ControlMessage),
    /// Reformatted render progress.
    Telemetry(String),
    Diagnostic(String),
}

/// Classifies worker output lines.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    noise_prefixes: Vec<String>,
    version: Regex,
    run_params: Regex,
    telemetry: Regex,
}

impl LineClassifier {
    pub fn new(noise_prefixes: Vec<String>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| BakeError::Worker(format!("bad pattern: {}", e)))
        };
        Ok(Self {
            noise_prefixes,
            version: compile(r"^Blender \d+\.\d+\.\d+")?,
            run_params: compile(r"^\[RUN_PARAMS\]: (\{.*\})")?,
            telemetry: compile(
                r"^Fra:(\d+) Mem:(\d+\.\d+)M \(Peak (\d+\.\d+)M\) \| Time:(\d+:\S*) \| Mem:(\d+\.\d+)M, Peak:(\d+\.\d+)M (.*)$",
            )?,
        })
    }

    pub fn classify(&self, line: &str) -> WorkerLine {
        let line = line.trim();
        if line.is_empty() || self.noise_prefixes.iter().any(|p| line.starts_with(p.as_str())) {
            return WorkerLine::Noise;
        }

        if let Some(frame) = line.strip_prefix(CONTROL_MARKER) {
            return match ControlMessage::decode(frame.trim_start()) {
                Ok(message) => WorkerLine::Control(message),
                Err(e) => WorkerLine::Diagnostic(format!("{} ({})", line, e)),
            };
        }

        if let Some(caps) = self.run_params.captures(line) {
            return match serde_json::from_str::<Map<String, Value>>(&caps[1]) {
                Ok(params) => WorkerLine::RunParams(params),
                Err(e) => WorkerLine::Diagnostic(format!("{} ({})", line, e)),
            };
        }

        if self.version.is_match(line) {
            return WorkerLine::Noise;
        }

        let line = line.replace("| Scene ", "");
        if let Some(caps) = self.telemetry.captures(&line) {
            return WorkerLine::Telemetry(format!("Fra:{} Mem:{}M {}", &caps[1], &caps[2], &caps[7]));
        }

        WorkerLine::Diagnostic(line)
    }
}
