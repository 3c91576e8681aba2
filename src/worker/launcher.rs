//! Launches one worker process per bake unit and supervises its output.

use super::protocol::{ControlMessage, LineClassifier, WorkerDescriptor, WorkerLine};
use crate::config::WorkerConfig;
use crate::error::{BakeError, Result};
use crossbeam_channel::{unbounded, Sender};
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

/// Input for one worker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRequest {
    pub descriptor: WorkerDescriptor,
    /// Scene snapshot the worker opens.
    pub snapshot: PathBuf,
}

/// What a finished worker reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitReport {
    /// Process exited with status 0.
    pub exit_ok: bool,
    pub exit_code: Option<i32>,
    /// Last run-params bag the worker emitted, if any.
    pub run_params: Option<Map<String, Value>>,
    /// Worker sent an explicit `Completed` frame.
    pub completed: bool,
    /// Worker sent a `Failed` frame.
    pub failure: Option<String>,
    /// Unrecognized lines, in arrival order.
    pub diagnostics: Vec<String>,
}

impl UnitReport {
    /// Successful exit with no reported failure.
    pub fn success() -> Self {
        Self {
            exit_ok: true,
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_ok && self.failure.is_none()
    }

    /// Human-readable reason for a failed unit.
    pub fn failure_reason(&self) -> Option<String> {
        if let Some(reason) = &self.failure {
            return Some(reason.clone());
        }
        if self.exit_ok {
            return None;
        }
        Some(match self.exit_code {
            Some(code) => format!("worker exited with status {}", code),
            None => "worker terminated by signal".to_string(),
        })
    }

    /// Fold one classified line into the report.
    pub fn absorb(&mut self, line: WorkerLine) {
        match line {
            WorkerLine::Noise => {}
            WorkerLine::RunParams(params)
            | WorkerLine::Control(ControlMessage::RunParams { params }) => {
                tracing::debug!("Run params: {}", serde_json::Value::Object(params.clone()));
                self.run_params = Some(params);
            }
            WorkerLine::Control(ControlMessage::Completed) => self.completed = true,
            WorkerLine::Control(ControlMessage::Failed { reason }) => {
                tracing::error!("Worker reported failure: {}", reason);
                self.failure = Some(reason);
            }
            WorkerLine::Telemetry(text) => tracing::info!("{}", text),
            WorkerLine::Diagnostic(text) => {
                tracing::error!("{}", text);
                self.diagnostics.push(text);
            }
        }
    }
}

/// Runs one bake unit to completion.
#[cfg_attr(test, mockall::automock)]
pub trait UnitRunner: Send + Sync {
    fn run_unit(&self, request: &UnitRequest) -> Result<UnitReport>;
}

/// [`UnitRunner`] that spawns the configured worker program.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: WorkerConfig,
    classifier: LineClassifier,
}

impl ProcessLauncher {
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let classifier = LineClassifier::new(config.noise_prefixes.clone())?;
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Substitute `{snapshot}`, `{script}` and `{descriptor}` into the template.
    pub fn build_args(&self, request: &UnitRequest) -> Result<Vec<String>> {
        let descriptor = request.descriptor.to_arg()?;
        let snapshot = request.snapshot.to_string_lossy();
        let script = self
            .config
            .script
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        self.config
            .args
            .iter()
            .map(|arg| {
                let mut arg = arg.replace("{snapshot}", &snapshot);
                if arg.contains("{script}") {
                    let script = script.as_deref().ok_or_else(|| {
                        BakeError::Config("worker.script is not configured".to_string())
                    })?;
                    arg = arg.replace("{script}", script);
                }
                Ok(arg.replace("{descriptor}", &descriptor))
            })
            .collect()
    }
}

/// Forward each output line until EOF. Bytes that are not UTF-8 are replaced
/// so one bad line never ends the stream.
fn forward_lines<R: Read + Send + 'static>(
    stream: R,
    tx: Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut receiver_gone = false;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Worker output read failed: {}", e);
                    break;
                }
            }
            if receiver_gone {
                // Keep the pipe open so the worker never sees EPIPE.
                continue;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if tx.send(line.to_string()).is_err() {
                receiver_gone = true;
            }
        }
    })
}

impl UnitRunner for ProcessLauncher {
    fn run_unit(&self, request: &UnitRequest) -> Result<UnitReport> {
        let args = self.build_args(request)?;
        tracing::trace!("Spawning {} {:?}", self.config.program, args);

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BakeError::Worker(format!("failed to spawn {}: {}", self.config.program, e))
            })?;

        let (tx, rx) = unbounded();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut report = UnitReport::default();
        // Ends once both pipes are closed.
        for line in rx.iter() {
            report.absorb(self.classifier.classify(&line));
        }

        let status = child
            .wait()
            .map_err(|e| BakeError::Worker(format!("failed to wait for worker: {}", e)))?;
        for reader in readers {
            if reader.join().is_err() {
                tracing::warn!("Worker output reader panicked");
            }
        }

        report.exit_ok = status.success();
        report.exit_code = status.code();
        if !report.exit_ok {
            tracing::error!("Worker exited with {}", status);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Context;
    use crate::worker::protocol::{BakeUnit, MeshTriple};
    use serde_json::json;

    fn request() -> UnitRequest {
        UnitRequest {
            descriptor: WorkerDescriptor {
                ctx: Context::new(),
                bake_params: BakeUnit::new(MeshTriple::new("Cube", "", ""), "Internal", "AO"),
                shm_name: "texbake_test".into(),
                shm_dir: None,
                shm_size: 16,
                resolution: [1, 1],
                run_params: Map::new(),
                preset: None,
            },
            snapshot: PathBuf::from("/tmp/BAKE_NODE_Bake.json"),
        }
    }

    #[test]
    fn test_build_args_substitutes_template() {
        let mut config = WorkerConfig::default();
        config.script = Some(PathBuf::from("/opt/run.py"));
        let launcher = ProcessLauncher::new(config).unwrap();
        let args = launcher.build_args(&request()).unwrap();

        assert_eq!(args[0], "/tmp/BAKE_NODE_Bake.json");
        assert_eq!(args[3], "/opt/run.py");
        assert_eq!(args[6], "-bnc");
        let descriptor = WorkerDescriptor::from_arg(&args[7]).unwrap();
        assert_eq!(descriptor.bake_params.pass, "AO");
    }

    #[test]
    fn test_missing_script_is_config_error() {
        let launcher = ProcessLauncher::new(WorkerConfig::default()).unwrap();
        assert!(matches!(
            launcher.build_args(&request()),
            Err(BakeError::Config(_))
        ));
    }

    #[test]
    fn test_report_absorbs_lines() {
        let mut report = UnitReport::default();
        let mut params = Map::new();
        params.insert("elementsCount".into(), json!(2));
        report.absorb(WorkerLine::Noise);
        report.absorb(WorkerLine::RunParams(params.clone()));
        report.absorb(WorkerLine::Diagnostic("odd".into()));
        report.absorb(WorkerLine::Control(ControlMessage::Completed));
        assert_eq!(report.run_params, Some(params));
        assert_eq!(report.diagnostics, vec!["odd".to_string()]);
        assert!(report.completed);
        assert!(!report.succeeded());
        assert_eq!(
            report.failure_reason().as_deref(),
            Some("worker terminated by signal")
        );
    }

    #[test]
    fn test_failed_frame_wins_over_exit_status() {
        let mut report = UnitReport::success();
        report.absorb(WorkerLine::Control(ControlMessage::Failed {
            reason: "target missing".into(),
        }));
        assert!(!report.succeeded());
        assert_eq!(report.failure_reason().as_deref(), Some("target missing"));
    }

    fn shell(script: &str) -> ProcessLauncher {
        let config = WorkerConfig {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), script.into()],
            ..Default::default()
        };
        ProcessLauncher::new(config).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_utf8_line_does_not_end_stream() {
        let launcher = shell(
            r#"printf 'Saved \377\376 file\n'; echo '[RUN_PARAMS]: {"elementsCount": 7}'; echo 'after marker'"#,
        );
        let report = launcher.run_unit(&request()).unwrap();

        assert!(report.exit_ok);
        let params = report.run_params.expect("marker after the bad line is read");
        assert_eq!(params.get("elementsCount"), Some(&json!(7)));
        assert_eq!(report.diagnostics.len(), 2);
        assert!(report.diagnostics[0].starts_with("Saved \u{FFFD}\u{FFFD} file"));
        assert_eq!(report.diagnostics[1], "after marker");
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_and_stderr_are_collected() {
        let launcher = shell("echo 'lost texture' >&2; exit 3");
        let report = launcher.run_unit(&request()).unwrap();

        assert!(!report.exit_ok);
        assert_eq!(report.exit_code, Some(3));
        assert_eq!(report.diagnostics, vec!["lost texture".to_string()]);
        assert_eq!(
            report.failure_reason().as_deref(),
            Some("worker exited with status 3")
        );
    }

    #[test]
    fn test_spawn_failure_is_worker_error() {
        let launcher =
            ProcessLauncher::new(WorkerConfig::direct("/nonexistent/texbake-worker")).unwrap();
        assert!(matches!(
            launcher.run_unit(&request()),
            Err(BakeError::Worker(_))
        ));
    }
}
