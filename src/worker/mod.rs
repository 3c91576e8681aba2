//! Out-of-process bake workers.
//!
//! Each bake unit runs in a fresh worker process. Bulk pixels go through a
//! named shared buffer; control state goes over the worker's output lines.
//!
//! ```text
//! orchestrator                         worker process
//! ────────────                         ──────────────
//! SharedBufferPool::allocate ──name──► SharedBuffer::attach
//! ProcessLauncher::run_unit  ──-bnc──► descriptor_from_args
//!          ◄── [CONTROL] / [RUN_PARAMS] / telemetry lines ──
//! SharedBuffer::read_pixels  ◄─pixels─ WorkerSession::write_pixels
//! ```
//!
//! - [`shm`] - Shared buffer segments
//! - [`protocol`] - Descriptor, control frames and line classification
//! - [`launcher`] - Orchestrator side: spawn, supervise, report
//! - [`client`] - Worker side helpers

pub mod client;
pub mod launcher;
pub mod protocol;
pub mod shm;

#[cfg(test)]
pub use launcher::MockUnitRunner;
pub use launcher::{ProcessLauncher, UnitReport, UnitRequest, UnitRunner};
pub use protocol::{
    BakeUnit, ControlMessage, LineClassifier, MeshTriple, WorkerDescriptor, WorkerLine,
    CONTROL_MARKER, DESCRIPTOR_FLAG, RUN_PARAMS_MARKER,
};
pub use shm::{buffer_size, SharedBuffer, SharedBufferPool, BYTES_PER_PIXEL};
