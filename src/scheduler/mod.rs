//! Task scheduling.
//!
//! ```text
//! presentation thread                    scheduler thread
//! ───────────────────                    ────────────────
//! TaskScheduler::submit ──VecDeque──►    SchedulerLoop (poll, FIFO)
//!                                          └─ NodeRegistry::resolve → execute
//! SchedulerBridge::drain ◄──channel──    ProgressReporter (SchedulerMessage)
//! ```
//!
//! - [`task`] - Compiled unit of work
//! - [`bridge`] - Progress messages across the thread boundary
//! - [`service`] - The loop and its handle

pub mod bridge;
pub mod service;
pub mod task;

pub use bridge::{FinishedTask, ProgressReporter, ProgressState, SchedulerBridge, SchedulerMessage};
pub use service::{SchedulerDeps, TaskScheduler};
pub use task::Task;
