//! # texbake: node-graph texture baking
//!
//! An artist wires a graph of pass, settings, mesh, bake and output nodes.
//! This crate turns that graph into ordered work and runs it: bulk compute
//! happens in disposable worker processes that hand pixels back through a
//! shared memory segment.
//!
//! ## Architecture
//!
//! - **Graph**: nodes, typed sockets and links, plus the compiler that
//!   flattens each output root into an execution queue and a merged Context
//! - **Scheduler**: one background thread running tasks in FIFO order,
//!   reporting progress to the presentation thread over a crossbeam channel
//! - **Registry**: node type label → run-time handler (enum dispatch for
//!   builtins, trait objects for plugins)
//! - **Worker**: process launch, line-oriented control protocol and shared
//!   pixel buffers
//! - **Host**: the scene store seam (objects, images, snapshots)
//!
//! ## Configuration
//!
//! Settings live in `config.toml` under the platform data directory in
//! `dev.texbake` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use texbake::{
//!     config::AppConfig,
//!     graph::{GraphCompiler, NodeGraph},
//!     host::{self, MemoryScene},
//!     registry::NodeRegistry,
//!     scheduler::{SchedulerDeps, TaskScheduler},
//!     worker::{ProcessLauncher, SharedBufferPool},
//! };
//!
//! let config = AppConfig::load_or_default();
//! let presets = Arc::new(config.load_presets()?);
//! let graph = NodeGraph::load("bake.json")?;
//! let tasks = GraphCompiler::new()
//!     .with_presets(presets.clone())
//!     .compile(&graph)
//!     .into_tasks(graph.name());
//!
//! let mut scheduler = TaskScheduler::new(SchedulerDeps {
//!     registry: NodeRegistry::shared(),
//!     scene: host::shared(MemoryScene::load("scene.json")?),
//!     runner: Arc::new(ProcessLauncher::new(config.worker.clone())?),
//!     buffers: SharedBufferPool::new(),
//!     presets,
//!     worker: config.worker.clone(),
//!     config: config.scheduler.clone(),
//! });
//! let mut bridge = scheduler.start()?;
//! scheduler.submit_all(tasks);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod registry;
pub mod scheduler;
pub mod worker;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{BakeError, Result, ResultExt};
pub use graph::{Context, GraphCompiler, NodeGraph};
pub use scheduler::{SchedulerBridge, Task, TaskScheduler};
