//! The background task loop.
//!
//! Exactly one thread executes tasks, one at a time, in submission order.
//! Node execution touches the shared scene store, so nothing here runs in
//! parallel: not tasks, not nodes within a task, not bake units.

use super::bridge::{ProgressReporter, SchedulerBridge, SchedulerMessage};
use super::task::Task;
use crate::config::{PresetTable, SchedulerConfig, WorkerConfig};
use crate::error::{BakeError, Result};
use crate::graph::{Context, EXECUTION_QUEUE};
use crate::host::SharedScene;
use crate::registry::{ExecutionEnv, NodeRegistry};
use crate::worker::{SharedBufferPool, UnitRunner};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Everything the loop needs to execute tasks.
pub struct SchedulerDeps {
    pub registry: Arc<NodeRegistry>,
    pub scene: SharedScene,
    pub runner: Arc<dyn UnitRunner>,
    pub buffers: SharedBufferPool,
    pub presets: Arc<PresetTable>,
    pub worker: WorkerConfig,
    pub config: SchedulerConfig,
}

type TaskQueue = Arc<Mutex<VecDeque<Task>>>;

fn lock(queue: &TaskQueue) -> MutexGuard<'_, VecDeque<Task>> {
    // Poisoning is ignored; the queue only holds plain data.
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle owned by the presentation side.
pub struct TaskScheduler {
    queue: TaskQueue,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    deps: Option<SchedulerDeps>,
    reporter: Option<ProgressReporter>,
    handle: Option<JoinHandle<()>>,
}

impl TaskScheduler {
    pub fn new(deps: SchedulerDeps) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            paused: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicBool::new(false)),
            deps: Some(deps),
            reporter: None,
            handle: None,
        }
    }

    /// Spawn the loop. Can be called once.
    pub fn start(&mut self) -> Result<SchedulerBridge> {
        let deps = self
            .deps
            .take()
            .ok_or_else(|| BakeError::Config("scheduler already started".to_string()))?;
        let (bridge, reporter) = SchedulerBridge::new(deps.config.progress_channel_capacity);

        let worker_loop = SchedulerLoop {
            deps,
            queue: self.queue.clone(),
            paused: self.paused.clone(),
            stop: self.stop.clone(),
            busy: self.busy.clone(),
            reporter: reporter.clone(),
        };
        let handle = thread::Builder::new()
            .name("texbake-scheduler".to_string())
            .spawn(move || worker_loop.run())?;

        self.reporter = Some(reporter);
        self.handle = Some(handle);
        Ok(bridge)
    }

    pub fn submit(&self, task: Task) {
        tracing::debug!("Submitted task {} of {}", task.name, task.graph);
        let depth = {
            let mut queue = lock(&self.queue);
            queue.push_back(task);
            queue.len()
        };
        self.report_depth(depth);
    }

    pub fn submit_all(&self, tasks: impl IntoIterator<Item = Task>) {
        let depth = {
            let mut queue = lock(&self.queue);
            queue.extend(tasks);
            queue.len()
        };
        self.report_depth(depth);
    }

    /// Stop taking new tasks; the in-flight task finishes.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Tasks submitted but not yet started.
    pub fn queue_depth(&self) -> usize {
        lock(&self.queue).len()
    }

    /// A task is executing right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Nothing queued and nothing executing.
    pub fn is_idle(&self) -> bool {
        self.queue_depth() == 0 && !self.is_busy()
    }

    /// Discard queued tasks; returns how many were dropped.
    pub fn drain(&self) -> usize {
        let dropped = {
            let mut queue = lock(&self.queue);
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            tracing::info!("Dropped {} queued tasks", dropped);
        }
        self.report_depth(0);
        dropped
    }

    /// Stop after the in-flight task, drop the rest and join the loop.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.drain();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Scheduler thread panicked");
            }
        }
    }

    fn report_depth(&self, depth: usize) {
        if let Some(reporter) = &self.reporter {
            reporter.queue_depth(depth);
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SchedulerLoop {
    deps: SchedulerDeps,
    queue: TaskQueue,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    reporter: ProgressReporter,
}

impl SchedulerLoop {
    fn run(self) {
        tracing::info!("Scheduler thread started");
        let poll = self.deps.config.poll_interval();

        while !self.stop.load(Ordering::SeqCst) {
            if self.paused.load(Ordering::SeqCst) {
                thread::sleep(poll);
                continue;
            }
            let next = {
                let mut queue = lock(&self.queue);
                let task = queue.pop_front();
                if task.is_some() {
                    self.busy.store(true, Ordering::SeqCst);
                }
                task.map(|t| (t, queue.len()))
            };
            let Some((task, remaining)) = next else {
                thread::sleep(poll);
                continue;
            };
            self.reporter.queue_depth(remaining);

            let outcome = catch_unwind(AssertUnwindSafe(|| self.execute_task(&task)));
            self.busy.store(false, Ordering::SeqCst);
            match outcome {
                Ok(result) => {
                    if let Err(e) = &result {
                        tracing::error!("Task {} failed: {}", task.name, e);
                    }
                    self.finished(&task, result.is_ok());
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    tracing::error!("Task {} panicked: {}", task.name, reason);
                    self.finished(&task, false);
                    self.reporter.send(SchedulerMessage::Fatal(reason));
                    break;
                }
            }
        }

        self.reporter.send(SchedulerMessage::Shutdown);
        tracing::info!("Scheduler thread exiting");
    }

    fn finished(&self, task: &Task, ok: bool) {
        self.reporter.send(SchedulerMessage::TaskFinished {
            task: task.name.clone(),
            graph: task.graph.clone(),
            ok,
        });
    }

    fn execute_task(&self, task: &Task) -> Result<()> {
        let span = tracing::info_span!("task", name = task.name.as_str());
        let _enter = span.enter();
        for (key, value) in task.context.iter().filter(|(k, _)| *k != EXECUTION_QUEUE) {
            tracing::warn!("[Config] {}: {}", key, value);
        }

        self.reporter.send(SchedulerMessage::CurrentTask {
            name: task.name.clone(),
            graph: task.graph.clone(),
        });
        self.reporter.send(SchedulerMessage::GraphRunning {
            graph: task.graph.clone(),
            running: true,
        });
        let _cleanup = CleanupGuard {
            reporter: &self.reporter,
            graph: &task.graph,
        };

        let deps = &self.deps;
        let queue = task.execution_queue();
        let total = queue.len();
        let mut ctx = task.context.clone();
        let mut results = Context::new();

        for (index, entry) in queue.iter().enumerate() {
            let span = tracing::info_span!("node", label = entry.label(), name = entry.name());
            let _enter = span.enter();
            self.reporter.current_node(entry.name());
            self.reporter.task_progress(index as f32 / total as f32);
            self.reporter.node_progress(0.0);

            let handler = deps.registry.resolve(entry.label());
            let mut env = ExecutionEnv {
                scene: &deps.scene,
                runner: deps.runner.as_ref(),
                buffers: &deps.buffers,
                presets: deps.presets.as_ref(),
                worker: &deps.worker,
                progress: &self.reporter,
                node_name: entry.name(),
            };
            let partial = handler
                .execute(&mut env, &mut ctx, results.clone())
                .map_err(|e| e.with_context(format!("node {}", entry.name())))?;
            results.merge(partial);
        }
        Ok(())
    }
}

/// Clears running state and progress however the task ends.
struct CleanupGuard<'a> {
    reporter: &'a ProgressReporter,
    graph: &'a str,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.reporter.send(SchedulerMessage::GraphRunning {
            graph: self.graph.to_string(),
            running: false,
        });
        self.reporter.send(SchedulerMessage::TaskProgress(0.0));
        self.reporter.send(SchedulerMessage::NodeProgress(0.0));
        self.reporter.send(SchedulerMessage::CurrentNode(String::new()));
        self.reporter.send(SchedulerMessage::CurrentTask {
            name: String::new(),
            graph: String::new(),
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
