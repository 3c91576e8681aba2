//! Thread boundary between the scheduler loop and the presentation thread.
//!
//! The scheduler never writes progress state directly. It sends
//! [`SchedulerMessage`]s; the presentation thread calls
//! [`SchedulerBridge::drain`] on its own schedule and the bridge folds them
//! into the [`ProgressState`] it owns.
//!
//! Sending never blocks, so a slow or absent consumer cannot stall the
//! scheduler. Transitions travel on an unbounded channel. Scalar fields
//! (queue depth, task and node progress) are coalesced: the latest value is
//! always kept and the bounded tick channel only wakes the consumer.

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Messages sent from the scheduler loop to the presentation thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerMessage {
    /// Tasks submitted but not yet started.
    QueueDepth(usize),

    /// A task started; empty name when idle.
    CurrentTask { name: String, graph: String },

    /// Fraction of the current task's execution queue done.
    TaskProgress(f32),

    /// Node being executed; empty when none.
    CurrentNode(String),

    /// Current node's own fractional progress.
    NodeProgress(f32),

    /// A graph started or stopped running.
    GraphRunning { graph: String, running: bool },

    /// A task left the scheduler.
    TaskFinished {
        task: String,
        graph: String,
        ok: bool,
    },

    /// The loop died on a panic.
    Fatal(String),

    /// The loop exited.
    Shutdown,
}

/// A finished task, in completion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTask {
    pub task: String,
    pub graph: String,
    pub ok: bool,
    pub finished_at: DateTime<Utc>,
}

/// Progress fields as seen by the presentation thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    pub queue_depth: usize,
    pub current_task: String,
    pub current_graph: String,
    pub task_progress: f32,
    pub current_node: String,
    pub node_progress: f32,
    pub running_graphs: BTreeSet<String>,
    /// Processed-order log.
    pub finished: Vec<FinishedTask>,
    pub fatal: Option<String>,
    pub shut_down: bool,
}

impl ProgressState {
    pub fn apply(&mut self, message: &SchedulerMessage) {
        match message {
            SchedulerMessage::QueueDepth(depth) => self.queue_depth = *depth,
            SchedulerMessage::CurrentTask { name, graph } => {
                self.current_task = name.clone();
                self.current_graph = graph.clone();
            }
            SchedulerMessage::TaskProgress(p) => self.task_progress = *p,
            SchedulerMessage::CurrentNode(name) => self.current_node = name.clone(),
            SchedulerMessage::NodeProgress(p) => self.node_progress = *p,
            SchedulerMessage::GraphRunning { graph, running } => {
                if *running {
                    self.running_graphs.insert(graph.clone());
                } else {
                    self.running_graphs.remove(graph);
                }
            }
            SchedulerMessage::TaskFinished { task, graph, ok } => {
                self.finished.push(FinishedTask {
                    task: task.clone(),
                    graph: graph.clone(),
                    ok: *ok,
                    finished_at: Utc::now(),
                });
            }
            SchedulerMessage::Fatal(reason) => self.fatal = Some(reason.clone()),
            SchedulerMessage::Shutdown => self.shut_down = true,
        }
    }

    pub fn is_running(&self, graph: &str) -> bool {
        self.running_graphs.contains(graph)
    }

    /// Nothing queued and nothing executing.
    pub fn is_idle(&self) -> bool {
        self.queue_depth == 0 && self.current_task.is_empty() && self.running_graphs.is_empty()
    }

    /// Names of finished tasks, in completion order.
    pub fn finished_order(&self) -> Vec<&str> {
        self.finished.iter().map(|f| f.task.as_str()).collect()
    }
}

/// Latest scalar progress values, written by the scheduler and read by the
/// bridge. A tick dropped on a full channel is still visible here.
#[derive(Debug, Default)]
struct Scalars {
    queue_depth: AtomicUsize,
    task_progress: AtomicU32,
    node_progress: AtomicU32,
}

impl Scalars {
    fn store(&self, message: &SchedulerMessage) -> bool {
        match message {
            SchedulerMessage::QueueDepth(depth) => self.queue_depth.store(*depth, Ordering::SeqCst),
            SchedulerMessage::TaskProgress(p) => self.task_progress.store(p.to_bits(), Ordering::SeqCst),
            SchedulerMessage::NodeProgress(p) => self.node_progress.store(p.to_bits(), Ordering::SeqCst),
            _ => return false,
        }
        true
    }

    fn load_into(&self, state: &mut ProgressState) {
        state.queue_depth = self.queue_depth.load(Ordering::SeqCst);
        state.task_progress = f32::from_bits(self.task_progress.load(Ordering::SeqCst));
        state.node_progress = f32::from_bits(self.node_progress.load(Ordering::SeqCst));
    }
}

/// Scheduler-side sender for progress messages. Nothing here blocks.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    /// Transitions; unbounded, never dropped.
    events: Sender<SchedulerMessage>,
    /// Scalar ticks; bounded, dropped when full.
    ticks: Sender<SchedulerMessage>,
    scalars: Arc<Scalars>,
}

impl ProgressReporter {
    pub fn send(&self, message: SchedulerMessage) {
        if self.scalars.store(&message) {
            match self.ticks.try_send(message) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => tracing::trace!("Progress channel full, coalescing tick"),
            }
        } else if self.events.send(message).is_err() {
            tracing::trace!("Progress receiver dropped");
        }
    }

    pub fn task_progress(&self, fraction: f32) {
        self.send(SchedulerMessage::TaskProgress(fraction.clamp(0.0, 1.0)));
    }

    pub fn node_progress(&self, fraction: f32) {
        self.send(SchedulerMessage::NodeProgress(fraction.clamp(0.0, 1.0)));
    }

    pub fn current_node(&self, name: impl Into<String>) {
        self.send(SchedulerMessage::CurrentNode(name.into()));
    }

    pub fn queue_depth(&self, depth: usize) {
        self.send(SchedulerMessage::QueueDepth(depth));
    }
}

/// Presentation-side handle.
pub struct SchedulerBridge {
    events: Receiver<SchedulerMessage>,
    ticks: Receiver<SchedulerMessage>,
    scalars: Arc<Scalars>,
    state: ProgressState,
}

impl SchedulerBridge {
    /// Create a bridge pair: `(bridge_for_ui, reporter_for_scheduler)`.
    /// `capacity` bounds the tick channel only.
    pub fn new(capacity: usize) -> (Self, ProgressReporter) {
        let (event_tx, events) = unbounded();
        let (tick_tx, ticks) = bounded(capacity.max(1));
        let scalars = Arc::new(Scalars::default());
        (
            Self {
                events,
                ticks,
                scalars: scalars.clone(),
                state: ProgressState::default(),
            },
            ProgressReporter {
                events: event_tx,
                ticks: tick_tx,
                scalars,
            },
        )
    }

    /// Apply all pending messages to the progress state and return them.
    pub fn drain(&mut self) -> Vec<SchedulerMessage> {
        let mut msgs: Vec<_> = self.events.try_iter().collect();
        msgs.extend(self.ticks.try_iter());
        for msg in &msgs {
            self.state.apply(msg);
        }
        self.scalars.load_into(&mut self.state);
        msgs
    }

    /// Wait up to `timeout` for one message and apply it.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<SchedulerMessage> {
        let msg = select! {
            recv(self.events) -> msg => msg.ok(),
            recv(self.ticks) -> msg => msg.ok(),
            default(timeout) => None,
        };
        if let Some(msg) = &msg {
            self.state.apply(msg);
        }
        self.scalars.load_into(&mut self.state);
        msg
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_applies_messages() {
        let (mut bridge, reporter) = SchedulerBridge::new(16);
        reporter.send(SchedulerMessage::CurrentTask {
            name: "Out".into(),
            graph: "g".into(),
        });
        reporter.send(SchedulerMessage::GraphRunning {
            graph: "g".into(),
            running: true,
        });
        reporter.task_progress(0.5);
        reporter.node_progress(2.0);

        assert_eq!(bridge.drain().len(), 4);
        let state = bridge.state();
        assert_eq!(state.current_task, "Out");
        assert!(state.is_running("g"));
        assert_eq!(state.task_progress, 0.5);
        assert_eq!(state.node_progress, 1.0);
        assert!(!state.is_idle());
    }

    #[test]
    fn test_finished_log_keeps_order() {
        let mut state = ProgressState::default();
        for task in ["a", "b", "c"] {
            state.apply(&SchedulerMessage::TaskFinished {
                task: task.into(),
                graph: "g".into(),
                ok: true,
            });
        }
        assert_eq!(state.finished_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_full_tick_channel_coalesces() {
        let (mut bridge, reporter) = SchedulerBridge::new(1);
        reporter.node_progress(0.1);
        reporter.node_progress(0.2);
        reporter.queue_depth(3);
        assert_eq!(bridge.drain(), vec![SchedulerMessage::NodeProgress(0.1)]);
        assert_eq!(bridge.state().node_progress, 0.2);
        assert_eq!(bridge.state().queue_depth, 3);
    }

    #[test]
    fn test_transitions_never_dropped_or_blocked() {
        let (mut bridge, reporter) = SchedulerBridge::new(1);
        for task in 0..100 {
            reporter.send(SchedulerMessage::TaskFinished {
                task: task.to_string(),
                graph: "g".into(),
                ok: true,
            });
            reporter.task_progress(0.5);
        }
        reporter.send(SchedulerMessage::Shutdown);

        bridge.drain();
        let state = bridge.state();
        assert_eq!(state.finished.len(), 100);
        assert_eq!(state.finished[99].task, "99");
        assert!(state.shut_down);
    }

    #[test]
    fn test_recv_timeout_refreshes_scalars() {
        let (mut bridge, reporter) = SchedulerBridge::new(1);
        reporter.task_progress(0.25);
        reporter.task_progress(0.75);
        assert_eq!(
            bridge.recv_timeout(Duration::from_millis(10)),
            Some(SchedulerMessage::TaskProgress(0.25))
        );
        assert_eq!(bridge.state().task_progress, 0.75);
        assert_eq!(bridge.recv_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_reporter_survives_dropped_bridge() {
        let (bridge, reporter) = SchedulerBridge::new(4);
        drop(bridge);
        reporter.send(SchedulerMessage::Shutdown);
        reporter.node_progress(0.5);
    }
}
