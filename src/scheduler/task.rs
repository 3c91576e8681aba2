//! A compiled, runnable unit of work.

use crate::graph::{Context, QueueEntry};

/// One output root of a compiled graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Output root node name.
    pub name: String,
    /// Name of the graph the task was compiled from.
    pub graph: String,
    pub context: Context,
}

impl Task {
    pub fn new(name: impl Into<String>, graph: impl Into<String>, context: Context) -> Self {
        Self {
            name: name.into(),
            graph: graph.into(),
            context,
        }
    }

    /// The compiled execution order. A malformed queue is empty.
    pub fn execution_queue(&self) -> Vec<QueueEntry> {
        self.context.execution_queue().unwrap_or_else(|e| {
            tracing::error!("Task {} has a malformed execution queue: {}", self.name, e);
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EXECUTION_QUEUE;
    use serde_json::json;

    #[test]
    fn test_execution_queue() {
        let mut ctx = Context::new();
        ctx.push_queue(QueueEntry::new("Bake", "Bake"));
        ctx.push_queue(QueueEntry::new("SaveToImage", "Out"));
        let task = Task::new("Out", "g", ctx);
        let queue = task.execution_queue();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].name(), "Out");
    }

    #[test]
    fn test_malformed_queue_is_empty() {
        let mut ctx = Context::new();
        ctx.insert(EXECUTION_QUEUE, json!(["Bake"]));
        assert!(Task::new("Out", "g", ctx).execution_queue().is_empty());
    }
}
