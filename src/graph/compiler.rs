use super::context::{Context, QueueEntry};
use super::error::{CompileError, CompileResult};
use super::graph::NodeGraph;
use super::id::NodeId;
use super::nodes::Contribution;
use crate::config::PresetTable;
use crate::scheduler::Task;
use std::collections::HashSet;
use std::sync::Arc;

/// Default bound on upstream recursion.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Statistics about one compile pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileStats {
    /// Output nodes found in the graph.
    pub roots: usize,
    /// Roots that compiled without error.
    pub compiled_roots: usize,
    /// Queue entries written across all roots.
    pub queued_nodes: usize,
    /// Time taken to compile (microseconds).
    pub compile_time_us: u64,
}

/// Result of compiling a graph.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// One sub-Context per successfully compiled output root, keyed by root name.
    pub context: Context,
    /// Roots that failed, with the reason.
    pub errors: Vec<(String, CompileError)>,
    pub stats: CompileStats,
}

impl CompileOutput {
    /// Split into one task per compiled root, in root order.
    pub fn into_tasks(self, graph: &str) -> Vec<Task> {
        self.context
            .into_map()
            .into_iter()
            .filter_map(|(root, value)| match value {
                serde_json::Value::Object(map) => {
                    Some(Task::new(root, graph, Context::from_map(map)))
                }
                _ => None,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Flattens a graph into per-root execution queues plus merged Contexts.
#[derive(Debug, Clone)]
pub struct GraphCompiler {
    max_depth: usize,
    presets: Option<Arc<PresetTable>>,
}

impl Default for GraphCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphCompiler {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            presets: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Validate custom pass parameters against a preset table.
    pub fn with_presets(mut self, presets: Arc<PresetTable>) -> Self {
        self.presets = Some(presets);
        self
    }

    /// Compile every output root of `graph`.
    ///
    /// Each root gets a fresh visited set, so a node shared by two roots is
    /// queued and contributes once per root. A failing root is logged and
    /// left out; the remaining roots still compile.
    pub fn compile(&self, graph: &NodeGraph) -> CompileOutput {
        let start_time = std::time::Instant::now();
        let mut output = CompileOutput::default();

        for root in graph.outputs() {
            let Some(root_node) = graph.node(root) else {
                continue;
            };
            output.stats.roots += 1;
            let root_name = root_node.name.clone();
            let mut visited = HashSet::new();
            let mut ctx = Context::new();

            let _span = tracing::debug_span!("compile", root = %root_name).entered();
            match self.visit(graph, root, &root_name, &mut visited, &mut ctx, 0) {
                Ok(()) => {
                    output.stats.compiled_roots += 1;
                    output.stats.queued_nodes += visited.len();
                    output.context.insert(root_name, ctx);
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to compile output {}: {}", root_name, e);
                    output.errors.push((root_name, e));
                }
            }
        }

        output.stats.compile_time_us = start_time.elapsed().as_micros() as u64;
        tracing::debug!(
            "Compiled graph {} ({} of {} roots) in {}us",
            graph.name(),
            output.stats.compiled_roots,
            output.stats.roots,
            output.stats.compile_time_us
        );
        output
    }

    /// Depth-first visit: upstream first, then queue and contribute.
    fn visit(
        &self,
        graph: &NodeGraph,
        id: NodeId,
        root: &str,
        visited: &mut HashSet<NodeId>,
        ctx: &mut Context,
        depth: usize,
    ) -> CompileResult<()> {
        let node = graph
            .node(id)
            .ok_or_else(|| CompileError::Graph(super::GraphError::UnknownNode(id.to_string())))?;
        if depth > self.max_depth {
            return Err(CompileError::DepthExceeded {
                root: root.to_string(),
                node: node.name.clone(),
                limit: self.max_depth,
            });
        }

        let inputs = node.kind.inputs();
        let mut linked = Vec::with_capacity(inputs.len());
        for input in 0..inputs.len() as u16 {
            // The socket's own link, even if a relay behind it leads nowhere.
            linked.push(graph.is_linked(id, input));
            for source in graph.upstream(id, input) {
                if visited.contains(&source) {
                    continue;
                }
                self.visit(graph, source, root, visited, ctx, depth + 1)?;
            }
        }

        visited.insert(id);
        ctx.push_queue(QueueEntry::new(node.label(), node.name.clone()));

        let site = Contribution {
            node: &node.name,
            linked: &linked,
            presets: self.presets.as_deref(),
        };
        node.kind.contribute(&site, ctx)
    }
}
