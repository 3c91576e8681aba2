//! Node execution registry.
//!
//! Maps a node type label to the behavior that runs when a compiled
//! execution queue reaches that node. Two layers:
//!
//! - **`NodeHandler` trait** - for plugins registered at runtime.
//! - **`BuiltinHandler` enum** - for the handlers that ship with the crate,
//!   dispatched with a match.
//!
//! [`AnyHandler`] wraps either so the scheduler treats them uniformly.
//!
//! Most node types do all their work at compile time and map to the passive
//! handler. `Bake`, `ImageCombine` and `SaveToImage` do real work at run time.

pub mod bake;
pub mod combine;
pub mod save;

pub use bake::{BakeExecutor, FAILED_UNITS, OUT_IMAGES};
pub use combine::{CombineExecutor, COMBINED_IMAGES};
pub use save::{SaveExecutor, SAVED_IMAGES};

use crate::config::{PresetTable, WorkerConfig};
use crate::error::{BakeError, Result};
use crate::graph::{Context, NodeType};
use crate::host::{SceneStore, SharedScene};
use crate::scheduler::ProgressReporter;
use crate::worker::{SharedBufferPool, UnitRunner};
use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, OnceLock};
use std::time::Instant;

/// Collaborators a handler may use while executing one node.
pub struct ExecutionEnv<'a> {
    pub scene: &'a SharedScene,
    pub runner: &'a dyn UnitRunner,
    pub buffers: &'a SharedBufferPool,
    pub presets: &'a PresetTable,
    pub worker: &'a WorkerConfig,
    pub progress: &'a ProgressReporter,
    /// Instance name of the node being executed.
    pub node_name: &'a str,
}

impl<'a> ExecutionEnv<'a> {
    /// Lock the scene store for the duration of the guard.
    pub fn scene(&self) -> Result<MutexGuard<'a, dyn SceneStore + 'static>> {
        self.scene
            .lock()
            .map_err(|_| BakeError::Channel("scene store lock poisoned".to_string()))
    }
}

/// Run-time behavior of one node type.
pub trait NodeHandler: Send + Sync {
    /// `ctx` is the task Context; `previous` holds the results accumulated
    /// from earlier nodes. The returned partial results are merged into the
    /// running results for the next node.
    fn execute(
        &self,
        env: &mut ExecutionEnv<'_>,
        ctx: &mut Context,
        previous: Context,
    ) -> Result<Context>;
}

/// Handlers that ship with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinHandler {
    Passive,
    Bake(BakeExecutor),
    ImageCombine(CombineExecutor),
    SaveToImage(SaveExecutor),
}

impl BuiltinHandler {
    pub fn for_type(ty: NodeType) -> Self {
        match ty {
            NodeType::Bake => BuiltinHandler::Bake(BakeExecutor),
            NodeType::ImageCombine => BuiltinHandler::ImageCombine(CombineExecutor),
            NodeType::SaveToImage => BuiltinHandler::SaveToImage(SaveExecutor),
            _ => BuiltinHandler::Passive,
        }
    }

    pub fn execute(
        &self,
        env: &mut ExecutionEnv<'_>,
        ctx: &mut Context,
        previous: Context,
    ) -> Result<Context> {
        match self {
            BuiltinHandler::Passive => {
                tracing::info!("{} [Execute]", env.node_name);
                Ok(Context::new())
            }
            BuiltinHandler::Bake(h) => h.execute(env, ctx, previous),
            BuiltinHandler::ImageCombine(h) => h.execute(env, ctx, previous),
            BuiltinHandler::SaveToImage(h) => h.execute(env, ctx, previous),
        }
    }
}

/// Either a builtin or a plugin handler.
#[derive(Clone)]
pub enum AnyHandler {
    Builtin(BuiltinHandler),
    Plugin(Arc<dyn NodeHandler>),
}

impl AnyHandler {
    pub fn execute(
        &self,
        env: &mut ExecutionEnv<'_>,
        ctx: &mut Context,
        previous: Context,
    ) -> Result<Context> {
        match self {
            AnyHandler::Builtin(h) => h.execute(env, ctx, previous),
            AnyHandler::Plugin(h) => h.execute(env, ctx, previous),
        }
    }

    pub fn is_plugin(&self) -> bool {
        matches!(self, AnyHandler::Plugin(_))
    }
}

impl std::fmt::Debug for AnyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyHandler::Builtin(h) => f.debug_tuple("Builtin").field(h).finish(),
            AnyHandler::Plugin(_) => f.write_str("Plugin(..)"),
        }
    }
}

static PASSIVE: AnyHandler = AnyHandler::Builtin(BuiltinHandler::Passive);

/// Label → handler table.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    handlers: HashMap<String, AnyHandler>,
}

impl NodeRegistry {
    /// One entry per known node type.
    pub fn builtin() -> Self {
        let handlers = NodeType::all()
            .iter()
            .map(|ty| {
                (
                    ty.label().to_string(),
                    AnyHandler::Builtin(BuiltinHandler::for_type(*ty)),
                )
            })
            .collect();
        Self { handlers }
    }

    /// Process-wide builtin table, built on first use.
    pub fn shared() -> Arc<NodeRegistry> {
        static SHARED: OnceLock<Arc<NodeRegistry>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                tracing::debug!("Building node registry");
                Arc::new(NodeRegistry::builtin())
            })
            .clone()
    }

    /// Add or replace the handler for `label`.
    pub fn with_plugin(mut self, label: impl Into<String>, handler: Arc<dyn NodeHandler>) -> Self {
        let label = label.into();
        if self.handlers.contains_key(&label) {
            tracing::debug!("Plugin overrides handler for {}", label);
        }
        self.handlers.insert(label, AnyHandler::Plugin(handler));
        self
    }

    /// Unknown labels resolve to the passive handler.
    pub fn resolve(&self, label: &str) -> &AnyHandler {
        self.handlers.get(label).unwrap_or_else(|| {
            tracing::warn!("No handler for node type {}, treating as passive", label);
            &PASSIVE
        })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.handlers.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Logs elapsed time at warn level when dropped.
pub struct ScopeTimer {
    what: String,
    start: Instant,
}

impl ScopeTimer {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for ScopeTimer {
    fn drop(&mut self) {
        tracing::warn!(
            "{}: cost {:.3}s",
            self.what,
            self.start.elapsed().as_secs_f64()
        );
    }
}

/// Recorded `<key>.<a>.<b> = name` entries from the running results,
/// falling back to the task Context.
pub(crate) fn recorded<'c>(
    ctx: &'c Context,
    previous: &'c Context,
    key: &str,
) -> Vec<(&'c str, &'c str, &'c str, &'c str)> {
    let table = previous
        .get(key)
        .or_else(|| ctx.get(key))
        .and_then(|v| v.as_object());
    let Some(table) = table else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (outer, by_cat) in table {
        let Some(by_cat) = by_cat.as_object() else {
            continue;
        };
        for (cat, by_pass) in by_cat {
            let Some(by_pass) = by_pass.as_object() else {
                continue;
            };
            for (pass, name) in by_pass {
                if let Some(name) = name.as_str() {
                    entries.push((outer.as_str(), cat.as_str(), pass.as_str(), name));
                }
            }
        }
    }
    entries
}
