//! texbake - command line entry point
//!
//! Compiles bake graphs, runs them through the scheduler with out-of-process
//! workers, and lists the custom pass presets it can see.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use texbake::config::AppConfig;
use texbake::graph::nodes::MeshConfig;
use texbake::graph::{GraphCompiler, NodeGraph, NodeKind};
use texbake::host::{self, MemoryScene};
use texbake::registry::NodeRegistry;
use texbake::scheduler::{SchedulerDeps, SchedulerMessage, TaskScheduler};
use texbake::worker::{ProcessLauncher, SharedBufferPool};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "texbake", version, about)]
struct Cli {
    /// Config file; the platform data directory's config.toml when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a graph and print the per-root Contexts as JSON.
    Compile {
        graph: PathBuf,
    },
    /// Compile a graph and bake every output root.
    Run {
        graph: PathBuf,
        /// Scene description the executors and workers read.
        #[arg(long)]
        scene: PathBuf,
    },
    /// List the custom pass presets that validate.
    Presets,
    /// Write the starter graph.
    Init {
        out: PathBuf,
        /// Bake target of the starter mesh node.
        #[arg(long)]
        mesh: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::from_path(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => AppConfig::load_or_default(),
    };
    let _log_guard = init_logging(&config)?;

    match cli.cmd {
        Command::Compile { graph } => cmd_compile(&config, &graph),
        Command::Run { graph, scene } => cmd_run(&config, &graph, &scene),
        Command::Presets => cmd_presets(&config),
        Command::Init { out, mesh } => cmd_init(&config, &out, mesh),
    }
}

/// Stderr plus, when `log.directory` is set, a daily rotating file.
fn init_logging(config: &AppConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log.filter()))
    };
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let (file, guard) = match &config.log.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir '{}'", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "texbake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(guard)
}

fn compiler(config: &AppConfig) -> anyhow::Result<(GraphCompiler, Arc<texbake::config::PresetTable>)> {
    let presets = Arc::new(config.load_presets()?);
    let compiler = GraphCompiler::new()
        .with_max_depth(config.scheduler.max_compile_depth)
        .with_presets(presets.clone());
    Ok((compiler, presets))
}

fn cmd_compile(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let graph = NodeGraph::load(path).with_context(|| format!("load graph '{}'", path.display()))?;
    let (compiler, _) = compiler(config)?;
    let output = compiler.compile(&graph);
    for (root, error) in &output.errors {
        tracing::error!("Root {} failed to compile: {}", root, error);
    }
    println!("{}", serde_json::to_string_pretty(&output.context)?);
    if output.context.is_empty() {
        anyhow::bail!("no output root compiled");
    }
    Ok(())
}

fn cmd_run(config: &AppConfig, graph_path: &Path, scene_path: &Path) -> anyhow::Result<()> {
    let graph = NodeGraph::load(graph_path)
        .with_context(|| format!("load graph '{}'", graph_path.display()))?;
    let scene = MemoryScene::load(scene_path)?;
    let (compiler, presets) = compiler(config)?;

    let output = compiler.compile(&graph);
    for (root, error) in &output.errors {
        tracing::error!("Root {} failed to compile: {}", root, error);
    }
    let tasks = output.into_tasks(graph.name());
    if tasks.is_empty() {
        anyhow::bail!("nothing to run");
    }
    let submitted = tasks.len();

    let mut scheduler = TaskScheduler::new(SchedulerDeps {
        registry: NodeRegistry::shared(),
        scene: host::shared(scene),
        runner: Arc::new(ProcessLauncher::new(config.worker.clone())?),
        buffers: SharedBufferPool::new(),
        presets,
        worker: config.worker.clone(),
        config: config.scheduler.clone(),
    });
    let mut bridge = scheduler.start()?;
    scheduler.submit_all(tasks);

    let mut last_task = String::new();
    while bridge.state().finished.len() < submitted && bridge.state().fatal.is_none() {
        let Some(message) = bridge.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        let state = bridge.state();
        match message {
            SchedulerMessage::CurrentTask { name, .. } if !name.is_empty() && name != last_task => {
                println!("[{}] started", name);
                last_task = name;
            }
            SchedulerMessage::CurrentNode(node) if !node.is_empty() => {
                println!(
                    "[{}] {:>3.0}% {}",
                    state.current_task,
                    state.task_progress * 100.0,
                    node
                );
            }
            SchedulerMessage::TaskFinished { task, ok, .. } => {
                println!("[{}] {}", task, if ok { "done" } else { "failed" });
            }
            _ => {}
        }
    }
    scheduler.shutdown();
    bridge.drain();

    let state = bridge.state();
    if let Some(reason) = &state.fatal {
        anyhow::bail!("scheduler stopped: {}", reason);
    }
    let failed = state.finished.iter().filter(|f| !f.ok).count();
    if failed > 0 {
        anyhow::bail!("{} of {} tasks failed", failed, submitted);
    }
    Ok(())
}

fn cmd_presets(config: &AppConfig) -> anyhow::Result<()> {
    let presets = config.load_presets()?;
    if presets.is_empty() {
        println!("No presets found");
        return Ok(());
    }
    for preset in presets.iter() {
        println!(
            "{:<24} {:<16} {} params  {}",
            preset.id,
            preset.bake_type,
            preset.params.len(),
            preset.description
        );
    }
    Ok(())
}

fn cmd_init(config: &AppConfig, out: &Path, mesh: Option<String>) -> anyhow::Result<()> {
    let name = out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bake".to_string());
    let mut graph = NodeGraph::default_bake_graph(name);

    for node_name in ["Bake Setting", "Mesh"] {
        let Some(node) = graph.find(node_name).and_then(|id| graph.node_mut(id)) else {
            continue;
        };
        match &mut node.kind {
            NodeKind::BakeSetting(setting) => *setting = config.bake.bake_setting(),
            NodeKind::SingleMesh(list) => {
                if let Some(target) = &mesh {
                    list.meshes = vec![MeshConfig {
                        target: target.clone(),
                        ..Default::default()
                    }];
                }
            }
            _ => {}
        }
    }

    let json = serde_json::to_string_pretty(&graph.to_document())?;
    std::fs::write(out, json).with_context(|| format!("write '{}'", out.display()))?;
    println!("Wrote {}", out.display());
    Ok(())
}
