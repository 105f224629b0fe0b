use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nodeflow_rs::adk::model::openai::OpenAIModel;
use nodeflow_rs::nodeflow::broker::McpBroker;
use nodeflow_rs::nodeflow::config::EngineConfig;
use nodeflow_rs::nodeflow::engine::{Executor, ResumeInput, RunResult, RunState, RunStatus, Services};
use nodeflow_rs::nodeflow::graph::{build, plan, StartSet};
use nodeflow_rs::nodeflow::library::GraphLibrary;
use nodeflow_rs::nodeflow::loader::{GraphDocument, GraphLoader};
use nodeflow_rs::nodeflow::registry::ModelRegistry;
use nodeflow_rs::nodeflow::sinks::{ChannelCommandSink, LogObserver, ShellWorker};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a graph file
    Run {
        /// Path to the graph file
        #[arg(short, long)]
        file: PathBuf,

        /// Seed for the graph's start nodes
        #[arg(short, long)]
        input: Option<String>,

        /// Write the run state as JSON
        #[arg(long)]
        state_out: Option<PathBuf>,
    },
    /// Re-run a node and everything downstream of it
    Resume {
        /// Path to the graph file
        #[arg(short, long)]
        file: PathBuf,

        /// Run state written by a previous run
        #[arg(short, long)]
        state: PathBuf,

        /// Node to resume from
        #[arg(long)]
        from: String,

        /// Input for the resumed node instead of its cached input
        #[arg(short, long, conflicts_with = "no_input")]
        input: Option<String>,

        /// Resume the node without any input
        #[arg(long)]
        no_input: bool,

        /// Where to write the updated state (defaults to --state)
        #[arg(long)]
        state_out: Option<PathBuf>,
    },
    /// Print the execution levels of a graph file
    Plan {
        /// Path to the graph file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            file,
            input,
            state_out,
        } => {
            let doc = load(&file)?;
            let (executor, config, shell) = executor_for(&doc).await?;

            println!("Running graph: {}", display_name(&doc, &file));
            let result = executor.run(&doc.graph(), input).await;
            drop(executor);
            shell.finish().await;
            let result = result?;
            report(&doc, &result, &config);

            if let Some(path) = state_out {
                save_state(&path, &result.state)?;
            }
            finish(result)
        }
        Commands::Resume {
            file,
            state,
            from,
            input,
            no_input,
            state_out,
        } => {
            let doc = load(&file)?;
            let prior: RunState = serde_json::from_str(
                &fs::read_to_string(&state)
                    .with_context(|| format!("reading state {}", state.display()))?,
            )?;
            let (executor, config, shell) = executor_for(&doc).await?;

            let resume_input = match (input, no_input) {
                (Some(value), _) => ResumeInput::Supplied(value),
                (None, true) => ResumeInput::Empty,
                (None, false) => ResumeInput::Cached,
            };

            println!("Resuming {} from {}", display_name(&doc, &file), from);
            let result = executor
                .resume_from(&doc.graph(), prior, &from, resume_input)
                .await;
            drop(executor);
            shell.finish().await;
            let result = result?;
            report(&doc, &result, &config);

            save_state(state_out.as_deref().unwrap_or(state.as_path()), &result.state)?;
            finish(result)
        }
        Commands::Plan { file } => {
            let doc = load(&file)?;
            let graph = doc.graph();
            let deps = build(&graph.nodes, &graph.edges)?;
            for (index, level) in plan(&deps, &StartSet::Roots)?.iter().enumerate() {
                println!("Level {}: {}", index, level.join(", "));
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> anyhow::Result<GraphDocument> {
    GraphLoader::load(path).with_context(|| format!("loading graph {}", path.display()))
}

fn display_name(doc: &GraphDocument, path: &Path) -> String {
    if doc.name.is_empty() {
        path.display().to_string()
    } else {
        doc.name.clone()
    }
}

/// Wire collaborators declared in the graph file.
///
/// Command nodes feed the returned shell worker, which keeps running until
/// the executor is dropped.
async fn executor_for(
    doc: &GraphDocument,
) -> anyhow::Result<(Executor, EngineConfig, ShellWorker)> {
    let config = EngineConfig::from_env();

    let models = ModelRegistry::new();
    for (name, spec) in &doc.models {
        match spec.provider.to_lowercase().as_str() {
            "openai" => {
                log::info!("Using provider: openai with model: {} as {}", spec.model_name, name);
                models
                    .register(name.clone(), Arc::new(OpenAIModel::new(spec.model_name.clone())?))
                    .await;
            }
            other => bail!("model '{}' uses unsupported provider '{}'", name, other),
        }
    }

    let (commands, shell) = ChannelCommandSink::spawn_shell();
    let mut services = Services::default()
        .with_models(models)
        .with_commands(Arc::new(commands))
        .with_observer(Arc::new(LogObserver));

    if !doc.mcp_servers.is_empty() {
        services = services.with_broker(Arc::new(McpBroker::new(doc.mcp_servers.clone())));
    }

    if !doc.sub_graphs.is_empty() {
        let library = GraphLibrary::new(services.clone(), config.clone());
        for (id, graph) in &doc.sub_graphs {
            library.register(id.clone(), graph.clone()).await?;
        }
        services = services.with_sub_graphs(library);
    }

    Ok((Executor::new(services).with_config(config.clone()), config, shell))
}

fn report(doc: &GraphDocument, result: &RunResult, config: &EngineConfig) {
    let state = &result.state;

    for node in &doc.nodes {
        if let Some(ms) = state.node_durations.get(&node.id) {
            println!("  {:<24} {:>8} ms  {:?}", node.id, ms, state.status_of(&node.id));
        }
    }

    match &result.status {
        RunStatus::Success => {
            println!("Run {} succeeded", state.run_id);
            println!("{}", state.final_output(&doc.graph(), &config.merge_separator));
        }
        RunStatus::Error { node_id, message } => {
            println!("Run {} failed at {}: {}", state.run_id, node_id, message);
        }
        RunStatus::Stopped => println!("Run {} stopped", state.run_id),
    }
}

fn save_state(path: &Path, state: &RunState) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string_pretty(state)?)
        .with_context(|| format!("writing state {}", path.display()))?;
    log::info!("Wrote run state to {}", path.display());
    Ok(())
}

fn finish(result: RunResult) -> anyhow::Result<()> {
    result.into_result()?;
    Ok(())
}
