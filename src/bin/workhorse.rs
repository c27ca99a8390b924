//! workhorse CLI: run work against the in-process engine.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use workhorse::behavior::Calculator;
use workhorse::config::Config;
use workhorse::model::work::{Outcome, Work, WorkResult};
use workhorse::service::{BehaviorRegistry, MemoryRouter, Runnable, Services, StateStore};
use workhorse::telemetry::{TelemetryConfig, init_telemetry};
use workhorse::{Workhorse, href::Module};

#[derive(Parser)]
#[command(name = "workhorse", about = "Run, fan out, fan in, finalize")]
struct Cli {
    /// TOML config file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a work item and wait for its whole tree to settle
    Run {
        /// Behavior ref (e.g. "calculator")
        behavior: String,
        /// JSON input
        #[arg(long)]
        input: Option<String>,
    },
    /// Hand a work item to the router and wait for its tree to settle
    Route {
        behavior: String,
        #[arg(long)]
        input: Option<String>,
    },
    /// Check whether an href resolves to an instantiable component
    Resolve {
        href: String,
        #[arg(long, value_enum, default_value_t = Kind::Behavior)]
        kind: Kind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Behavior,
    Loader,
    State,
    Router,
    Logger,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "workhorse".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Run { behavior, input } => cmd_run(config, behavior, input, false).await,
        Command::Route { behavior, input } => cmd_run(config, behavior, input, true).await,
        Command::Resolve { href, kind } => cmd_resolve(&href, kind),
    }
}

fn services() -> Services {
    let mut behaviors = BehaviorRegistry::default();
    behaviors.register_component("calculator", || Arc::new(Calculator) as Arc<dyn Runnable>);
    behaviors.register_module(
        "math",
        Module::new().component("Calculator", || Arc::new(Calculator) as Arc<dyn Runnable>),
    );
    Services::new(behaviors)
}

async fn cmd_run(
    config: Config,
    behavior: String,
    input: Option<String>,
    via_router: bool,
) -> anyhow::Result<()> {
    let input: serde_json::Value = match input {
        Some(json) => serde_json::from_str(&json)?,
        None => serde_json::json!({}),
    };

    // Keep a typed handle on the in-memory router so we can wait on it.
    let memory_router = (config.router == workhorse::service::builtin::MEMORY_ROUTER)
        .then(|| Arc::new(MemoryRouter::new()));
    let mut builder = Workhorse::builder().config(config).services(services());
    if let Some(router) = &memory_router {
        builder = builder.router(router.clone());
    }
    let engine = builder.build()?;

    let work = if via_router {
        engine.route((behavior.as_str(), input)).await?
    } else {
        engine.run((behavior.as_str(), input)).await?
    };

    match &memory_router {
        Some(router) => router.wait_idle().await,
        None => eprintln!("router is not in-process; not waiting for children"),
    }

    let id = work.require_id()?;
    print_tree(&engine, engine.load(id).await?, 0).await?;
    Ok(())
}

async fn print_tree(engine: &Workhorse, work: Work, depth: usize) -> anyhow::Result<()> {
    let pad = "  ".repeat(depth);
    let id = work.require_id()?;
    println!("{pad}{} {}  {}", id.short(), work.behavior_ref, work.input);
    println!("{pad}  result:    {}", describe(&work.result));
    if let Some(finalizer) = &work.finalizer_result {
        println!("{pad}  finalizer: {}", describe(finalizer));
    }
    if work.has_children() {
        println!(
            "{pad}  children:  {}/{} finished",
            work.finished_children_ids.len(),
            work.children_ids.len()
        );
    }
    for child in engine.state().load_all(&work.children_ids).await? {
        Box::pin(print_tree(engine, child, depth + 1)).await?;
    }
    Ok(())
}

fn describe(result: &WorkResult) -> String {
    match result {
        WorkResult::NotStarted => "not started".to_string(),
        WorkResult::Running { started } => format!("running since {started}"),
        WorkResult::Ended { outcome, .. } => {
            let ms = result.duration_ms().unwrap_or_default();
            match outcome {
                Outcome::Success(value) => format!("success {value} ({ms}ms)"),
                Outcome::Failure(err) => format!("failure: {err} ({ms}ms)"),
            }
        }
    }
}

fn cmd_resolve(href: &str, kind: Kind) -> anyhow::Result<()> {
    let services = services();
    let resolved = match kind {
        Kind::Behavior => services.behaviors.instantiate_lenient(href).map(|_| ()),
        Kind::Loader => services.work_loaders.instantiate_from_path(href).map(|_| ()),
        Kind::State => services.state_managers.instantiate_from_path(href).map(|_| ()),
        Kind::Router => services.routers.instantiate_from_path(href).map(|_| ()),
        Kind::Logger => services.loggers.instantiate_from_path(href).map(|_| ()),
    };
    match resolved {
        Ok(()) => {
            println!("{href}: ok");
            Ok(())
        }
        Err(e) => anyhow::bail!("{href}: {e}"),
    }
}
