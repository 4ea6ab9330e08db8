mod config;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{default_config_path, Config};
use dock_core::{
    filter_log_lines, Action, ActionDispatcher, ActionOutcome, DeploymentOrchestrator,
    DockerEngine, Engine, ProvisioningWorkflow, RegistryClient, ResourceCache, SyncEvent,
    SyncScheduler, TemplateStore, ViewState,
};

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "dock")]
#[command(about = "Manage containers, images, volumes, networks and compose deployments", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, env = "DOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Engine endpoint (unix socket path, unix://, tcp:// or http://)
    #[arg(long, env = "DOCKER_HOST")]
    host: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List containers
    Ps {
        /// Include stopped containers
        #[arg(long, short)]
        all: bool,
    },
    Start { id: String },
    Stop { id: String },
    Restart { id: String },
    Pause { id: String },
    Unpause { id: String },
    /// Remove a container (asks for confirmation)
    Rm {
        id: String,
        #[arg(long, short)]
        yes: bool,
    },
    Inspect { id: String },
    Stats { id: String },
    Logs {
        id: String,
        #[arg(long)]
        tail: Option<String>,
        /// Only lines containing this text (case-insensitive)
        #[arg(long)]
        grep: Option<String>,
    },
    Images,
    Pull { name: String },
    Rmi {
        id: String,
        #[arg(long)]
        force: bool,
    },
    #[command(subcommand)]
    Volume(VolumeCommand),
    #[command(subcommand)]
    Network(NetworkCommand),
    /// Search the image registry
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    #[command(subcommand)]
    Templates(TemplateCommand),
    #[command(subcommand)]
    Compose(ComposeCommand),
    /// Keep refreshing a view until Ctrl-C
    Watch {
        #[arg(long, short)]
        all: bool,
        /// Watch one container's detail and stats instead of the list
        #[arg(long)]
        container: Option<String>,
    },
    /// Show or set the display theme
    Theme {
        #[arg(value_parser = ["dark", "light"])]
        mode: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum VolumeCommand {
    Ls,
    Create { name: String },
    Rm {
        name: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum NetworkCommand {
    Ls,
    Create {
        name: String,
        #[arg(long)]
        driver: Option<String>,
    },
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    Ls {
        #[arg(long, default_value = "all")]
        category: String,
    },
    Show { id: String },
    /// Pull if needed, then create and start a container from a template
    Use {
        id: String,
        #[arg(long)]
        name: Option<String>,
    },
    Export { id: String },
    ExportAll,
    /// Import a template file (single object or array)
    Import { file: PathBuf },
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
enum ComposeCommand {
    Up {
        file: PathBuf,
        /// Start the created containers afterwards
        #[arg(long)]
        start: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut cfg = Config::load(&config_path)?;
    if let Some(host) = cli.host.clone() {
        cfg.docker_host = Some(host);
    }

    match cli.command {
        Command::Theme { mode } => theme(&mut cfg, &config_path, mode),
        Command::Templates(cmd) if !matches!(cmd, TemplateCommand::Use { .. }) => {
            templates_offline(&cfg, cmd)
        }
        command => {
            let engine = connect(&cfg).await?;
            run(command, engine, &cfg).await
        }
    }
}

/// Build the engine client and probe it before doing anything else.
async fn connect(cfg: &Config) -> Result<Arc<dyn Engine>> {
    let registry = RegistryClient::new(REGISTRY_TIMEOUT)?;
    let engine = DockerEngine::connect(cfg.docker_host.as_deref(), registry)?;
    let ready = engine
        .check_connection()
        .await
        .context("Container engine is not reachable")?;
    if !ready {
        bail!("Container engine is not ready");
    }
    Ok(Arc::new(engine))
}

async fn run(command: Command, engine: Arc<dyn Engine>, cfg: &Config) -> Result<()> {
    match command {
        Command::Ps { all } => {
            let containers = engine.list_containers(all).await?;
            output::print_containers(&containers);
        }
        Command::Start { id } => lifecycle(engine, Action::Start, &id, true).await?,
        Command::Stop { id } => lifecycle(engine, Action::Stop, &id, true).await?,
        Command::Restart { id } => lifecycle(engine, Action::Restart, &id, true).await?,
        Command::Pause { id } => lifecycle(engine, Action::Pause, &id, true).await?,
        Command::Unpause { id } => lifecycle(engine, Action::Unpause, &id, true).await?,
        Command::Rm { id, yes } => lifecycle(engine, Action::Remove, &id, yes).await?,
        Command::Inspect { id } => output::print_json(&engine.container_details(&id).await?)?,
        Command::Stats { id } => output::print_json(&engine.container_stats(&id).await?)?,
        Command::Logs { id, tail, grep } => {
            let tail = tail.unwrap_or_else(|| cfg.log_tail.clone());
            let text = engine.container_logs(&id, Some(&tail)).await?;
            for line in filter_log_lines(&text, grep.as_deref().unwrap_or_default()) {
                println!("{}", line);
            }
        }
        Command::Images => output::print_json(&engine.list_images().await?)?,
        Command::Pull { name } => {
            engine.pull_image(&name).await?;
            info!("Pulled {}", name);
            output::print_success();
        }
        Command::Rmi { id, force } => {
            engine.remove_image(&id, force).await?;
            output::print_success();
        }
        Command::Volume(cmd) => match cmd {
            VolumeCommand::Ls => output::print_json(&engine.list_volumes().await?)?,
            VolumeCommand::Create { name } => {
                dock_core::validation::validate_name(&name)?;
                println!("{}", engine.create_volume(&name).await?);
            }
            VolumeCommand::Rm { name, force } => {
                engine.remove_volume(&name, force).await?;
                output::print_success();
            }
        },
        Command::Network(cmd) => match cmd {
            NetworkCommand::Ls => output::print_json(&engine.list_networks().await?)?,
            NetworkCommand::Create { name, driver } => {
                dock_core::validation::validate_network_name(&name)?;
                println!("{}", engine.create_network(&name, driver.as_deref()).await?);
            }
            NetworkCommand::Rm { id } => {
                engine.remove_network(&id).await?;
                output::print_success();
            }
        },
        Command::Search { query, limit } => {
            let limit = limit.unwrap_or(cfg.search_limit);
            output::print_json(&engine.search_registry(&query, Some(limit)).await?)?;
        }
        Command::Templates(TemplateCommand::Use { id, name }) => {
            use_template(engine, cfg, &id, name).await?
        }
        Command::Compose(ComposeCommand::Up { file, start }) => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let orchestrator = DeploymentOrchestrator::new(engine);
            let deployment = orchestrator.deploy(&text).await?;
            output::print_deployment(&deployment);
            if start {
                let report = orchestrator.start_all(&deployment.results).await;
                output::print_start_report(&report);
            }
        }
        Command::Watch { all, container } => watch(engine, cfg, all, container).await?,
        Command::Theme { .. } | Command::Templates(_) => bail!("command does not use the engine"),
    }
    Ok(())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y" | "yes")
}

/// Ask on the terminal without blocking the runtime.
async fn confirm_on_stdin(prompt: String) -> bool {
    let asked = tokio::task::spawn_blocking(move || {
        print!("{} [y/N] ", prompt);
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok::<_, std::io::Error>(is_yes(&answer))
    })
    .await;
    matches!(asked, Ok(Ok(true)))
}

async fn lifecycle(engine: Arc<dyn Engine>, action: Action, id: &str, confirmed: bool) -> Result<()> {
    let cache = ResourceCache::new(engine);
    let dispatcher = ActionDispatcher::new(cache);
    let mut view = ViewState::default();
    view.open_details(id);

    let confirmed = confirmed
        || !action.needs_confirmation()
        || confirm_on_stdin(format!("Are you sure you want to remove container {}?", id)).await;

    let outcome = dispatcher
        .apply(action, id, &mut view, |_| confirmed)
        .await?;

    match outcome {
        ActionOutcome::Applied => output::print_success(),
        ActionOutcome::Declined => println!("Cancelled"),
    }
    Ok(())
}

async fn use_template(
    engine: Arc<dyn Engine>,
    cfg: &Config,
    id: &str,
    name: Option<String>,
) -> Result<()> {
    let store = TemplateStore::open(cfg.templates_path())?;
    let template = store
        .get(id)
        .cloned()
        .with_context(|| format!("No template with id {}", id))?;

    let workflow = Arc::new(ProvisioningWorkflow::new(
        engine,
        cfg.provisioning_settings(),
    ));
    let mut handle = workflow.spawn(template);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                println!("Cancelled");
                return Ok(());
            }
            session = handle.progress.recv() => match session {
                Some(session) => output::print_progress(&session),
                None => break,
            },
        }
    }

    let Some(mut handoff) = handle.join().await else {
        bail!("Provisioning was cancelled");
    };
    if let Some(e) = &handoff.error {
        warn!("Continuing to creation despite: {}", e);
    }

    let mut spec = handoff.spec.clone();
    if name.is_some() {
        spec.name = name;
    }
    let container_id = workflow.finish(&mut handoff, &spec).await?;
    output::print_progress(&handoff.session);
    println!("{}", container_id);
    Ok(())
}

async fn watch(
    engine: Arc<dyn Engine>,
    cfg: &Config,
    all: bool,
    container: Option<String>,
) -> Result<()> {
    let cache = ResourceCache::new(engine);
    let scheduler = SyncScheduler::new(cache.clone(), cfg.scheduler_settings());
    let mut events = scheduler.subscribe();

    let mut view = ViewState {
        show_all: all,
        log_tail: cfg.log_tail.clone(),
        ..ViewState::default()
    };
    if let Some(id) = container {
        view.open_details(id);
    }

    scheduler.sync_view(&view).await;
    scheduler
        .connect()
        .await
        .context("Container engine is not reachable")?;

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::Refreshed { kind, .. }) => {
                    if let Some(snapshot) = cache.get(&kind).await {
                        output::print_snapshot(&snapshot)?;
                    }
                }
                Ok(SyncEvent::RefreshFailed { kind, error, .. }) => {
                    eprintln!("refresh of {} failed: {}", kind, error);
                }
                Ok(SyncEvent::ConnectionLost { error }) => {
                    eprintln!("{}", error);
                    eprintln!("Refresh stopped. Press Enter to retry, Ctrl-C to quit.");
                    loop {
                        tokio::select! {
                            _ = tokio::signal::ctrl_c() => {
                                scheduler.shutdown().await;
                                return Ok(());
                            }
                            line = stdin.next_line() => {
                                if line?.is_none() {
                                    scheduler.shutdown().await;
                                    return Ok(());
                                }
                                match scheduler.retry_connection().await {
                                    Ok(()) => break,
                                    Err(e) => eprintln!("{}. Press Enter to retry.", e),
                                }
                            }
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Display fell behind, skipped {} refresh events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

fn theme(cfg: &mut Config, path: &std::path::Path, mode: Option<String>) -> Result<()> {
    match mode.as_deref() {
        None => println!("{}", if cfg.dark_mode { "dark" } else { "light" }),
        Some(mode) => {
            cfg.dark_mode = mode == "dark";
            cfg.save(path)?;
            println!("{}", mode);
        }
    }
    Ok(())
}

fn templates_offline(cfg: &Config, cmd: TemplateCommand) -> Result<()> {
    let mut store = TemplateStore::open(cfg.templates_path())?;
    match cmd {
        TemplateCommand::Ls { category } => {
            for t in store.by_category(&category)? {
                let marker = if t.is_custom { " (custom)" } else { "" };
                println!("{:<44}{:<36}{}{}", t.id, t.image, t.name, marker);
            }
        }
        TemplateCommand::Show { id } => {
            let template = store
                .get(&id)
                .with_context(|| format!("No template with id {}", id))?;
            output::print_json(template)?;
        }
        TemplateCommand::Export { id } => println!("{}", store.export(&id)?),
        TemplateCommand::ExportAll => println!("{}", store.export_all()?),
        TemplateCommand::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            if text.trim_start().starts_with('[') {
                let count = store.import_all(&text)?;
                println!("Imported {} templates", count);
            } else {
                let template = store.import(&text)?;
                println!("{}", template.id);
            }
        }
        TemplateCommand::Rm { id } => {
            store.delete(&id)?;
            output::print_success();
        }
        TemplateCommand::Use { .. } => bail!("template use needs an engine connection"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" yes "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yeah"));
    }

    #[test]
    fn test_rm_flags_parse() {
        let cli = Cli::try_parse_from(["dock", "rm", "web", "--yes"]).unwrap();
        assert!(matches!(cli.command, Command::Rm { ref id, yes: true } if id == "web"));
    }
}
