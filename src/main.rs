//! Claude Orchestrator CLI
//!
//! `cco box ...` manages the sandbox VM and moves jobs in and out of it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orchestrator::runner::{CommandRunner, CommandSpec, ProcessRunner};
use orchestrator::{
    paths, Config, Error, ExchangeLayout, JobExchange, LimaClient, Result,
    SandboxService, Validate,
};

#[derive(Parser)]
#[command(name = "cco", about = "Run Claude Code plans in a sandbox VM", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/cco/config.toml).
    #[arg(long, global = true, env = "CCO_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sandbox VM management.
    Box {
        #[command(subcommand)]
        action: BoxAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum BoxAction {
    /// Create, start and provision the sandbox.
    Create,
    /// Start a stopped sandbox.
    Start,
    /// Stop the sandbox.
    Stop,
    /// Delete the sandbox.
    Destroy,
    /// Print the sandbox state.
    Status,
    /// Copy agent config and skills into the sandbox.
    Provision,
    /// Open a shell in the sandbox, or run a command there.
    Shell {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Push the current branch and a plan into the sandbox.
    Push {
        /// Plan file, relative to the repository.
        plan: String,
        /// Run the launch command here instead of printing it.
        #[arg(long)]
        run: bool,
    },
    /// Wait for a job's results and fast-forward the current branch.
    Pull {
        job_id: String,
        /// Overrides pull.timeout_secs.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Overrides pull.poll_interval_secs.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path.
    Path,
    /// Print the config file contents.
    Show,
    /// Write a default config file if none exists.
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => paths::config_file()?,
    };

    match cli.command {
        Commands::Config { action } => config_command(action, &config_path),
        Commands::Box { action } => {
            let config = Config::load(&config_path)?;
            config.validate().check()?;
            box_command(action, &config).await
        }
    }
}

fn config_command(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => match std::fs::read_to_string(path) {
            Ok(contents) => print!("{}", contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = ?path, "no config file found");
            }
            Err(e) => return Err(e.into()),
        },
        ConfigAction::Init => {
            Config::init(path)?;
        }
    }
    Ok(())
}

async fn box_command(action: BoxAction, config: &Config) -> Result<()> {
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let vm = Arc::new(
        LimaClient::new(runner.clone())
            .with_name(&config.sandbox.vm_name)
            .with_limactl(&config.sandbox.limactl),
    );
    let exchange_root = paths::exchange_root()?;
    let sandbox = SandboxService::new(vm.clone(), exchange_root.clone());

    match action {
        BoxAction::Create => sandbox.create().await,
        BoxAction::Start => sandbox.start().await,
        BoxAction::Stop => sandbox.stop().await,
        BoxAction::Destroy => sandbox.destroy().await,
        BoxAction::Status => {
            println!("{}", sandbox.status().await?);
            Ok(())
        }
        BoxAction::Provision => sandbox.provision().await,
        BoxAction::Shell { args } => sandbox.shell(&args).await,
        BoxAction::Push { plan, run } => {
            let cwd = std::env::current_dir()?;
            if !cwd.join(&plan).exists() {
                return Err(Error::Config(format!("plan file not found: {}", plan)));
            }

            let exchange = JobExchange::new(vm, runner.clone(), ExchangeLayout::new(exchange_root));
            let mut job = exchange.prepare(&cwd, &plan).await?;

            if !config.go_proxy.patterns.is_empty() {
                if let Err(e) = exchange
                    .prefetch_dependencies(&mut job, &cwd, &config.go_proxy.patterns)
                    .await
                {
                    tracing::warn!(error = %e, "failed to cache Go dependencies, continuing without them");
                }
            }

            tracing::info!(job_id = %job.job_id, "job prepared, pull with: cco box pull {}", job.job_id);
            if run {
                let output = runner
                    .interactive(&CommandSpec::new("sh").arg("-c").arg(&job.command))
                    .await?;
                if !output.success {
                    tracing::warn!(status = ?output.code, "agent exited unsuccessfully");
                }
            } else {
                println!("{}", job.job_id);
                println!("{}", job.command);
            }
            Ok(())
        }
        BoxAction::Pull {
            job_id,
            timeout_secs,
            interval_secs,
        } => {
            let cwd = std::env::current_dir()?;
            let mut options = config.pull.options();
            if let Some(secs) = timeout_secs {
                options = options.with_timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = interval_secs {
                options = options.with_poll_interval(Duration::from_secs(secs));
            }

            let exchange = JobExchange::new(vm, runner, ExchangeLayout::new(exchange_root));
            exchange
                .pull_until(&cwd, &job_id, &options, async {
                    // An error installing the handler means we wait for the timeout instead.
                    if tokio::signal::ctrl_c().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
                .await
        }
    }
}
