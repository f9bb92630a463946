use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;

use stevedore::compose::{Composer, DownOptions, LifecycleReport, Options, UpOptions};
use stevedore::config::{Config, Jobs};
use stevedore::engine::{self, CancelToken, CliRuntime, ContainerSummary, Executor, ProcessExecutor};
use stevedore::lock::StoreLock;
use stevedore::logging;

#[derive(Parser, Debug)]
#[command(name = "stevedore", version, about = "Compose front end for containerd-backed engines")]
struct Cli {
    /// containerd namespace passed to the engine.
    #[arg(long, global = true, env = "CONTAINERD_NAMESPACE")]
    namespace: Option<String>,

    /// containerd socket address passed to the engine.
    #[arg(long, global = true, env = "CONTAINERD_ADDRESS")]
    address: Option<String>,

    /// Engine binary every container operation is delegated to.
    #[arg(long, global = true, env = "STEVEDORE_ENGINE")]
    engine: Option<String>,

    /// Directory holding the compose lock file.
    #[arg(long, global = true, env = "STEVEDORE_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage multi-container applications.
    Compose(ComposeArgs),
}

#[derive(Args, Debug)]
struct ComposeArgs {
    /// Compose configuration files.
    #[arg(short = 'f', long = "file")]
    files: Vec<PathBuf>,

    /// Project name.
    #[arg(short = 'p', long)]
    project_name: Option<String>,

    /// Alternate working directory.
    #[arg(long)]
    project_directory: Option<PathBuf>,

    /// Alternate environment file.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Profiles to enable.
    #[arg(long = "profile")]
    profiles: Vec<String>,

    /// Containers acted on concurrently per service ("auto" or a number).
    #[arg(long)]
    jobs: Option<Jobs>,

    /// Exit non-zero when any container operation fails.
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: ComposeCommand,
}

#[derive(Subcommand, Debug)]
enum ComposeCommand {
    /// Create and start containers.
    Up {
        /// Build images before starting containers.
        #[arg(long)]
        build: bool,
        /// Don't start the services after creating them.
        #[arg(long)]
        no_start: bool,
        services: Vec<String>,
    },
    /// Stop and remove containers and networks.
    Down {
        /// Remove named volumes declared in the manifest.
        #[arg(short = 'v', long)]
        volumes: bool,
        /// Remove containers for services not defined in the manifest.
        #[arg(long)]
        remove_orphans: bool,
    },
    /// Start existing containers.
    Start { services: Vec<String> },
    /// Stop running containers.
    Stop {
        /// Seconds to wait before killing.
        #[arg(short = 't', long = "timeout")]
        timeout: Option<u32>,
        services: Vec<String>,
    },
    /// Restart containers.
    Restart {
        /// Seconds to wait before killing.
        #[arg(short = 't', long = "timeout")]
        timeout: Option<u32>,
        services: Vec<String>,
    },
    /// Kill containers.
    Kill {
        /// Signal to send.
        #[arg(short = 's', long)]
        signal: Option<String>,
        services: Vec<String>,
    },
    /// Pause containers.
    Pause { services: Vec<String> },
    /// Unpause containers.
    Unpause { services: Vec<String> },
    /// List containers.
    Ps {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        services: Vec<String>,
    },
    /// Display the running processes of containers.
    Top { services: Vec<String> },
    /// List images used by the created containers.
    Images { services: Vec<String> },
    /// Print the normalized project.
    Config {
        /// Print the service names, one per line.
        #[arg(long)]
        services: bool,
    },
}

impl ComposeCommand {
    fn mutates(&self) -> bool {
        !matches!(
            self,
            ComposeCommand::Ps { .. }
                | ComposeCommand::Top { .. }
                | ComposeCommand::Images { .. }
                | ComposeCommand::Config { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    let mut cfg = Config::load(&cwd)?.unwrap_or_default();
    if let Some(engine) = cli.engine {
        cfg.engine = engine;
    }
    if cli.namespace.is_some() {
        cfg.namespace = cli.namespace;
    }
    if cli.address.is_some() {
        cfg.address = cli.address;
    }
    if cli.data_root.is_some() {
        cfg.data_root = cli.data_root;
    }

    match cli.command {
        Command::Compose(args) => compose(cfg, args),
    }
}

fn compose(cfg: Config, args: ComposeArgs) -> Result<()> {
    let argv_prefix = cfg.argv_prefix();
    let executor: Arc<dyn Executor> = Arc::new(
        ProcessExecutor::new(&argv_prefix).context("engine binary must not be empty")?,
    );
    let runtime = CliRuntime::new(Arc::clone(&executor));
    let strict = args.strict || cfg.strict;

    let options = Options {
        config_paths: args.files,
        project_name: args.project_name,
        project_directory: args.project_directory,
        env_file: args.env_file,
        profiles: args.profiles,
        environment: std::env::vars().collect(),
        argv_prefix,
        jobs: args.jobs.unwrap_or(cfg.jobs),
        network_exists: Some(Arc::new({
            let runtime = runtime.clone();
            move |name: &str| runtime.network_exists(name)
        })),
        volume_exists: Some(Arc::new({
            let runtime = runtime.clone();
            move |name: &str| runtime.volume_exists(name)
        })),
        ensure_image: Some(Arc::new({
            let runtime = runtime.clone();
            move |request: &engine::ImageRequest| runtime.ensure_image(request)
        })),
    };
    let composer = Composer::with_executor(options, Arc::clone(&executor), Arc::new(runtime))?;

    if let ComposeCommand::Config { services } = &args.command {
        if *services {
            for name in composer.resolve_service_names(&[])? {
                println!("{name}");
            }
        } else {
            print!("{}", serde_yaml::to_string(composer.project())?);
        }
        return Ok(());
    }

    engine::ensure_available(executor.as_ref())?;
    let _lock = if args.command.mutates() {
        Some(StoreLock::acquire(&cfg.lock_dir())?)
    } else {
        None
    };
    let cancel = CancelToken::new();
    cancel
        .cancel_on_interrupt()
        .context("failed to install interrupt handler")?;

    match args.command {
        ComposeCommand::Up { build, no_start, services } => finish(
            composer.up(&services, &UpOptions { build, no_start }, &cancel)?,
            strict,
        ),
        ComposeCommand::Down { volumes, remove_orphans } => finish(
            composer.down(&DownOptions { volumes, remove_orphans }, &cancel)?,
            strict,
        ),
        ComposeCommand::Start { services } => finish(composer.start(&services, &cancel)?, strict),
        ComposeCommand::Stop { timeout, services } => {
            finish(composer.stop(timeout, &services, &cancel)?, strict)
        }
        ComposeCommand::Restart { timeout, services } => {
            finish(composer.restart(timeout, &services, &cancel)?, strict)
        }
        ComposeCommand::Kill { signal, services } => {
            finish(composer.kill(signal, &services, &cancel)?, strict)
        }
        ComposeCommand::Pause { services } => finish(composer.pause(&services, &cancel)?, strict),
        ComposeCommand::Unpause { services } => {
            finish(composer.unpause(&services, &cancel)?, strict)
        }
        ComposeCommand::Ps { format, services } => {
            let containers = composer.ps(&services)?;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&containers)?),
                Format::Table => print_ps_table(&containers),
            }
            Ok(())
        }
        ComposeCommand::Top { services } => {
            for listing in composer.top(&services)? {
                println!("{}\n{}", listing.container, listing.output.trim_end());
            }
            Ok(())
        }
        ComposeCommand::Images { services } => {
            println!("{:<30} {:<20} {}", "CONTAINER", "SERVICE", "IMAGE");
            for row in composer.images(&services)? {
                println!("{:<30} {:<20} {}", row.container, row.service, row.image);
            }
            Ok(())
        }
        ComposeCommand::Config { .. } => Ok(()),
    }
}

/// Best effort by default: failures were already logged per container.
fn finish(report: LifecycleReport, strict: bool) -> Result<()> {
    if strict {
        report.into_result()?;
    } else if !report.is_success() {
        warn!(
            failed = report.failures().count(),
            total = report.outcomes.len(),
            "some container operations failed"
        );
    }
    Ok(())
}

fn print_ps_table(containers: &[ContainerSummary]) {
    println!("{:<30} {:<30} {:<20} {}", "NAME", "IMAGE", "SERVICE", "STATE");
    for c in containers {
        println!(
            "{:<30} {:<30} {:<20} {}",
            c.name,
            c.image,
            c.label(stevedore::compose::labels::SERVICE).unwrap_or_default(),
            c.state
        );
    }
}
