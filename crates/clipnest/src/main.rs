use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info};
use tokio::signal::unix::{Signal, SignalKind, signal};

use clipnest::clipboard;
use clipnest::config::{self, AppPaths, ClipboardBackend, ClipnestConfig};
use clipnest::daemon::Daemon;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_main(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve(ServeCommand::default()));

    match command {
        Command::Completions { shell } => return handle_completions(shell),
        Command::Config {
            command: ConfigCommand::Init { force },
        } => return handle_init(cli.common.config, force),
        _ => {}
    }

    let ctx = RuntimeContext::new(cli.common)?;
    ctx.init_logging()?;
    debug!("resolved paths: {}", ctx.paths);

    match command {
        Command::Serve(cmd) => async_main(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { .. } => Ok(()),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "clipnestd",
    author,
    version,
    about = "ClipNest clipboard history daemon.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON (logs and `config show`)
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the daemon (default)
    Serve(ServeCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Default, Args)]
struct ServeCommand {
    /// Socket path (overrides config)
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,
    /// Ledger database path (overrides config)
    #[arg(long, value_name = "PATH")]
    ledger: Option<PathBuf>,
    /// In-memory history capacity (overrides config)
    #[arg(long, value_name = "N")]
    max_entries: Option<usize>,
    /// Clipboard backend (overrides config)
    #[arg(long, value_enum)]
    clipboard: Option<BackendOption>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendOption {
    System,
    Memory,
}

impl From<BackendOption> for ClipboardBackend {
    fn from(value: BackendOption) -> Self {
        match value {
            BackendOption::System => ClipboardBackend::System,
            BackendOption::Memory => ClipboardBackend::Memory,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: ClipnestConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = config::load_or_init_config(&paths.config_file, true)?;
        let paths = paths.apply_overrides(&config)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("clipnest={level},clipnestd={level},sqlx=warn"))
        });

        // `try_init` also bridges `log` records into tracing.
        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(self.common.trace),
                )
                .try_init()
                .ok();
        }

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.quiet {
            LevelFilter::Error
        } else if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

async fn handle_serve(mut ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    if let Some(socket) = cmd.socket {
        ctx.paths.socket = config::expand_path(socket)?;
    }
    if let Some(ledger) = cmd.ledger {
        ctx.paths.ledger = config::expand_path(ledger)?;
    }
    if let Some(max_entries) = cmd.max_entries {
        ctx.config.history.max_entries = max_entries;
    }
    if let Some(backend) = cmd.clipboard {
        ctx.config.clipboard.backend = backend.into();
    }
    ctx.config.validate()?;

    info!(
        "Starting clipnestd (user={}, {})",
        env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        ctx.paths
    );

    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let clipboard = clipboard::from_backend(ctx.config.clipboard.backend)
        .context("opening clipboard backend")?;
    let daemon = Daemon::start(&ctx.config, &ctx.paths, clipboard).await?;

    let waited = wait_for_shutdown_signal(&mut terminate).await;
    daemon.shutdown().await;
    waited
}

async fn wait_for_shutdown_signal(terminate: &mut Signal) -> Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            info!("Received interrupt");
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
                println!("# socket: {}", ctx.paths.socket.display());
                println!("# ledger: {}", ctx.paths.ledger.display());
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Init { .. } => Ok(()),
    }
}

fn handle_init(config_override: Option<PathBuf>, force: bool) -> Result<()> {
    let paths = AppPaths::discover(config_override)?;
    if paths.config_file.exists() && !force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            paths.config_file.display()
        ));
    }
    config::write_default_config(&paths.config_file)?;
    println!("{}", paths.config_file.display());
    Ok(())
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "clipnestd", &mut io::stdout());
    Ok(())
}
