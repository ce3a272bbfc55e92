//! console-share CLI
//!
//! Single binary for sharing Incus consoles on fixed TCP ports:
//! - Daemon (supervises every configured bridge, serves IPC)
//! - Foreground `shell` / `console` for a single bridge
//! - Management commands (list, start, stop, status, ...)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console_share::commands;
use console_share::ipc::DaemonClient;
use console_share::output::print_warning;
use cs_core::SessionKind;

#[derive(Parser)]
#[command(name = "console-share")]
#[command(author, version, about = "Share Incus consoles and shells on fixed TCP ports")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy daemon for every enabled instance mapping
    Serve {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Share a shell of an instance in the foreground
    Shell {
        /// Instance name
        instance: String,
        /// TCP port to listen on (defaults to the instance mapping)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Share the console of an instance in the foreground
    Console {
        /// Instance name
        instance: String,
        /// Share the VGA (SPICE) display instead of the text console
        #[arg(long)]
        vga: bool,
        /// TCP port to listen on (defaults to the instance mapping)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List proxies supervised by the daemon
    List,

    /// Ask the daemon to start a proxy
    Start {
        /// Instance name
        instance: String,
        /// Session type (defaults to the instance mapping, then the instance type)
        #[arg(short = 't', long = "type")]
        kind: Option<SessionKind>,
        /// TCP port (defaults to the instance mapping)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Stop proxies for an instance
    Stop {
        /// Instance name
        instance: String,
        /// Which session type to stop
        #[arg(short = 't', long = "type", value_enum, default_value_t = StopTarget::All)]
        kind: StopTarget,
    },

    /// Show daemon status
    Status,

    /// Stop the daemon and all of its proxies
    Shutdown,

    /// List instances on the configured remote
    Instances,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
    /// Generate a config mapping every instance to a port
    Generate {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StopTarget {
    Shell,
    Console,
    Vga,
    All,
}

impl StopTarget {
    fn kind(self) -> Option<SessionKind> {
        match self {
            StopTarget::Shell => Some(SessionKind::Shell),
            StopTarget::Console => Some(SessionKind::Console),
            StopTarget::Vga => Some(SessionKind::Vga),
            StopTarget::All => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.as_ref();

    // Handle no command - show quick status
    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            show_quick_status(config_path).await;
            return Ok(());
        }
    };

    match command {
        Commands::Serve { foreground } => {
            commands::serve_command(config_path, foreground).await?;
        }

        Commands::Shell { instance, port } => {
            commands::session_command(config_path, &instance, SessionKind::Shell, port).await?;
        }

        Commands::Console {
            instance,
            vga,
            port,
        } => {
            let kind = if vga {
                SessionKind::Vga
            } else {
                SessionKind::Console
            };
            commands::session_command(config_path, &instance, kind, port).await?;
        }

        Commands::List => {
            let mut client = daemon_client(config_path)?;
            commands::list_command(&mut client).await?;
        }

        Commands::Start {
            instance,
            kind,
            port,
        } => {
            let mut client = daemon_client(config_path)?;
            commands::start_command(&mut client, &instance, kind, port).await?;
        }

        Commands::Stop { instance, kind } => {
            let mut client = daemon_client(config_path)?;
            commands::stop_command(&mut client, &instance, kind.kind()).await?;
        }

        Commands::Status => {
            let mut client = daemon_client(config_path)?;
            commands::status_command(&mut client).await?;
        }

        Commands::Shutdown => {
            let mut client = daemon_client(config_path)?;
            commands::shutdown_command(&mut client).await?;
        }

        Commands::Instances => {
            commands::instances_command(config_path).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Path => commands::config_path(config_path)?,
            ConfigAction::Generate { force } => {
                commands::config_generate(config_path, force).await?
            }
        },
    }

    Ok(())
}

/// Client for the daemon named by the configuration
fn daemon_client(config_path: Option<&PathBuf>) -> Result<DaemonClient> {
    let config = commands::load_share_config(config_path)?;
    Ok(DaemonClient::new(config.ipc_address()))
}

async fn show_quick_status(config_path: Option<&PathBuf>) {
    println!();
    println!("  \x1b[1;34mconsole-share\x1b[0m - Incus consoles on fixed TCP ports");
    println!();

    match daemon_client(config_path) {
        Ok(mut client) => match client.ping().await {
            Ok(true) => {
                println!("  Daemon: \x1b[32m●\x1b[0m Running");
                if let Ok(proxies) = client.list_proxies().await {
                    println!("  Proxies: {}", proxies.len());
                }
            }
            _ => println!("  Daemon: \x1b[31m●\x1b[0m Not running"),
        },
        Err(e) => print_warning(&format!("{:#}", e)),
    }

    println!();
    println!("  Commands:");
    println!("    console-share serve              Start the daemon");
    println!("    console-share shell <name>       Share a shell in the foreground");
    println!("    console-share console <name>     Share a console (--vga for SPICE)");
    println!("    console-share list               List proxies");
    println!();
}
