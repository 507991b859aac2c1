//! Lockwarden: remote device-lockdown agent.
//!
//! Quick start:
//!   lockwarden init                      # write config.yaml
//!   lockwarden setup --device-id <ID>    # register and arm protection
//!   lockwarden run                       # poll the server and enforce
//!
//! For more info: lockwarden --help

use clap::{Parser, Subcommand};
use colored::Colorize;
use lockwarden::cli;
use lockwarden::cli::pin::PinAction;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lockwarden enforces the management server's lock policy on this device.
#[derive(Parser)]
#[command(
    name = "lockwarden",
    version,
    about = "Enforce a remotely managed lock policy on this device",
    long_about = "Lockwarden asks the management server whether this device\n\
                  should be locked, enforces the answer, resists removal and\n\
                  runs the server's update and uninstall directives.\n\n\
                  Quick start:\n  \
                  lockwarden init                      # write config.yaml\n  \
                  lockwarden setup --device-id <ID>    # register the device\n  \
                  lockwarden run                       # start enforcing"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the device's lock state (default)
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Register this device and arm protection
    Setup {
        /// Identifier the management server knows this device by
        #[arg(short, long)]
        device_id: Option<String>,
    },

    /// Check with the server now
    Sync,

    /// Master unlock: release the lock and allow removal
    Unlock {
        #[arg(long, env = "LOCKWARDEN_PIN", hide_env_values = true)]
        pin: String,
    },

    /// Take a break from the lock
    Break {
        #[arg(long, env = "LOCKWARDEN_PIN", hide_env_values = true)]
        pin: String,
    },

    /// Remove protection so the agent can be uninstalled
    RemoveProtection {
        #[arg(long, env = "LOCKWARDEN_PIN", hide_env_values = true)]
        pin: String,
    },

    /// Start over after protection was removed
    ResetSetup,

    /// Run the agent: boot recovery, polling and enforcement until Ctrl-C
    Run,

    /// See what happened on this device
    Log {
        /// Filter by kind
        #[arg(short, long, help = "Filter: transition, tamper, pin, command, sync")]
        kind: Option<String>,

        /// Filter by outcome
        #[arg(short, long, help = "Filter: ok, rejected, failed")]
        outcome: Option<String>,

        /// Limit number of entries shown
        #[arg(short, long, help = "Max entries to show")]
        limit: Option<usize>,

        /// Show only the summary
        #[arg(long)]
        summary: bool,
    },

    /// Validate the configuration file
    Check {
        /// Path to the config file (default: $LOCKWARDEN_HOME/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the configuration template
    Init {
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Dial a code; the administration code opens the admin view
    #[command(hide = true)]
    Dial { code: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Some(Commands::Run) => "lockwarden=info",
        _ => "lockwarden=warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        None => cli::status::run_status(false),
        Some(Commands::Status { json }) => cli::status::run_status(json),
        Some(Commands::Setup { device_id }) => cli::setup::run_setup(device_id),
        Some(Commands::Sync) => cli::sync::run_sync().await,
        Some(Commands::Unlock { pin }) => cli::pin::run_pin_action(PinAction::Unlock, &pin),
        Some(Commands::Break { pin }) => cli::pin::run_pin_action(PinAction::Break, &pin),
        Some(Commands::RemoveProtection { pin }) => {
            cli::pin::run_pin_action(PinAction::RemoveProtection, &pin)
        }
        Some(Commands::ResetSetup) => cli::pin::run_reset_setup(),
        Some(Commands::Run) => cli::run::run_agent().await,
        Some(Commands::Log {
            kind,
            outcome,
            limit,
            summary,
        }) => cli::log::run_log(kind.as_deref(), outcome.as_deref(), limit, summary),
        Some(Commands::Check { config }) => cli::check::run_check(config),
        Some(Commands::Init { output, force }) => cli::init::run_init(output, force),
        Some(Commands::Dial { code }) => cli::status::run_dial(&code),
    };

    if let Err(e) = result {
        eprintln!();
        eprintln!("  {} {}", "✗".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        eprintln!();
        std::process::exit(1);
    }
}
