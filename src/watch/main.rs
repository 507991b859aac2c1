//! lockwarden-watch: the tamper watcher process.
//!
//! The platform's event bridge pipes one JSON object per foreground change
//! into stdin. For each event the watcher re-reads the policy state, decides
//! what to do, performs the actions and writes the decision as one JSON line
//! to stdout.
//!
//! Stdin format:
//! {"package": "com.android.settings", "class_name": "...", "texts": ["Uninstall"]}
//!
//! Exits 0 when the stream closes, 1 when it cannot start.

use anyhow::{Context, Result};
use lockwarden::agent::build_platform;
use lockwarden::audit::Journal;
use lockwarden::config::parse_config_file;
use lockwarden::store::{FileStore, PolicyStore};
use lockwarden::utils::paths;
use lockwarden::watcher::{pump_events, TamperWatcher, WatcherRules};
use std::process;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lockwarden=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("[lockwarden-watch] {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("[lockwarden-watch]   caused by: {}", cause);
        }
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let state_dir = paths::state_dir()?;
    let config = parse_config_file(paths::config_path(&state_dir))?;
    let rules = WatcherRules::from_config(&config)?;

    let store = PolicyStore::new(Arc::new(
        FileStore::open(paths::store_path(&state_dir)).context("Failed to open the policy store")?,
    ));
    let journal = Journal::open(paths::journal_path(&state_dir))?;
    let platform = build_platform(&config);

    let watcher =
        TamperWatcher::new(rules, store, platform.ui.clone()).with_journal(Arc::new(journal));

    let stats = pump_events(
        &watcher,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    tracing::info!(
        events = stats.events,
        interventions = stats.interventions,
        malformed = stats.malformed,
        "event stream closed"
    );
    Ok(())
}
