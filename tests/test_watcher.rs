//! The tamper watcher reading state written by a separately composed agent.
//!
//! The two share nothing but the state file, as the agent daemon and the
//! `lockwarden-watch` process do on a device.

use async_trait::async_trait;
use chrono::Utc;
use lockwarden::agent::{Agent, AgentParts, SOURCE_AGENT};
use lockwarden::audit::{EntryKind, Journal, JournalReader};
use lockwarden::command::{DownloadError, Downloader};
use lockwarden::config::AgentConfig;
use lockwarden::platform::{Platform, SimulatedPlatform};
use lockwarden::policy::types::LockdownState;
use lockwarden::remote::{FetchedStatus, RemoteError, RemoteStatus, StatusSource};
use lockwarden::store::{FileStore, PolicyStore};
use lockwarden::watcher::{
    pump_events, EnforcementAction, ForegroundEvent, Intervention, PumpStats, TamperWatcher,
    WatcherDecision, WatcherRules,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Always answers with the body currently set.
struct FixedSource(Mutex<String>);

#[async_trait]
impl StatusSource for FixedSource {
    async fn fetch_status(&self, _device_id: &str) -> Result<FetchedStatus, RemoteError> {
        let raw = self.0.lock().unwrap().clone();
        Ok(FetchedStatus {
            status: RemoteStatus::from_json(&raw)
                .map_err(|e| RemoteError::Malformed(e.to_string()))?,
            raw,
        })
    }
}

struct NoDownloads;

#[async_trait]
impl Downloader for NoDownloads {
    async fn download(&self, url: &str, _dest: &Path) -> Result<u64, DownloadError> {
        panic!("unexpected download of {}", url);
    }
}

const LOCKED: &str = r#"{"is_freezed": 1, "is_protected": 1}"#;
const UNLOCKED: &str = r#"{"is_freezed": 0, "is_protected": 1}"#;

struct Device {
    dir: TempDir,
    source: Arc<FixedSource>,
    agent: Arc<Agent>,
    watcher_ui: Arc<SimulatedPlatform>,
    watcher: TamperWatcher,
}

impl Device {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state.json");
        let journal = dir.path().join("journal.jsonl");
        let source = Arc::new(FixedSource(Mutex::new(UNLOCKED.to_string())));

        let agent = Agent::new(AgentParts {
            config: AgentConfig::default(),
            kv: Arc::new(FileStore::open(&state).unwrap()),
            source: source.clone(),
            platform: Platform::from_backend(Arc::new(SimulatedPlatform::new())),
            downloader: Arc::new(NoDownloads),
            downloads_dir: dir.path().join("downloads"),
            journal: Some(Arc::new(Journal::open(&journal).unwrap())),
            label: SOURCE_AGENT,
        })
        .unwrap();

        let watcher_ui = Arc::new(SimulatedPlatform::new());
        let watcher = TamperWatcher::new(
            WatcherRules::from_config(&AgentConfig::default()).unwrap(),
            PolicyStore::new(Arc::new(FileStore::open(&state).unwrap())),
            watcher_ui.clone(),
        )
        .with_journal(Arc::new(Journal::open(&journal).unwrap()));

        Self {
            dir,
            source,
            agent,
            watcher_ui,
            watcher,
        }
    }

    async fn serve(&self, body: &str) {
        *self.source.0.lock().unwrap() = body.to_string();
        self.agent.sync_once(Utc::now()).await.unwrap();
    }

    fn set_up(&self) {
        self.agent.save_device_id("dev-7").unwrap();
        self.agent.complete_setup(Utc::now()).unwrap();
    }
}

fn game() -> ForegroundEvent {
    ForegroundEvent::new("com.example.game")
}

fn uninstall_page() -> ForegroundEvent {
    ForegroundEvent::new("com.android.settings")
        .with_text("App info")
        .with_text("Uninstall")
}

#[test]
fn test_nothing_enforced_before_setup() {
    let device = Device::new();
    assert!(device.watcher.handle(&uninstall_page(), Utc::now()).is_empty());
    assert!(device.watcher.handle(&game(), Utc::now()).is_empty());
}

#[test]
fn test_self_defense_follows_protection() {
    let device = Device::new();
    device.set_up();

    let decision = device.watcher.handle(&uninstall_page(), Utc::now());
    assert!(matches!(
        decision.interventions[..],
        [Intervention::SelfDefense { .. }]
    ));
    assert_eq!(device.watcher_ui.ui_actions()[0], EnforcementAction::GoHome);
    // Protected but not locked: other apps are left alone.
    assert!(device.watcher.handle(&game(), Utc::now()).is_empty());

    device.agent.remove_protection("1133", Utc::now()).unwrap();
    assert_eq!(device.agent.state(), LockdownState::Unprotected);
    assert!(device.watcher.handle(&uninstall_page(), Utc::now()).is_empty());
}

#[tokio::test]
async fn test_lock_enforcement_follows_agent_state() {
    let device = Device::new();
    device.set_up();

    device.serve(LOCKED).await;
    assert_eq!(
        device.watcher.handle(&game(), Utc::now()).actions,
        vec![EnforcementAction::BringLockToFront]
    );
    // The dialer stays usable while locked.
    assert!(device
        .watcher
        .handle(&ForegroundEvent::new("com.android.dialer"), Utc::now())
        .is_empty());

    device.agent.grant_break("1133", Utc::now()).unwrap();
    assert!(device.watcher.handle(&game(), Utc::now()).is_empty());

    device.serve(UNLOCKED).await;
    assert_eq!(device.agent.state(), LockdownState::Active);
    assert!(device.watcher.handle(&game(), Utc::now()).is_empty());
}

#[test]
fn test_shade_is_collapsed_while_locked() {
    let device = Device::new();
    device.set_up();
    tokio_test::block_on(device.serve(LOCKED));

    let decision = device
        .watcher
        .handle(&ForegroundEvent::new("com.android.systemui"), Utc::now());
    assert_eq!(
        decision.actions,
        vec![
            EnforcementAction::DismissNotificationShade,
            EnforcementAction::GoBack,
            EnforcementAction::BringLockToFront,
        ]
    );
}

#[tokio::test]
async fn test_event_stream_is_journaled() {
    let device = Device::new();
    device.set_up();
    device.serve(LOCKED).await;

    let input = [
        serde_json::to_string(&game()).unwrap(),
        "{\"package\": ".to_string(),
        serde_json::to_string(&uninstall_page()).unwrap(),
        serde_json::to_string(&ForegroundEvent::new("com.android.dialer")).unwrap(),
    ]
    .join("\n");
    let mut output = Vec::new();

    let stats = pump_events(&device.watcher, input.as_bytes(), &mut output)
        .await
        .unwrap();
    assert_eq!(
        stats,
        PumpStats {
            events: 3,
            interventions: 2,
            malformed: 1
        }
    );

    let decisions: Vec<WatcherDecision> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(decisions.len(), 3);
    assert!(decisions[2].is_empty());

    let tamper: Vec<_> = JournalReader::with_path(device.dir.path().join("journal.jsonl"))
        .read_all()
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EntryKind::Tamper)
        .collect();
    assert_eq!(tamper.len(), 2);
    assert!(tamper[0].summary.contains("com.example.game"));
    assert!(tamper[1].summary.contains("Uninstall"));
}
