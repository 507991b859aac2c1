//! Remote command executor: forced self-removal and forced update.
//!
//! Both paths catch and log their own failures and report an outcome; they
//! never return an error into the sync cycle that invoked them.

use crate::command::download::Downloader;
use crate::kiosk::KioskController;
use crate::platform::PackageManager;
use crate::remote::merge::UpdateDirective;
use crate::store::PolicyStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UninstallOutcome {
    /// Removed through the privileged package facility.
    Silent,
    /// Handed to the user as a standard removal request.
    Requested,
    /// Neither path was accepted; the record is kept.
    Failed { reason: String },
}

impl UninstallOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, UninstallOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Installed { version: i64 },
    /// Server version not strictly greater than the installed one.
    NotNewer { installed: i64, offered: i64 },
    /// No privileged install session; nothing attempted.
    Unsupported,
    Failed { reason: String },
}

pub struct RemoteCommandExecutor {
    packages: Arc<dyn PackageManager>,
    kiosk: Arc<KioskController>,
    store: PolicyStore,
    downloader: Arc<dyn Downloader>,
    downloads_dir: PathBuf,
    own_package: String,
}

impl RemoteCommandExecutor {
    pub fn new(
        packages: Arc<dyn PackageManager>,
        kiosk: Arc<KioskController>,
        store: PolicyStore,
        downloader: Arc<dyn Downloader>,
        downloads_dir: impl Into<PathBuf>,
        own_package: impl Into<String>,
    ) -> Self {
        Self {
            packages,
            kiosk,
            store,
            downloader,
            downloads_dir: downloads_dir.into(),
            own_package: own_package.into(),
        }
    }

    /// Release restrictions, request removal (silent if possible, else
    /// interactive) and clear the store once a request was accepted.
    pub fn force_uninstall(&self) -> UninstallOutcome {
        tracing::info!("forced uninstall requested by server");
        self.kiosk.release_for_removal();

        let outcome = self.request_removal();
        if outcome.succeeded() {
            if let Err(e) = self.store.clear() {
                tracing::warn!(error = %e, "failed to clear policy store after removal request");
            }
        } else {
            tracing::warn!(?outcome, "removal was not accepted, keeping device record");
        }
        outcome
    }

    fn request_removal(&self) -> UninstallOutcome {
        if self.packages.can_uninstall_silently() {
            match self.packages.uninstall_silently(&self.own_package) {
                Ok(()) => return UninstallOutcome::Silent,
                Err(e) => {
                    tracing::warn!(error = %e, "silent uninstall failed, falling back to removal request")
                }
            }
        }
        match self.packages.request_uninstall(&self.own_package) {
            Ok(()) => UninstallOutcome::Requested,
            Err(e) => UninstallOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Install `directive` if it is newer than what is installed and a
    /// privileged install session exists. The artifact is always removed.
    pub async fn update(&self, directive: &UpdateDirective) -> UpdateOutcome {
        let installed = self.store.installed_version();
        if directive.version <= installed {
            return UpdateOutcome::NotNewer {
                installed,
                offered: directive.version,
            };
        }
        if !self.packages.can_install_silently() {
            // No interactive fallback.
            tracing::info!(
                offered = directive.version,
                installed,
                "update available but silent install is not possible"
            );
            return UpdateOutcome::Unsupported;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.downloads_dir).await {
            return self.update_failed(format!("cannot create download directory: {}", e));
        }
        let artifact = self
            .downloads_dir
            .join(format!("update-{}-{}.apk", directive.version, uuid::Uuid::new_v4()));

        let outcome = match self.downloader.download(&directive.url, &artifact).await {
            Err(e) => self.update_failed(e.to_string()),
            Ok(bytes) => {
                tracing::info!(version = directive.version, bytes, "installing update");
                match self.packages.install_silently(&artifact) {
                    Ok(()) => match self.store.set_installed_version(directive.version) {
                        Ok(()) => UpdateOutcome::Installed {
                            version: directive.version,
                        },
                        Err(e) => self.update_failed(format!(
                            "installed but could not record version: {}",
                            e
                        )),
                    },
                    Err(e) => self.update_failed(e.to_string()),
                }
            }
        };

        match tokio::fs::remove_file(&artifact).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %artifact.display(), error = %e, "could not delete artifact"),
        }
        outcome
    }

    fn update_failed(&self, reason: String) -> UpdateOutcome {
        tracing::warn!(%reason, "update failed");
        UpdateOutcome::Failed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::download::DownloadError;
    use crate::config::types::RestrictionRetention;
    use crate::platform::{PlatformCall, SimulatedPlatform};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    /// Writes a fixed payload, or fails.
    struct FakeDownloader {
        fail: bool,
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn download(&self, _url: &str, dest: &Path) -> Result<u64, DownloadError> {
            if self.fail {
                return Err(DownloadError::Status(500));
            }
            tokio::fs::write(dest, b"apk").await?;
            Ok(3)
        }
    }

    fn executor(
        sim: &Arc<SimulatedPlatform>,
        store: &PolicyStore,
        dir: &Path,
        fail_download: bool,
    ) -> RemoteCommandExecutor {
        let kiosk = Arc::new(KioskController::new(
            sim.clone(),
            RestrictionRetention::RetainWhileProtected,
        ));
        RemoteCommandExecutor::new(
            sim.clone(),
            kiosk,
            store.clone(),
            Arc::new(FakeDownloader {
                fail: fail_download,
            }),
            dir.join("downloads"),
            "com.lockwarden.agent",
        )
    }

    fn store() -> PolicyStore {
        let s = PolicyStore::new(Arc::new(MemoryStore::new()));
        s.set_device_id("dev-1").unwrap();
        s.set_protection_enabled(true).unwrap();
        s.set_installed_version(3).unwrap();
        s
    }

    fn update(version: i64) -> UpdateDirective {
        UpdateDirective {
            url: "https://example.com/agent.apk".to_string(),
            version,
        }
    }

    #[test]
    fn test_silent_uninstall_clears_store() {
        let tmp = TempDir::new().unwrap();
        let sim = Arc::new(SimulatedPlatform::new());
        let s = store();
        let outcome = executor(&sim, &s, tmp.path(), false).force_uninstall();
        assert_eq!(outcome, UninstallOutcome::Silent);
        assert!(s.device_id().is_none());
        assert!(sim
            .calls()
            .contains(&PlatformCall::UninstallSilently("com.lockwarden.agent".to_string())));
    }

    #[test]
    fn test_uninstall_falls_back_to_request() {
        let tmp = TempDir::new().unwrap();
        let sim = Arc::new(SimulatedPlatform::new().with_silent_packages(false));
        let s = store();
        let outcome = executor(&sim, &s, tmp.path(), false).force_uninstall();
        assert_eq!(outcome, UninstallOutcome::Requested);
        assert!(s.device_id().is_none());
    }

    #[test]
    fn test_failed_removal_keeps_record() {
        let tmp = TempDir::new().unwrap();
        let sim = Arc::new(
            SimulatedPlatform::new()
                .failing("uninstall")
                .failing("request_uninstall"),
        );
        let s = store();
        let outcome = executor(&sim, &s, tmp.path(), false).force_uninstall();
        assert!(!outcome.succeeded());
        assert_eq!(s.device_id().as_deref(), Some("dev-1"));
    }

    #[tokio::test]
    async fn test_update_installs_only_newer_versions() {
        let tmp = TempDir::new().unwrap();
        let sim = Arc::new(SimulatedPlatform::new());
        let s = store();
        let exec = executor(&sim, &s, tmp.path(), false);

        assert!(matches!(exec.update(&update(3)).await, UpdateOutcome::NotNewer { .. }));
        assert!(matches!(exec.update(&update(2)).await, UpdateOutcome::NotNewer { .. }));
        assert!(!sim
            .calls()
            .iter()
            .any(|c| matches!(c, PlatformCall::InstallSilently(_))));

        assert_eq!(
            exec.update(&update(4)).await,
            UpdateOutcome::Installed { version: 4 }
        );
        assert_eq!(s.installed_version(), 4);
    }

    #[tokio::test]
    async fn test_update_deletes_artifact_after_install() {
        let tmp = TempDir::new().unwrap();
        let sim = Arc::new(SimulatedPlatform::new().failing("install"));
        let s = store();
        let exec = executor(&sim, &s, tmp.path(), false);

        assert!(matches!(exec.update(&update(9)).await, UpdateOutcome::Failed { .. }));
        assert_eq!(s.installed_version(), 3);
        let leftovers = std::fs::read_dir(tmp.path().join("downloads")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_update_without_silent_install_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let sim = Arc::new(SimulatedPlatform::new().with_silent_packages(false));
        let s = store();
        let exec = executor(&sim, &s, tmp.path(), false);
        assert_eq!(exec.update(&update(9)).await, UpdateOutcome::Unsupported);
    }

    #[tokio::test]
    async fn test_download_failure_is_reported_not_raised() {
        let tmp = TempDir::new().unwrap();
        let sim = Arc::new(SimulatedPlatform::new());
        let s = store();
        let exec = executor(&sim, &s, tmp.path(), true);
        assert!(matches!(exec.update(&update(9)).await, UpdateOutcome::Failed { .. }));
        assert_eq!(s.installed_version(), 3);
    }
}
