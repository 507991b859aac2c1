pub mod download;
pub mod executor;

pub use download::{DownloadError, Downloader, HttpDownloader};
pub use executor::{RemoteCommandExecutor, UninstallOutcome, UpdateOutcome};
