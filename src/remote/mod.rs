pub mod client;
pub mod merge;
pub mod protocol;

pub use client::{FetchedStatus, HttpStatusClient, RemoteError, StatusSource};
pub use merge::{merge_status, Directives, FieldChange, StatusDiff, UpdateDirective};
pub use protocol::RemoteStatus;
