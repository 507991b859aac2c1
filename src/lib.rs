//! Lockwarden: remote device-lockdown agent library.
//!
//! Exposes the agent's components for the two binaries (`lockwarden` and
//! `lockwarden-watch`) and for integration tests.

pub mod agent;
pub mod audit;
pub mod cli;
pub mod command;
pub mod config;
pub mod icon;
pub mod kiosk;
pub mod platform;
pub mod policy;
pub mod remote;
pub mod scheduler;
pub mod store;
pub mod surface;
pub mod utils;
pub mod watcher;
