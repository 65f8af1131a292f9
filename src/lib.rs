//! Profile synchronization engine for Logitech Gaming Software game
//! profiles.
//!
//! This library exposes the core functionality of the `lgsync` CLI for
//! use in tests and embedding applications.
//!
//! # Modules
//!
//! - `profile`: XML profile parsing and the in-memory data model
//! - `watcher`: Debounced polling directory watcher with optional OS
//!   change notifications
//! - `sync`: Reconciliation controller and the service wrapper
//! - `native`: Adapter for a native gaming-software event stream
//! - `host`: Outbound notification seam (list, current profile, key
//!   states)
//! - `config`: Engine settings
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod native;
pub mod profile;
pub mod sync;
pub mod watcher;

pub use config::Settings;
pub use error::{LgsError, Result};
pub use profile::Profile;
pub use sync::{SyncHandle, SyncService};
