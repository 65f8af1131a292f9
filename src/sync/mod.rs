//! Reconciliation controller and the service wrapper around it.

pub mod controller;
pub mod service;

pub use controller::{Controller, ControllerMsg, profile_id_from_path};
pub use service::{SHUTDOWN_TIMEOUT, SyncHandle, SyncService};
