// SPDX-License-Identifier: MIT
//! taskd — minimal task-tracking RPC daemon.
//!
//! An in-memory task store exposed as JSON-RPC 2.0 over a local WebSocket,
//! guarded by a per-call bearer-token check. The `taskd` binary runs the
//! daemon in the foreground (`taskd serve`) and doubles as an RPC client for
//! it (`taskd task create`, `taskd task list`, ...).

pub mod cli;
pub mod config;
pub mod ipc;
pub mod retry;
pub mod store;

// Re-export auth so main.rs can use taskd::auth directly.
pub use ipc::auth;

use std::sync::Arc;

use config::TaskdConfig;
use store::TaskStore;

/// Shared application state passed to every RPC handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<TaskdConfig>,
    /// The authoritative in-memory task collection.
    pub store: Arc<TaskStore>,
    pub started_at: std::time::Instant,
    /// Shared secret every call must present as `Bearer <token>`.
    /// Established at startup; no runtime rotation.
    pub auth_token: String,
}
