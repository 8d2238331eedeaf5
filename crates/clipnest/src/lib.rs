//! ClipNest clipboard history daemon.
//!
//! ```text
//!  ClipboardAccess ──▶ ChangeMonitor ──▶ HybridStore ──▶ IpcServer::broadcast ──▶ clients
//!                                        │        │
//!                                  HistoryStore  PinLedger (SQLite)
//!                                  (memory, LRU)  (pinned only)
//!                                        ▲
//!                    clients ──requests──┘ (via IpcServer)
//! ```

pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod error;
pub mod history;
pub mod ipc;
pub mod ledger;
pub mod model;
pub mod monitor;
pub mod store;

pub use error::{ClipError, ClipResult};
pub use model::{ClipEntry, ClipId, ClipKind};
