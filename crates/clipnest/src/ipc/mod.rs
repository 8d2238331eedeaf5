//! Local socket interface.
//!
//! Clients connect to a Unix socket and exchange newline-delimited JSON:
//! requests in, one `response` frame per request out, plus `new_clip` pushes
//! whenever the monitor ingests something. See `clipnest_protocol` for the
//! frame shapes.

mod client;
mod hub;
mod lines;
mod server;

pub use client::{DaemonError, IpcClient};
pub use hub::{ConnId, ConnectionHub};
pub use server::{IpcServer, SocketListener};

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Transport failures. Each one is confined to a single connection, except
/// for bind errors which stop the daemon.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("another daemon is already listening on {0}")]
    AddrInUse(PathBuf),

    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("connection closed")]
    Closed,
}
