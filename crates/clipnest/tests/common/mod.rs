//! Test utilities for running a daemon against a temporary directory.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clipnest::clipboard::{ClipboardAccess, MemoryClipboard};
use clipnest::config::{AppPaths, ClipboardBackend, ClipnestConfig};
use clipnest::daemon::Daemon;
use clipnest::ipc::IpcClient;
use clipnest_protocol::ClipData;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Config tuned for fast tests: quick polling, in-memory clipboard.
pub fn test_config() -> ClipnestConfig {
    let mut config = ClipnestConfig::default();
    config.history.max_entries = 20;
    config.history.poll_interval_ms = 10;
    config.clipboard.backend = ClipboardBackend::Memory;
    config
}

/// A daemon rooted in a temp dir, with a clipboard the test controls.
pub struct TestDaemon {
    pub dir: TempDir,
    pub config: ClipnestConfig,
    pub clipboard: Arc<MemoryClipboard>,
    pub daemon: Option<Daemon>,
}

impl TestDaemon {
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    pub async fn start_with(config: ClipnestConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut harness = Self {
            dir,
            config,
            clipboard,
            daemon: None,
        };
        harness.launch().await;
        harness
    }

    pub fn paths(&self) -> AppPaths {
        let root = self.dir.path();
        AppPaths {
            config_file: root.join("config.toml"),
            data_dir: root.to_path_buf(),
            socket: root.join("clipnest.sock"),
            ledger: root.join("clipnest.db"),
        }
    }

    pub fn socket(&self) -> PathBuf {
        self.paths().socket
    }

    async fn launch(&mut self) {
        let clipboard: Arc<dyn ClipboardAccess> = self.clipboard.clone();
        let daemon = Daemon::start(&self.config, &self.paths(), clipboard)
            .await
            .unwrap();
        self.daemon = Some(daemon);
    }

    /// Shut the daemon down and start a fresh one on the same files.
    pub async fn restart(&mut self) {
        self.stop().await;
        self.launch().await;
    }

    pub async fn stop(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            daemon.shutdown().await;
        }
    }

    pub fn daemon(&self) -> &Daemon {
        self.daemon.as_ref().unwrap()
    }

    /// Connect a client and wait until the daemon has registered it.
    pub async fn client(&self) -> IpcClient {
        let mut client = IpcClient::connect(self.socket()).await.unwrap();
        client.ping().await.unwrap();
        client
    }

    pub async fn raw(&self) -> RawConn {
        RawConn::connect(&self.socket()).await
    }

    /// Simulate a user copy and wait for the daemon to push it to `watcher`.
    pub async fn copy_text(&self, watcher: &mut IpcClient, text: &str) -> ClipData {
        self.clipboard.set_text(text);
        next_push(watcher).await
    }
}

pub async fn next_push(client: &mut IpcClient) -> ClipData {
    tokio::time::timeout(WAIT, client.next_push())
        .await
        .expect("timed out waiting for new_clip")
        .unwrap()
        .expect("daemon closed the connection")
}

/// A bare socket connection for exercising the wire format directly.
pub struct RawConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawConn {
    pub async fn connect(path: &std::path::Path) -> Self {
        let stream = UnixStream::connect(path).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    pub async fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }

    /// Read the next frame, or `None` on EOF.
    pub async fn recv(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .unwrap();
        if read == 0 {
            return None;
        }
        Some(serde_json::from_str(&line).unwrap())
    }

    /// Read frames until the next `response`.
    pub async fn response(&mut self) -> Value {
        loop {
            let frame = self.recv().await.expect("connection closed");
            if frame["type"] == "response" {
                return frame["data"].clone();
            }
        }
    }
}

/// Poll `check` until it holds or [`WAIT`] passes.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
