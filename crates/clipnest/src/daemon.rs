//! Daemon wiring: ledger, store, socket server and clipboard monitor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::clipboard::{ClipSnapshot, ClipboardAccess};
use crate::config::{AppPaths, ClipnestConfig};
use crate::ipc::{IpcServer, SocketListener};
use crate::ledger::{PinLedger, SqliteLedger};
use crate::monitor::{ChangeMonitor, ClipSink};
use crate::store::HybridStore;

/// How long shutdown waits for connection tasks to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Stores every captured clip and pushes it to connected clients.
struct Ingestor {
    store: Arc<HybridStore>,
    server: Arc<IpcServer>,
}

#[async_trait]
impl ClipSink for Ingestor {
    async fn ingest(&self, snapshot: ClipSnapshot) {
        match self.store.add(snapshot.content, snapshot.kind).await {
            Ok(stored) => {
                let delivered = self.server.broadcast(&stored.entry);
                debug!(
                    "Stored clip {} ({}), pushed to {} clients",
                    stored.entry.id,
                    if stored.deduplicated { "existing" } else { "new" },
                    delivered
                );
            }
            Err(e) => error!("Failed to store clip: {}", e),
        }
    }
}

/// A running daemon.
pub struct Daemon {
    store: Arc<HybridStore>,
    server: Arc<IpcServer>,
    monitor: ChangeMonitor,
    serve_task: JoinHandle<()>,
    socket_path: PathBuf,
}

impl Daemon {
    /// Open the ledger, bind the socket and start polling the clipboard.
    pub async fn start(
        config: &ClipnestConfig,
        paths: &AppPaths,
        clipboard: Arc<dyn ClipboardAccess>,
    ) -> Result<Self> {
        Self::assemble(config, paths, clipboard)
            .await?
            .start_monitor()
            .await
    }

    /// Everything but the monitor: ledger, store and a serving socket.
    async fn assemble(
        config: &ClipnestConfig,
        paths: &AppPaths,
        clipboard: Arc<dyn ClipboardAccess>,
    ) -> Result<Self> {
        let ledger = SqliteLedger::open(&paths.ledger)
            .await
            .with_context(|| format!("opening pinned ledger {}", paths.ledger.display()))?;
        let ledger: Arc<dyn PinLedger> = Arc::new(ledger);

        let store = match HybridStore::open(
            ledger.clone(),
            config.history.max_entries,
            config.history.capacity_policy(),
        )
        .await
        {
            Ok(store) => Arc::new(store),
            Err(e) => {
                ledger.close().await;
                return Err(e).context("loading clip store");
            }
        };

        let listener = match SocketListener::bind(&paths.socket) {
            Ok(listener) => listener,
            Err(e) => {
                store.close().await;
                return Err(e).context("binding control socket");
            }
        };
        let socket_path = listener.path().to_path_buf();

        let server = Arc::new(IpcServer::new(
            store.clone(),
            clipboard.clone(),
            config.ipc.clone(),
        ));
        let serve_task = tokio::spawn(server.clone().serve(listener));

        let sink = Arc::new(Ingestor {
            store: store.clone(),
            server: server.clone(),
        });
        let monitor = ChangeMonitor::new(clipboard, sink, config.history.poll_interval());

        Ok(Self {
            store,
            server,
            monitor,
            serve_task,
            socket_path,
        })
    }

    /// Start polling. On failure everything already running is shut down.
    async fn start_monitor(self) -> Result<Self> {
        let started = self.monitor.start().await;
        if let Err(e) = started {
            self.shutdown().await;
            return Err(e).context("starting clipboard monitor");
        }

        info!("clipnestd ready (socket {})", self.socket_path.display());
        Ok(self)
    }

    pub fn store(&self) -> &Arc<HybridStore> {
        &self.store
    }

    pub fn server(&self) -> &Arc<IpcServer> {
        &self.server
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Release everything in order: socket, monitor, connections, ledger.
    pub async fn shutdown(self) {
        info!("Shutting down");

        self.server.stop_accepting();
        if let Err(e) = self.serve_task.await {
            warn!("Accept loop ended abnormally: {}", e);
        }

        self.monitor.stop().await;
        self.server.shutdown(SHUTDOWN_GRACE).await;
        self.store.close().await;

        info!("clipnestd stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::config::ClipboardBackend;

    fn test_setup(dir: &Path) -> (ClipnestConfig, AppPaths) {
        let mut config = ClipnestConfig::default();
        config.history.poll_interval_ms = 10;
        config.clipboard.backend = ClipboardBackend::Memory;
        let paths = AppPaths {
            config_file: dir.join("config.toml"),
            data_dir: dir.to_path_buf(),
            socket: dir.join("clipnest.sock"),
            ledger: dir.join("clipnest.db"),
        };
        (config, paths)
    }

    #[tokio::test]
    async fn test_monitor_failure_releases_socket_and_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let (config, paths) = test_setup(dir.path());
        let clipboard: Arc<dyn ClipboardAccess> = Arc::new(MemoryClipboard::new());

        let daemon = Daemon::assemble(&config, &paths, clipboard.clone())
            .await
            .unwrap();
        assert!(paths.socket.exists());

        // A monitor that is already running refuses a second start.
        daemon.monitor.start().await.unwrap();
        let server = daemon.server.clone();
        let err = daemon.start_monitor().await.err().unwrap();
        assert!(format!("{err:#}").contains("starting clipboard monitor"));

        assert!(!paths.socket.exists());
        assert_eq!(server.connection_count(), 0);

        // Nothing is left holding the socket path.
        let daemon = Daemon::start(&config, &paths, clipboard).await.unwrap();
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_failure_closes_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let (config, paths) = test_setup(dir.path());
        let clipboard: Arc<dyn ClipboardAccess> = Arc::new(MemoryClipboard::new());

        let first = Daemon::start(&config, &paths, clipboard.clone())
            .await
            .unwrap();
        let err = Daemon::start(&config, &paths, clipboard).await.err().unwrap();
        assert!(format!("{err:#}").contains("binding control socket"));

        assert!(paths.socket.exists());
        first.shutdown().await;
        assert!(!paths.socket.exists());
    }
}
