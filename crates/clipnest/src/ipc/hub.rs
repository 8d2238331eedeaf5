//! Connection registry and per-connection outbound queues.
//!
//! Every connection gets a bounded queue drained by its own writer task, so
//! responses and pushes to one client are written one at a time and in order.
//! Broadcast never waits: a client whose queue is full or closed is dropped.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::ConnectionError;

/// Identifier of a live connection.
pub type ConnId = u64;

/// One line waiting to be written.
pub(super) struct Outbound {
    pub(super) line: Arc<str>,
    /// Signalled once the line is fully written. Dropped on failure.
    pub(super) written: Option<oneshot::Sender<()>>,
}

struct Peer {
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

/// Handle a connection task holds for itself.
pub(super) struct Registration {
    pub(super) id: ConnId,
    pub(super) tx: mpsc::Sender<Outbound>,
    pub(super) rx: mpsc::Receiver<Outbound>,
    /// Cancelled when the connection is dropped from the hub.
    pub(super) closed: CancellationToken,
}

/// All connections that receive broadcasts.
pub struct ConnectionHub {
    peers: DashMap<ConnId, Peer>,
    next_id: AtomicU64,
    queue_size: usize,
}

impl ConnectionHub {
    pub fn new(queue_size: usize) -> Self {
        Self {
            peers: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_size: queue_size.max(1),
        }
    }

    pub(super) fn register(&self) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_size);
        let closed = CancellationToken::new();
        self.peers.insert(
            id,
            Peer {
                tx: tx.clone(),
                closed: closed.clone(),
            },
        );
        debug!("Registered connection {}", id);
        Registration { id, tx, rx, closed }
    }

    /// Remove a connection and signal its tasks to stop.
    pub fn unregister(&self, id: ConnId) {
        if let Some((_, peer)) = self.peers.remove(&id) {
            peer.closed.cancel();
            debug!("Unregistered connection {}", id);
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Queue `line` for every connection. Returns how many accepted it.
    pub fn broadcast(&self, line: Arc<str>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for peer in self.peers.iter() {
            let outbound = Outbound {
                line: line.clone(),
                written: None,
            };
            match peer.tx.try_send(outbound) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Connection {} is not reading; dropping it", peer.key());
                    dead.push(*peer.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*peer.key()),
            }
        }

        // Removal happens after iteration; DashMap shards are locked while iterating.
        for id in dead {
            self.unregister(id);
        }
        delivered
    }

    /// Unregister every connection.
    pub fn close_all(&self) {
        let ids: Vec<ConnId> = self.peers.iter().map(|p| *p.key()).collect();
        if !ids.is_empty() {
            info!("Closing {} client connections", ids.len());
        }
        for id in ids {
            self.unregister(id);
        }
    }
}

/// Queue a line on one connection and wait until it has been written.
pub(super) async fn send_and_wait(
    tx: &mpsc::Sender<Outbound>,
    line: Arc<str>,
) -> Result<(), ConnectionError> {
    let (written_tx, written_rx) = oneshot::channel();
    tx.send(Outbound {
        line,
        written: Some(written_tx),
    })
    .await
    .map_err(|_| ConnectionError::Closed)?;
    written_rx.await.map_err(|_| ConnectionError::Closed)
}

/// Drain a connection's queue into its socket until the queue closes, the
/// connection is dropped, or a write fails.
pub(super) async fn write_loop<W>(
    hub: Arc<ConnectionHub>,
    id: ConnId,
    mut rx: mpsc::Receiver<Outbound>,
    mut writer: W,
    write_timeout: Duration,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let outbound = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            next = rx.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };

        let result = match tokio::time::timeout(
            write_timeout,
            writer.write_all(outbound.line.as_bytes()),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Write(e)),
            Err(_) => Err(ConnectionError::WriteTimeout(write_timeout)),
        };

        match result {
            Ok(()) => {
                if let Some(written) = outbound.written {
                    let _ = written.send(());
                }
            }
            Err(e) => {
                warn!("Connection {}: {}; dropping it", id, e);
                hub.unregister(id);
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    debug!("Writer for connection {} finished", id);
}
