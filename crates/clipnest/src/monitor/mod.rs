//! Clipboard change detection.
//!
//! [`ChangeMonitor`] polls a [`ClipboardAccess`] on a fixed period and hands
//! every changed value to a [`ClipSink`]. The value present when polling
//! starts is the baseline and is not reported.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clipboard::{ClipSnapshot, ClipboardAccess, ClipboardError};

/// Receives clipboard changes.
#[async_trait]
pub trait ClipSink: Send + Sync {
    async fn ingest(&self, snapshot: ClipSnapshot);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor is already polling")]
    AlreadyRunning,
}

enum State {
    Idle,
    Polling {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
}

pub struct ChangeMonitor {
    clipboard: Arc<dyn ClipboardAccess>,
    sink: Arc<dyn ClipSink>,
    period: Duration,
    state: Mutex<State>,
}

impl ChangeMonitor {
    pub fn new(clipboard: Arc<dyn ClipboardAccess>, sink: Arc<dyn ClipSink>, period: Duration) -> Self {
        Self {
            clipboard,
            sink,
            period,
            state: Mutex::new(State::Idle),
        }
    }

    /// Capture the baseline and begin polling.
    pub async fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Polling { .. }) {
            return Err(MonitorError::AlreadyRunning);
        }

        let baseline = match read_clipboard(self.clipboard.clone()).await {
            Ok(snapshot) if !snapshot.is_empty() => Some(snapshot),
            Ok(_) => None,
            Err(e) => {
                debug!("No clipboard baseline: {e}");
                None
            }
        };

        let cancel = CancellationToken::new();
        let poller = Poller {
            clipboard: self.clipboard.clone(),
            sink: self.sink.clone(),
            period: self.period,
            last: baseline,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(poller.run());

        info!("Clipboard monitor polling every {:?}", self.period);
        *state = State::Polling { cancel, handle };
        Ok(())
    }

    /// Stop polling. No sink call happens after this returns.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let State::Polling { cancel, handle } = std::mem::replace(&mut *state, State::Idle) {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Clipboard monitor task ended abnormally: {e}");
            }
            info!("Clipboard monitor stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, State::Polling { .. })
    }
}

struct Poller {
    clipboard: Arc<dyn ClipboardAccess>,
    sink: Arc<dyn ClipSink>,
    period: Duration,
    last: Option<ClipSnapshot>,
    cancel: CancellationToken,
}

impl Poller {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the baseline covers it.
        ticker.tick().await;

        let mut failing = false;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = match read_clipboard(self.clipboard.clone()).await {
                Ok(snapshot) => {
                    if failing {
                        info!("Clipboard readable again");
                        failing = false;
                    }
                    snapshot
                }
                Err(e) => {
                    if !failing {
                        warn!("Clipboard read failed: {e}");
                        failing = true;
                    } else {
                        debug!("Clipboard read failed: {e}");
                    }
                    continue;
                }
            };

            if snapshot.is_empty() || self.last.as_ref() == Some(&snapshot) {
                continue;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            debug!(
                "Clipboard changed: {} bytes of {}",
                snapshot.content.len(),
                snapshot.kind
            );
            self.last = Some(snapshot.clone());
            self.sink.ingest(snapshot).await;
        }
    }
}

/// Read on the blocking pool; platform clipboards may block.
async fn read_clipboard(clipboard: Arc<dyn ClipboardAccess>) -> Result<ClipSnapshot, ClipboardError> {
    tokio::task::spawn_blocking(move || clipboard.read())
        .await
        .map_err(|e| ClipboardError::Access(format!("clipboard task failed: {e}")))?
}
