//! Unix socket server.

use log::{debug, error, info, warn};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use clipnest_protocol::{
    ErrorCode, FrameError, Request, ResponseBody, ServerMessage, effective_limit,
};

use super::ConnectionError;
use super::hub::{self, ConnectionHub, Registration};
use super::lines::LineReader;
use crate::clipboard::{ClipboardAccess, ClipboardError};
use crate::config::IpcConfig;
use crate::error::{ClipError, ClipResult};
use crate::model::ClipEntry;
use crate::store::HybridStore;

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listening socket. The socket file is removed on drop.
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
}

impl SocketListener {
    /// Bind `path` with owner-only permissions.
    ///
    /// A leftover socket file from a dead daemon is replaced. A socket that
    /// still accepts connections is reported as in use.
    pub fn bind(path: &Path) -> Result<Self, ConnectionError> {
        let bind_err = |source| ConnectionError::Bind {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(bind_err)?;
        }

        if path.exists() {
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                return Err(ConnectionError::AddrInUse(path.to_path_buf()));
            }
            debug!("Removing stale socket {:?}", path);
            std::fs::remove_file(path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(path).map_err(bind_err)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(bind_err)?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove socket {:?}: {}", self.path, e);
        }
    }
}

/// Serves client requests against a [`HybridStore`] and pushes new clips.
pub struct IpcServer {
    store: Arc<HybridStore>,
    clipboard: Arc<dyn ClipboardAccess>,
    hub: Arc<ConnectionHub>,
    config: IpcConfig,
    /// Stops the accept loop.
    accepting: CancellationToken,
    /// Stops every connection task.
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl IpcServer {
    pub fn new(
        store: Arc<HybridStore>,
        clipboard: Arc<dyn ClipboardAccess>,
        config: IpcConfig,
    ) -> Self {
        Self {
            hub: Arc::new(ConnectionHub::new(config.outbound_queue)),
            store,
            clipboard,
            config,
            accepting: CancellationToken::new(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Accept connections until [`IpcServer::stop_accepting`] or
    /// [`IpcServer::shutdown`] is called. The listener, and with it the
    /// socket file, is released on return.
    pub async fn serve(self: Arc<Self>, listener: SocketListener) {
        info!("Listening on {:?}", listener.path());

        loop {
            let accepted = tokio::select! {
                _ = self.accepting.cancelled() => break,
                accepted = listener.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _addr)) => {
                    let server = self.clone();
                    self.tracker.spawn(async move {
                        server.handle_connection(stream).await;
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        drop(listener);
        info!("Stopped accepting connections");
    }

    /// Push a newly captured clip to every client.
    pub fn broadcast(&self, entry: &ClipEntry) -> usize {
        let message = ServerMessage::NewClip(entry.to_wire());
        match message.encode_line() {
            Ok(line) => self.hub.broadcast(Arc::from(line)),
            Err(e) => {
                error!("Failed to encode clip {}: {}", entry.id, e);
                0
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.hub.len()
    }

    /// Stop the accept loop. Open connections keep being served.
    pub fn stop_accepting(&self) {
        self.accepting.cancel();
    }

    /// Stop accepting, close every connection, and wait up to `grace` for
    /// connection tasks to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.accepting.cancel();
        self.cancel.cancel();
        self.hub.close_all();
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                "{} connection tasks still running after {:?}",
                self.tracker.len(),
                grace
            );
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: UnixStream) {
        let (read_half, write_half) = stream.into_split();
        let Registration { id, tx, rx, closed } = self.hub.register();
        debug!("Client {} connected", id);

        self.tracker.spawn(hub::write_loop(
            self.hub.clone(),
            id,
            rx,
            write_half,
            self.config.write_timeout(),
            closed.clone(),
        ));

        let mut lines = LineReader::new(read_half, self.config.max_frame_bytes);
        let idle = self.config.idle_timeout();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = closed.cancelled() => break,
                next = read_line(&mut lines, idle) => next,
            };

            let body = match next {
                ReadOutcome::Line(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.dispatch(&line).await
                }
                ReadOutcome::TooLong => {
                    let err = FrameError::TooLong(self.config.max_frame_bytes);
                    ResponseBody::error(ErrorCode::ProtocolError, err.to_string())
                }
                ReadOutcome::Idle => {
                    debug!("Client {} idle, closing", id);
                    break;
                }
                ReadOutcome::Eof => break,
                ReadOutcome::Failed(e) => {
                    debug!("Client {}: {}", id, e);
                    break;
                }
            };

            if let Err(e) = respond(&tx, body).await {
                debug!("Client {}: response not delivered: {}", id, e);
                break;
            }
        }

        self.hub.unregister(id);
        debug!("Client {} disconnected", id);
    }

    /// Decode and execute one request line. Always yields a response.
    pub(crate) async fn dispatch(&self, line: &str) -> ResponseBody {
        let request = match Request::decode(line) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected frame: {}", e);
                return ResponseBody::error(ErrorCode::ProtocolError, e.to_string());
            }
        };

        let kind = request.type_name();
        match self.execute(request).await {
            Ok(body) => body,
            Err(e) => {
                if !e.is_not_found() {
                    warn!("Request {} failed: {}", kind, e);
                }
                ResponseBody::error(error_code(&e), e.to_string())
            }
        }
    }

    async fn execute(&self, request: Request) -> ClipResult<ResponseBody> {
        let body = match request {
            Request::List(req) => {
                let clips = self.store.list(effective_limit(req.limit)).await?;
                clip_list(clips)
            }
            Request::Search(req) => {
                let clips = self
                    .store
                    .search(req.query.as_bytes(), effective_limit(req.limit))
                    .await?;
                clip_list(clips)
            }
            Request::Pins => clip_list(self.store.pinned().await?),
            Request::CopyClip(req) => {
                self.copy_clip(req.id).await?;
                ResponseBody::ok()
            }
            Request::Pin(req) => {
                self.store.pin(req.id).await?;
                ResponseBody::ok()
            }
            Request::Unpin(req) => {
                self.store.unpin(req.id).await?;
                ResponseBody::ok()
            }
            Request::Remove(req) => {
                self.store.remove(req.id).await?;
                ResponseBody::ok()
            }
            Request::Clear(req) => {
                self.store.clear(req.keep_pinned).await?;
                ResponseBody::ok()
            }
            Request::Ping => ResponseBody::ok(),
        };
        Ok(body)
    }

    /// Write a clip back to the clipboard and move it to the front.
    async fn copy_clip(&self, id: i64) -> ClipResult<()> {
        let entry = self.store.get(id).await?;
        let clipboard = self.clipboard.clone();
        let ClipEntry { content, kind, .. } = entry;

        tokio::task::spawn_blocking(move || clipboard.write(&content, kind))
            .await
            .map_err(|e| ClipboardError::Access(format!("clipboard task failed: {e}")))??;

        self.store.touch(id).await?;
        debug!("Copied clip {} to clipboard", id);
        Ok(())
    }
}

enum ReadOutcome {
    Line(String),
    TooLong,
    Idle,
    Eof,
    Failed(ConnectionError),
}

async fn read_line<R>(lines: &mut LineReader<R>, idle: Option<Duration>) -> ReadOutcome
where
    R: tokio::io::AsyncRead + Unpin,
{
    let next = match idle {
        Some(limit) => match tokio::time::timeout(limit, lines.next_line()).await {
            Ok(next) => next,
            Err(_) => return ReadOutcome::Idle,
        },
        None => lines.next_line().await,
    };

    match next {
        Some(Ok(line)) => ReadOutcome::Line(line),
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => ReadOutcome::TooLong,
        Some(Err(LinesCodecError::Io(e))) => ReadOutcome::Failed(ConnectionError::Read(e)),
        None => ReadOutcome::Eof,
    }
}

async fn respond(
    tx: &tokio::sync::mpsc::Sender<hub::Outbound>,
    body: ResponseBody,
) -> Result<(), ConnectionError> {
    let line = ServerMessage::Response(body).encode_line().map_err(|e| {
        ConnectionError::Write(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    hub::send_and_wait(tx, Arc::from(line)).await
}

fn clip_list(clips: Vec<ClipEntry>) -> ResponseBody {
    ResponseBody::clips(clips.iter().map(ClipEntry::to_wire).collect())
}

fn error_code(err: &ClipError) -> ErrorCode {
    match err {
        ClipError::NotFound(_) => ErrorCode::NotFound,
        ClipError::Storage(_) => ErrorCode::StorageError,
        ClipError::Clipboard(_) => ErrorCode::ClipboardError,
    }
}
