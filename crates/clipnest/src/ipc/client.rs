//! Client for the daemon socket.
//!
//! Keeps one connection open. `new_clip` pushes that arrive while waiting for
//! a response are buffered and handed out by [`IpcClient::next_push`].

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, LinesCodec};

use clipnest_protocol::{
    ClearRequest, ClipData, ErrorCode, IdRequest, ListRequest, Request, ResponseBody,
    SearchRequest, ServerMessage,
};

/// Longest line the client accepts from the daemon.
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// A request the daemon answered with `success: false`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DaemonError {
    pub code: Option<ErrorCode>,
    pub message: String,
}

pub struct IpcClient {
    socket_path: PathBuf,
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: OwnedWriteHalf,
    pushes: VecDeque<ClipData>,
}

impl IpcClient {
    pub async fn connect(socket_path: impl Into<PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();
        let stream = UnixStream::connect(&socket_path)
            .await
            .with_context(|| format!("connecting to clipnestd at {:?}", socket_path))?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            socket_path,
            reader: FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_RESPONSE_BYTES)),
            writer: write_half,
            pushes: VecDeque::new(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and return the daemon's response, successful or not.
    pub async fn request(&mut self, request: &Request) -> Result<ResponseBody> {
        let line = request.encode_line().context("serializing request")?;
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("writing request")?;

        loop {
            match self.read_message().await? {
                ServerMessage::Response(body) => return Ok(body),
                ServerMessage::NewClip(clip) => self.pushes.push_back(clip),
            }
        }
    }

    /// Send a request and turn a failure response into an error.
    async fn call(&mut self, request: &Request) -> Result<ResponseBody> {
        let body = self.request(request).await?;
        if body.success {
            Ok(body)
        } else {
            Err(DaemonError {
                code: body.code,
                message: body.error.unwrap_or_else(|| "unknown error".to_string()),
            }
            .into())
        }
    }

    async fn call_for_clips(&mut self, request: &Request) -> Result<Vec<ClipData>> {
        let body = self.call(request).await?;
        Ok(body.data.map(|list| list.clips).unwrap_or_default())
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.call(&Request::Ping).await.map(|_| ())
    }

    pub async fn list(&mut self, limit: usize) -> Result<Vec<ClipData>> {
        self.call_for_clips(&Request::List(ListRequest { limit }))
            .await
    }

    pub async fn search(&mut self, query: impl Into<String>, limit: usize) -> Result<Vec<ClipData>> {
        let request = Request::Search(SearchRequest {
            query: query.into(),
            limit,
        });
        self.call_for_clips(&request).await
    }

    pub async fn pins(&mut self) -> Result<Vec<ClipData>> {
        self.call_for_clips(&Request::Pins).await
    }

    pub async fn copy(&mut self, id: i64) -> Result<()> {
        self.call(&Request::CopyClip(IdRequest { id })).await.map(|_| ())
    }

    pub async fn pin(&mut self, id: i64) -> Result<()> {
        self.call(&Request::Pin(IdRequest { id })).await.map(|_| ())
    }

    pub async fn unpin(&mut self, id: i64) -> Result<()> {
        self.call(&Request::Unpin(IdRequest { id })).await.map(|_| ())
    }

    pub async fn remove(&mut self, id: i64) -> Result<()> {
        self.call(&Request::Remove(IdRequest { id })).await.map(|_| ())
    }

    pub async fn clear(&mut self, keep_pinned: bool) -> Result<()> {
        self.call(&Request::Clear(ClearRequest { keep_pinned }))
            .await
            .map(|_| ())
    }

    /// Wait for the next `new_clip` push. Returns `None` when the daemon
    /// closes the connection.
    pub async fn next_push(&mut self) -> Result<Option<ClipData>> {
        if let Some(clip) = self.pushes.pop_front() {
            return Ok(Some(clip));
        }
        loop {
            match self.try_read_message().await? {
                Some(ServerMessage::NewClip(clip)) => return Ok(Some(clip)),
                // Stray responses carry nothing for a watcher.
                Some(ServerMessage::Response(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    async fn read_message(&mut self) -> Result<ServerMessage> {
        self.try_read_message()
            .await?
            .ok_or_else(|| anyhow!("daemon closed the connection"))
    }

    async fn try_read_message(&mut self) -> Result<Option<ServerMessage>> {
        let Some(line) = self.reader.next().await else {
            return Ok(None);
        };
        let line = line.context("reading from daemon")?;
        let message = serde_json::from_str(&line).context("parsing daemon message")?;
        Ok(Some(message))
    }
}
