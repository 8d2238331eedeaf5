//! Length-capped line reader.
//!
//! Unlike `FramedRead`, an oversize line is reported and skipped while the
//! stream keeps going, so one bad frame does not end the connection.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

const READ_CHUNK: usize = 8 * 1024;

pub(super) struct LineReader<R> {
    inner: R,
    codec: LinesCodec,
    buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(super) fn new(inner: R, max_length: usize) -> Self {
        Self {
            inner,
            codec: LinesCodec::new_with_max_length(max_length),
            buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Next line without its terminator, `None` at end of stream.
    ///
    /// Cancel safe: a partially received line stays buffered.
    pub(super) async fn next_line(&mut self) -> Option<Result<String, LinesCodecError>> {
        loop {
            if self.eof {
                return self.codec.decode_eof(&mut self.buf).transpose();
            }
            match self.codec.decode(&mut self.buf) {
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }

            self.buf.reserve(READ_CHUNK);
            match self.inner.read_buf(&mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(e) => return Some(Err(LinesCodecError::Io(e))),
            }
        }
    }
}
