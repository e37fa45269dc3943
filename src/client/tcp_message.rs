// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::{io::AsyncReadExt, net::tcp::OwnedReadHalf};
use tracing::trace;

/// Length of the big-endian frame size prefix on a TCP stream.
pub const TCP_LENGTH_PREFIX: usize = 2;

/// Transport-level failures on a connection or the dispatch socket.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("i/o failure: {0}")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Length-prefixed message framer over the read half of a TCP stream.
///
/// Reading is incremental: bytes land in an accumulation buffer as they
/// arrive, so a `read_message` future dropped mid-frame loses nothing and
/// the next call resumes where the stream stopped. One frame may also
/// carry the start of the next; the surplus stays buffered.
#[derive(Debug, Default)]
pub struct TcpMessage {
    stream: Option<OwnedReadHalf>,
    acc: BytesMut,
    want: Option<usize>,
}

impl TcpMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a freshly accepted connection and resets framer state.
    pub fn init(&mut self, stream: OwnedReadHalf) {
        self.stream = Some(stream);
        self.acc.clear();
        self.want = None;
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// One complete message, without its length prefix.
    pub async fn read_message(&mut self) -> Result<BytesMut, TransportError> {
        loop {
            if self.want.is_none() && self.acc.len() >= TCP_LENGTH_PREFIX {
                self.want =
                    Some(u16::from_be_bytes([self.acc[0], self.acc[1]]) as usize);
            }
            if let Some(want) = self.want
                && self.acc.len() >= TCP_LENGTH_PREFIX + want
            {
                let mut frame = self.acc.split_to(TCP_LENGTH_PREFIX + want);
                frame.advance(TCP_LENGTH_PREFIX);
                self.want = None;
                trace!(len = want, "tcp frame complete");
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
            let n = stream.read_buf(&mut self.acc).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    /// Forgets any partially read frame. The stream stays attached.
    pub fn cancel_read(&mut self) {
        self.acc.clear();
        self.want = None;
    }

    /// Drops the stream; subsequent reads fail as closed.
    pub fn invalidate(&mut self) {
        self.cancel_read();
        self.stream = None;
    }
}
