// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed transport over a byte-duplex channel (in production: the pipe
//! pair between the client and the forked agent).

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::AgentError;
use crate::frame::{Frame, FRAME_LEN, PROTOCOL_VERSION};

/// Default bounded wait for the first handshake byte.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends and receives whole [`Frame`]s over a pair of byte streams.
///
/// Reads are buffered: a single `read` may return a partial frame or bytes
/// of the next one; the surplus is kept for the following `recv`.
pub struct FramedChannel<R, W> {
    reader: R,
    writer: W,
    readahead: BytesMut,
}

impl<R, W> FramedChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            readahead: BytesMut::with_capacity(2 * FRAME_LEN),
        }
    }

    /// Write one whole frame. Short writes and broken pipes both surface as
    /// `Disconnected`; the peer vanishing is an expected way for a session
    /// to end.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), AgentError> {
        let encoded = frame.encode();
        self.writer
            .write_all(&encoded)
            .await
            .map_err(|_| AgentError::Disconnected)?;
        self.writer
            .flush()
            .await
            .map_err(|_| AgentError::Disconnected)?;
        Ok(())
    }

    /// Read exactly one frame, buffering any surplus bytes.
    pub async fn recv(&mut self) -> Result<Frame, AgentError> {
        while self.readahead.len() < FRAME_LEN {
            let n = self
                .reader
                .read_buf(&mut self.readahead)
                .await
                .map_err(|_| AgentError::Disconnected)?;
            if n == 0 {
                return Err(AgentError::Disconnected);
            }
        }

        let raw = self.readahead.split_to(FRAME_LEN);
        let frame = Frame::decode(&raw)?;
        if frame.protocol_version != PROTOCOL_VERSION {
            warn!(
                received = frame.protocol_version,
                expected = PROTOCOL_VERSION,
                "protocol mismatch"
            );
            return Err(AgentError::ProtocolMismatch);
        }
        Ok(frame)
    }

    /// Block until at least one byte is readable, up to `timeout`.
    ///
    /// Used only during the connection handshake so a dead child cannot
    /// hang the caller forever.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<(), AgentError> {
        if !self.readahead.is_empty() {
            return Ok(());
        }
        let read = tokio::time::timeout(timeout, self.reader.read_buf(&mut self.readahead))
            .await
            .map_err(|_| AgentError::Timeout)?;
        match read {
            Ok(0) => Err(AgentError::Disconnected),
            Ok(_) => Ok(()),
            Err(_) => Err(AgentError::Disconnected),
        }
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
