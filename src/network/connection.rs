use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use crate::network::frame::{RequestFrame, ResponseFrame, FRAME_LENGTH_SIZE};
use crate::service::NetworkConfig;
use crate::{AppError, AppResult};

/// Represents a connection to a client.
///
/// The stream is wrapped in a `BufWriter` so a response frame reaches the socket in one
/// flush, and a `BytesMut` buffer collects incoming bytes until a complete frame can be
/// split off.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    stream: BufWriter<S>,
    buffer: BytesMut,
    max_frame_size: usize,
    read_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    closed: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, network: &NetworkConfig) -> Connection<S> {
        Connection {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(network.conn_read_buffer_size),
            max_frame_size: network.max_frame_size,
            read_timeout: network.read_timeout(),
            idle_timeout: network.idle_timeout(),
            closed: false,
        }
    }

    /// Reads a `RequestFrame` from the connection.
    ///
    /// This method continuously reads data from the stream into the buffer until a complete
    /// `RequestFrame` can be parsed. A negative or oversized length prefix is an error, and
    /// the connection should be closed.
    ///
    /// If the client closes the connection while a frame is being sent, `TruncatedFrame` is
    /// returned. If the client closes the connection gracefully, `None` is returned.
    pub async fn read_frame(&mut self) -> AppResult<Option<RequestFrame>> {
        loop {
            if let Some(frame) = RequestFrame::parse(&mut self.buffer, self.max_frame_size)? {
                return Ok(Some(frame));
            }
            if 0 == self.fill_buffer().await? {
                return if self.buffer.is_empty() {
                    // client has closed the connection gracefully
                    Ok(None)
                } else {
                    // client close the connection while sending a frame
                    Err(self.truncated_frame())
                };
            }
        }
    }

    async fn fill_buffer(&mut self) -> AppResult<usize> {
        // an empty buffer means we are between frames
        let (timeout, partial) = if self.buffer.is_empty() {
            (self.idle_timeout, false)
        } else {
            (self.read_timeout, true)
        };
        let Some(timeout) = timeout else {
            return Ok(self.stream.read_buf(&mut self.buffer).await?);
        };
        match time::timeout(timeout, self.stream.read_buf(&mut self.buffer)).await {
            Ok(read) => Ok(read?),
            Err(_) if partial => Err(AppError::ReadTimeout(timeout.as_millis() as u64)),
            Err(_) => Err(AppError::IdleTimeout(timeout.as_millis() as u64)),
        }
    }

    fn truncated_frame(&self) -> AppError {
        match RequestFrame::declared_length(&self.buffer) {
            Some(length) => AppError::TruncatedFrame {
                expected: length.max(0) as usize,
                received: self.buffer.len() - FRAME_LENGTH_SIZE,
            },
            None => AppError::TruncatedFrame {
                expected: FRAME_LENGTH_SIZE,
                received: self.buffer.len(),
            },
        }
    }

    /// Writes one length-prefixed response frame.
    ///
    /// The frame is written in full and flushed before returning; partial writes are
    /// retried by `write_all` until done or the stream fails.
    pub async fn write_frame(&mut self, payload: &[u8]) -> AppResult<()> {
        let frame = ResponseFrame::new(payload).encode()?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shuts down the write side of the stream. Calling it again does nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown().await {
            // the peer may already be gone
            debug!("shutdown connection error: {}", e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
