//! One accepted client socket and its buffers.

use crate::config::Framing;
use crate::wire::frame;
use crate::{DaisyError, Result};
use mio::net::TcpStream;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Whether the peer is still sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadState {
    Open,
    PeerClosed,
}

pub(crate) struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    write_interest: bool,
    closing: bool,
    last_activity: Instant,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            inbound: Vec::new(),
            outbound: Vec::new(),
            write_interest: false,
            closing: false,
            last_activity: Instant::now(),
        }
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Pending OS-level socket error, rendered for the log.
    pub(crate) fn socket_error(&self) -> String {
        match self.stream.take_error() {
            Ok(Some(e)) => format!("{} (code {})", e, e.raw_os_error().unwrap_or_default()),
            Ok(None) => "unknown socket error".to_string(),
            Err(e) => format!("OS error {}", e),
        }
    }

    /// Read until the socket would block.
    ///
    /// Readiness is edge-triggered, so everything available is drained in
    /// `chunk`-sized reads. The buffer is capped at one maximum-size message
    /// plus a length prefix.
    pub(crate) fn fill(&mut self, chunk: &mut [u8], max_message_size: usize) -> Result<ReadState> {
        loop {
            match self.stream.read(chunk) {
                Ok(0) => return Ok(ReadState::PeerClosed),
                Ok(n) => {
                    self.last_activity = Instant::now();
                    self.inbound.extend_from_slice(&chunk[..n]);
                    if self.inbound.len() > max_message_size + 4 {
                        return Err(DaisyError::MessageTooLarge {
                            size: self.inbound.len(),
                            max: max_message_size,
                        });
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadState::Open),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Next complete message in the inbound buffer, if any.
    pub(crate) fn next_message(
        &mut self,
        framing: Framing,
        max_message_size: usize,
    ) -> Result<Option<Vec<u8>>> {
        frame::decode(framing, &mut self.inbound, max_message_size)
    }

    pub(crate) fn has_partial_input(&self) -> bool {
        !self.inbound.is_empty()
    }

    pub(crate) fn queue(&mut self, framing: Framing, payload: &[u8]) {
        self.outbound.extend_from_slice(&frame::encode(framing, payload));
    }

    pub(crate) fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Write as much queued output as the socket accepts.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.last_activity = Instant::now();
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stop reading and close once queued output has been written.
    pub(crate) fn mark_closing(&mut self) {
        self.closing = true;
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing
    }

    /// Time since bytes last moved in either direction.
    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Whether the registration must change to match pending output.
    pub(crate) fn wants_interest_change(&self) -> bool {
        self.write_interest != self.has_pending_output()
    }

    pub(crate) fn set_write_interest(&mut self, enabled: bool) {
        self.write_interest = enabled;
    }
}
