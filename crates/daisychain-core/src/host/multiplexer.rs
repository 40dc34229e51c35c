//! Non-blocking connection multiplexer.
//!
//! A [`Multiplexer`] owns the listening socket, every accepted connection and
//! the [`Dispatcher`]. Each [`tick`](Multiplexer::tick) performs one
//! zero-timeout readiness poll and services whatever is ready, so it can be
//! driven from any periodic callback without blocking it.
//!
//! Requests are executed on the ticking thread, one at a time, in the order
//! their sockets become ready.
//!
//! A peer that shuts down its write half still receives every queued
//! response before the host closes the socket. Connections that move no
//! bytes for [`HostConfig::idle_timeout`] are closed.

use super::connection::{Connection, ReadState};
use crate::config::{HostConfig, HostDefaults};
use crate::dispatch::Dispatcher;
use crate::{DaisyError, Result};
use mio::event::Event;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Registry, Token};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const LISTENER: Token = Token(0);

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accepted: usize,
    pub requests: usize,
    pub closed: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.accepted == 0 && self.requests == 0 && self.closed == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Readiness {
    token: Token,
    readable: bool,
    writable: bool,
    error: bool,
    read_closed: bool,
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error(),
            read_closed: event.is_read_closed(),
        }
    }
}

enum Disposition {
    Keep,
    Close,
}

/// Listening socket plus accepted connections, serviced by polling.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    dispatcher: Dispatcher,
    config: HostConfig,
    chunk: Vec<u8>,
}

impl Multiplexer {
    /// Bind the listening socket and take ownership of `dispatcher`.
    pub fn bind(config: HostConfig, dispatcher: Dispatcher) -> Result<Self> {
        config.validate()?;

        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(config.addr).map_err(|e| DaisyError::Io {
            message: format!("failed to bind {}: {}", config.addr, e),
            source: Some(e),
        })?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        info!(
            "DaisyChain host listening on {} ({} framing)",
            local_addr, config.framing
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(HostDefaults::MAX_EVENTS),
            listener,
            local_addr,
            connections: HashMap::new(),
            next_token: LISTENER.0 + 1,
            dispatcher,
            chunk: vec![0u8; config.read_buffer_size],
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Invalidate every issued reference except the anchor.
    pub fn reset_references(&mut self) {
        self.dispatcher.reset();
        info!("Reference cache reset");
    }

    /// Poll once without blocking and service every ready socket.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        match self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(report),
            Err(e) => return Err(e.into()),
        }

        let ready: Vec<Readiness> = self.events.iter().map(Readiness::from).collect();
        // Sweep before servicing; a socket reported by this poll is not idle.
        self.close_idle(&ready, &mut report);
        for readiness in ready {
            if readiness.token == LISTENER {
                self.accept_pending(&mut report);
            } else {
                self.service(readiness, &mut report);
            }
        }

        Ok(report)
    }

    fn accept_pending(&mut self, report: &mut TickReport) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    if self.connections.len() >= self.config.max_connections {
                        warn!(
                            "Rejecting connection from {}: at max capacity ({})",
                            peer, self.config.max_connections
                        );
                        continue;
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!("Failed to register connection from {}: {}", peer, e);
                        continue;
                    }

                    debug!("Connection from {}", peer);
                    self.connections.insert(token, Connection::new(stream, peer));
                    report.accepted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn close_idle(&mut self, ready: &[Readiness], report: &mut TickReport) {
        let now = Instant::now();
        let timeout = self.config.idle_timeout;
        let stale: Vec<Token> = self
            .connections
            .iter()
            .filter(|(token, conn)| {
                conn.idle_for(now) >= timeout && !ready.iter().any(|r| r.token == **token)
            })
            .map(|(token, _)| *token)
            .collect();

        for token in stale {
            if let Some(conn) = self.connections.get(&token) {
                if conn.has_partial_input() {
                    warn!(
                        "Closing {}: idle for {:?} with an incomplete message",
                        conn.peer(),
                        timeout
                    );
                } else {
                    debug!("Closing {}: idle for {:?}", conn.peer(), timeout);
                }
            }
            self.close(token, report);
        }
    }

    fn service(&mut self, readiness: Readiness, report: &mut TickReport) {
        let token = readiness.token;
        // May already be gone if an earlier event this tick closed it.
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let disposition = serve_connection(
            conn,
            readiness,
            &mut self.dispatcher,
            &self.config,
            &mut self.chunk,
            self.poll.registry(),
            token,
            report,
        );

        if let Disposition::Close = disposition {
            self.close(token, report);
        }
    }

    fn close(&mut self, token: Token, report: &mut TickReport) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                debug!("Deregister of {} failed: {}", conn.peer(), e);
            }
            debug!("Closed connection to {}", conn.peer());
            report.closed += 1;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn serve_connection(
    conn: &mut Connection,
    readiness: Readiness,
    dispatcher: &mut Dispatcher,
    config: &HostConfig,
    chunk: &mut [u8],
    registry: &Registry,
    token: Token,
    report: &mut TickReport,
) -> Disposition {
    let peer = conn.peer();

    if readiness.error {
        warn!("Exception on {}: {}", peer, conn.socket_error());
        return Disposition::Close;
    }

    let mut peer_closed = false;
    let mut queued = false;
    if !conn.is_closing() && (readiness.readable || readiness.read_closed) {
        match conn.fill(chunk, config.max_message_size) {
            Ok(ReadState::Open) => {}
            Ok(ReadState::PeerClosed) => peer_closed = true,
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                return Disposition::Close;
            }
        }

        loop {
            match conn.next_message(config.framing, config.max_message_size) {
                Ok(Some(request)) => {
                    debug!("Executing request from {} ({} bytes)", peer, request.len());
                    let response = dispatcher.execute(&request);
                    conn.queue(config.framing, &response);
                    queued = true;
                    report.requests += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Dropping connection to {}: {}", peer, e);
                    return Disposition::Close;
                }
            }
        }
    }

    if conn.has_pending_output() && (queued || readiness.writable) {
        if let Err(e) = conn.flush() {
            warn!("Write to {} failed: {}", peer, e);
            return Disposition::Close;
        }
    }

    if peer_closed {
        if conn.has_partial_input() {
            warn!("Client {} disconnected mid-message", peer);
        } else {
            debug!("Client {} disconnected", peer);
        }
        conn.mark_closing();
    }

    if conn.is_closing() {
        if !conn.has_pending_output() {
            return Disposition::Close;
        }
        debug!("Still writing queued output to half-closed {}", peer);
    }

    if conn.wants_interest_change() {
        let pending = conn.has_pending_output();
        let interest = if pending {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        if let Err(e) = registry.reregister(conn.stream_mut(), token, interest) {
            warn!("Failed to update interest for {}: {}", peer, e);
            return Disposition::Close;
        }
        conn.set_write_interest(pending);
    }

    Disposition::Keep
}
