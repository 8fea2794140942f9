//! Module `handler`
//!
//! Drives one realm connection: reads envelope chunks, dispatches them, and
//! runs the heartbeat and inbound deadline timers until the connection ends.

use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use crate::protocol::envelope::{Envelope, HEADER_LEN, MAX_PAYLOAD_LEN, decode_chunk};
use crate::protocol::opcodes::SrvComOpcode;
use crate::registry::RealmRegistry;
use crate::session::dispatch::SessionCore;
use crate::session::state::{ConnectionHandle, ConnectionState};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEADLINE_RESPONSE_TIME: Duration = Duration::from_secs(30);

const READ_BUFFER_SIZE: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

enum Event {
    Shutdown,
    Heartbeat,
    Deadline,
    Read(io::Result<usize>),
}

/// One realm connection over any byte stream.
pub struct RegistrationSession<S> {
    core: SessionCore,
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    read_buf: Vec<u8>,
    shutdown: CancellationToken,
    closed: bool,
}

impl<S> RegistrationSession<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        registry: Arc<RealmRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            core: SessionCore::new(peer, registry),
            reader,
            writer,
            read_buf: vec![0; READ_BUFFER_SIZE],
            shutdown,
            closed: false,
        }
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.core.handle
    }

    pub fn state(&self) -> &ConnectionState {
        &self.core.state
    }

    /// Arms the heartbeat and deadline timers.
    ///
    /// The first heartbeat goes out as soon as the loop starts.
    pub fn open(&mut self) {
        self.core
            .state
            .arm_timers(HEARTBEAT_INTERVAL, DEADLINE_RESPONSE_TIME);
        info!("Realm connection opened from {}", self.core.peer);
    }

    /// Runs the connection until the peer leaves, the deadline expires, a
    /// write fails, or shutdown is requested. Always ends closed.
    pub async fn run(mut self) {
        if !self.core.state.timers_armed() {
            self.open();
        }

        loop {
            let event = {
                let (Some(heartbeat), Some(deadline)) = self.core.state.timers_mut() else {
                    break;
                };
                tokio::select! {
                    _ = self.shutdown.cancelled() => Event::Shutdown,
                    _ = heartbeat.tick() => Event::Heartbeat,
                    _ = deadline.as_mut() => Event::Deadline,
                    read = self.reader.read(&mut self.read_buf) => Event::Read(read),
                }
            };

            match event {
                Event::Shutdown => {
                    info!("Closing connection from {} for shutdown", self.core.peer);
                    break;
                }
                Event::Heartbeat => {
                    if let Err(e) = self.send(Envelope::empty(SrvComOpcode::Heartbeat)).await {
                        error!("Failed to send heartbeat to {}: {}", self.core.peer, e);
                        break;
                    }
                }
                Event::Deadline => {
                    warn!(
                        "No data from {} in {}s, closing connection",
                        self.core.peer,
                        DEADLINE_RESPONSE_TIME.as_secs()
                    );
                    break;
                }
                Event::Read(Ok(0)) => {
                    info!("Connection closed by {}", self.core.peer);
                    break;
                }
                Event::Read(Ok(n)) => {
                    if let Err(e) = self.process_chunk(n).await {
                        error!("Failed to write to {}: {}", self.core.peer, e);
                        break;
                    }
                }
                Event::Read(Err(e)) => {
                    error!("Failed to read from {}: {}", self.core.peer, e);
                    break;
                }
            }
        }

        self.close().await;
    }

    /// Handles the first `n` bytes of the read buffer.
    async fn process_chunk(&mut self, n: usize) -> io::Result<()> {
        self.core.state.rearm_deadline();

        let decoded = decode_chunk(&self.read_buf[..n]);
        for envelope in &decoded.envelopes {
            if let Some(reply) = self.core.dispatch(envelope) {
                self.send(reply).await?;
            }
        }

        if let Some(fault) = decoded.fault {
            warn!(
                "Malformed envelope from {}: {}; discarded {} bytes",
                self.core.peer, fault, decoded.discarded
            );
        }
        Ok(())
    }

    /// Writes one envelope. The deadline and shutdown stay armed while the
    /// write is pending, so a peer that stops reading is still closed.
    async fn send(&mut self, envelope: Envelope) -> io::Result<()> {
        let bytes = envelope
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let (_, Some(deadline)) = self.core.state.timers_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closing",
            ));
        };
        let writer = &mut self.writer;
        let write = async move {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };

        tokio::select! {
            written = write => written?,
            _ = deadline.as_mut() => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "deadline expired with a write pending",
                ));
            }
            _ = self.shutdown.cancelled() => {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "shutdown with a write pending",
                ));
            }
        }
        debug!("Sent {} to {}", envelope.opcode.name(), self.core.peer);

        self.core.state.postpone_heartbeat();
        Ok(())
    }

    /// Tears the connection down. Safe to call more than once.
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.core.state.cancel_timers();
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.core.peer, e);
        }
        self.core.handle.mark_closed();

        if let Some(id) = self.core.state.realm_id() {
            self.core.registry.release_connection(id, &self.core.handle);
        }
        info!("Realm connection from {} closed", self.core.peer);
    }
}
