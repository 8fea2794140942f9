//! Module `state`
//!
//! Per-connection registration state and liveness timers, plus the shared
//! `ConnectionHandle` that realm records point back to.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{Instant, Interval, Sleep};

/// Identity of one realm connection, shared weakly with the realm it
/// registered.
#[derive(Debug)]
pub struct ConnectionHandle {
    peer: SocketAddr,
    closed: AtomicBool,
}

impl ConnectionHandle {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Registration progress of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NotRegistered,
    Registered,
}

/// State owned by one connection task.
///
/// Holds the realm id once registered and the two liveness timers: the
/// recurring heartbeat and the inbound deadline.
pub struct ConnectionState {
    status: SessionStatus,
    realm_id: Option<u32>,
    heartbeat: Option<Interval>,
    deadline: Option<Pin<Box<Sleep>>>,
    deadline_period: Duration,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::NotRegistered,
            realm_id: None,
            heartbeat: None,
            deadline: None,
            deadline_period: Duration::ZERO,
        }
    }
}

impl ConnectionState {
    // --------------------
    // Getter methods
    // --------------------

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_registered(&self) -> bool {
        self.status == SessionStatus::Registered
    }

    /// Realm bound to this connection, once registered.
    pub fn realm_id(&self) -> Option<u32> {
        self.realm_id
    }

    pub fn timers_armed(&self) -> bool {
        self.heartbeat.is_some() && self.deadline.is_some()
    }

    /// Both timers, for polling in the connection loop.
    pub(crate) fn timers_mut(
        &mut self,
    ) -> (Option<&mut Interval>, Option<&mut Pin<Box<Sleep>>>) {
        (self.heartbeat.as_mut(), self.deadline.as_mut())
    }

    // --------------------
    // Transitions
    // --------------------

    /// Moves to `Registered` for `realm_id`. Only the first call has effect.
    pub fn bind(&mut self, realm_id: u32) -> bool {
        if self.is_registered() {
            return false;
        }
        self.status = SessionStatus::Registered;
        self.realm_id = Some(realm_id);
        true
    }

    /// Starts the heartbeat (first tick fires immediately) and the deadline.
    pub fn arm_timers(&mut self, heartbeat: Duration, deadline: Duration) {
        self.heartbeat = Some(tokio::time::interval(heartbeat));
        self.deadline = Some(Box::pin(tokio::time::sleep(deadline)));
        self.deadline_period = deadline;
    }

    /// Pushes the deadline back by a full period from now.
    pub fn rearm_deadline(&mut self) {
        let period = self.deadline_period;
        if let Some(deadline) = self.deadline.as_mut() {
            deadline.as_mut().reset(Instant::now() + period);
        }
    }

    /// Delays the next heartbeat by a full period from now.
    pub fn postpone_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.reset();
        }
    }

    /// Drops both timers so neither can fire again.
    pub fn cancel_timers(&mut self) {
        self.heartbeat = None;
        self.deadline = None;
    }
}
