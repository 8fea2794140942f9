//! Module `channel`
//!
//! Upgrade path from an authenticated login to the registry's admin session.
//! The caller supplies the access level it authenticated; anything below
//! Administrator is refused before the registry is consulted.

use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::AdminError;
use crate::realm::AccessLevel;
use crate::registry::{AdminSink, RealmRegistry};

/// One login connection that may become the admin session.
pub struct AdminChannel {
    peer: SocketAddr,
    sink: Arc<dyn AdminSink>,
    session_id: Option<u64>,
    registry: Option<Arc<RealmRegistry>>,
}

impl AdminChannel {
    pub fn new(peer: SocketAddr, sink: Arc<dyn AdminSink>) -> Self {
        Self {
            peer,
            sink,
            session_id: None,
            registry: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    pub fn is_admitted(&self) -> bool {
        self.session_id.is_some()
    }

    /// Switches this connection into admin mode.
    ///
    /// On success the connection receives the realm list, then every realm
    /// event and log batch until it is closed.
    pub fn request_admin_upgrade(
        &mut self,
        access: AccessLevel,
        registry: &Arc<RealmRegistry>,
    ) -> Result<u64, AdminError> {
        if access < AccessLevel::Administrator {
            warn!(
                "Admin mode refused for {}: access level {:?}",
                self.peer, access
            );
            return Err(AdminError::InsufficientAccess);
        }

        match registry.admit_admin_session(Arc::clone(&self.sink), self.session_id) {
            Some(id) => {
                self.session_id = Some(id);
                self.registry = Some(Arc::clone(registry));
                info!("{} entered admin mode as session {}", self.peer, id);
                Ok(id)
            }
            None => match self.session_id {
                Some(id) => Err(AdminError::AlreadyAdmitted(id)),
                None => {
                    warn!("Admin mode refused for {}: slot taken", self.peer);
                    Err(AdminError::SlotTaken)
                }
            },
        }
    }

    /// Gives up the admin slot, if held.
    pub fn close(&mut self) {
        if let (Some(id), Some(registry)) = (self.session_id.take(), self.registry.take()) {
            registry.evict_admin_session(id);
            info!("{} left admin mode", self.peer);
        }
    }
}

impl Drop for AdminChannel {
    fn drop(&mut self) {
        self.close();
    }
}
