//! Opcode dispatch for realm connections.
//!
//! `OPCODE_TABLE` is indexed by opcode value; every slot holds the handler for
//! that opcode. Reserved and registry-to-realm opcodes share the null handler.

use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::protocol::envelope::Envelope;
use crate::protocol::messages::{
    LogMessage, RegistrationRequest, StatusUpdate, encode_registration_response,
};
use crate::protocol::opcodes::SrvComOpcode;
use crate::realm::RealmRecord;
use crate::registry::RealmRegistry;
use crate::session::state::{ConnectionHandle, ConnectionState};

/// Handles one envelope payload; returns the reply to send, if any.
pub type OpcodeHandlerFn = fn(&mut SessionCore, SrvComOpcode, &[u8]) -> Option<Envelope>;

static OPCODE_TABLE: [OpcodeHandlerFn; SrvComOpcode::COUNT] = [
    handle_null_msg,              // NullAction
    handle_registering_request,   // RegisteringRequest
    handle_null_msg,              // UserConfirmationRequest
    handle_null_msg,              // SecurityLevelUpdate
    handle_null_msg,              // PopulationUpdate
    handle_status_update,         // StatusUpdate
    handle_null_msg,              // RegistrationResponse
    handle_null_msg,              // UserConfirmationResponse
    handle_null_msg,              // SecurityLevelResponse
    handle_log_message,           // LogMessage
    handle_heartbeat,             // Heartbeat
];

/// The transport-independent part of a realm connection.
pub struct SessionCore {
    pub(crate) peer: SocketAddr,
    pub(crate) registry: Arc<RealmRegistry>,
    pub(crate) handle: Arc<ConnectionHandle>,
    pub(crate) state: ConnectionState,
}

impl SessionCore {
    pub fn new(peer: SocketAddr, registry: Arc<RealmRegistry>) -> Self {
        Self {
            peer,
            registry,
            handle: Arc::new(ConnectionHandle::new(peer)),
            state: ConnectionState::default(),
        }
    }

    /// Runs the handler registered for the envelope's opcode.
    pub fn dispatch(&mut self, envelope: &Envelope) -> Option<Envelope> {
        debug!(
            "Received {} ({} bytes) from {}",
            envelope.opcode.name(),
            envelope.payload.len(),
            self.peer
        );
        let handler = OPCODE_TABLE[envelope.opcode.index()];
        handler(self, envelope.opcode, &envelope.payload)
    }

    /// Bound realm id, or `None` after logging the state fault.
    fn registered_realm(&self, opcode: SrvComOpcode) -> Option<u32> {
        let id = self.state.realm_id();
        if id.is_none() {
            warn!(
                "{} from {} before registration, ignored",
                opcode.name(),
                self.peer
            );
        }
        id
    }
}

fn registration_response(added: bool) -> Option<Envelope> {
    Some(Envelope::new(
        SrvComOpcode::RegistrationResponse,
        encode_registration_response(added),
    ))
}

fn handle_null_msg(core: &mut SessionCore, opcode: SrvComOpcode, _payload: &[u8]) -> Option<Envelope> {
    warn!("Not handled {} received from {}", opcode.name(), core.peer);
    None
}

fn handle_registering_request(
    core: &mut SessionCore,
    _opcode: SrvComOpcode,
    payload: &[u8],
) -> Option<Envelope> {
    if let Some(id) = core.state.realm_id() {
        warn!(
            "Realm {} at {} sent registration request while already registered",
            id, core.peer
        );
        return registration_response(false);
    }

    let (request, trailing) = match RegistrationRequest::decode(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Malformed registration request from {}: {}", core.peer, e);
            return registration_response(false);
        }
    };
    if trailing > 0 {
        warn!(
            "Registration request from {} carried {} unprocessed bytes",
            core.peer, trailing
        );
    }

    let record = RealmRecord::from_registration(
        request,
        core.peer.ip().to_string(),
        Arc::downgrade(&core.handle),
    );
    let id = record.id();

    match core.registry.add_or_update(record) {
        Ok(_) => {
            core.state.bind(id);
            info!("Connection {} registered realm {}", core.peer, id);
            registration_response(true)
        }
        Err(e) => {
            warn!("Registration from {} refused: {}", core.peer, e);
            registration_response(false)
        }
    }
}

fn handle_status_update(core: &mut SessionCore, opcode: SrvComOpcode, payload: &[u8]) -> Option<Envelope> {
    let id = core.registered_realm(opcode)?;

    match StatusUpdate::decode(payload) {
        Ok(update) => {
            if let Err(e) = core.registry.update_status(id, update.flags, update.population) {
                warn!("Status update for realm {} dropped: {}", id, e);
            }
        }
        Err(e) => warn!("Malformed status update from realm {}: {}", id, e),
    }
    None
}

fn handle_log_message(core: &mut SessionCore, opcode: SrvComOpcode, payload: &[u8]) -> Option<Envelope> {
    let id = core.registered_realm(opcode)?;

    match LogMessage::decode(payload) {
        Ok(message) => {
            if let Err(e) = core.registry.append_log(id, message.category, &message.text) {
                warn!("Log line for realm {} dropped: {}", id, e);
            }
        }
        Err(e) => warn!("Malformed log message from realm {}: {}", id, e),
    }
    None
}

fn handle_heartbeat(core: &mut SessionCore, _opcode: SrvComOpcode, _payload: &[u8]) -> Option<Envelope> {
    debug!("Heartbeat from {}", core.peer);
    None
}
