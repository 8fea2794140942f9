//! Error handlers
//!
//! Logs errors at the level matching how much they matter to the process.

use crate::error::types::RegistryServerError;
use log::{error, warn};

/// Handle a registry server error
pub fn handle_error(err: &RegistryServerError) {
    if is_peer_fault(err) {
        warn!("Realm registry fault: {}", err);
    } else {
        error!("Realm registry error: {}", err);
    }
}

/// Faults caused by one peer's input. They never affect other connections.
pub fn is_peer_fault(err: &RegistryServerError) -> bool {
    match err {
        RegistryServerError::Decode(_)
        | RegistryServerError::Payload(_)
        | RegistryServerError::Registry(_)
        | RegistryServerError::Admin(_) => true,
        RegistryServerError::Harvest(_)
        | RegistryServerError::Config(_)
        | RegistryServerError::IoError(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdminError, DecodeError};

    #[test]
    fn test_peer_faults_are_classified() {
        assert!(is_peer_fault(&DecodeError::UnknownOpcode(200).into()));
        assert!(is_peer_fault(&AdminError::SlotTaken.into()));

        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        assert!(!is_peer_fault(&io.into()));
    }
}
