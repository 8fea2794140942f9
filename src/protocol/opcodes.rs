//! Opcode tables for the realm channel and the admin fan-out channel.

use crate::error::DecodeError;

/// Realm channel opcodes. Values are dense so they can index a handler table;
/// `Heartbeat` must stay last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SrvComOpcode {
    NullAction = 0,
    RegisteringRequest = 1,
    UserConfirmationRequest = 2,
    SecurityLevelUpdate = 3,
    PopulationUpdate = 4,
    StatusUpdate = 5,
    RegistrationResponse = 6,
    UserConfirmationResponse = 7,
    SecurityLevelResponse = 8,
    LogMessage = 9,
    Heartbeat = 10,
}

impl SrvComOpcode {
    pub const COUNT: usize = SrvComOpcode::Heartbeat as usize + 1;

    pub const ALL: [SrvComOpcode; SrvComOpcode::COUNT] = [
        SrvComOpcode::NullAction,
        SrvComOpcode::RegisteringRequest,
        SrvComOpcode::UserConfirmationRequest,
        SrvComOpcode::SecurityLevelUpdate,
        SrvComOpcode::PopulationUpdate,
        SrvComOpcode::StatusUpdate,
        SrvComOpcode::RegistrationResponse,
        SrvComOpcode::UserConfirmationResponse,
        SrvComOpcode::SecurityLevelResponse,
        SrvComOpcode::LogMessage,
        SrvComOpcode::Heartbeat,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SrvComOpcode::NullAction => "MSG_NULL_ACTION",
            SrvComOpcode::RegisteringRequest => "SMSG_REGISTERING_REQUEST",
            SrvComOpcode::UserConfirmationRequest => "SMSG_USER_CONFIRMATION_REQUEST",
            SrvComOpcode::SecurityLevelUpdate => "SMSG_SECURITY_LEVEL_UPDATE",
            SrvComOpcode::PopulationUpdate => "SMSG_POPULATION_UPDATE",
            SrvComOpcode::StatusUpdate => "SMSG_STATUS_UPDATE",
            SrvComOpcode::RegistrationResponse => "RMSG_REGISTRATION_RESPONSE",
            SrvComOpcode::UserConfirmationResponse => "RMSG_USER_CONFIRMATION_RESPONSE",
            SrvComOpcode::SecurityLevelResponse => "RMSG_SECURITY_LEVEL_RESPONSE",
            SrvComOpcode::LogMessage => "SMSG_LOG_MESSAGE",
            SrvComOpcode::Heartbeat => "MSG_HEARTBEAT_COMMAND",
        }
    }
}

impl TryFrom<u8> for SrvComOpcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SrvComOpcode::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(DecodeError::UnknownOpcode(value))
    }
}

/// Opcodes pushed to the admin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AdminOpcode {
    RealmList = 1,
    RealmAdded = 2,
    RealmStatus = 3,
    LogBatch = 4,
}

impl TryFrom<u8> for AdminOpcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AdminOpcode::RealmList),
            2 => Ok(AdminOpcode::RealmAdded),
            3 => Ok(AdminOpcode::RealmStatus),
            4 => Ok(AdminOpcode::LogBatch),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_dense() {
        for (i, op) in SrvComOpcode::ALL.iter().enumerate() {
            assert_eq!(op.index(), i);
            assert_eq!(SrvComOpcode::try_from(i as u8), Ok(*op));
        }
    }

    #[test]
    fn test_out_of_range_opcode() {
        assert_eq!(
            SrvComOpcode::try_from(SrvComOpcode::COUNT as u8),
            Err(DecodeError::UnknownOpcode(11))
        );
        assert_eq!(
            SrvComOpcode::try_from(255),
            Err(DecodeError::UnknownOpcode(255))
        );
    }
}
