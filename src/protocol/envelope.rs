//! Envelope framing.
//!
//! Realm channel: `[opcode:u8][length:u16 LE][payload]`.
//! Admin channel: `[opcode:u8][length:u32 LE][payload]`, wide enough for a
//! compressed log batch.

use crate::error::{DecodeError, PayloadError};
use crate::protocol::opcodes::{AdminOpcode, SrvComOpcode};

pub const HEADER_LEN: usize = 3;
pub const ADMIN_HEADER_LEN: usize = 5;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// One decoded realm channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub opcode: SrvComOpcode,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(opcode: SrvComOpcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    pub fn empty(opcode: SrvComOpcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    /// Frames the envelope for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        let len = u16::try_from(self.payload.len()).map_err(|_| PayloadError::TooLarge {
            field: "payload",
            len: self.payload.len(),
        })?;

        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.opcode as u8);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decodes one envelope from the front of `buf`.
    ///
    /// Returns the envelope and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Envelope, usize), DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader(buf.len()));
        }

        let opcode = SrvComOpcode::try_from(buf[0])?;
        let declared = usize::from(u16::from_le_bytes([buf[1], buf[2]]));
        let available = buf.len() - HEADER_LEN;
        if declared > available {
            return Err(DecodeError::LengthOverrun {
                declared,
                available,
            });
        }

        let end = HEADER_LEN + declared;
        Ok((Envelope::new(opcode, buf[HEADER_LEN..end].to_vec()), end))
    }
}

/// Result of splitting one read chunk into envelopes.
#[derive(Debug, Default)]
pub struct DecodedChunk {
    pub envelopes: Vec<Envelope>,
    /// Set when decoding stopped on a malformed envelope; the bytes after it
    /// were discarded.
    pub fault: Option<DecodeError>,
    pub discarded: usize,
}

/// Decodes every envelope in a read chunk.
///
/// Stops at the first malformed envelope and discards whatever follows it.
pub fn decode_chunk(chunk: &[u8]) -> DecodedChunk {
    let mut decoded = DecodedChunk::default();
    let mut rest = chunk;

    while !rest.is_empty() {
        match Envelope::decode(rest) {
            Ok((envelope, used)) => {
                decoded.envelopes.push(envelope);
                rest = &rest[used..];
            }
            Err(e) => {
                decoded.fault = Some(e);
                decoded.discarded = rest.len();
                break;
            }
        }
    }

    decoded
}

/// Frames an admin channel message.
pub fn encode_admin_frame(opcode: AdminOpcode, payload: &[u8]) -> Result<Vec<u8>, PayloadError> {
    let len = u32::try_from(payload.len()).map_err(|_| PayloadError::TooLarge {
        field: "payload",
        len: payload.len(),
    })?;

    let mut out = Vec::with_capacity(ADMIN_HEADER_LEN + payload.len());
    out.push(opcode as u8);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Splits one admin frame off the front of `buf`, for admin-side readers.
pub fn decode_admin_frame(buf: &[u8]) -> Result<(AdminOpcode, &[u8], usize), DecodeError> {
    if buf.len() < ADMIN_HEADER_LEN {
        return Err(DecodeError::TruncatedHeader(buf.len()));
    }

    let opcode = AdminOpcode::try_from(buf[0])?;
    let declared = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let available = buf.len() - ADMIN_HEADER_LEN;
    if declared > available {
        return Err(DecodeError::LengthOverrun {
            declared,
            available,
        });
    }

    let end = ADMIN_HEADER_LEN + declared;
    Ok((opcode, &buf[ADMIN_HEADER_LEN..end], end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_layout() {
        let bytes = Envelope::new(SrvComOpcode::RegistrationResponse, vec![1])
            .encode()
            .unwrap();
        assert_eq!(bytes, vec![6, 1, 0, 1]);

        let heartbeat = Envelope::empty(SrvComOpcode::Heartbeat).encode().unwrap();
        assert_eq!(heartbeat, vec![10, 0, 0]);
    }

    #[test]
    fn test_decode_rejects_bad_opcode() {
        assert_eq!(
            Envelope::decode(&[42, 0, 0]),
            Err(DecodeError::UnknownOpcode(42))
        );
    }

    #[test]
    fn test_decode_rejects_length_overrun() {
        assert_eq!(
            Envelope::decode(&[5, 5, 0, 1, 2]),
            Err(DecodeError::LengthOverrun {
                declared: 5,
                available: 2
            })
        );
    }

    #[test]
    fn test_chunk_with_several_envelopes() {
        let mut chunk = Envelope::empty(SrvComOpcode::Heartbeat).encode().unwrap();
        chunk.extend(
            Envelope::new(SrvComOpcode::LogMessage, vec![1, b'x', 0])
                .encode()
                .unwrap(),
        );

        let decoded = decode_chunk(&chunk);
        assert!(decoded.fault.is_none());
        assert_eq!(decoded.envelopes.len(), 2);
        assert_eq!(decoded.envelopes[1].payload, vec![1, b'x', 0]);
    }

    #[test]
    fn test_chunk_stops_at_fault_and_discards_rest() {
        let mut chunk = Envelope::empty(SrvComOpcode::Heartbeat).encode().unwrap();
        chunk.extend([200, 0, 0]);
        chunk.extend(Envelope::empty(SrvComOpcode::Heartbeat).encode().unwrap());

        let decoded = decode_chunk(&chunk);
        assert_eq!(decoded.envelopes.len(), 1);
        assert_eq!(decoded.fault, Some(DecodeError::UnknownOpcode(200)));
        assert_eq!(decoded.discarded, 6);
    }

    #[test]
    fn test_oversized_payload_is_refused() {
        let envelope = Envelope::new(SrvComOpcode::LogMessage, vec![0; MAX_PAYLOAD_LEN + 1]);
        assert!(envelope.encode().is_err());
    }

    #[test]
    fn test_admin_frame_roundtrip() {
        let frame = encode_admin_frame(AdminOpcode::RealmStatus, &[7, 0, 0, 0]).unwrap();
        assert_eq!(&frame[..5], &[3, 4, 0, 0, 0]);

        let (opcode, payload, used) = decode_admin_frame(&frame).unwrap();
        assert_eq!(opcode, AdminOpcode::RealmStatus);
        assert_eq!(payload, &[7, 0, 0, 0]);
        assert_eq!(used, frame.len());
    }
}
