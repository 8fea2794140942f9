//! Payload schemas for realm channel and admin channel messages.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{HarvestError, PayloadError};
use crate::protocol::payload::{PayloadReader, PayloadWriter};
use crate::realm::{AccessLevel, RealmFlags, RealmSnapshot, RealmType, Timezone};

/// SMSG_REGISTERING_REQUEST body.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    pub realm_id: u32,
    pub name: String,
    pub game_port: u32,
    pub max_players: u32,
    pub online_players: u32,
    pub min_access_level: AccessLevel,
    pub flags: RealmFlags,
    pub realm_type: RealmType,
    pub timezone: Timezone,
    pub builds: Vec<u32>,
}

impl RegistrationRequest {
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        let build_count = u8::try_from(self.builds.len()).map_err(|_| PayloadError::TooLarge {
            field: "build_count",
            len: self.builds.len(),
        })?;

        let mut w = PayloadWriter::new();
        w.write_u32(self.realm_id)
            .write_cstring(&self.name)
            .write_u32(self.game_port)
            .write_u32(self.max_players)
            .write_u32(self.online_players)
            .write_u8(self.min_access_level.to_wire())
            .write_u8(self.flags.bits())
            .write_u8(self.realm_type.to_wire())
            .write_u8(self.timezone.to_wire())
            .write_u8(build_count);
        for build in &self.builds {
            w.write_u32(*build);
        }
        Ok(w.into_bytes())
    }

    /// Parses the request; also returns how many trailing bytes were left.
    pub fn decode(payload: &[u8]) -> Result<(Self, usize), PayloadError> {
        let mut r = PayloadReader::new(payload);
        let realm_id = r.read_u32("realm_id")?;
        let name = r.read_cstring("name")?;
        let game_port = r.read_u32("game_port")?;
        let max_players = r.read_u32("max_players")?;
        let online_players = r.read_u32("online_players")?;
        let min_access_level = AccessLevel::from_wire(r.read_u8("min_access_level")?)?;
        let flags = RealmFlags::from_bits(r.read_u8("flags")?);
        let realm_type = RealmType::from_wire(r.read_u8("type")?)?;
        let timezone = Timezone::from_wire(r.read_u8("timezone")?)?;
        let build_count = r.read_u8("build_count")?;

        let mut builds = Vec::with_capacity(usize::from(build_count));
        for _ in 0..build_count {
            builds.push(r.read_u32("build_id")?);
        }

        let request = RegistrationRequest {
            realm_id,
            name,
            game_port,
            max_players,
            online_players,
            min_access_level,
            flags,
            realm_type,
            timezone,
            builds,
        };
        Ok((request, r.remaining()))
    }
}

/// SMSG_STATUS_UPDATE body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusUpdate {
    pub flags: RealmFlags,
    pub population: f32,
}

impl StatusUpdate {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        w.write_u8(self.flags.bits()).write_f32(self.population);
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let mut r = PayloadReader::new(payload);
        Ok(StatusUpdate {
            flags: RealmFlags::from_bits(r.read_u8("flags")?),
            population: r.read_f32("population")?,
        })
    }
}

/// SMSG_LOG_MESSAGE body, also the unit stored in a realm's log buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub category: u8,
    pub text: String,
}

impl LogMessage {
    pub fn new(category: u8, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        w.write_u8(self.category).write_cstring(&self.text);
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let mut r = PayloadReader::new(payload);
        Ok(LogMessage {
            category: r.read_u8("category")?,
            text: r.read_cstring("text")?,
        })
    }
}

/// RMSG_REGISTRATION_RESPONSE body.
pub fn encode_registration_response(added: bool) -> Vec<u8> {
    vec![u8::from(added)]
}

pub fn decode_registration_response(payload: &[u8]) -> Result<bool, PayloadError> {
    let mut r = PayloadReader::new(payload);
    match r.read_u8("added")? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(PayloadError::InvalidValue {
            field: "added",
            value: u32::from(other),
        }),
    }
}

// ---- admin channel ----

fn write_snapshot(w: &mut PayloadWriter, realm: &RealmSnapshot) -> Result<(), PayloadError> {
    let build_count =
        u8::try_from(realm.accepted_builds.len()).map_err(|_| PayloadError::TooLarge {
            field: "build_count",
            len: realm.accepted_builds.len(),
        })?;

    w.write_u32(realm.id)
        .write_cstring(&realm.name)
        .write_cstring(&realm.address)
        .write_u32(realm.game_port)
        .write_u8(realm.flags.bits())
        .write_u8(realm.realm_type.to_wire())
        .write_u8(realm.min_access_level.to_wire())
        .write_u8(realm.timezone.to_wire())
        .write_u32(realm.max_players)
        .write_u32(realm.online_players)
        .write_f32(realm.population)
        .write_u8(build_count);
    for build in &realm.accepted_builds {
        w.write_u32(*build);
    }
    Ok(())
}

fn read_snapshot(r: &mut PayloadReader<'_>) -> Result<RealmSnapshot, PayloadError> {
    let id = r.read_u32("id")?;
    let name = r.read_cstring("name")?;
    let address = r.read_cstring("address")?;
    let game_port = r.read_u32("game_port")?;
    let flags = RealmFlags::from_bits(r.read_u8("flags")?);
    let realm_type = RealmType::from_wire(r.read_u8("type")?)?;
    let min_access_level = AccessLevel::from_wire(r.read_u8("min_access_level")?)?;
    let timezone = Timezone::from_wire(r.read_u8("timezone")?)?;
    let max_players = r.read_u32("max_players")?;
    let online_players = r.read_u32("online_players")?;
    let population = r.read_f32("population")?;
    let build_count = r.read_u8("build_count")?;

    let mut accepted_builds = BTreeSet::new();
    for _ in 0..build_count {
        accepted_builds.insert(r.read_u32("build_id")?);
    }

    Ok(RealmSnapshot {
        id,
        name,
        address,
        game_port,
        flags,
        realm_type,
        min_access_level,
        timezone,
        max_players,
        online_players,
        population,
        accepted_builds,
    })
}

/// REALM_ADDED body: one full realm snapshot.
pub fn encode_realm_added(realm: &RealmSnapshot) -> Result<Vec<u8>, PayloadError> {
    let mut w = PayloadWriter::new();
    write_snapshot(&mut w, realm)?;
    Ok(w.into_bytes())
}

pub fn decode_realm_added(payload: &[u8]) -> Result<RealmSnapshot, PayloadError> {
    read_snapshot(&mut PayloadReader::new(payload))
}

/// REALM_LIST body: realm count then one snapshot per realm.
pub fn encode_realm_list(realms: &[RealmSnapshot]) -> Result<Vec<u8>, PayloadError> {
    let count = u32::try_from(realms.len()).map_err(|_| PayloadError::TooLarge {
        field: "realm_count",
        len: realms.len(),
    })?;

    let mut w = PayloadWriter::new();
    w.write_u32(count);
    for realm in realms {
        write_snapshot(&mut w, realm)?;
    }
    Ok(w.into_bytes())
}

pub fn decode_realm_list(payload: &[u8]) -> Result<Vec<RealmSnapshot>, PayloadError> {
    let mut r = PayloadReader::new(payload);
    let count = r.read_u32("realm_count")?;
    let mut realms = Vec::new();
    for _ in 0..count {
        realms.push(read_snapshot(&mut r)?);
    }
    Ok(realms)
}

/// REALM_STATUS body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealmStatusEvent {
    pub id: u32,
    pub flags: RealmFlags,
    pub population: f32,
}

impl RealmStatusEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        w.write_u32(self.id)
            .write_u8(self.flags.bits())
            .write_f32(self.population);
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let mut r = PayloadReader::new(payload);
        Ok(RealmStatusEvent {
            id: r.read_u32("id")?,
            flags: RealmFlags::from_bits(r.read_u8("flags")?),
            population: r.read_f32("population")?,
        })
    }
}

/// Log entries harvested from one realm, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmLogs {
    pub realm_id: u32,
    pub entries: Vec<LogMessage>,
}

/// Serializes harvested logs into the uncompressed batch layout.
pub fn encode_log_batch(realms: &[RealmLogs]) -> Result<Vec<u8>, PayloadError> {
    let count = u32::try_from(realms.len()).map_err(|_| PayloadError::TooLarge {
        field: "realm_count",
        len: realms.len(),
    })?;

    let mut w = PayloadWriter::new();
    w.write_u32(count);
    for realm in realms {
        let entries = u32::try_from(realm.entries.len()).map_err(|_| PayloadError::TooLarge {
            field: "entry_count",
            len: realm.entries.len(),
        })?;
        w.write_u32(realm.realm_id).write_u32(entries);
        for entry in &realm.entries {
            w.write_u8(entry.category).write_cstring(&entry.text);
        }
    }
    Ok(w.into_bytes())
}

pub fn decode_log_batch(payload: &[u8]) -> Result<Vec<RealmLogs>, PayloadError> {
    let mut r = PayloadReader::new(payload);
    let count = r.read_u32("realm_count")?;
    let mut realms = Vec::new();
    for _ in 0..count {
        let realm_id = r.read_u32("realm_id")?;
        let entry_count = r.read_u32("entry_count")?;
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let category = r.read_u8("category")?;
            let text = r.read_cstring("text")?;
            entries.push(LogMessage { category, text });
        }
        realms.push(RealmLogs { realm_id, entries });
    }
    Ok(realms)
}

/// LOG_BATCH body: uncompressed size, then the zlib stream.
pub fn compress_log_batch(raw: &[u8]) -> Result<Vec<u8>, HarvestError> {
    let size = u32::try_from(raw.len()).map_err(|_| PayloadError::TooLarge {
        field: "uncompressed_size",
        len: raw.len(),
    })?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).map_err(HarvestError::Compression)?;
    let compressed = encoder.finish().map_err(HarvestError::Compression)?;

    let mut w = PayloadWriter::new();
    w.write_u32(size).write_bytes(&compressed);
    Ok(w.into_bytes())
}

/// Reverses [`compress_log_batch`], checking the declared size.
pub fn decompress_log_batch(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut r = PayloadReader::new(body);
    let size = r
        .read_u32("uncompressed_size")
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Never inflate more than one byte past the declared size.
    let mut raw = Vec::new();
    ZlibDecoder::new(&body[4..])
        .take(u64::from(size) + 1)
        .read_to_end(&mut raw)?;
    if raw.len() != size as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("declared {} bytes, inflated {}", size, raw.len()),
        ));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(builds: Vec<u32>) -> RegistrationRequest {
        RegistrationRequest {
            realm_id: 7,
            name: "Lordaeron".to_string(),
            game_port: 8085,
            max_players: 1000,
            online_players: 250,
            min_access_level: AccessLevel::Player,
            flags: RealmFlags::RECOMMENDED,
            realm_type: RealmType::Pvp,
            timezone: Timezone::English,
            builds,
        }
    }

    #[test]
    fn test_registration_roundtrip() {
        let request = sample_request(vec![5875, 6005, 8606]);
        let bytes = request.encode().unwrap();
        let (decoded, trailing) = RegistrationRequest::decode(&bytes).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(trailing, 0);
    }

    #[test]
    fn test_registration_roundtrip_without_builds() {
        let request = sample_request(Vec::new());
        let bytes = request.encode().unwrap();
        assert_eq!(*bytes.last().unwrap(), 0);

        let (decoded, _) = RegistrationRequest::decode(&bytes).unwrap();
        assert!(decoded.builds.is_empty());
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_registration_with_truncated_builds() {
        let mut bytes = sample_request(vec![5875, 6005]).encode().unwrap();
        bytes.truncate(bytes.len() - 2);
        assert_eq!(
            RegistrationRequest::decode(&bytes),
            Err(PayloadError::UnexpectedEnd { field: "build_id" })
        );
    }

    #[test]
    fn test_registration_with_unknown_realm_type() {
        let mut bytes = sample_request(vec![]).encode().unwrap();
        // type byte sits right before timezone and build_count
        let type_pos = bytes.len() - 3;
        bytes[type_pos] = 3;
        assert!(matches!(
            RegistrationRequest::decode(&bytes),
            Err(PayloadError::InvalidValue { field: "type", .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_reported() {
        let mut bytes = sample_request(vec![1]).encode().unwrap();
        bytes.extend([0xAA, 0xBB]);
        let (_, trailing) = RegistrationRequest::decode(&bytes).unwrap();
        assert_eq!(trailing, 2);
    }

    #[test]
    fn test_status_update_layout() {
        let update = StatusUpdate {
            flags: RealmFlags::FULL,
            population: 1.5,
        };
        let bytes = update.encode();
        assert_eq!(bytes.len(), 5);
        assert_eq!(StatusUpdate::decode(&bytes).unwrap(), update);
    }

    #[test]
    fn test_registration_response_values() {
        assert_eq!(decode_registration_response(&encode_registration_response(true)), Ok(true));
        assert_eq!(decode_registration_response(&[0]), Ok(false));
        assert!(decode_registration_response(&[2]).is_err());
    }

    #[test]
    fn test_log_batch_compression_roundtrip() {
        let realms = vec![
            RealmLogs {
                realm_id: 3,
                entries: vec![LogMessage::new(1, "world loaded"), LogMessage::new(2, "tick")],
            },
            RealmLogs {
                realm_id: 5,
                entries: vec![LogMessage::new(0, "player joined")],
            },
        ];

        let raw = encode_log_batch(&realms).unwrap();
        let body = compress_log_batch(&raw).unwrap();
        assert_eq!(u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize, raw.len());

        let inflated = decompress_log_batch(&body).unwrap();
        assert_eq!(decode_log_batch(&inflated).unwrap(), realms);
    }

    #[test]
    fn test_log_batch_with_wrong_declared_size_is_rejected() {
        let raw = encode_log_batch(&[RealmLogs {
            realm_id: 9,
            entries: vec![LogMessage::new(1, "shutdown scheduled")],
        }])
        .unwrap();
        let body = compress_log_batch(&raw).unwrap();

        let mut oversized = body.clone();
        oversized[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = decompress_log_batch(&oversized).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        let mut undersized = body;
        undersized[..4].copy_from_slice(&2u32.to_le_bytes());
        let err = decompress_log_batch(&undersized).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
