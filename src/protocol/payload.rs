//! Payload field encodings.
//!
//! Integers and floats are little-endian. Strings are UTF-8 terminated by a
//! single null byte, everywhere in the protocol.

use crate::error::PayloadError;

/// Cursor over a received payload.
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], PayloadError> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(PayloadError::UnexpectedEnd { field })?;
        self.pos = end;

        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, PayloadError> {
        Ok(self.take::<1>(field)?[0])
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, PayloadError> {
        Ok(u32::from_le_bytes(self.take(field)?))
    }

    pub fn read_f32(&mut self, field: &'static str) -> Result<f32, PayloadError> {
        Ok(f32::from_le_bytes(self.take(field)?))
    }

    pub fn read_cstring(&mut self, field: &'static str) -> Result<String, PayloadError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(PayloadError::UnterminatedString { field })?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|_| PayloadError::InvalidUtf8 { field })?
            .to_string();
        self.pos += len + 1;
        Ok(text)
    }
}

/// Growable buffer for building an outbound payload.
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Writes `value` up to its first interior null, then the terminator.
    pub fn write_cstring(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buf.extend_from_slice(&bytes[..end]);
        self.buf.push(0);
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_little_endian() {
        let mut writer = PayloadWriter::new();
        writer.write_u32(0x0102_0304).write_u8(9);
        assert_eq!(writer.into_bytes(), vec![0x04, 0x03, 0x02, 0x01, 9]);
    }

    #[test]
    fn test_cstring_reading() {
        let data = b"Lordaeron\0rest";
        let mut reader = PayloadReader::new(data);
        assert_eq!(reader.read_cstring("name").unwrap(), "Lordaeron");
        assert_eq!(reader.remaining(), 4);

        let mut reader = PayloadReader::new(b"no terminator");
        assert_eq!(
            reader.read_cstring("name"),
            Err(PayloadError::UnterminatedString { field: "name" })
        );
    }

    #[test]
    fn test_interior_null_is_truncated_on_write() {
        let mut writer = PayloadWriter::new();
        writer.write_cstring("abc\0def");
        assert_eq!(writer.into_bytes(), b"abc\0".to_vec());
    }

    #[test]
    fn test_short_read_names_field() {
        let mut reader = PayloadReader::new(&[1, 2]);
        assert_eq!(
            reader.read_u32("game_port"),
            Err(PayloadError::UnexpectedEnd { field: "game_port" })
        );
    }
}
