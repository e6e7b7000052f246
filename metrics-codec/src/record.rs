use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size in bytes of the zero-padded name field.
pub const NAME_LEN: usize = 55;
/// Total size of one encoded record: name (55) + type (1) + value (8).
pub const RECORD_SIZE: usize = NAME_LEN + 1 + 8;

/// The two metric kinds a record can carry, matching the 1-byte `type` field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    Counter = 0,
    Gauge = 1,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown record type byte: {0}")]
pub struct UnknownRecordType(pub u8);

impl TryFrom<u8> for RecordType {
    type Error = UnknownRecordType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RecordType::Counter),
            1 => Ok(RecordType::Gauge),
            other => Err(UnknownRecordType(other)),
        }
    }
}

/// Encode one metric record into its 64-byte wire form.
///
/// `name` longer than [`NAME_LEN`] bytes is truncated; shorter names are
/// zero-padded. Callers that need to detect truncation should check
/// `name.len() <= NAME_LEN` themselves.
pub fn encode_record(name: &[u8], ty: RecordType, value: f64) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    let copy_len = name.len().min(NAME_LEN);
    buf[..copy_len].copy_from_slice(&name[..copy_len]);
    buf[NAME_LEN] = ty as u8;
    buf[NAME_LEN + 1..RECORD_SIZE].copy_from_slice(&value.to_le_bytes());
    buf
}

/// A borrowed view over one decoded record's fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordView<'a> {
    name_bytes: &'a [u8],
    pub ty: RecordType,
    pub value: f64,
}

impl<'a> RecordView<'a> {
    /// Parse a single 64-byte record. Trailing zero bytes in the name field
    /// are trimmed; the type byte must be 0 or 1.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, RecordDecodeError> {
        if bytes.len() != RECORD_SIZE {
            return Err(RecordDecodeError::WrongLength(bytes.len()));
        }
        let raw_name = &bytes[..NAME_LEN];
        let trimmed = {
            let mut end = raw_name.len();
            while end > 0 && raw_name[end - 1] == 0 {
                end -= 1;
            }
            &raw_name[..end]
        };
        let ty = RecordType::try_from(bytes[NAME_LEN]).map_err(RecordDecodeError::BadType)?;
        let mut value_bytes = [0u8; 8];
        value_bytes.copy_from_slice(&bytes[NAME_LEN + 1..RECORD_SIZE]);
        let value = f64::from_le_bytes(value_bytes);
        Ok(RecordView {
            name_bytes: trimmed,
            ty,
            value,
        })
    }

    /// Raw name bytes, zero padding trimmed. Not guaranteed to be valid UTF-8.
    pub fn name_bytes(&self) -> &'a [u8] {
        self.name_bytes
    }

    /// Best-effort text view of the name; `None` if it isn't valid UTF-8.
    pub fn name_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.name_bytes).ok()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordDecodeError {
    #[error("record must be {RECORD_SIZE} bytes, got {0}")]
    WrongLength(usize),
    #[error("invalid type byte: {0}")]
    BadType(#[from] UnknownRecordType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_encode_decode() {
        let encoded = encode_record(b"rps", RecordType::Counter, 42.5);
        let view = RecordView::parse(&encoded).unwrap();
        assert_eq!(view.name_str(), Some("rps"));
        assert_eq!(view.ty, RecordType::Counter);
        assert_eq!(view.value, 42.5);
    }

    #[test]
    fn name_padding_is_trimmed() {
        let encoded = encode_record(b"a", RecordType::Gauge, 1.0);
        assert_eq!(&encoded[1..NAME_LEN], &[0u8; NAME_LEN - 1]);
        let view = RecordView::parse(&encoded).unwrap();
        assert_eq!(view.name_bytes(), b"a");
    }

    #[test]
    fn name_at_max_length_is_not_truncated() {
        let name = vec![b'x'; NAME_LEN];
        let encoded = encode_record(&name, RecordType::Gauge, 0.0);
        let view = RecordView::parse(&encoded).unwrap();
        assert_eq!(view.name_bytes(), name.as_slice());
    }

    #[test]
    fn name_longer_than_max_is_truncated_on_encode() {
        let name = vec![b'y'; NAME_LEN + 10];
        let encoded = encode_record(&name, RecordType::Counter, 0.0);
        let view = RecordView::parse(&encoded).unwrap();
        assert_eq!(view.name_bytes().len(), NAME_LEN);
    }

    #[test]
    fn bad_type_byte_is_rejected() {
        let mut encoded = encode_record(b"m", RecordType::Counter, 1.0);
        encoded[NAME_LEN] = 7;
        assert_eq!(
            RecordView::parse(&encoded),
            Err(RecordDecodeError::BadType(UnknownRecordType(7)))
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = [0u8; RECORD_SIZE - 1];
        assert_eq!(
            RecordView::parse(&short),
            Err(RecordDecodeError::WrongLength(RECORD_SIZE - 1))
        );
    }

    #[test]
    fn non_utf8_name_has_no_text_view() {
        let encoded = encode_record(&[0xff, 0xfe], RecordType::Gauge, 0.0);
        let view = RecordView::parse(&encoded).unwrap();
        assert_eq!(view.name_str(), None);
    }
}
