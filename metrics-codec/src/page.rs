use crate::record::{RecordDecodeError, RecordType, RecordView, RECORD_SIZE};

/// A decoded view over a page's occupied records.
///
/// Only the leading `occupancy` records are considered present; bytes past
/// that point are ignored even if non-zero, since occupancy is carried
/// out-of-band by the control plane and is the sole source of truth.
#[derive(Debug, Clone)]
pub struct DecodedPage {
    names: Vec<Vec<u8>>,
    types: Vec<RecordType>,
    values: Vec<f64>,
}

impl DecodedPage {
    pub fn names(&self) -> &[Vec<u8>] {
        &self.names
    }

    pub fn types(&self) -> &[RecordType] {
        &self.types
    }

    /// Contiguous array of decoded values, in record order. This is a bulk
    /// view built once at decode time, not a per-record allocation.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decode the first `occupancy` records of a page.
///
/// `bytes` may be longer than `occupancy * RECORD_SIZE` (e.g. a full page
/// buffer fetched from a remote MR); only the occupied prefix is decoded.
pub fn decode_page(bytes: &[u8], occupancy: usize) -> Result<DecodedPage, RecordDecodeError> {
    let occupied_len = occupancy
        .checked_mul(RECORD_SIZE)
        .expect("occupancy too large");
    if bytes.len() < occupied_len {
        return Err(RecordDecodeError::WrongLength(bytes.len()));
    }

    let mut names = Vec::with_capacity(occupancy);
    let mut types = Vec::with_capacity(occupancy);
    let mut values = Vec::with_capacity(occupancy);

    for i in 0..occupancy {
        let start = i * RECORD_SIZE;
        let record = RecordView::parse(&bytes[start..start + RECORD_SIZE])?;
        names.push(record.name_bytes().to_vec());
        types.push(record.ty);
        values.push(record.value);
    }

    Ok(DecodedPage {
        names,
        types,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_record;

    fn page_bytes(records: &[(&[u8], RecordType, f64)], capacity: usize) -> Vec<u8> {
        let mut buf = vec![0u8; capacity * RECORD_SIZE];
        for (i, (name, ty, value)) in records.iter().enumerate() {
            let encoded = encode_record(name, *ty, *value);
            buf[i * RECORD_SIZE..(i + 1) * RECORD_SIZE].copy_from_slice(&encoded);
        }
        buf
    }

    #[test]
    fn decodes_only_occupied_prefix() {
        let bytes = page_bytes(
            &[
                (b"rps".as_slice(), RecordType::Counter, 1.0),
                (b"cpu".as_slice(), RecordType::Gauge, 2.0),
            ],
            4,
        );
        let decoded = decode_page(&bytes, 2).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.values(), &[1.0, 2.0]);
    }

    #[test]
    fn trailing_nonzero_bytes_past_occupancy_are_ignored() {
        let mut bytes = page_bytes(&[(b"rps".as_slice(), RecordType::Counter, 1.0)], 4);
        // Poison the byte range beyond the reported occupancy with a record
        // whose type byte would fail to decode if it were ever inspected.
        let poison = encode_record(b"ghost", RecordType::Gauge, 99.0);
        bytes[RECORD_SIZE..2 * RECORD_SIZE].copy_from_slice(&poison);
        bytes[RECORD_SIZE + crate::record::NAME_LEN] = 0xff; // would be a bad type byte
        let decoded = decode_page(&bytes, 1).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.values(), &[1.0]);
    }

    #[test]
    fn zero_occupancy_decodes_to_empty() {
        let bytes = vec![0u8; 4 * RECORD_SIZE];
        let decoded = decode_page(&bytes, 0).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let bytes = vec![0u8; RECORD_SIZE];
        assert!(decode_page(&bytes, 2).is_err());
    }
}
