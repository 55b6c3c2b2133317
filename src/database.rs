//! DAT database decoding.
//!
//! Layout:
//!
//! ```text
//! 0..4            u32 BE   text section offset + 1024
//! 4..1028                  reserved header block (not interpreted)
//! 1028..text      8-byte entries:
//!                   u32 BE  inclusive upper bound of the range
//!                   u32 LE  (text length << 24) | text offset relative to the text section
//! text..          UTF-8 tab-separated records referenced by the entries
//! ```
//!
//! Decoding is all-or-nothing: any inconsistency fails the whole database.

use std::collections::HashMap;
use std::fmt;

use sha1::{Digest, Sha1};

use crate::config::{DAT_ENTRY_SIZE, DAT_HEADER_SIZE, DAT_TEXT_OFFSET_BIAS, DAT_TEXT_OFFSET_MASK, SHA1_VALIDATOR_PREFIX};
use crate::error_handling::MalformedDatabase;
use crate::index::RangeRecord;
use crate::resolver::{RecordResolver, Resolution};

/// SHA-1 digest of raw database content, used for change detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 20]);

impl Checksum {
    /// Hashes `content`.
    pub fn of(content: &[u8]) -> Self {
        Checksum::from_hasher(Sha1::new_with_prefix(content))
    }

    pub(crate) fn from_hasher(hasher: Sha1) -> Self {
        let mut digest = [0u8; 20];
        digest.copy_from_slice(&hasher.finalize());
        Checksum(digest)
    }

    /// Parses 40 hex digits.
    pub fn from_hex(hex_digits: &str) -> Option<Self> {
        let bytes = hex::decode(hex_digits).ok()?;
        let digest: [u8; 20] = bytes.try_into().ok()?;
        Some(Checksum(digest))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The HTTP validator form, `sha1-<hex>`.
    pub fn validator(&self) -> String {
        format!("{}{}", SHA1_VALIDATOR_PREFIX, self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

/// Ranges in file order plus the content checksum.
#[derive(Debug)]
pub struct DecodedDatabase {
    pub records: Vec<RangeRecord>,
    pub checksum: Checksum,
}

fn read_u32_be(content: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([content[at], content[at + 1], content[at + 2], content[at + 3]])
}

fn read_u32_le(content: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([content[at], content[at + 1], content[at + 2], content[at + 3]])
}

/// Decodes DAT content, resolving every text record through `resolver`.
///
/// Entries sharing a text slice are resolved once.
pub fn decode(content: &[u8], resolver: &RecordResolver) -> Result<DecodedDatabase, MalformedDatabase> {
    if content.len() < DAT_HEADER_SIZE {
        return Err(MalformedDatabase::TooShort {
            len: content.len(),
            required: DAT_HEADER_SIZE,
        });
    }

    let header = read_u32_be(content, 0);
    let text_offset = header
        .checked_sub(DAT_TEXT_OFFSET_BIAS)
        .ok_or(MalformedDatabase::InvalidHeader(header))? as usize;
    if text_offset < DAT_HEADER_SIZE || text_offset > content.len() {
        return Err(MalformedDatabase::TextSectionOutOfBounds {
            offset: text_offset,
            min: DAT_HEADER_SIZE,
            len: content.len(),
        });
    }

    let table_len = text_offset - DAT_HEADER_SIZE;
    if table_len % DAT_ENTRY_SIZE != 0 {
        return Err(MalformedDatabase::TruncatedEntryTable {
            len: table_len,
            entry_size: DAT_ENTRY_SIZE,
        });
    }

    let mut records = Vec::with_capacity(table_len / DAT_ENTRY_SIZE);
    let mut resolved: HashMap<(usize, usize), Resolution> = HashMap::new();

    for entry in 0..table_len / DAT_ENTRY_SIZE {
        let at = DAT_HEADER_SIZE + entry * DAT_ENTRY_SIZE;
        let upper_bound = read_u32_be(content, at);
        let packed = read_u32_le(content, at + 4);

        let start = text_offset + (packed & DAT_TEXT_OFFSET_MASK) as usize;
        let end = start + (packed >> 24) as usize;
        if end > content.len() {
            return Err(MalformedDatabase::TextOutOfBounds {
                entry,
                start,
                end,
                len: content.len(),
            });
        }

        let resolution = match resolved.get(&(start, end)) {
            Some(resolution) => resolution.clone(),
            None => {
                let text = std::str::from_utf8(&content[start..end])
                    .map_err(|_| MalformedDatabase::InvalidText { entry })?;
                let resolution = resolver.resolve(text);
                resolved.insert((start, end), resolution.clone());
                resolution
            }
        };

        records.push(RangeRecord {
            upper_bound,
            resolution,
        });
    }

    log::debug!(
        "Decoded {} ranges ({} distinct records)",
        records.len(),
        resolved.len()
    );

    Ok(DecodedDatabase {
        records,
        checksum: Checksum::of(content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Iso3166_1};
    use std::sync::Arc;

    fn resolver() -> RecordResolver {
        let mut builder = Catalog::builder();
        let cn = builder.add_country(1, Iso3166_1::default(), "中国");
        builder.add_subdivision(cn, 31, "CN-SH", "上海");
        builder.add_isp(1, "ChinaNet", vec![]);
        RecordResolver::new(Arc::new(builder.build()))
    }

    /// Lays out a DAT file from (upper bound, text) pairs.
    fn build_dat(entries: &[(u32, &str)]) -> Vec<u8> {
        let text_offset = DAT_HEADER_SIZE + entries.len() * DAT_ENTRY_SIZE;
        let mut table = Vec::new();
        let mut text = Vec::new();
        for (upper, record) in entries {
            table.extend_from_slice(&upper.to_be_bytes());
            let packed = ((record.len() as u32) << 24) | text.len() as u32;
            table.extend_from_slice(&packed.to_le_bytes());
            text.extend_from_slice(record.as_bytes());
        }
        let mut content = Vec::new();
        content.extend_from_slice(&(text_offset as u32 + DAT_TEXT_OFFSET_BIAS).to_be_bytes());
        content.resize(DAT_HEADER_SIZE, 0);
        content.extend_from_slice(&table);
        content.extend_from_slice(&text);
        content
    }

    #[test]
    fn test_decode_preserves_file_order() {
        let content = build_dat(&[
            (0x3A1F_FFFF, "中国\t\t\t\t"),
            (0x3A20_FFFF, "中国\t上海\t\t\tChinaNet"),
            (0xFFFF_FFFF, "\t\t\t\t"),
        ]);
        let decoded = decode(&content, &resolver()).expect("decode should succeed");

        let bounds: Vec<u32> = decoded.records.iter().map(|r| r.upper_bound).collect();
        assert_eq!(bounds, vec![0x3A1F_FFFF, 0x3A20_FFFF, 0xFFFF_FFFF]);
        assert_eq!(decoded.records[1].resolution.isps().len(), 1);
        assert!(decoded.records[2].resolution.location.is_none());
        assert_eq!(decoded.checksum, Checksum::of(&content));
    }

    #[test]
    fn test_decode_empty_table() {
        let content = build_dat(&[]);
        let decoded = decode(&content, &resolver()).expect("empty table is structurally valid");
        assert!(decoded.records.is_empty());
    }

    #[test]
    fn test_too_short() {
        let err = decode(&[0u8; 100], &resolver()).unwrap_err();
        assert_eq!(
            err,
            MalformedDatabase::TooShort {
                len: 100,
                required: DAT_HEADER_SIZE
            }
        );
    }

    #[test]
    fn test_header_below_bias() {
        let mut content = build_dat(&[(0xFFFF_FFFF, "")]);
        content[0..4].copy_from_slice(&100u32.to_be_bytes());
        assert_eq!(
            decode(&content, &resolver()).unwrap_err(),
            MalformedDatabase::InvalidHeader(100)
        );
    }

    #[test]
    fn test_text_offset_beyond_content() {
        let mut content = build_dat(&[(0xFFFF_FFFF, "中国\t\t\t\t")]);
        let declared = content.len() as u32 + 1 + DAT_TEXT_OFFSET_BIAS;
        content[0..4].copy_from_slice(&declared.to_be_bytes());
        assert!(matches!(
            decode(&content, &resolver()).unwrap_err(),
            MalformedDatabase::TextSectionOutOfBounds { .. }
        ));
    }

    #[test]
    fn test_text_offset_inside_header() {
        let mut content = build_dat(&[(0xFFFF_FFFF, "")]);
        content[0..4].copy_from_slice(&(DAT_TEXT_OFFSET_BIAS + 8).to_be_bytes());
        assert!(matches!(
            decode(&content, &resolver()).unwrap_err(),
            MalformedDatabase::TextSectionOutOfBounds { offset: 8, .. }
        ));
    }

    #[test]
    fn test_partial_entry() {
        let mut content = build_dat(&[(0xFFFF_FFFF, "abc")]);
        let header = read_u32_be(&content, 0) - 3;
        content[0..4].copy_from_slice(&header.to_be_bytes());
        assert_eq!(
            decode(&content, &resolver()).unwrap_err(),
            MalformedDatabase::TruncatedEntryTable {
                len: 5,
                entry_size: DAT_ENTRY_SIZE
            }
        );
    }

    #[test]
    fn test_text_slice_out_of_bounds() {
        let mut content = build_dat(&[(0xFFFF_FFFF, "abc")]);
        // Claim 200 bytes of text
        let packed = (200u32 << 24).to_le_bytes();
        content[DAT_HEADER_SIZE + 4..DAT_HEADER_SIZE + 8].copy_from_slice(&packed);
        assert!(matches!(
            decode(&content, &resolver()).unwrap_err(),
            MalformedDatabase::TextOutOfBounds { entry: 0, .. }
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut content = build_dat(&[(0xFFFF_FFFF, "ab")]);
        let len = content.len();
        content[len - 2] = 0xFF;
        content[len - 1] = 0xFE;
        assert_eq!(
            decode(&content, &resolver()).unwrap_err(),
            MalformedDatabase::InvalidText { entry: 0 }
        );
    }

    fn with_packed(content: &[u8], entry: usize, packed: u32) -> Vec<u8> {
        let mut patched = content.to_vec();
        let at = DAT_HEADER_SIZE + entry * DAT_ENTRY_SIZE + 4;
        patched[at..at + 4].copy_from_slice(&packed.to_le_bytes());
        patched
    }

    #[test]
    fn test_shared_text_resolved_once() {
        let content = build_dat(&[(0x0FFF_FFFF, "Atlantis\t\t\t\t"), (0xFFFF_FFFF, "")]);
        // Point the second entry at the first entry's text
        let first = read_u32_le(&content, DAT_HEADER_SIZE + 4);
        let content = with_packed(&content, 1, first);

        let reports = Arc::new(std::sync::Mutex::new(0usize));
        let sink = Arc::clone(&reports);
        let resolver = resolver().with_observer(Some(crate::config::UnknownObserver::new(
            move |_, _| *sink.lock().unwrap() += 1,
        )));
        let decoded = decode(&content, &resolver).expect("decode should succeed");
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.records[0].resolution, decoded.records[1].resolution);
        assert_eq!(*reports.lock().unwrap(), 1);
    }

    #[test]
    fn test_checksum_hex_round_trip() {
        let checksum = Checksum::of(b"hello");
        assert_eq!(
            checksum.to_hex(),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(
            checksum.validator(),
            "sha1-aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(Checksum::from_hex(&checksum.to_hex()), Some(checksum));
        assert_eq!(Checksum::from_hex("abcd"), None);
        assert_eq!(Checksum::from_hex("not hex"), None);
    }
}
