//! Region file header codec.
//!
//! The header consists of two tables:
//! - Location table: where each chunk is stored
//! - Timestamp table: when each chunk was last saved
//!
//! A location entry is `[sector count: 1][sector index: 3]`, big endian.

use std::io::{Read, Write};

use super::{MAX_SECTOR_COUNT, SECTOR_SIZE, sector_to_offset, sectors_for};

/// Byte offset of a coordinate's 4-byte entry inside either table.
#[inline]
pub fn slot_index(x: u8, z: u8) -> usize {
    ((x as usize % 32) + (z as usize % 32) * 32) * 4
}

/// Sector count byte for a payload of `len` bytes, or `None` when the
/// payload does not fit in [`MAX_SECTOR_COUNT`] sectors.
#[inline]
pub fn sector_count(len: usize) -> Option<u8> {
    let sectors = sectors_for(len);
    if sectors > MAX_SECTOR_COUNT {
        None
    } else {
        Some(sectors as u8)
    }
}

/// Decoded location entry, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// Byte offset of the chunk frame.
    pub offset: u64,
    /// Allocated span, always a whole number of sectors.
    pub size: u64,
}

impl Location {
    pub fn decode(entry: [u8; 4]) -> Self {
        let sector = u32::from_be_bytes([0, entry[1], entry[2], entry[3]]);
        Self {
            offset: sector_to_offset(sector),
            size: entry[0] as u64 * SECTOR_SIZE as u64,
        }
    }

    /// Encode a sector count and a byte offset. Only the low 3 bytes of the
    /// sector index fit in the entry.
    pub fn encode(sectors: u8, offset: u64) -> [u8; 4] {
        let sector = (offset / SECTOR_SIZE as u64) as u32;
        [
            sectors,
            ((sector >> 16) & 0xFF) as u8,
            ((sector >> 8) & 0xFF) as u8,
            (sector & 0xFF) as u8,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// In-memory copy of the two header tables.
#[derive(Clone, Debug)]
pub struct Header {
    locations: Box<[u8; SECTOR_SIZE]>,
    timestamps: Box<[u8; SECTOR_SIZE]>,
}

impl Header {
    /// All-zero header: every slot empty.
    pub fn new() -> Self {
        Self {
            locations: Box::new([0u8; SECTOR_SIZE]),
            timestamps: Box::new([0u8; SECTOR_SIZE]),
        }
    }

    /// Read both tables from the current position of `reader`.
    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut header = Self::new();
        reader.read_exact(header.locations.as_mut_slice())?;
        reader.read_exact(header.timestamps.as_mut_slice())?;
        Ok(header)
    }

    /// Write both tables, locations first.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.locations.as_slice())?;
        writer.write_all(self.timestamps.as_slice())
    }

    pub fn location(&self, x: u8, z: u8) -> Location {
        Location::decode(entry(&self.locations, x, z))
    }

    pub fn set_location(&mut self, x: u8, z: u8, value: [u8; 4]) {
        let i = slot_index(x, z);
        self.locations[i..i + 4].copy_from_slice(&value);
    }

    pub fn timestamp(&self, x: u8, z: u8) -> u32 {
        u32::from_be_bytes(entry(&self.timestamps, x, z))
    }

    pub fn set_timestamp(&mut self, x: u8, z: u8, seconds: u32) {
        let i = slot_index(x, z);
        self.timestamps[i..i + 4].copy_from_slice(&seconds.to_be_bytes());
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

fn entry(table: &[u8; SECTOR_SIZE], x: u8, z: u8) -> [u8; 4] {
    let i = slot_index(x, z);
    [table[i], table[i + 1], table[i + 2], table[i + 3]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slot_index_is_injective() {
        let mut seen = HashSet::new();
        for z in 0..32 {
            for x in 0..32 {
                let i = slot_index(x, z);
                assert!(i < SECTOR_SIZE);
                assert_eq!(i % 4, 0);
                assert!(seen.insert(i), "duplicate index for ({}, {})", x, z);
            }
        }
        assert_eq!(seen.len(), 1024);
    }

    #[test]
    fn test_slot_index_wraps() {
        assert_eq!(slot_index(32, 0), slot_index(0, 0));
        assert_eq!(slot_index(1, 33), slot_index(1, 1));
        assert_eq!(slot_index(31, 31), 4092);
    }

    #[test]
    fn test_zero_entry_is_empty() {
        let loc = Location::decode([0, 0, 0, 0]);
        assert_eq!(loc, Location { offset: 0, size: 0 });
        assert!(loc.is_empty());
    }

    #[test]
    fn test_decode_layout() {
        // 2 sectors at sector index 0x010203
        let loc = Location::decode([2, 0x01, 0x02, 0x03]);
        assert_eq!(loc.size, 2 * 4096);
        assert_eq!(loc.offset, 0x010203 * 4096);
    }

    #[test]
    fn test_encode_matches_decode() {
        let entry = Location::encode(3, 5 * 4096);
        assert_eq!(entry, [3, 0, 0, 5]);
        let loc = Location::decode(entry);
        assert_eq!(loc.offset, 5 * 4096);
        assert_eq!(loc.size, 3 * 4096);
    }

    #[test]
    fn test_encode_truncates_sector_index() {
        let entry = Location::encode(1, 0x0100_0002 * 4096);
        assert_eq!(entry, [1, 0, 0, 2]);
    }

    #[test]
    fn test_sector_count_limit() {
        assert_eq!(sector_count(0), Some(0));
        assert_eq!(sector_count(4097), Some(2));
        assert_eq!(sector_count(255 * 4096), Some(255));
        assert_eq!(sector_count(255 * 4096 + 1), None);
    }

    #[test]
    fn test_header_round_trip() {
        let mut header = Header::new();
        header.set_location(5, 10, Location::encode(1, 8192));
        header.set_timestamp(5, 10, 1_700_000_000);

        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 8192);

        let read = Header::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(read.location(5, 10), Location { offset: 8192, size: 4096 });
        assert_eq!(read.timestamp(5, 10), 1_700_000_000);
        assert!(read.location(0, 0).is_empty());
    }

    #[test]
    fn test_short_header_fails() {
        let bytes = vec![0u8; 100];
        assert!(Header::read_from(&mut bytes.as_slice()).is_err());
    }
}
