//! Repacking a region into a fresh file image.
//!
//! Saving runs in two phases. [`SavePlan::build`] walks the grid in header
//! order, serializes every chunk and lays it out sector by sector, producing
//! the final header tables plus a list of pending writes. Only then does
//! [`SavePlan::write_to`] touch the output: headers first, payloads after.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use super::header::{Header, Location, sector_count};
use super::{CHUNK_COUNT, HEADER_SIZE, SECTOR_SIZE, index_to_local};
use crate::chunk::Chunk;
use crate::error::{RegionError, Result};

/// One chunk frame waiting to be written.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    /// Grid index of the chunk the bytes belong to.
    pub index: usize,
    pub offset: u64,
    pub sectors: u8,
    pub bytes: Vec<u8>,
}

impl PendingWrite {
    pub fn location(&self) -> Location {
        Location {
            offset: self.offset,
            size: self.sectors as u64 * SECTOR_SIZE as u64,
        }
    }
}

/// Complete layout of the next file image.
#[derive(Debug)]
pub(crate) struct SavePlan {
    pub header: Header,
    pub writes: Vec<PendingWrite>,
    /// File length once every write is applied, sector aligned.
    pub end: u64,
}

impl SavePlan {
    /// Serialize every chunk and compute the new header tables.
    ///
    /// `previous` supplies the timestamps of chunks that were never loaded.
    /// `source` is the file unloaded chunks are read from. Chunks that are
    /// corrupt get an empty location entry and their bytes are dropped.
    pub fn build(
        grid: &mut [Option<Chunk>],
        previous: &Header,
        mut source: Option<&mut File>,
        now: u32,
    ) -> Result<Self> {
        let mut header = previous.clone();
        let mut writes = Vec::new();
        let mut cursor = HEADER_SIZE as u64;

        for (index, slot) in grid.iter_mut().enumerate().take(CHUNK_COUNT) {
            let (x, z) = index_to_local(index);

            let Some(chunk) = slot.as_mut() else {
                header.set_location(x, z, [0; 4]);
                continue;
            };

            let bytes = chunk.serialize(source.as_deref_mut())?;
            let sectors = sector_count(bytes.len()).ok_or(RegionError::ChunkTooLarge {
                x,
                z,
                len: bytes.len(),
            })?;

            if chunk.is_corrupt() {
                log::warn!("Dropping corrupt chunk ({}, {}) from saved region", x, z);
                header.set_location(x, z, [0; 4]);
                continue;
            }

            header.set_location(x, z, Location::encode(sectors, cursor));
            if chunk.is_loaded() {
                header.set_timestamp(x, z, now);
            }

            log::debug!(
                "Chunk ({}, {}) -> offset {} ({} sectors)",
                x,
                z,
                cursor,
                sectors
            );
            writes.push(PendingWrite {
                index,
                offset: cursor,
                sectors,
                bytes,
            });
            cursor += sectors as u64 * SECTOR_SIZE as u64;
        }

        Ok(Self {
            header,
            writes,
            end: cursor,
        })
    }

    /// Write the header tables, then every pending chunk at its offset.
    pub fn write_to<W: Write + Seek>(&self, out: &mut W) -> std::io::Result<()> {
        out.seek(SeekFrom::Start(0))?;
        self.header.write_to(out)?;
        for write in &self.writes {
            out.seek(SeekFrom::Start(write.offset))?;
            out.write_all(&write.bytes)?;
        }
        out.flush()
    }
}
