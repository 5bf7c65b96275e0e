//! Anvil-style region container (.mca).
//!
//! A region file holds up to 32x32 chunks:
//! - Bytes 0-4095: Location table (1024 entries × 4 bytes)
//! - Bytes 4096-8191: Timestamp table (1024 entries × 4 bytes)
//! - Bytes 8192+: Chunk data, each chunk padded to a whole sector

mod container;
mod events;
pub mod header;
mod save;

pub use container::{Region, RegionId};
pub use events::RegionChange;
pub use header::Location;

/// Size of one sector in bytes (4 KB).
pub const SECTOR_SIZE: usize = 4096;

/// Total header size (location table + timestamp table).
pub const HEADER_SIZE: usize = SECTOR_SIZE * 2; // 8192 bytes

/// Number of chunks per region dimension.
pub const REGION_SIZE: i32 = 32;

/// Number of chunk slots in one region.
pub const CHUNK_COUNT: usize = (REGION_SIZE * REGION_SIZE) as usize;

/// Largest sector count a location entry can encode (1 MiB per chunk).
pub const MAX_SECTOR_COUNT: usize = u8::MAX as usize;

/// Convert chunk coordinates to local region coordinates (0-31).
#[inline]
pub fn chunk_to_local(chunk_coord: i32) -> i32 {
    chunk_coord.rem_euclid(REGION_SIZE)
}

/// Convert chunk coordinates to region coordinates.
#[inline]
pub fn chunk_to_region(chunk_coord: i32) -> i32 {
    chunk_coord.div_euclid(REGION_SIZE)
}

/// Calculate linear index for a chunk within a region (0-1023).
///
/// Coordinates wrap modulo 32; passing anything outside `0..32` is a caller
/// bug and trips a debug assertion.
#[inline]
pub fn local_to_index(local_x: u8, local_z: u8) -> usize {
    debug_assert!(
        (local_x as i32) < REGION_SIZE && (local_z as i32) < REGION_SIZE,
        "local coordinate ({}, {}) outside region",
        local_x,
        local_z
    );
    (local_x as usize % 32) + (local_z as usize % 32) * 32
}

/// Calculate local coordinates from linear index.
#[inline]
pub fn index_to_local(index: usize) -> (u8, u8) {
    let local_x = (index % REGION_SIZE as usize) as u8;
    let local_z = (index / REGION_SIZE as usize) as u8;
    (local_x, local_z)
}

/// Calculate file offset for a chunk given its sector number.
#[inline]
pub fn sector_to_offset(sector: u32) -> u64 {
    sector as u64 * SECTOR_SIZE as u64
}

/// Number of whole sectors needed to hold `len` bytes.
#[inline]
pub fn sectors_for(len: usize) -> usize {
    len.div_ceil(SECTOR_SIZE)
}

/// Region file coordinates (parsed from filename like "r.0.-1.mca").
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Parse region position from filename (e.g., "r.0.-1.mca").
    pub fn from_filename(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() == 4 && parts[0] == "r" && parts[3] == "mca" {
            let x = parts[1].parse().ok()?;
            let z = parts[2].parse().ok()?;
            Some(Self { x, z })
        } else {
            None
        }
    }

    /// Region that contains the given world chunk.
    pub fn containing(chunk_x: i32, chunk_z: i32) -> Self {
        Self::new(chunk_to_region(chunk_x), chunk_to_region(chunk_z))
    }

    /// Canonical filename for this region.
    pub fn filename(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Convert local chunk coordinates to world chunk coordinates.
    pub fn local_to_world(&self, local_x: u8, local_z: u8) -> (i32, i32) {
        (
            self.x * REGION_SIZE + local_x as i32,
            self.z * REGION_SIZE + local_z as i32,
        )
    }
}
