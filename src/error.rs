//! Error types for region operations

use thiserror::Error;

/// Region operation result type
pub type Result<T> = std::result::Result<T, RegionError>;

/// Region operation errors
#[derive(Error, Debug)]
pub enum RegionError {
    /// Header entry points somewhere a chunk cannot live
    #[error("Invalid chunk location at ({x}, {z}): {reason}")]
    Format { x: u8, z: u8, reason: String },

    /// Header scan found nothing
    #[error("Region file contains no chunks")]
    NoChunks,

    /// Target coordinate already holds a chunk
    #[error("Slot ({x}, {z}) is already occupied")]
    SlotOccupied { x: u8, z: u8 },

    /// Chunk still sits in another region's grid
    #[error("Chunk ({x}, {z}) belongs to another region; move it with Region::import")]
    OwnedElsewhere { x: u8, z: u8 },

    /// Serialized chunk does not fit in 255 sectors
    #[error("Chunk ({x}, {z}) is {len} bytes, over the 255 sector limit")]
    ChunkTooLarge { x: u8, z: u8, len: usize },

    /// In-memory region without a backing file
    #[error("Region has no backing file")]
    Unsaveable,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
