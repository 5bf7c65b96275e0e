//! anvil-region: read, edit and repack Anvil-style region files (.mca).
//!
//! A region file stores up to 32x32 chunks behind two 4 KiB header tables.
//! [`Region`] opens such a file lazily, tracks edits in memory and rewrites
//! the whole file, sector aligned, on save.

pub mod chunk;
pub mod error;
pub mod region;

pub use chunk::{Chunk, Compression};
pub use error::{RegionError, Result};
pub use region::{Location, Region, RegionChange, RegionId, RegionPos};
