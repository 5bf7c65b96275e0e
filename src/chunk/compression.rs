//! Chunk framing and compression.
//!
//! Every chunk is stored as `[length: 4][compression: 1][data...]` where
//! `length` is big endian and counts the compression byte plus the data.

use std::io::{Read, Write};

use flate2::Compression as Level;
use flate2::write::{GzEncoder, ZlibEncoder};
use serde::Serialize;
use thiserror::Error;

/// Length prefix plus compression byte.
pub const FRAME_HEADER: usize = 5;

/// Compression types used in the Anvil format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Compression {
    Gzip = 1,
    #[default]
    Zlib = 2,
    None = 3,
    /// LZ4 block stream, same encoding as lz4-java.
    Lz4 = 4,
}

impl Compression {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Gzip),
            2 => Some(Self::Zlib),
            3 => Some(Self::None),
            4 => Some(Self::Lz4),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Level::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => {
                let mut compressed = Vec::new();
                {
                    // The end-of-stream block is emitted when the writer drops.
                    let mut output = lz4_java_wrc::Lz4BlockOutput::new(&mut compressed);
                    output.write_all(data)?;
                    output.flush()?;
                }
                Ok(compressed)
            }
        }
    }

    pub fn decompress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decompressed = Vec::new();
        match self {
            Self::Gzip => {
                flate2::read::GzDecoder::new(data).read_to_end(&mut decompressed)?;
            }
            Self::Zlib => {
                flate2::read::ZlibDecoder::new(data).read_to_end(&mut decompressed)?;
            }
            Self::None => decompressed.extend_from_slice(data),
            Self::Lz4 => {
                lz4_java_wrc::Lz4BlockInput::new(data).read_to_end(&mut decompressed)?;
            }
        }
        Ok(decompressed)
    }
}

/// Why a stored frame could not be turned back into chunk data.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame is {0} bytes, shorter than its header")]
    TooShort(usize),

    #[error("frame claims {claimed} bytes but {available} are present")]
    BadLength { claimed: usize, available: usize },

    #[error("unknown compression type: {0}")]
    UnknownCompression(u8),

    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
}

/// Compress `data` and wrap it in a chunk frame.
pub fn wrap(compression: Compression, data: &[u8]) -> std::io::Result<Vec<u8>> {
    let compressed = compression.compress(data)?;
    let total_len = (compressed.len() + 1) as u32; // +1 byte for type
    let mut frame = Vec::with_capacity(FRAME_HEADER + compressed.len());
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.push(compression.id());
    frame.extend_from_slice(&compressed);
    Ok(frame)
}

/// Parse a chunk frame and decompress its payload.
pub fn unwrap(frame: &[u8]) -> Result<(Compression, Vec<u8>), FrameError> {
    if frame.len() < FRAME_HEADER {
        return Err(FrameError::TooShort(frame.len()));
    }

    let claimed = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let available = frame.len() - 4;
    if claimed == 0 || claimed > available {
        return Err(FrameError::BadLength { claimed, available });
    }

    let compression =
        Compression::from_id(frame[4]).ok_or(FrameError::UnknownCompression(frame[4]))?;
    let data = compression
        .decompress(&frame[FRAME_HEADER..4 + claimed])
        .map_err(FrameError::Decompress)?;
    Ok((compression, data))
}
