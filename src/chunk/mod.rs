//! Chunk slots.
//!
//! A [`Chunk`] is one entry of the region grid. Chunks read from disk start
//! out unloaded and only pull their frame from the region file when asked;
//! chunks built in memory are loaded from the start.

pub mod compression;

use std::io::{Read, Seek, SeekFrom};

pub use compression::{Compression, FrameError};

use crate::region::{Location, RegionId};

/// One chunk slot of a region.
#[derive(Debug)]
pub struct Chunk {
    x: u8,
    z: u8,
    location: Location,
    owner: Option<RegionId>,
    /// Frame exactly as stored on disk.
    raw: Option<Vec<u8>>,
    /// Decompressed payload, present once loaded.
    data: Option<Vec<u8>>,
    compression: Compression,
    corrupt: bool,
    dirty: bool,
}

impl Chunk {
    /// Build a loaded chunk from decompressed payload bytes.
    pub fn new(x: u8, z: u8, data: Vec<u8>, compression: Compression) -> Self {
        Self {
            x,
            z,
            location: Location::default(),
            owner: None,
            raw: None,
            data: Some(data),
            compression,
            corrupt: false,
            dirty: false,
        }
    }

    /// Build a loaded chunk from an NBT tree.
    pub fn from_nbt(x: u8, z: u8, nbt: &fastnbt::Value) -> fastnbt::error::Result<Self> {
        let data = fastnbt::to_bytes(nbt)?;
        Ok(Self::new(x, z, data, Compression::default()))
    }

    /// Stub for a chunk that lives in a region file and has not been read yet.
    pub(crate) fn on_disk(x: u8, z: u8, location: Location, owner: RegionId) -> Self {
        Self {
            x,
            z,
            location,
            owner: Some(owner),
            raw: None,
            data: None,
            compression: Compression::default(),
            corrupt: false,
            dirty: false,
        }
    }

    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    /// Move a detached chunk to other local coordinates.
    pub fn with_position(mut self, x: u8, z: u8) -> Self {
        self.x = x;
        self.z = z;
        self
    }

    /// Where the chunk was found (or last written) on disk. Zero for chunks
    /// that have never been saved.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Region currently holding this chunk.
    pub fn owner(&self) -> Option<RegionId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<RegionId>) {
        self.owner = owner;
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_corrupt(&self) -> bool {
        self.corrupt
    }

    /// Changes made to this chunk's content since it was loaded or saved.
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Compression used the next time the chunk is written. An unloaded
    /// chunk is re-encoded on save even if the scheme looks unchanged, since
    /// its stored scheme is not known yet.
    pub fn set_compression(&mut self, compression: Compression) {
        if self.compression != compression || !self.is_loaded() {
            self.compression = compression;
            self.dirty = true;
        }
    }

    /// Decompressed payload, if loaded.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Replace the payload. Clears the corrupt flag.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = Some(data);
        self.raw = None;
        self.corrupt = false;
        self.dirty = true;
    }

    /// Parse the loaded payload as NBT.
    pub fn nbt(&self) -> Option<fastnbt::error::Result<fastnbt::Value>> {
        self.data.as_deref().map(|data| fastnbt::from_bytes(data))
    }

    /// Replace the payload with an NBT tree.
    pub fn set_nbt(&mut self, nbt: &fastnbt::Value) -> fastnbt::error::Result<()> {
        self.set_data(fastnbt::to_bytes(nbt)?);
        Ok(())
    }

    /// Materialize the chunk from `source`.
    ///
    /// I/O failures are returned. A frame that cannot be decoded, or that
    /// runs past the end of the file, marks the chunk corrupt instead.
    pub fn load<R: Read + Seek>(&mut self, source: Option<&mut R>) -> std::io::Result<()> {
        if self.is_loaded() || self.corrupt {
            return Ok(());
        }

        if self.raw.is_none() {
            self.raw = self.read_raw(source)?;
            if self.raw.is_none() {
                return Ok(());
            }
        }

        self.decode_raw();
        Ok(())
    }

    /// Bytes to store for this chunk: the re-encoded payload when it was
    /// changed, otherwise the original frame.
    ///
    /// Reading the original frame may discover that it is malformed, in
    /// which case the chunk becomes corrupt and an empty frame is returned.
    pub fn serialize<R: Read + Seek>(&mut self, source: Option<&mut R>) -> std::io::Result<Vec<u8>> {
        if self.corrupt {
            return Ok(Vec::new());
        }

        if self.data.is_none() && self.raw.is_none() {
            self.raw = self.read_raw(source)?;
            if self.raw.is_none() {
                return Ok(Vec::new());
            }
        }

        // Compression changed while unloaded: the payload has to be re-encoded.
        if self.dirty && self.data.is_none() {
            self.decode_raw();
            if self.corrupt {
                return Ok(Vec::new());
            }
        }

        if let Some(data) = &self.data {
            if self.dirty || self.raw.is_none() {
                return compression::wrap(self.compression, data);
            }
        }
        Ok(self.raw.clone().unwrap_or_default())
    }

    /// Pull the frame into memory so the chunk no longer depends on its
    /// region's file, then drop the owner.
    pub(crate) fn detach<R: Read + Seek>(&mut self, source: Option<&mut R>) {
        if !self.is_loaded() && !self.corrupt && self.raw.is_none() {
            match self.read_raw(source) {
                Ok(raw) => self.raw = raw,
                Err(e) => {
                    log::warn!("Failed to read chunk ({}, {}) while detaching: {}", self.x, self.z, e);
                    self.corrupt = true;
                }
            }
        }
        self.owner = None;
        self.location = Location::default();
    }

    /// Record the location the chunk was just written to.
    pub(crate) fn mark_saved(&mut self, location: Location) {
        self.location = location;
        self.dirty = false;
    }

    /// Decompress the held frame. A compression picked while the chunk was
    /// unloaded wins over the one stored on disk.
    fn decode_raw(&mut self) {
        let frame = self.raw.as_deref().unwrap_or_default();
        match compression::unwrap(frame) {
            Ok((stored, data)) => {
                log::debug!(
                    "Loaded chunk ({}, {}): {} bytes, {:?}",
                    self.x,
                    self.z,
                    data.len(),
                    stored
                );
                if !self.dirty {
                    self.compression = stored;
                }
                self.data = Some(data);
            }
            Err(e) => {
                log::warn!("Chunk ({}, {}) is corrupt: {}", self.x, self.z, e);
                self.corrupt = true;
            }
        }
    }

    /// Read the stored frame, trimmed to the length it declares. Returns
    /// `None` (and marks the chunk corrupt) when the declared length does
    /// not fit the allocated sectors or the file ends before the frame does.
    fn read_raw<R: Read + Seek>(&mut self, source: Option<&mut R>) -> std::io::Result<Option<Vec<u8>>> {
        let Some(reader) = source else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("chunk ({}, {}) has no backing file", self.x, self.z),
            ));
        };

        reader.seek(SeekFrom::Start(self.location.offset))?;
        let mut len_bytes = [0u8; 4];
        if !self.read_frame_part(reader, &mut len_bytes)? {
            return Ok(None);
        }
        let claimed = u32::from_be_bytes(len_bytes) as u64;

        if claimed == 0 || claimed + 4 > self.location.size {
            log::warn!(
                "Chunk ({}, {}) is corrupt: frame claims {} bytes in a {} byte allocation",
                self.x,
                self.z,
                claimed,
                self.location.size
            );
            self.corrupt = true;
            return Ok(None);
        }

        let mut frame = vec![0u8; 4 + claimed as usize];
        frame[..4].copy_from_slice(&len_bytes);
        if !self.read_frame_part(reader, &mut frame[4..])? {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    /// `read_exact` that turns a truncated file into a corrupt chunk.
    fn read_frame_part<R: Read>(&mut self, reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
        match reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::warn!("Chunk ({}, {}) is corrupt: frame is cut off by end of file", self.x, self.z);
                self.corrupt = true;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
