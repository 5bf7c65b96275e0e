//! The region container: a 32x32 grid of chunk slots backed by a file.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::time::{SystemTime, UNIX_EPOCH};

use super::events::{RegionChange, Subscribers};
use super::header::{Header, Location};
use super::save::SavePlan;
use super::{CHUNK_COUNT, HEADER_SIZE, index_to_local, local_to_index};
use crate::chunk::Chunk;
use crate::error::{RegionError, Result};

/// Process-unique handle naming the region a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u64);

impl RegionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A region file opened for editing.
///
/// Chunks are read lazily from the backing file. Edits stay in memory until
/// [`Region::save`] rewrites the whole file.
///
/// A region is single-threaded and not reentrant: saving swaps the backing
/// file handle, so loads and saves must not overlap.
pub struct Region {
    id: RegionId,
    path: Option<PathBuf>,
    file: Option<File>,
    header: Header,
    chunks: Vec<Option<Chunk>>,
    chunk_count: usize,
    structure_changed: bool,
    subscribers: Subscribers,
}

impl Region {
    /// Empty in-memory region with no backing file.
    pub fn new() -> Self {
        Self {
            id: RegionId::next(),
            path: None,
            file: None,
            header: Header::new(),
            chunks: (0..CHUNK_COUNT).map(|_| None).collect(),
            chunk_count: 0,
            structure_changed: false,
            subscribers: Subscribers::default(),
        }
    }

    /// Open a region file, validating every location entry.
    ///
    /// The first chunk found is loaded right away as a sanity check on the
    /// format. A file without any chunk is rejected.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let header = Header::read_from(&mut file)?;

        let mut region = Self::new();
        let mut first = None;

        for index in 0..CHUNK_COUNT {
            let (x, z) = index_to_local(index);
            let location = header.location(x, z);
            if location.is_empty() {
                continue;
            }

            if location.offset < HEADER_SIZE as u64 {
                return Err(RegionError::Format {
                    x,
                    z,
                    reason: format!("offset {} is inside the header", location.offset),
                });
            }
            if location.offset > file_len {
                return Err(RegionError::Format {
                    x,
                    z,
                    reason: format!(
                        "offset {} is beyond the end of the file ({} bytes)",
                        location.offset, file_len
                    ),
                });
            }

            region.chunks[index] = Some(Chunk::on_disk(x, z, location, region.id));
            region.chunk_count += 1;
            first.get_or_insert(index);
        }

        let Some(first) = first else {
            return Err(RegionError::NoChunks);
        };
        if let Some(chunk) = region.chunks[first].as_mut() {
            chunk.load(Some(&mut file))?;
        }

        log::info!(
            "Opened region {} with {} chunks",
            path.display(),
            region.chunk_count
        );

        region.path = Some(path.to_path_buf());
        region.file = Some(file);
        region.header = header;
        Ok(region)
    }

    /// Like [`Region::open`], but any failure yields `None`. Meant for
    /// checking files that may not be regions at all.
    pub fn try_open(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(region) => Some(region),
            Err(e) => {
                log::debug!("{} is not a region file: {}", path.display(), e);
                None
            }
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Backing file, `None` for in-memory regions.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Chunk at local coordinates. Coordinates must be below 32.
    pub fn get(&self, x: u8, z: u8) -> Option<&Chunk> {
        self.chunks[local_to_index(x, z)].as_ref()
    }

    pub fn get_mut(&mut self, x: u8, z: u8) -> Option<&mut Chunk> {
        self.chunks[local_to_index(x, z)].as_mut()
    }

    /// Load the chunk at `(x, z)` from the backing file if needed.
    pub fn load_chunk(&mut self, x: u8, z: u8) -> Result<Option<&Chunk>> {
        let file = self.file.as_mut();
        match self.chunks[local_to_index(x, z)].as_mut() {
            Some(chunk) => {
                chunk.load(file)?;
                Ok(Some(chunk))
            }
            None => Ok(None),
        }
    }

    /// Location entry currently stored in the header for `(x, z)`.
    pub fn location(&self, x: u8, z: u8) -> Location {
        self.header.location(x, z)
    }

    /// Last save time of `(x, z)`, Unix seconds.
    pub fn timestamp(&self, x: u8, z: u8) -> u32 {
        self.header.timestamp(x, z)
    }

    /// All 1024 slots in header order, empty ones included.
    pub fn slots(&self) -> impl Iterator<Item = Option<&Chunk>> + '_ {
        self.chunks.iter().map(Option::as_ref)
    }

    /// Present chunks in header order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.chunks.iter().flatten()
    }

    /// Every empty coordinate, `x` outermost. The scan starts at
    /// `(start_x, start_z)`; later rows start from `z = 0`.
    pub fn free_coordinates(&self, start_x: u8, start_z: u8) -> impl Iterator<Item = (u8, u8)> + '_ {
        (start_x..32)
            .flat_map(move |x| {
                let from = if x == start_x { start_z } else { 0 };
                (from..32).map(move |z| (x, z))
            })
            .filter(move |&(x, z)| self.chunks[local_to_index(x, z)].is_none())
    }

    /// Detach the chunk at `(x, z)`. The returned chunk no longer belongs to
    /// any region and carries its own bytes.
    pub fn remove(&mut self, x: u8, z: u8) -> Option<Chunk> {
        let mut chunk = self.chunks[local_to_index(x, z)].take()?;
        chunk.detach(self.file.as_mut());

        self.chunk_count -= 1;
        self.structure_changed = true;
        log::debug!("Removed chunk ({}, {})", x, z);
        self.subscribers.publish(RegionChange::Removed { x, z });
        Some(chunk)
    }

    /// Insert a detached chunk at its own coordinates.
    ///
    /// A chunk still owned by another region is refused: its bytes live in
    /// that region's file. Use [`Region::import`] to move it.
    pub fn add(&mut self, mut chunk: Chunk) -> Result<()> {
        let (x, z) = (chunk.x(), chunk.z());
        if chunk.owner().is_some_and(|owner| owner != self.id) {
            return Err(RegionError::OwnedElsewhere { x, z });
        }
        let index = local_to_index(x, z);
        if self.chunks[index].is_some() {
            return Err(RegionError::SlotOccupied { x, z });
        }

        chunk.set_owner(Some(self.id));
        self.chunks[index] = Some(chunk);
        self.chunk_count += 1;
        self.structure_changed = true;
        log::debug!("Added chunk ({}, {})", x, z);
        self.subscribers.publish(RegionChange::Added { x, z });
        Ok(())
    }

    /// Move the chunk at `from` in `source` to `to` in this region.
    ///
    /// Returns `Ok(false)` when `source` has nothing at `from`. Fails
    /// without touching either region when `to` is occupied.
    pub fn import(&mut self, source: &mut Region, from: (u8, u8), to: (u8, u8)) -> Result<bool> {
        if self.get(to.0, to.1).is_some() {
            return Err(RegionError::SlotOccupied { x: to.0, z: to.1 });
        }
        let Some(chunk) = source.remove(from.0, from.1) else {
            return Ok(false);
        };
        self.add(chunk.with_position(to.0, to.1))?;
        Ok(true)
    }

    /// Receive a [`RegionChange`] after every add and remove.
    pub fn subscribe(&mut self) -> Receiver<RegionChange> {
        self.subscribers.subscribe()
    }

    /// Structural edits since the last save, or a chunk with edits of its
    /// own. Chunks can change behind the region's back, so this is computed
    /// on every call.
    pub fn has_unsaved_changes(&self) -> bool {
        self.structure_changed || self.chunks().any(Chunk::has_unsaved_changes)
    }

    /// Rewrite the backing file with every chunk repacked from sector 2.
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone().ok_or(RegionError::Unsaveable)?;

        let plan = SavePlan::build(&mut self.chunks, &self.header, self.file.as_mut(), unix_now())?;

        self.file = None;
        let mut out = BufWriter::new(File::create(&path)?);
        plan.write_to(&mut out)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.set_len(plan.end)?;
        file.sync_all()?;
        drop(file);

        for write in &plan.writes {
            if let Some(chunk) = self.chunks[write.index].as_mut() {
                chunk.mark_saved(write.location());
            }
        }
        self.header = plan.header;
        self.structure_changed = false;
        self.file = Some(File::open(&path)?);

        log::info!(
            "Saved region {}: {} chunks, {} bytes",
            path.display(),
            plan.writes.len(),
            plan.end
        );
        Ok(())
    }

    /// Bind the region to `path` and save it there. Unloaded chunks are
    /// still read from the previous file.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.path = Some(path.as_ref().to_path_buf());
        self.save()
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("chunk_count", &self.chunk_count)
            .field("structure_changed", &self.structure_changed)
            .finish()
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Compression;

    fn chunk(x: u8, z: u8) -> Chunk {
        Chunk::new(x, z, vec![x, z, 1, 2, 3], Compression::Zlib)
    }

    #[test]
    fn test_new_region_is_empty() {
        let region = Region::new();
        assert_eq!(region.chunk_count(), 0);
        assert!(region.path().is_none());
        assert!(!region.has_unsaved_changes());
        assert_eq!(region.slots().count(), 1024);
        assert!(region.slots().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_add_and_get() {
        let mut region = Region::new();
        region.add(chunk(4, 9)).unwrap();

        let got = region.get(4, 9).unwrap();
        assert_eq!(got.owner(), Some(region.id()));
        assert_eq!(region.chunk_count(), 1);
        assert!(region.get(9, 4).is_none());
        assert!(region.has_unsaved_changes());
    }

    #[test]
    fn test_add_to_occupied_slot_fails() {
        let mut region = Region::new();
        region.add(chunk(1, 1)).unwrap();

        let replacement = Chunk::new(1, 1, vec![0xAA], Compression::None);
        let err = region.add(replacement).unwrap_err();
        assert!(matches!(err, RegionError::SlotOccupied { x: 1, z: 1 }));
        assert_eq!(region.chunk_count(), 1);
        assert_eq!(region.get(1, 1).unwrap().data(), Some(&[1, 1, 1, 2, 3][..]));
    }

    #[test]
    fn test_add_refuses_chunk_owned_by_other_region() {
        let other = Region::new();
        let mut region = Region::new();
        let location = Location::decode(Location::encode(1, 8192));
        let foreign = Chunk::on_disk(3, 3, location, other.id());

        let err = region.add(foreign).unwrap_err();
        assert!(matches!(err, RegionError::OwnedElsewhere { x: 3, z: 3 }));
        assert_eq!(region.chunk_count(), 0);
        assert!(!region.has_unsaved_changes());
    }

    #[test]
    fn test_remove_then_readd() {
        let mut region = Region::new();
        region.add(chunk(2, 3)).unwrap();

        let removed = region.remove(2, 3).unwrap();
        assert_eq!(removed.owner(), None);
        assert_eq!(region.chunk_count(), 0);
        assert!(region.remove(2, 3).is_none());

        region.add(removed).unwrap();
        assert_eq!(region.chunk_count(), 1);
    }

    #[test]
    fn test_free_coordinates_order() {
        let mut region = Region::new();
        let all: Vec<_> = region.free_coordinates(0, 0).collect();
        assert_eq!(all.len(), 1024);
        assert_eq!(&all[..3], &[(0, 0), (0, 1), (0, 2)]);
        assert_eq!(all[32], (1, 0));

        region.add(chunk(5, 10)).unwrap();
        let rest: Vec<_> = region.free_coordinates(0, 0).collect();
        assert_eq!(rest.len(), 1023);
        assert!(!rest.contains(&(5, 10)));
        let expected: Vec<_> = all.into_iter().filter(|&c| c != (5, 10)).collect();
        assert_eq!(rest, expected);
    }

    #[test]
    fn test_free_coordinates_start() {
        let region = Region::new();
        let mut free = region.free_coordinates(31, 30);
        assert_eq!(free.next(), Some((31, 30)));
        assert_eq!(free.next(), Some((31, 31)));
        assert_eq!(free.next(), None);

        let second_row: Vec<_> = region.free_coordinates(3, 31).take(2).collect();
        assert_eq!(second_row, vec![(3, 31), (4, 0)]);
    }

    #[test]
    fn test_change_notifications() {
        let mut region = Region::new();
        let rx = region.subscribe();

        region.add(chunk(0, 0)).unwrap();
        let _ = region.add(chunk(0, 0));
        region.remove(0, 0);
        region.remove(0, 0);

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                RegionChange::Added { x: 0, z: 0 },
                RegionChange::Removed { x: 0, z: 0 }
            ]
        );
    }

    #[test]
    fn test_import_between_regions() {
        let mut source = Region::new();
        let mut target = Region::new();
        source.add(chunk(7, 7)).unwrap();
        target.add(chunk(0, 0)).unwrap();

        assert!(target.import(&mut source, (7, 7), (0, 1)).unwrap());
        assert_eq!(source.chunk_count(), 0);
        assert_eq!(target.chunk_count(), 2);

        let moved = target.get(0, 1).unwrap();
        assert_eq!((moved.x(), moved.z()), (0, 1));
        assert_eq!(moved.owner(), Some(target.id()));

        assert!(!target.import(&mut source, (7, 7), (0, 2)).unwrap());
    }

    #[test]
    fn test_import_into_occupied_leaves_both_untouched() {
        let mut source = Region::new();
        let mut target = Region::new();
        source.add(chunk(1, 1)).unwrap();
        target.add(chunk(2, 2)).unwrap();

        let err = target.import(&mut source, (1, 1), (2, 2)).unwrap_err();
        assert!(matches!(err, RegionError::SlotOccupied { x: 2, z: 2 }));
        assert!(source.get(1, 1).is_some());
        assert_eq!(target.chunk_count(), 1);
    }

    #[test]
    fn test_chunk_dirtiness_is_seen() {
        let mut region = Region::new();
        region.add(chunk(0, 0)).unwrap();
        region.structure_changed = false;
        assert!(!region.has_unsaved_changes());

        region.get_mut(0, 0).unwrap().set_data(vec![1]);
        assert!(region.has_unsaved_changes());
    }

    #[test]
    fn test_in_memory_region_cannot_save() {
        let mut region = Region::new();
        region.add(chunk(0, 0)).unwrap();
        assert!(matches!(region.save(), Err(RegionError::Unsaveable)));
    }
}
