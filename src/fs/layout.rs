//! What the filesystem looks like on disk.
//!
//! [`SegFs`] owns the host directory holding the segment files and provides
//! the allocators, record I/O and the file block map everything else is
//! built on. Two parallel segment spaces exist: inode segments hold one
//! 4 KiB inode record per slot, data segments hold one 4 KiB data block per
//! slot, each headed by a 4 KiB bitmap over its 255 slots.
//!
//! Every operation opens the segment file it needs, works on it, and drops
//! the handle before returning; no handle outlives a public operation.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use super::bitmap::Bitmap;
use super::inode::Inode;
use super::record::DiskRecord;
use super::segment::{self, SegmentKind};
use super::{
    BLOCKS_PER_SEGMENT, BLOCK_SIZE, DIRECT_POINTERS, INODES_PER_SEGMENT, INODE_SIZE, NO_BLOCK,
    POINTERS_PER_BLOCK, ROOT_INODE,
};
use crate::error::{FsError, Result};

/// A 4 KiB block of 1024 block ids. Slot value 0 means "no block"; live ids
/// always form a leading prefix.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct IndirectBlock {
    #[serde(with = "BigArray")]
    pub slots: [i32; POINTERS_PER_BLOCK],
}

impl IndirectBlock {
    pub fn zeroed() -> Self {
        IndirectBlock {
            slots: [0; POINTERS_PER_BLOCK],
        }
    }

    /// The live block ids: every slot up to the first zero.
    pub fn live_prefix(&self) -> impl Iterator<Item = i32> + '_ {
        self.slots.iter().copied().take_while(|&id| id != 0)
    }
}

impl DiskRecord for IndirectBlock {
    const DISK_SIZE: usize = BLOCK_SIZE;
}

/// The filesystem engine, rooted at the host directory holding the segment
/// files.
pub struct SegFs {
    base: PathBuf,
}

fn locate(id: i32, per_segment: usize) -> (usize, usize) {
    debug_assert!(id >= 0);
    let id = id as usize;
    (id / per_segment, id % per_segment)
}

fn record_offset(slot: usize, stride: usize) -> u64 {
    (BLOCK_SIZE + slot * stride) as u64
}

fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl SegFs {
    /// Open the filesystem in `base`, initialising it on first use.
    ///
    /// Initialisation creates `inode_seg_0` (with the root directory at
    /// inode 0) and `data_seg_0`.
    pub fn open<P: AsRef<Path>>(base: P) -> Result<Self> {
        let fs = SegFs {
            base: base.as_ref().to_path_buf(),
        };
        if !segment::exists(&fs.base, SegmentKind::Inode, 0) {
            fs.create_segment(SegmentKind::Inode, 0)?;
            fs.create_segment(SegmentKind::Data, 0)?;
            info!("initialized new filesystem in {}", fs.base.display());
        }
        Ok(fs)
    }

    /// Create a zero-filled segment. Creating inode segment 0 also installs
    /// the root directory: bitmap bit 0 set, an empty directory inode in
    /// slot 0.
    fn create_segment(&self, kind: SegmentKind, index: usize) -> Result<()> {
        segment::create(&self.base, kind, index)?;
        if kind == SegmentKind::Inode && index == 0 {
            let mut file = segment::open_rw(&self.base, kind, 0)?;
            let mut bitmap = Bitmap::new();
            bitmap.set(ROOT_INODE as usize);
            segment::write_bitmap(&mut file, &bitmap)?;
            write_record(&mut file, 0, &Inode::new_directory())?;
        }
        Ok(())
    }

    fn open_or_create(&self, kind: SegmentKind, index: usize) -> Result<File> {
        if !segment::exists(&self.base, kind, index) {
            self.create_segment(kind, index)?;
        }
        Ok(segment::open_rw(&self.base, kind, index)?)
    }

    /// First-fit allocation within `kind` segments, scanned in ascending
    /// order; the address space grows by creating new segments, so this
    /// only fails on I/O errors.
    fn allocate_slot(&self, kind: SegmentKind, per_segment: usize) -> Result<i32> {
        let mut index = 0;
        loop {
            let mut file = self.open_or_create(kind, index)?;
            let mut bitmap = segment::read_bitmap(&mut file)?;
            if let Some(slot) = bitmap.first_free(per_segment) {
                bitmap.set(slot);
                segment::write_bitmap(&mut file, &bitmap)?;
                return Ok((index * per_segment + slot) as i32);
            }
            index += 1;
        }
    }

    fn free_slot(&self, kind: SegmentKind, per_segment: usize, id: i32) -> Result<()> {
        let (seg, slot) = locate(id, per_segment);
        let mut file = segment::open_rw(&self.base, kind, seg)?;
        let mut bitmap = segment::read_bitmap(&mut file)?;
        bitmap.clear(slot);
        segment::write_bitmap(&mut file, &bitmap)
    }
}

/// Inode table.
impl SegFs {
    pub fn allocate_inode(&self) -> Result<i32> {
        let inode_num = self.allocate_slot(SegmentKind::Inode, INODES_PER_SEGMENT)?;
        debug!("allocated inode {inode_num}");
        Ok(inode_num)
    }

    pub fn read_inode(&self, inode_num: i32) -> Result<Inode> {
        let (seg, slot) = locate(inode_num, INODES_PER_SEGMENT);
        let mut file = segment::open_read(&self.base, SegmentKind::Inode, seg)?;
        let mut buf = vec![0u8; INODE_SIZE];
        file.seek(SeekFrom::Start(record_offset(slot, INODE_SIZE)))?;
        file.read_exact(&mut buf)?;
        Inode::from_bytes(&buf)
    }

    pub fn write_inode(&self, inode_num: i32, inode: &Inode) -> Result<()> {
        let (seg, slot) = locate(inode_num, INODES_PER_SEGMENT);
        let mut file = segment::open_rw(&self.base, SegmentKind::Inode, seg)?;
        write_record(&mut file, slot, inode)
    }

    /// Clear the inode's bitmap bit. The record bytes stay behind; the
    /// bitmap is the source of truth.
    pub fn free_inode(&self, inode_num: i32) -> Result<()> {
        debug!("freeing inode {inode_num}");
        self.free_slot(SegmentKind::Inode, INODES_PER_SEGMENT, inode_num)
    }
}

fn write_record(file: &mut File, slot: usize, inode: &Inode) -> Result<()> {
    file.seek(SeekFrom::Start(record_offset(slot, INODE_SIZE)))?;
    file.write_all(&inode.to_bytes()?)?;
    Ok(())
}

/// Data block store.
impl SegFs {
    pub fn allocate_block(&self) -> Result<i32> {
        let block_id = self.allocate_slot(SegmentKind::Data, BLOCKS_PER_SEGMENT)?;
        debug!("allocated block {block_id}");
        Ok(block_id)
    }

    pub(crate) fn read_block(&self, block_id: i32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        let (seg, slot) = locate(block_id, BLOCKS_PER_SEGMENT);
        let mut file = segment::open_read(&self.base, SegmentKind::Data, seg)?;
        file.seek(SeekFrom::Start(record_offset(slot, BLOCK_SIZE)))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub(crate) fn write_block(&self, block_id: i32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        let (seg, slot) = locate(block_id, BLOCKS_PER_SEGMENT);
        let mut file = segment::open_rw(&self.base, SegmentKind::Data, seg)?;
        file.seek(SeekFrom::Start(record_offset(slot, BLOCK_SIZE)))?;
        file.write_all(buf)?;
        Ok(())
    }

    pub fn free_block(&self, block_id: i32) -> Result<()> {
        debug!("freeing block {block_id}");
        self.free_slot(SegmentKind::Data, BLOCKS_PER_SEGMENT, block_id)
    }
}

/// The file block map: logical block index to physical block id through
/// direct slots and up to three levels of indirection.
impl SegFs {
    pub(crate) fn read_pointers(&self, block_id: i32) -> Result<IndirectBlock> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(block_id, &mut buf)?;
        IndirectBlock::from_bytes(&buf)
    }

    pub(crate) fn write_pointers(&self, block_id: i32, pointers: &IndirectBlock) -> Result<()> {
        let bytes = pointers.to_bytes()?;
        let mut buf = [0u8; BLOCK_SIZE];
        buf.copy_from_slice(&bytes);
        self.write_block(block_id, &buf)
    }

    /// Allocate a data block and zero it for use as an indirect block.
    fn alloc_pointer_block(&self) -> Result<i32> {
        let block_id = self.allocate_block()?;
        self.write_pointers(block_id, &IndirectBlock::zeroed())?;
        Ok(block_id)
    }

    /// The child pointer at `slot` of an indirect block, allocating a fresh
    /// zeroed child when the slot is still empty.
    fn pointer_child(&self, parent: i32, slot: usize) -> Result<i32> {
        let mut pointers = self.read_pointers(parent)?;
        let existing = pointers.slots[slot];
        if existing != 0 {
            return Ok(existing);
        }
        let child = self.alloc_pointer_block()?;
        pointers.slots[slot] = child;
        self.write_pointers(parent, &pointers)?;
        Ok(child)
    }

    fn set_pointer(&self, block_id: i32, slot: usize, value: i32) -> Result<()> {
        let mut pointers = self.read_pointers(block_id)?;
        pointers.slots[slot] = value;
        self.write_pointers(block_id, &pointers)
    }

    /// Record `block_id` as logical block `logical` of a file, allocating
    /// whatever indirect structure the position requires. Placement is
    /// derived from the index alone: with D direct slots and P pointers per
    /// block, positions fall into the direct range `[0, D)`, the single-
    /// indirect range `[D, D+P)`, the double range `[D+P, D+P+P^2)` and the
    /// triple range beyond that.
    fn link_block(&self, inode: &mut Inode, logical: u64, block_id: i32) -> Result<()> {
        const D: u64 = DIRECT_POINTERS as u64;
        const P: u64 = POINTERS_PER_BLOCK as u64;

        if logical < D {
            inode.direct_blocks[inode.num_direct as usize] = block_id;
            inode.num_direct += 1;
        } else if logical < D + P {
            if inode.indirect_block == NO_BLOCK {
                inode.indirect_block = self.alloc_pointer_block()?;
            }
            self.set_pointer(inode.indirect_block, (logical - D) as usize, block_id)?;
        } else if logical < D + P + P * P {
            if inode.double_indirect_block == NO_BLOCK {
                inode.double_indirect_block = self.alloc_pointer_block()?;
            }
            let offset = logical - D - P;
            let level1 = self.pointer_child(inode.double_indirect_block, (offset / P) as usize)?;
            self.set_pointer(level1, (offset % P) as usize, block_id)?;
        } else if logical < D + P + P * P + P * P * P {
            if inode.triple_indirect_block == NO_BLOCK {
                inode.triple_indirect_block = self.alloc_pointer_block()?;
            }
            let offset = logical - D - P - P * P;
            let level1 =
                self.pointer_child(inode.triple_indirect_block, (offset / (P * P)) as usize)?;
            let level2 = self.pointer_child(level1, ((offset / P) % P) as usize)?;
            self.set_pointer(level2, (offset % P) as usize, block_id)?;
        } else {
            return Err(FsError::FileTooLarge);
        }
        Ok(())
    }

    /// Stream `src` into a fresh file inode, one block at a time. Short
    /// tails are zero-padded on disk; `inode.size` counts user bytes only.
    pub(crate) fn write_file_data<R: Read>(&self, inode: &mut Inode, src: &mut R) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        let mut logical = 0u64;
        loop {
            let n = read_full(src, &mut buf)?;
            if n == 0 {
                break;
            }
            buf[n..].fill(0);
            let block_id = self.allocate_block()?;
            self.write_block(block_id, &buf)?;
            self.link_block(inode, logical, block_id)?;
            inode.size += n as u64;
            logical += 1;
            if n < BLOCK_SIZE {
                break;
            }
        }
        debug!("wrote {} bytes across {} blocks", inode.size, logical);
        Ok(())
    }

    /// Free an indirect tree rooted at `root`: data blocks at depth 1,
    /// child indirect blocks recursively above that, the root last.
    pub(crate) fn free_pointer_tree(&self, root: i32, depth: u8) -> Result<()> {
        let pointers = self.read_pointers(root)?;
        for id in pointers.live_prefix() {
            if depth == 1 {
                self.free_block(id)?;
            } else {
                self.free_pointer_tree(id, depth - 1)?;
            }
        }
        self.free_block(root)
    }
}

#[cfg(test)]
impl SegFs {
    pub(crate) fn load_bitmap(&self, kind: SegmentKind, index: usize) -> Result<Bitmap> {
        let mut file = segment::open_read(&self.base, kind, index)?;
        segment::read_bitmap(&mut file)
    }

    pub(crate) fn segment_count(&self, kind: SegmentKind) -> usize {
        let mut count = 0;
        while segment::exists(&self.base, kind, count) {
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::inode::InodeKind;

    fn fresh() -> (tempfile::TempDir, SegFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = SegFs::open(dir.path()).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_open_initialises_root() {
        let (_dir, fs) = fresh();
        let root = fs.read_inode(ROOT_INODE).unwrap();
        assert_eq!(root.kind, InodeKind::Directory);
        assert_eq!(root.size, 0);
        assert_eq!(root.num_direct, 0);
        assert_eq!(root.indirect_block, NO_BLOCK);

        let bitmap = fs.load_bitmap(SegmentKind::Inode, 0).unwrap();
        assert!(bitmap.is_set(0));
        assert_eq!(bitmap.count_set(), 1);

        let data_bitmap = fs.load_bitmap(SegmentKind::Data, 0).unwrap();
        assert_eq!(data_bitmap.count_set(), 0);
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SegFs::open(dir.path()).unwrap();
        let inode_num = fs.allocate_inode().unwrap();

        // Reopening must not re-initialise anything.
        let fs = SegFs::open(dir.path()).unwrap();
        let bitmap = fs.load_bitmap(SegmentKind::Inode, 0).unwrap();
        assert!(bitmap.is_set(inode_num as usize));
    }

    #[test]
    fn test_allocation_is_first_fit() {
        let (_dir, fs) = fresh();
        assert_eq!(fs.allocate_inode().unwrap(), 1);
        assert_eq!(fs.allocate_inode().unwrap(), 2);
        fs.free_inode(1).unwrap();
        assert_eq!(fs.allocate_inode().unwrap(), 1);

        assert_eq!(fs.allocate_block().unwrap(), 0);
        assert_eq!(fs.allocate_block().unwrap(), 1);
        fs.free_block(0).unwrap();
        assert_eq!(fs.allocate_block().unwrap(), 0);
    }

    #[test]
    fn test_allocation_spills_into_new_segment() {
        let (_dir, fs) = fresh();
        for expected in 0..BLOCKS_PER_SEGMENT as i32 {
            assert_eq!(fs.allocate_block().unwrap(), expected);
        }
        // Segment 0 is now full; the next allocation creates data_seg_1.
        assert_eq!(fs.allocate_block().unwrap(), BLOCKS_PER_SEGMENT as i32);
        assert_eq!(fs.segment_count(SegmentKind::Data), 2);
    }

    #[test]
    fn test_inode_record_round_trip() {
        let (_dir, fs) = fresh();
        let inode_num = fs.allocate_inode().unwrap();
        let mut inode = Inode::new_file();
        inode.size = 999;
        inode.num_direct = 1;
        inode.direct_blocks[0] = 17;
        fs.write_inode(inode_num, &inode).unwrap();

        let reloaded = fs.read_inode(inode_num).unwrap();
        assert_eq!(reloaded.kind, InodeKind::File);
        assert_eq!(reloaded.size, 999);
        assert_eq!(reloaded.live_direct(), &[17]);
    }

    #[test]
    fn test_block_round_trip() {
        let (_dir, fs) = fresh();
        let block_id = fs.allocate_block().unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0] = 0xAB;
        buf[BLOCK_SIZE - 1] = 0xCD;
        fs.write_block(block_id, &buf).unwrap();

        let mut readback = [0u8; BLOCK_SIZE];
        fs.read_block(block_id, &mut readback).unwrap();
        assert_eq!(readback[0], 0xAB);
        assert_eq!(readback[BLOCK_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_link_block_direct_then_single_indirect() {
        let (_dir, fs) = fresh();
        let mut inode = Inode::new_file();

        fs.link_block(&mut inode, 0, 10).unwrap();
        fs.link_block(&mut inode, 1, 11).unwrap();
        assert_eq!(inode.live_direct(), &[10, 11]);
        assert_eq!(inode.indirect_block, NO_BLOCK);

        // First position past the direct range opens the indirect block.
        let first_indirect = DIRECT_POINTERS as u64;
        fs.link_block(&mut inode, first_indirect, 12).unwrap();
        assert_ne!(inode.indirect_block, NO_BLOCK);
        let pointers = fs.read_pointers(inode.indirect_block).unwrap();
        assert_eq!(pointers.slots[0], 12);
        assert_eq!(pointers.slots[1], 0);
    }

    #[test]
    fn test_link_block_double_indirect_levels() {
        let (_dir, fs) = fresh();
        let mut inode = Inode::new_file();
        let base = (DIRECT_POINTERS + POINTERS_PER_BLOCK) as u64;

        fs.link_block(&mut inode, base, 21).unwrap();
        fs.link_block(&mut inode, base + 1, 22).unwrap();
        // Position P slots later must land in the second level-1 block.
        fs.link_block(&mut inode, base + POINTERS_PER_BLOCK as u64, 23)
            .unwrap();

        let root = fs.read_pointers(inode.double_indirect_block).unwrap();
        let level1_a = fs.read_pointers(root.slots[0]).unwrap();
        let level1_b = fs.read_pointers(root.slots[1]).unwrap();
        assert_eq!(level1_a.slots[..2], [21, 22]);
        assert_eq!(level1_b.slots[0], 23);
        assert_eq!(root.slots[2], 0);
    }

    #[test]
    fn test_link_block_triple_indirect_levels() {
        let (_dir, fs) = fresh();
        let mut inode = Inode::new_file();
        let p = POINTERS_PER_BLOCK as u64;
        let base = DIRECT_POINTERS as u64 + p + p * p;

        fs.link_block(&mut inode, base, 31).unwrap();
        // p positions later: same level-1 slot, next level-2 block.
        fs.link_block(&mut inode, base + p, 32).unwrap();
        // p*p positions later: next level-1 slot.
        fs.link_block(&mut inode, base + p * p, 33).unwrap();

        let root = fs.read_pointers(inode.triple_indirect_block).unwrap();
        let level1_a = fs.read_pointers(root.slots[0]).unwrap();
        assert_eq!(fs.read_pointers(level1_a.slots[0]).unwrap().slots[0], 31);
        assert_eq!(fs.read_pointers(level1_a.slots[1]).unwrap().slots[0], 32);
        let level1_b = fs.read_pointers(root.slots[1]).unwrap();
        assert_eq!(fs.read_pointers(level1_b.slots[0]).unwrap().slots[0], 33);
    }

    #[test]
    fn test_free_pointer_tree_reclaims_children() {
        let (_dir, fs) = fresh();
        let mut inode = Inode::new_file();
        // Claim block 0 first so no indirect slot ever stores the id 0,
        // which doubles as the empty-slot sentinel.
        fs.allocate_block().unwrap();
        let before = fs.load_bitmap(SegmentKind::Data, 0).unwrap().count_set();

        let base = (DIRECT_POINTERS + POINTERS_PER_BLOCK) as u64;
        let data = fs.allocate_block().unwrap();
        fs.link_block(&mut inode, base, data).unwrap();
        assert_eq!(
            fs.load_bitmap(SegmentKind::Data, 0).unwrap().count_set(),
            before + 3
        );

        // Depth 2 walks the level-1 blocks, freeing the data block, the
        // level-1 block and the root itself.
        fs.free_pointer_tree(inode.double_indirect_block, 2).unwrap();

        let after = fs.load_bitmap(SegmentKind::Data, 0).unwrap().count_set();
        assert_eq!(before, after);
    }
}
