//! Directory entries and entry blocks.
//!
//! A directory stores its entries in data blocks referenced by the direct
//! slots of its inode. Each entry is a 256-byte null-padded name followed by
//! a 32-bit inode number; -1 marks a free slot. A block holds
//! [`DIR_ENTRIES_PER_BLOCK`] entries; the tail of the block stays zero.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use super::inode::Inode;
use super::layout::SegFs;
use super::record::DiskRecord;
use super::{
    BLOCK_SIZE, DIRECT_POINTERS, DIR_ENTRIES_PER_BLOCK, DIR_ENTRY_SIZE, FREE_ENTRY, MAX_NAME_LEN,
};
use crate::error::{FsError, Result};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DirEntry {
    #[serde(with = "BigArray")]
    pub name: [u8; MAX_NAME_LEN],
    pub inode_num: i32,
}

impl DirEntry {
    pub fn free() -> Self {
        DirEntry {
            name: [0; MAX_NAME_LEN],
            inode_num: FREE_ENTRY,
        }
    }

    /// Build a live entry. Names of 256 bytes or more are truncated; byte
    /// 255 always stays null.
    pub fn new(name: &str, inode_num: i32) -> Self {
        let mut entry = DirEntry {
            name: [0; MAX_NAME_LEN],
            inode_num,
        };
        let bytes = name.as_bytes();
        if bytes.len() >= MAX_NAME_LEN {
            warn!("truncating over-long name to {} bytes", MAX_NAME_LEN - 1);
        }
        let len = bytes.len().min(MAX_NAME_LEN - 1);
        entry.name[..len].copy_from_slice(&bytes[..len]);
        entry
    }

    pub fn is_free(&self) -> bool {
        self.inode_num == FREE_ENTRY
    }

    /// Name bytes up to the first null.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);
        &self.name[..len]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn matches(&self, probe: &str) -> bool {
        let bytes = probe.as_bytes();
        let len = bytes.len().min(MAX_NAME_LEN - 1);
        !self.is_free() && self.name_bytes() == &bytes[..len]
    }

    /// Return the slot to the free state.
    pub fn clear(&mut self) {
        self.name = [0; MAX_NAME_LEN];
        self.inode_num = FREE_ENTRY;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DirBlock {
    pub entries: [DirEntry; DIR_ENTRIES_PER_BLOCK],
}

impl DirBlock {
    /// A block with every entry free.
    pub fn empty() -> Self {
        DirBlock {
            entries: core::array::from_fn(|_| DirEntry::free()),
        }
    }

    pub fn first_free(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.is_free())
    }

    pub fn live(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|e| !e.is_free())
    }
}

impl DiskRecord for DirBlock {
    const DISK_SIZE: usize = DIR_ENTRIES_PER_BLOCK * DIR_ENTRY_SIZE;
}

impl SegFs {
    /// Read a full entries block out of a data block.
    pub(crate) fn load_dir_block(&self, block_id: i32) -> Result<DirBlock> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(block_id, &mut buf)?;
        DirBlock::from_bytes(&buf)
    }

    /// Write an entries block into a data block, zero-padding the tail.
    pub(crate) fn save_dir_block(&self, block_id: i32, block: &DirBlock) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        let bytes = block.to_bytes()?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        self.write_block(block_id, &buf)
    }

    /// Look a name up in a directory. Returns the child's inode number.
    pub(crate) fn find_entry(&self, dir: &Inode, name: &str) -> Result<Option<i32>> {
        if !dir.is_directory() {
            return Err(FsError::NotDirectory(name.to_string()));
        }
        for &block_id in dir.live_direct() {
            let block = self.load_dir_block(block_id)?;
            for entry in block.live() {
                if entry.matches(name) {
                    return Ok(Some(entry.inode_num));
                }
            }
        }
        Ok(None)
    }

    /// Insert `name -> child` into a directory, appending a fresh entries
    /// block when no existing block has a free slot. The caller's in-memory
    /// inode is kept in step and persisted when it changes.
    pub(crate) fn add_entry(
        &self,
        dir: &mut Inode,
        dir_inode_num: i32,
        name: &str,
        child_inode_num: i32,
    ) -> Result<()> {
        if !dir.is_directory() {
            return Err(FsError::NotDirectory(name.to_string()));
        }
        if self.find_entry(dir, name)?.is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        for &block_id in dir.live_direct() {
            let mut block = self.load_dir_block(block_id)?;
            if let Some(slot) = block.first_free() {
                block.entries[slot] = DirEntry::new(name, child_inode_num);
                return self.save_dir_block(block_id, &block);
            }
        }

        if dir.num_direct as usize >= DIRECT_POINTERS {
            return Err(FsError::DirectoryFull);
        }

        let block_id = self.allocate_block()?;
        let mut block = DirBlock::empty();
        block.entries[0] = DirEntry::new(name, child_inode_num);
        self.save_dir_block(block_id, &block)?;

        dir.direct_blocks[dir.num_direct as usize] = block_id;
        dir.num_direct += 1;
        dir.size += BLOCK_SIZE as u64;
        self.write_inode(dir_inode_num, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_encoded_size() {
        let entry = DirEntry::new("hello", 3);
        let bytes = bincode::serde::encode_to_vec(&entry, bincode::config::legacy()).unwrap();
        assert_eq!(bytes.len(), DIR_ENTRY_SIZE);
    }

    #[test]
    fn test_block_encoded_size_fits_one_data_block() {
        let block = DirBlock::empty();
        let bytes = block.to_bytes().unwrap();
        assert_eq!(bytes.len(), DIR_ENTRIES_PER_BLOCK * DIR_ENTRY_SIZE);
        assert!(bytes.len() <= BLOCK_SIZE);
    }

    #[test]
    fn test_name_truncation_keeps_final_null() {
        let long = "x".repeat(400);
        let entry = DirEntry::new(&long, 1);
        assert_eq!(entry.name_bytes().len(), MAX_NAME_LEN - 1);
        assert_eq!(entry.name[MAX_NAME_LEN - 1], 0);
        assert!(entry.matches(&long));
    }

    #[test]
    fn test_matches_distinguishes_names() {
        let entry = DirEntry::new("notes.txt", 5);
        assert!(entry.matches("notes.txt"));
        assert!(!entry.matches("notes"));
        assert!(!entry.matches("notes.txt2"));

        let mut freed = entry.clone();
        freed.clear();
        assert!(!freed.matches("notes.txt"));
        assert!(freed.is_free());
        assert_eq!(freed.name, [0; MAX_NAME_LEN]);
    }

    #[test]
    fn test_empty_block_has_all_slots_free() {
        let block = DirBlock::empty();
        assert_eq!(block.first_free(), Some(0));
        assert_eq!(block.live().count(), 0);

        let decoded = DirBlock::from_bytes(&block.to_bytes().unwrap()).unwrap();
        assert!(decoded.entries.iter().all(|e| e.is_free()));
    }
}
