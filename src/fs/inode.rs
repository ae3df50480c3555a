//! The inode record.
//!
//! An inode occupies one 4 KiB slot in an inode segment. The encoded layout
//! is, in order: a 32-bit kind tag, a 64-bit byte size, a 32-bit count of
//! direct slots in use, 1017 direct block ids, and the single-, double- and
//! triple-indirect block ids. Unused block-id fields hold -1.

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use super::record::DiskRecord;
use super::{DIRECT_POINTERS, INODE_SIZE, NO_BLOCK};

/// Inode kind tag. The discriminants are the on-disk values: a zeroed slot
/// decodes as `Free`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Free,
    File,
    Directory,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Inode {
    pub kind: InodeKind,
    /// User bytes written. For directories this is the number of entry
    /// blocks times the block size, not a live entry count.
    pub size: u64,
    /// Direct slots currently in use; later slots are unspecified.
    pub num_direct: u32,
    #[serde(with = "BigArray")]
    pub direct_blocks: [i32; DIRECT_POINTERS],
    pub indirect_block: i32,
    pub double_indirect_block: i32,
    pub triple_indirect_block: i32,
}

impl Inode {
    fn new(kind: InodeKind) -> Self {
        Inode {
            kind,
            size: 0,
            num_direct: 0,
            direct_blocks: [NO_BLOCK; DIRECT_POINTERS],
            indirect_block: NO_BLOCK,
            double_indirect_block: NO_BLOCK,
            triple_indirect_block: NO_BLOCK,
        }
    }

    pub fn new_file() -> Self {
        Inode::new(InodeKind::File)
    }

    pub fn new_directory() -> Self {
        Inode::new(InodeKind::Directory)
    }

    pub fn is_directory(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File
    }

    /// The direct block ids currently in use.
    pub fn live_direct(&self) -> &[i32] {
        &self.direct_blocks[..self.num_direct as usize]
    }
}

impl DiskRecord for Inode {
    const DISK_SIZE: usize = INODE_SIZE;
}
