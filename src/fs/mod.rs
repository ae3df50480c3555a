//! The on-disk engine: segments, bitmaps, inodes, directories and the
//! file block map.

pub mod bitmap;
pub mod directory;
pub mod inode;
pub mod layout;
pub mod ops;
pub mod path;
mod record;
pub mod segment;

pub use directory::{DirBlock, DirEntry};
pub use inode::{Inode, InodeKind};
pub use layout::SegFs;
pub use ops::{DebugNode, LevelSummary, ListEntry};

/// Size of one segment container file.
pub const SEGMENT_SIZE: usize = 1024 * 1024;
/// Size of one data block, and of the bitmap block heading every segment.
pub const BLOCK_SIZE: usize = 4096;
/// Encoded size of one inode record.
pub const INODE_SIZE: usize = 4096;
/// Inode records per inode segment, after the bitmap block.
pub const INODES_PER_SEGMENT: usize = (SEGMENT_SIZE - BLOCK_SIZE) / INODE_SIZE;
/// Data blocks per data segment, after the bitmap block.
pub const BLOCKS_PER_SEGMENT: usize = (SEGMENT_SIZE - BLOCK_SIZE) / BLOCK_SIZE;

/// Direct block slots in an inode.
pub const DIRECT_POINTERS: usize = 1017;
/// Block ids held by one indirect block.
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Size of the name field in a directory entry, including the final null.
pub const MAX_NAME_LEN: usize = 256;
/// Encoded size of one directory entry.
pub const DIR_ENTRY_SIZE: usize = MAX_NAME_LEN + 4;
/// Directory entries per data block.
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

/// Inode number of the root directory.
pub const ROOT_INODE: i32 = 0;
/// Most components a path may carry.
pub const MAX_PATH_COMPONENTS: usize = 32;

/// Sentinel for an unused block pointer inside an inode.
pub const NO_BLOCK: i32 = -1;
/// Sentinel for a free directory entry.
pub const FREE_ENTRY: i32 = -1;
