//! segfs is a user-space persistent filesystem stored entirely inside
//! fixed-size 1 MiB container files ("segments") in an ordinary host
//! directory.
//!
//! Two parallel segment spaces exist side by side: `inode_seg_<N>` files
//! hold fixed-size inode records, `data_seg_<N>` files hold 4 KiB data
//! blocks. The first 4 KiB of every segment is a bitmap over that segment's
//! slots. Files reach their data through 1017 direct slots plus single-,
//! double- and triple-indirect blocks of 1024 pointers each; directories
//! store fixed-size name/inode entries in their direct blocks only.
//!
//! The engine is single-threaded and synchronous: every operation opens the
//! segment files it needs, finishes, and closes them. There is no journal
//! and no crash-consistency guarantee.

pub mod cli;
pub mod error;
pub mod fs;

pub use error::{FsError, Result};
pub use fs::*;
