//! The public operation surface: add, extract, remove, list and debug.
//!
//! These walk the directory tree from the root inode and drive the block
//! map underneath. User-facing formatting lives in the binary; everything
//! here returns plain data.

use std::io::{Read, Write};

use log::info;

use super::inode::{Inode, InodeKind};
use super::layout::SegFs;
use super::path;
use super::{BLOCK_SIZE, NO_BLOCK, ROOT_INODE};
use crate::error::{FsError, Result};

/// One line of the recursive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    /// Depth below the root; direct children of `/` are at depth 1.
    pub depth: usize,
    pub is_dir: bool,
}

/// Per-indirection-level block accounting for the debug report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelSummary {
    /// Live data blocks reachable through this level.
    pub count: usize,
    pub first: Option<i32>,
    pub last: Option<i32>,
    /// The indirect root block carrying this level, where one exists.
    pub via: Option<i32>,
}

/// One node of the debug report: the root directory, then one node per
/// path component.
#[derive(Debug, Clone)]
pub enum DebugNode {
    Directory {
        name: String,
        entries: Vec<(String, i32)>,
    },
    File {
        name: String,
        size: u64,
        direct: LevelSummary,
        indirect: Option<LevelSummary>,
        double_indirect: Option<LevelSummary>,
        triple_indirect: Option<LevelSummary>,
    },
    Missing {
        name: String,
    },
}

impl SegFs {
    /// Resolve a component sequence from the root, erroring on the first
    /// missing component or on traversal through a non-directory.
    fn walk(&self, parts: &[String]) -> Result<(i32, Inode)> {
        let mut current_num = ROOT_INODE;
        let mut current = self.read_inode(current_num)?;
        for part in parts {
            let next = self
                .find_entry(&current, part)?
                .ok_or_else(|| FsError::NotFound(part.clone()))?;
            current_num = next;
            current = self.read_inode(next)?;
        }
        Ok((current_num, current))
    }

    /// Store the bytes of `src` at `fs_path`, creating missing intermediate
    /// directories along the way.
    pub fn add_file<R: Read>(&self, fs_path: &str, src: &mut R) -> Result<()> {
        let parts = path::split(fs_path)?;
        let Some((file_name, dirs)) = parts.split_last() else {
            return Err(FsError::InvalidPath);
        };

        let mut current_num = ROOT_INODE;
        let mut current = self.read_inode(current_num)?;
        for part in dirs {
            match self.find_entry(&current, part)? {
                Some(next_num) => {
                    let next = self.read_inode(next_num)?;
                    if !next.is_directory() {
                        return Err(FsError::NotDirectory(part.clone()));
                    }
                    current_num = next_num;
                    current = next;
                }
                None => {
                    info!("creating directory: {part}");
                    let new_num = self.allocate_inode()?;
                    let new_dir = Inode::new_directory();
                    self.write_inode(new_num, &new_dir)?;
                    self.add_entry(&mut current, current_num, part, new_num)?;
                    current_num = new_num;
                    current = new_dir;
                }
            }
        }

        if self.find_entry(&current, file_name)?.is_some() {
            return Err(FsError::AlreadyExists(file_name.clone()));
        }

        let file_num = self.allocate_inode()?;
        let mut file_inode = Inode::new_file();
        self.write_file_data(&mut file_inode, src)?;
        self.write_inode(file_num, &file_inode)?;
        self.add_entry(&mut current, current_num, file_name, file_num)?;
        info!("added {fs_path} ({} bytes) as inode {file_num}", file_inode.size);
        Ok(())
    }

    /// Write the stored bytes of the file at `fs_path` to `out`.
    pub fn extract_file<W: Write>(&self, fs_path: &str, out: &mut W) -> Result<()> {
        let parts = path::split(fs_path)?;
        if parts.is_empty() {
            return Err(FsError::InvalidPath);
        }
        let (_, inode) = self.walk(&parts)?;
        if !inode.is_file() {
            return Err(FsError::NotFile(fs_path.to_string()));
        }

        let mut remaining = inode.size;
        for &block_id in inode.live_direct() {
            if remaining == 0 {
                break;
            }
            self.emit_block(block_id, &mut remaining, out)?;
        }
        let levels = [
            (inode.indirect_block, 1),
            (inode.double_indirect_block, 2),
            (inode.triple_indirect_block, 3),
        ];
        for (root, depth) in levels {
            if root != NO_BLOCK && remaining > 0 {
                self.emit_tree(root, depth, &mut remaining, out)?;
            }
        }
        Ok(())
    }

    fn emit_block<W: Write>(&self, block_id: i32, remaining: &mut u64, out: &mut W) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(block_id, &mut buf)?;
        let take = (*remaining).min(BLOCK_SIZE as u64) as usize;
        out.write_all(&buf[..take])?;
        *remaining -= take as u64;
        Ok(())
    }

    fn emit_tree<W: Write>(
        &self,
        root: i32,
        depth: u8,
        remaining: &mut u64,
        out: &mut W,
    ) -> Result<()> {
        let pointers = self.read_pointers(root)?;
        for id in pointers.live_prefix() {
            if *remaining == 0 {
                break;
            }
            if depth == 1 {
                self.emit_block(id, remaining, out)?;
            } else {
                self.emit_tree(id, depth - 1, remaining, out)?;
            }
        }
        Ok(())
    }

    /// Remove the file or directory subtree at `fs_path` and clear its
    /// entry in the parent directory.
    pub fn remove_path(&self, fs_path: &str) -> Result<()> {
        let parts = path::split(fs_path)?;
        let Some((target_name, dirs)) = parts.split_last() else {
            return Err(FsError::InvalidPath);
        };
        let (_, parent) = self.walk(dirs)?;
        let target_num = self
            .find_entry(&parent, target_name)?
            .ok_or_else(|| FsError::NotFound(target_name.clone()))?;

        self.remove_tree(target_num)?;

        // Clear the parent's entry in place; the parent inode itself does
        // not change, so only the entry block is rewritten.
        for &block_id in parent.live_direct() {
            let mut block = self.load_dir_block(block_id)?;
            if let Some(entry) = block
                .entries
                .iter_mut()
                .find(|e| e.inode_num == target_num)
            {
                entry.clear();
                self.save_dir_block(block_id, &block)?;
                break;
            }
        }
        info!("removed {fs_path}");
        Ok(())
    }

    /// Free everything reachable from `inode_num`, depth first. Files give
    /// back their data blocks and all indirect blocks; directories recurse
    /// into every live entry before freeing their entry blocks.
    fn remove_tree(&self, inode_num: i32) -> Result<()> {
        let inode = self.read_inode(inode_num)?;
        match inode.kind {
            InodeKind::File => {
                for &block_id in inode.live_direct() {
                    self.free_block(block_id)?;
                }
                let levels = [
                    (inode.indirect_block, 1),
                    (inode.double_indirect_block, 2),
                    (inode.triple_indirect_block, 3),
                ];
                for (root, depth) in levels {
                    if root != NO_BLOCK {
                        self.free_pointer_tree(root, depth)?;
                    }
                }
                self.free_inode(inode_num)
            }
            InodeKind::Directory => {
                for &block_id in inode.live_direct() {
                    let block = self.load_dir_block(block_id)?;
                    for entry in block.live() {
                        self.remove_tree(entry.inode_num)?;
                    }
                    self.free_block(block_id)?;
                }
                self.free_inode(inode_num)
            }
            InodeKind::Free => Ok(()),
        }
    }

    /// Depth-first listing of the whole tree.
    pub fn list(&self) -> Result<Vec<ListEntry>> {
        let mut out = Vec::new();
        self.list_dir(ROOT_INODE, 1, &mut out)?;
        Ok(out)
    }

    fn list_dir(&self, inode_num: i32, depth: usize, out: &mut Vec<ListEntry>) -> Result<()> {
        let inode = self.read_inode(inode_num)?;
        if !inode.is_directory() {
            return Ok(());
        }
        for &block_id in inode.live_direct() {
            let block = self.load_dir_block(block_id)?;
            for entry in block.live() {
                let child = self.read_inode(entry.inode_num)?;
                let is_dir = child.is_directory();
                out.push(ListEntry {
                    name: entry.name(),
                    depth,
                    is_dir,
                });
                if is_dir {
                    self.list_dir(entry.inode_num, depth + 1, out)?;
                }
            }
        }
        Ok(())
    }

    /// The debug report for a path: the root directory's live entries,
    /// then one node per resolved component. Resolution stops at the first
    /// missing component.
    pub fn debug_path(&self, fs_path: &str) -> Result<Vec<DebugNode>> {
        let parts = path::split(fs_path)?;
        let mut nodes = Vec::new();
        let mut current = self.read_inode(ROOT_INODE)?;
        nodes.push(self.directory_node("/", &current)?);
        for part in &parts {
            match self.find_entry(&current, part)? {
                None => {
                    nodes.push(DebugNode::Missing { name: part.clone() });
                    return Ok(nodes);
                }
                Some(next) => {
                    current = self.read_inode(next)?;
                    if current.is_directory() {
                        nodes.push(self.directory_node(part, &current)?);
                    } else if current.is_file() {
                        nodes.push(self.file_node(part, &current)?);
                    } else {
                        return Err(FsError::NotFound(part.clone()));
                    }
                }
            }
        }
        Ok(nodes)
    }

    fn directory_node(&self, name: &str, inode: &Inode) -> Result<DebugNode> {
        let mut entries = Vec::new();
        for &block_id in inode.live_direct() {
            let block = self.load_dir_block(block_id)?;
            for entry in block.live() {
                entries.push((entry.name(), entry.inode_num));
            }
        }
        Ok(DebugNode::Directory {
            name: name.to_string(),
            entries,
        })
    }

    fn file_node(&self, name: &str, inode: &Inode) -> Result<DebugNode> {
        let direct = LevelSummary {
            count: inode.num_direct as usize,
            first: inode.live_direct().first().copied(),
            last: inode.live_direct().last().copied(),
            via: None,
        };
        Ok(DebugNode::File {
            name: name.to_string(),
            size: inode.size,
            direct,
            indirect: self.summarize_tree(inode.indirect_block, 1)?,
            double_indirect: self.summarize_tree(inode.double_indirect_block, 2)?,
            triple_indirect: self.summarize_tree(inode.triple_indirect_block, 3)?,
        })
    }

    fn summarize_tree(&self, root: i32, depth: u8) -> Result<Option<LevelSummary>> {
        if root == NO_BLOCK {
            return Ok(None);
        }
        let mut summary = LevelSummary {
            via: Some(root),
            ..Default::default()
        };
        self.count_tree(root, depth, &mut summary)?;
        Ok(Some(summary))
    }

    fn count_tree(&self, block: i32, depth: u8, summary: &mut LevelSummary) -> Result<()> {
        let pointers = self.read_pointers(block)?;
        for id in pointers.slots.iter().copied().filter(|&id| id != 0) {
            if depth == 1 {
                if summary.first.is_none() {
                    summary.first = Some(id);
                }
                summary.last = Some(id);
                summary.count += 1;
            } else {
                self.count_tree(id, depth - 1, summary)?;
            }
        }
        Ok(())
    }
}
