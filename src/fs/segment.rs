//! Segment container files.
//!
//! A segment is a file of exactly [`SEGMENT_SIZE`] bytes in the filesystem's
//! host directory, named `inode_seg_<N>` or `data_seg_<N>`. The first block
//! is the segment's bitmap; the remainder holds fixed-stride records. New
//! segments are created zero-filled.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::info;

use super::bitmap::Bitmap;
use super::{BLOCK_SIZE, SEGMENT_SIZE};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Inode,
    Data,
}

impl SegmentKind {
    fn prefix(self) -> &'static str {
        match self {
            SegmentKind::Inode => "inode_seg_",
            SegmentKind::Data => "data_seg_",
        }
    }

    pub fn file_name(self, index: usize) -> String {
        format!("{}{}", self.prefix(), index)
    }
}

pub(crate) fn segment_path(base: &Path, kind: SegmentKind, index: usize) -> PathBuf {
    base.join(kind.file_name(index))
}

pub(crate) fn exists(base: &Path, kind: SegmentKind, index: usize) -> bool {
    segment_path(base, kind, index).exists()
}

/// Open an existing segment for reading only.
pub(crate) fn open_read(base: &Path, kind: SegmentKind, index: usize) -> io::Result<File> {
    File::open(segment_path(base, kind, index))
}

/// Open an existing segment for reading and writing.
pub(crate) fn open_rw(base: &Path, kind: SegmentKind, index: usize) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(segment_path(base, kind, index))
}

/// Create a segment file and fill it with zeros.
pub(crate) fn create(base: &Path, kind: SegmentKind, index: usize) -> Result<()> {
    info!("creating segment {}", kind.file_name(index));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(segment_path(base, kind, index))?;
    file.set_len(SEGMENT_SIZE as u64)?;
    let zeros = vec![0u8; SEGMENT_SIZE];
    file.write_all(&zeros)?;
    file.flush()?;
    Ok(())
}

/// Read the bitmap block at the head of an open segment.
pub(crate) fn read_bitmap(file: &mut File) -> Result<Bitmap> {
    let mut buf = [0u8; BLOCK_SIZE];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf)?;
    Ok(Bitmap::from_block(&buf))
}

/// Write the bitmap block back to the head of an open segment.
pub(crate) fn write_bitmap(file: &mut File, bitmap: &Bitmap) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bitmap.as_block())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_file_names() {
        assert_eq!(SegmentKind::Inode.file_name(0), "inode_seg_0");
        assert_eq!(SegmentKind::Data.file_name(12), "data_seg_12");
    }

    #[test]
    fn test_create_produces_zero_filled_segment() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), SegmentKind::Data, 0).unwrap();

        let metadata = std::fs::metadata(segment_path(dir.path(), SegmentKind::Data, 0)).unwrap();
        assert_eq!(metadata.len(), SEGMENT_SIZE as u64);

        let mut file = open_read(dir.path(), SegmentKind::Data, 0).unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).unwrap();
        assert!(contents.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_create_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), SegmentKind::Inode, 3).unwrap();
        assert!(create(dir.path(), SegmentKind::Inode, 3).is_err());
    }

    #[test]
    fn test_bitmap_round_trip_through_segment() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), SegmentKind::Data, 0).unwrap();

        let mut file = open_rw(dir.path(), SegmentKind::Data, 0).unwrap();
        let mut bitmap = read_bitmap(&mut file).unwrap();
        assert_eq!(bitmap.count_set(), 0);

        bitmap.set(0);
        bitmap.set(7);
        write_bitmap(&mut file, &bitmap).unwrap();
        drop(file);

        let mut file = open_read(dir.path(), SegmentKind::Data, 0).unwrap();
        let reloaded = read_bitmap(&mut file).unwrap();
        assert!(reloaded.is_set(0));
        assert!(reloaded.is_set(7));
        assert_eq!(reloaded.count_set(), 2);
    }
}
