use std::fs::File;
use std::path::Path;
use memmap2::{Mmap, MmapOptions};
use crate::core::error::Result;

/// Read-only memory map of a published file for zero-copy reads.
/// Zero-length files cannot be mapped and read back as an empty slice.
pub struct MmapFile {
    mmap: Option<Mmap>,
    pub len: usize,
}

impl MmapFile {
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(MmapFile { mmap: None, len });
        }

        // Files are append-only or published once, so mapped bytes never change
        let mmap = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(MmapFile { mmap: Some(mmap), len })
    }

    /// Maps `path` if it exists, empty otherwise
    pub fn open_or_empty<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open_read_only(path)
        } else {
            Ok(MmapFile { mmap: None, len: 0 })
        }
    }

    pub fn data(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => &mmap[..],
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_map_contents_and_empty_file() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("full");
        let empty = dir.path().join("empty");
        std::fs::write(&full, b"abc").unwrap();
        std::fs::write(&empty, b"").unwrap();

        assert_eq!(MmapFile::open_read_only(&full).unwrap().data(), b"abc");
        assert!(MmapFile::open_read_only(&empty).unwrap().data().is_empty());
        assert!(MmapFile::open_or_empty(dir.path().join("missing")).unwrap().data().is_empty());
        assert!(MmapFile::open_read_only(dir.path().join("missing")).is_err());
    }
}
