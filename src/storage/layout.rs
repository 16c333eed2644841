use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use crate::core::error::Result;
use crate::core::types::KeyId;

/// File names of one collection, all inside `<data_dir>/<collection id>/`
#[derive(Debug, Clone)]
pub struct CollectionLayout {
    pub collection_id: u64,
    pub base_dir: PathBuf,
}

impl CollectionLayout {
    pub fn new(data_dir: &Path, collection_id: u64) -> Result<Self> {
        let base_dir = data_dir.join(collection_id.to_string());
        fs::create_dir_all(&base_dir)?;

        Ok(CollectionLayout {
            collection_id,
            base_dir,
        })
    }

    fn collection_file(&self, extension: &str) -> PathBuf {
        self.base_dir.join(format!("{}.{}", self.collection_id, extension))
    }

    pub fn keys_path(&self) -> PathBuf {
        self.collection_file("key")
    }

    pub fn key_index_path(&self) -> PathBuf {
        self.collection_file("kix")
    }

    pub fn values_path(&self) -> PathBuf {
        self.collection_file("val")
    }

    pub fn value_index_path(&self) -> PathBuf {
        self.collection_file("vix")
    }

    pub fn docs_path(&self) -> PathBuf {
        self.collection_file("docs")
    }

    pub fn doc_index_path(&self) -> PathBuf {
        self.collection_file("dix")
    }

    pub fn postings_path(&self) -> PathBuf {
        self.collection_file("pos")
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.collection_file("vec")
    }

    /// Latest serialized tree of one key, rewritten on every flush of that key
    pub fn column_path(&self, key_id: KeyId) -> PathBuf {
        self.base_dir.join(format!("{}.{}.ix", self.collection_id, key_id.0))
    }

    pub fn segment_info_path(&self, version: u64) -> PathBuf {
        self.base_dir.join(format!("{}.ix", version))
    }

    pub fn compound_path(&self, version: u64) -> PathBuf {
        self.base_dir.join(format!("{}.rdb", version))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    /// Published versions in ascending order. Only a descriptor makes a
    /// version visible; a compound file without one is an unfinished publish.
    pub fn versions(&self) -> Result<Vec<u64>> {
        let mut versions = self.numbered_files("ix")?;
        versions.sort_unstable();
        Ok(versions)
    }

    /// Never reuses a number, including those of unfinished publishes
    pub fn next_version(&self) -> Result<u64> {
        let highest = self
            .numbered_files("ix")?
            .into_iter()
            .chain(self.numbered_files("rdb")?)
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    fn numbered_files(&self, extension: &str) -> Result<Vec<u64>> {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            // Column files are `<collection>.<key>.ix` and never parse as a number
            if let Some(number) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                numbers.push(number);
            }
        }
        Ok(numbers)
    }
}

/// Replaces `path` with `bytes` so a reader sees either the old or the new
/// contents, never a mix
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_dir(path.parent().unwrap_or_else(|| Path::new(".")))
}

/// Cuts a fixed-width index back to its last whole record. A torn trailing
/// record is the remains of an append that never completed. Returns the
/// resulting length; a missing file has length 0.
pub fn truncate_to_records(path: &Path, record_size: usize) -> Result<u64> {
    let file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let len = file.metadata()?.len();
    let torn = len % record_size as u64;
    if torn == 0 {
        return Ok(len);
    }

    warn!(
        path = %path.display(),
        len,
        dropped = torn,
        "truncating torn record from index"
    );
    file.set_len(len - torn)?;
    file.sync_all()?;
    Ok(len - torn)
}

#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let dir = TempDir::new().unwrap();
        let layout = CollectionLayout::new(dir.path(), 42).unwrap();

        assert!(layout.base_dir.is_dir());
        assert_eq!(layout.doc_index_path().file_name().unwrap(), "42.dix");
        assert_eq!(layout.column_path(KeyId(3)).file_name().unwrap(), "42.3.ix");
        assert_eq!(layout.segment_info_path(7).file_name().unwrap(), "7.ix");
        assert_eq!(layout.compound_path(7).file_name().unwrap(), "7.rdb");
    }

    #[test]
    fn test_versions_ignore_column_files() {
        let dir = TempDir::new().unwrap();
        let layout = CollectionLayout::new(dir.path(), 42).unwrap();
        assert_eq!(layout.next_version().unwrap(), 1);

        fs::write(layout.column_path(KeyId(0)), b"").unwrap();
        fs::write(layout.segment_info_path(2), b"").unwrap();
        fs::write(layout.segment_info_path(1), b"").unwrap();
        fs::write(layout.compound_path(5), b"").unwrap();

        assert_eq!(layout.versions().unwrap(), vec![1, 2]);
        assert_eq!(layout.next_version().unwrap(), 6);
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.ix");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_truncate_to_records_drops_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index");

        assert_eq!(truncate_to_records(&path, 12).unwrap(), 0);
        assert!(!path.exists());

        fs::write(&path, [7u8; 24]).unwrap();
        assert_eq!(truncate_to_records(&path, 12).unwrap(), 24);

        fs::write(&path, [7u8; 29]).unwrap();
        assert_eq!(truncate_to_records(&path, 12).unwrap(), 24);
        assert_eq!(fs::read(&path).unwrap(), vec![7u8; 24]);
    }
}
