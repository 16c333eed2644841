use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use crate::core::error::{Error, Result};

/// Page header: offset of the next page (-1 for none) and the id count
pub const PAGE_HEADER_SIZE: usize = 8 + 4;
const NO_PAGE: i64 = -1;

/// Page-addressed store of document id lists.
///
/// A list is a chain of pages `[next: i64][count: i32][ids: u64 * count]`.
/// The offset of its first page is the list's address and never changes;
/// extending a list writes a new page and then links it from the old tail,
/// so a reader never follows a pointer to bytes that are not yet written.
pub struct PostingsWriter<S: Read + Write + Seek> {
    pub stream: S,
    pub position: u64,
}

impl PostingsWriter<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let position = file.metadata()?.len();
        Ok(PostingsWriter { stream: file, position })
    }

    pub fn sync(&mut self) -> Result<()> {
        self.stream.flush()?;
        self.stream.sync_data()?;
        Ok(())
    }
}

impl<S: Read + Write + Seek> PostingsWriter<S> {
    pub fn new(mut stream: S) -> Result<Self> {
        let position = stream.seek(SeekFrom::End(0))?;
        Ok(PostingsWriter { stream, position })
    }

    /// Reserves an empty list, used for nodes that own no documents
    pub fn allocate_page(&mut self) -> Result<i64> {
        self.write_page(&[])
    }

    /// Persists a new id list and returns its address
    pub fn write(&mut self, ids: &[u64]) -> Result<i64> {
        self.write_page(ids)
    }

    /// Extends the list at `offset` with more ids
    pub fn append(&mut self, offset: i64, ids: &[u64]) -> Result<()> {
        if offset < 0 {
            return Err(Error::missing_offset(format!("postings offset {} is unset", offset)));
        }
        if ids.is_empty() {
            return Ok(());
        }

        let tail = self.tail_of(offset)?;
        let page = self.write_page(ids)?;

        self.stream.seek(SeekFrom::Start(tail as u64))?;
        self.stream.write_all(&page.to_le_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    fn write_page(&mut self, ids: &[u64]) -> Result<i64> {
        let offset = self.position as i64;
        let mut page = Vec::with_capacity(PAGE_HEADER_SIZE + ids.len() * 8);
        page.extend_from_slice(&NO_PAGE.to_le_bytes());
        page.extend_from_slice(&(ids.len() as i32).to_le_bytes());
        for id in ids {
            page.extend_from_slice(&id.to_le_bytes());
        }

        self.stream.seek(SeekFrom::Start(self.position))?;
        self.stream.write_all(&page)?;
        self.position += page.len() as u64;
        Ok(offset)
    }

    fn tail_of(&mut self, offset: i64) -> Result<i64> {
        let mut cursor = offset;
        let mut hops = 0u64;
        loop {
            if cursor as u64 + PAGE_HEADER_SIZE as u64 > self.position {
                return Err(Error::malformed(format!("postings page {} beyond end of store", cursor)));
            }
            self.stream.seek(SeekFrom::Start(cursor as u64))?;
            let mut next = [0u8; 8];
            self.stream.read_exact(&mut next)?;
            let next = i64::from_le_bytes(next);
            if next == NO_PAGE {
                return Ok(cursor);
            }

            hops += 1;
            if next <= cursor || hops > self.position / PAGE_HEADER_SIZE as u64 {
                return Err(Error::malformed(format!("postings chain at {} is cyclic", offset)));
            }
            cursor = next;
        }
    }
}

/// Reads the full id list at `offset` from a postings stream
pub fn read_postings(stream: &[u8], offset: i64) -> Result<Vec<u64>> {
    if offset < 0 {
        return Err(Error::missing_offset(format!("postings offset {} is unset", offset)));
    }

    let mut ids = Vec::new();
    let mut cursor = offset as usize;
    loop {
        let header = stream
            .get(cursor..cursor + PAGE_HEADER_SIZE)
            .ok_or_else(|| Error::malformed(format!("postings page {} is truncated", cursor)))?;
        let next = i64::from_le_bytes(header[..8].try_into().map_err(|_| Error::malformed("page header"))?);
        let count = i32::from_le_bytes(header[8..].try_into().map_err(|_| Error::malformed("page header"))?);
        if count < 0 {
            return Err(Error::malformed(format!("negative id count at page {}", cursor)));
        }

        let start = cursor + PAGE_HEADER_SIZE;
        let body = stream
            .get(start..start + count as usize * 8)
            .ok_or_else(|| Error::malformed(format!("postings page {} body is truncated", cursor)))?;
        ids.extend(body.chunks_exact(8).map(|chunk| {
            let mut id = [0u8; 8];
            id.copy_from_slice(chunk);
            u64::from_le_bytes(id)
        }));

        if next == NO_PAGE {
            return Ok(ids);
        }
        // Pages are only ever linked forward
        if next as usize <= cursor {
            return Err(Error::malformed(format!("postings chain at {} is cyclic", offset)));
        }
        cursor = next as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::core::error::ErrorKind;

    fn writer() -> PostingsWriter<Cursor<Vec<u8>>> {
        PostingsWriter::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn test_write_and_read() {
        let mut w = writer();
        let a = w.write(&[1, 2, 3]).unwrap();
        let b = w.write(&[9]).unwrap();

        let stream = w.stream.into_inner();
        assert_eq!(read_postings(&stream, a).unwrap(), vec![1, 2, 3]);
        assert_eq!(read_postings(&stream, b).unwrap(), vec![9]);
    }

    #[test]
    fn test_allocate_page_is_empty_list() {
        let mut w = writer();
        let root = w.allocate_page().unwrap();
        assert_eq!(root, 0);
        assert_eq!(w.position, PAGE_HEADER_SIZE as u64);
        assert!(read_postings(&w.stream.into_inner(), root).unwrap().is_empty());
    }

    #[test]
    fn test_append_keeps_address() {
        let mut w = writer();
        let a = w.write(&[1]).unwrap();
        let b = w.write(&[100]).unwrap();
        w.append(a, &[2, 3]).unwrap();
        w.append(a, &[4]).unwrap();
        w.append(b, &[]).unwrap();

        let stream = w.stream.into_inner();
        assert_eq!(read_postings(&stream, a).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(read_postings(&stream, b).unwrap(), vec![100]);
    }

    #[test]
    fn test_reopen_continues_at_end() {
        let mut w = writer();
        let a = w.write(&[5]).unwrap();
        let stream = w.stream;

        let mut w = PostingsWriter::new(stream).unwrap();
        w.append(a, &[6]).unwrap();
        assert_eq!(read_postings(&w.stream.into_inner(), a).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_truncated_page() {
        let mut w = writer();
        let a = w.write(&[1, 2]).unwrap();
        let mut stream = w.stream.into_inner();
        stream.truncate(stream.len() - 3);

        let err = read_postings(&stream, a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSegment);
    }

    #[test]
    fn test_unset_offset() {
        let mut w = writer();
        assert_eq!(w.append(-1, &[1]).unwrap_err().kind(), ErrorKind::MissingOffset);
        assert_eq!(read_postings(&[], -1).unwrap_err().kind(), ErrorKind::MissingOffset);
    }
}
