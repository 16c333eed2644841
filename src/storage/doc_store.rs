use std::io::Write;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, KeyId, ValueId};

/// offset i64 | length i32
pub const DOC_INDEX_RECORD_SIZE: usize = 8 + 4;

/// key id u32 | value id u64
pub const DOC_MAP_ENTRY_SIZE: usize = 4 + 8;

/// Where a document's key/value map lives in the doc store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocAddress {
    pub offset: i64,
    pub len: i32,
}

impl DocAddress {
    pub fn to_bytes(&self) -> [u8; DOC_INDEX_RECORD_SIZE] {
        let mut buf = [0u8; DOC_INDEX_RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < DOC_INDEX_RECORD_SIZE {
            return Err(Error::malformed(format!("doc index record of {} bytes", buf.len())));
        }
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&buf[0..8]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[8..12]);

        Ok(DocAddress {
            offset: i64::from_le_bytes(offset),
            len: i32::from_le_bytes(len),
        })
    }
}

pub fn encode_doc_map(map: &[(KeyId, ValueId)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(map.len() * DOC_MAP_ENTRY_SIZE);
    for (key, value) in map {
        buf.extend_from_slice(&key.0.to_le_bytes());
        buf.extend_from_slice(&value.0.to_le_bytes());
    }
    buf
}

pub fn decode_doc_map(bytes: &[u8]) -> Result<Vec<(KeyId, ValueId)>> {
    if bytes.len() % DOC_MAP_ENTRY_SIZE != 0 {
        return Err(Error::malformed(format!("document map of {} bytes", bytes.len())));
    }

    Ok(bytes
        .chunks_exact(DOC_MAP_ENTRY_SIZE)
        .map(|chunk| {
            let mut key = [0u8; 4];
            key.copy_from_slice(&chunk[0..4]);
            let mut value = [0u8; 8];
            value.copy_from_slice(&chunk[4..12]);
            (KeyId(u32::from_le_bytes(key)), ValueId(u64::from_le_bytes(value)))
        })
        .collect())
}

/// Append-only store of per-document key/value maps
pub struct DocWriter<W: Write> {
    pub writer: W,
    pub position: u64,
}

impl<W: Write> DocWriter<W> {
    pub fn new(writer: W, position: u64) -> Self {
        DocWriter { writer, position }
    }

    pub fn append(&mut self, map: &[(KeyId, ValueId)]) -> Result<DocAddress> {
        let bytes = encode_doc_map(map);
        let len = i32::try_from(bytes.len()).map_err(|_| {
            Error::new(ErrorKind::InvalidArgument, format!("document with {} fields is too large", map.len()))
        })?;

        let offset = self.position as i64;
        self.writer.write_all(&bytes)?;
        self.position += bytes.len() as u64;
        Ok(DocAddress { offset, len })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Fixed-width doc index; record `n` describes document `n`
pub struct DocIndexWriter<W: Write> {
    pub writer: W,
    count: u64,
}

impl<W: Write> DocIndexWriter<W> {
    /// `existing_len` is the current byte length of the index file
    pub fn new(writer: W, existing_len: u64) -> Result<Self> {
        if existing_len % DOC_INDEX_RECORD_SIZE as u64 != 0 {
            return Err(Error::malformed(format!(
                "doc index of {} bytes is not a whole number of records",
                existing_len
            )));
        }
        Ok(DocIndexWriter {
            writer,
            count: existing_len / DOC_INDEX_RECORD_SIZE as u64,
        })
    }

    pub fn next_doc_id(&self) -> DocId {
        DocId(self.count)
    }

    pub fn append(&mut self, address: &DocAddress) -> Result<DocId> {
        self.writer.write_all(&address.to_bytes())?;
        let id = DocId(self.count);
        self.count += 1;
        Ok(id)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Random access over doc index records, in a `.dix` file or in the address
/// section of a compound file
pub struct DocIndexReader<'a> {
    bytes: &'a [u8],
}

impl<'a> DocIndexReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        DocIndexReader { bytes }
    }

    pub fn len(&self) -> u64 {
        (self.bytes.len() / DOC_INDEX_RECORD_SIZE) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: DocId) -> Result<DocAddress> {
        let start = id.0 as usize * DOC_INDEX_RECORD_SIZE;
        match self.bytes.get(start..start + DOC_INDEX_RECORD_SIZE) {
            Some(record) => DocAddress::from_bytes(record),
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("document {} not in index of {} records", id.0, self.len()),
            )),
        }
    }
}

/// Slices a document's map bytes out of the doc store
pub fn read_doc_bytes<'a>(stream: &'a [u8], address: &DocAddress) -> Result<&'a [u8]> {
    if address.offset < 0 || address.len < 0 {
        return Err(Error::missing_offset(format!("document at {}", address.offset)));
    }
    let start = address.offset as usize;
    stream
        .get(start..start + address.len as usize)
        .ok_or_else(|| Error::malformed(format!("document at {} beyond store of {} bytes", start, stream.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_ids_are_record_numbers() {
        let mut docs = DocWriter::new(Vec::new(), 0);
        let mut index = DocIndexWriter::new(Vec::new(), 0).unwrap();

        for k in 0..5u64 {
            assert_eq!(index.next_doc_id(), DocId(k));
            let map = vec![(KeyId(0), ValueId(k)); k as usize];
            let address = docs.append(&map).unwrap();
            assert_eq!(index.append(&address).unwrap(), DocId(k));
            assert_eq!(index.writer.len(), (k as usize + 1) * 12);
        }
    }

    #[test]
    fn test_record_size_is_fixed() {
        let mut index = DocIndexWriter::new(Vec::new(), 0).unwrap();
        index.append(&DocAddress { offset: 0, len: 0 }).unwrap();
        index.append(&DocAddress { offset: i64::MAX, len: i32::MAX }).unwrap();
        assert_eq!(index.writer.len(), 2 * DOC_INDEX_RECORD_SIZE);
    }

    #[test]
    fn test_reopen_continues_numbering() {
        let index = DocIndexWriter::new(Vec::new(), 36).unwrap();
        assert_eq!(index.next_doc_id(), DocId(3));
        assert!(DocIndexWriter::new(Vec::new(), 13).is_err());
    }

    #[test]
    fn test_read_back_map() {
        let mut docs = DocWriter::new(Vec::new(), 0);
        let mut index = DocIndexWriter::new(Vec::new(), 0).unwrap();
        let first = vec![(KeyId(0), ValueId(0)), (KeyId(1), ValueId(1))];
        let second = vec![(KeyId(1), ValueId(2))];

        let a = docs.append(&first).unwrap();
        index.append(&a).unwrap();
        let b = docs.append(&second).unwrap();
        index.append(&b).unwrap();

        let reader = DocIndexReader::new(&index.writer);
        let address = reader.get(DocId(1)).unwrap();
        let bytes = read_doc_bytes(&docs.writer, &address).unwrap();
        assert_eq!(decode_doc_map(bytes).unwrap(), second);

        assert_eq!(reader.get(DocId(2)).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(decode_doc_map(&bytes[..5]).unwrap_err().kind(), ErrorKind::MalformedSegment);
    }
}
