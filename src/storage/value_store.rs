use std::io::Write;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DataType, FieldValue};

/// offset i64 | length i32 | data type u8
pub const VALUE_INDEX_RECORD_SIZE: usize = 8 + 4 + 1;

/// Location of one blob in a value or key store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueEntry {
    pub offset: i64,
    pub len: i32,
    pub data_type: DataType,
}

impl ValueEntry {
    pub fn to_bytes(&self) -> [u8; VALUE_INDEX_RECORD_SIZE] {
        let mut buf = [0u8; VALUE_INDEX_RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        buf[12] = self.data_type.as_byte();
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < VALUE_INDEX_RECORD_SIZE {
            return Err(Error::malformed(format!("value index record of {} bytes", buf.len())));
        }
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&buf[0..8]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[8..12]);

        Ok(ValueEntry {
            offset: i64::from_le_bytes(offset),
            len: i32::from_le_bytes(len),
            data_type: DataType::from_byte(buf[12])?,
        })
    }
}

/// Append-only blob store for field values and field names
pub struct ValueWriter<W: Write> {
    pub writer: W,
    pub position: u64,
}

impl<W: Write> ValueWriter<W> {
    pub fn new(writer: W, position: u64) -> Self {
        ValueWriter { writer, position }
    }

    pub fn append(&mut self, value: &FieldValue) -> Result<ValueEntry> {
        let bytes = value.to_bytes();
        let len = i32::try_from(bytes.len())
            .map_err(|_| Error::new(ErrorKind::InvalidArgument, format!("value of {} bytes is too large", bytes.len())))?;

        let offset = self.position as i64;
        self.writer.write_all(&bytes)?;
        self.position += bytes.len() as u64;

        Ok(ValueEntry {
            offset,
            len,
            data_type: value.data_type(),
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Fixed-width index over a value store; the record number is the value id
pub struct ValueIndexWriter<W: Write> {
    pub writer: W,
    pub count: u64,
}

impl<W: Write> ValueIndexWriter<W> {
    /// `existing_len` is the current byte length of the index file
    pub fn new(writer: W, existing_len: u64) -> Result<Self> {
        if existing_len % VALUE_INDEX_RECORD_SIZE as u64 != 0 {
            return Err(Error::malformed(format!(
                "value index of {} bytes is not a whole number of records",
                existing_len
            )));
        }
        Ok(ValueIndexWriter {
            writer,
            count: existing_len / VALUE_INDEX_RECORD_SIZE as u64,
        })
    }

    pub fn append(&mut self, entry: &ValueEntry) -> Result<u64> {
        self.writer.write_all(&entry.to_bytes())?;
        let id = self.count;
        self.count += 1;
        Ok(id)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Random access over a value index held in memory or mapped
pub struct ValueIndexReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ValueIndexReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ValueIndexReader { bytes }
    }

    pub fn len(&self) -> u64 {
        (self.bytes.len() / VALUE_INDEX_RECORD_SIZE) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u64) -> Result<ValueEntry> {
        let start = id as usize * VALUE_INDEX_RECORD_SIZE;
        let record = self
            .bytes
            .get(start..start + VALUE_INDEX_RECORD_SIZE)
            .ok_or_else(|| Error::malformed(format!("value id {} beyond index of {} records", id, self.len())))?;
        ValueEntry::from_bytes(record)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<ValueEntry>> + 'a {
        self.bytes.chunks_exact(VALUE_INDEX_RECORD_SIZE).map(ValueEntry::from_bytes)
    }
}

/// Raw bytes of the blob an index entry points at
pub fn read_bytes<'a>(stream: &'a [u8], entry: &ValueEntry) -> Result<&'a [u8]> {
    if entry.offset < 0 || entry.len < 0 {
        return Err(Error::missing_offset(format!("value at {} with length {}", entry.offset, entry.len)));
    }
    let start = entry.offset as usize;
    stream
        .get(start..start + entry.len as usize)
        .ok_or_else(|| Error::malformed(format!("value at {} beyond store of {} bytes", start, stream.len())))
}

/// Decodes the value an index entry points at
pub fn read_value(stream: &[u8], entry: &ValueEntry) -> Result<FieldValue> {
    FieldValue::from_bytes(entry.data_type, read_bytes(stream, entry)?)
}
