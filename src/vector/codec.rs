use std::io::Write;
use crate::core::error::{Error, Result};
use crate::vector::term_vector::TermVector;

/// One component on disk: 8-byte key followed by 4-byte count, little endian
pub const COMPONENT_SIZE: usize = 8 + 4;

/// Writes the components of `vector` in ascending key order, no count prefix.
/// Returns the number of bytes written.
pub fn write_vector<W: Write>(vector: &TermVector, writer: &mut W) -> Result<usize> {
    for (key, count) in vector.iter() {
        writer.write_all(&key.to_le_bytes())?;
        writer.write_all(&count.to_le_bytes())?;
    }
    Ok(vector.len() * COMPONENT_SIZE)
}

/// Decodes `count` components starting at `offset` in a vector stream
pub fn read_vector(stream: &[u8], offset: i64, count: i32) -> Result<TermVector> {
    if offset < 0 {
        return Err(Error::missing_offset(format!("vector offset {} is unset", offset)));
    }
    if count < 0 {
        return Err(Error::malformed(format!("negative component count {}", count)));
    }

    let start = offset as usize;
    let end = start
        .checked_add(count as usize * COMPONENT_SIZE)
        .ok_or_else(|| Error::malformed("vector range overflows"))?;
    let bytes = stream.get(start..end).ok_or_else(|| {
        Error::malformed(format!(
            "vector [{}..{}) beyond stream of {} bytes",
            start,
            end,
            stream.len()
        ))
    })?;

    let mut vector = TermVector::new();
    for chunk in bytes.chunks_exact(COMPONENT_SIZE) {
        let mut key = [0u8; 8];
        key.copy_from_slice(&chunk[..8]);
        let mut value = [0u8; 4];
        value.copy_from_slice(&chunk[8..]);
        vector.insert(i64::from_le_bytes(key), i32::from_le_bytes(value));
    }

    Ok(vector)
}

/// Append-only vector payload stream; hands out the offset of each vector
pub struct VectorWriter<W: Write> {
    pub writer: W,
    pub position: u64,
}

impl<W: Write> VectorWriter<W> {
    /// `position` is the current length of the underlying stream
    pub fn new(writer: W, position: u64) -> Self {
        VectorWriter { writer, position }
    }

    pub fn append(&mut self, vector: &TermVector) -> Result<i64> {
        let offset = self.position as i64;
        let written = write_vector(vector, &mut self.writer)?;
        self.position += written as u64;
        Ok(offset)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_layout_is_key_then_count() {
        let vec = TermVector::from_components([(2, 7), (1, 3)]);
        let mut buf = Vec::new();
        let written = write_vector(&vec, &mut buf).unwrap();

        assert_eq!(written, 24);
        assert_eq!(&buf[0..8], &1i64.to_le_bytes());
        assert_eq!(&buf[8..12], &3i32.to_le_bytes());
        assert_eq!(&buf[12..20], &2i64.to_le_bytes());
        assert_eq!(&buf[20..24], &7i32.to_le_bytes());
    }

    #[test]
    fn test_writer_offsets_and_read_back() {
        let mut writer = VectorWriter::new(Vec::new(), 0);
        let cat = TermVector::from_text("cat");
        let horse = TermVector::from_text("horse");

        let a = writer.append(&cat).unwrap();
        let b = writer.append(&horse).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, (3 * COMPONENT_SIZE) as i64);

        let stream = writer.writer;
        assert_eq!(read_vector(&stream, a, 3).unwrap(), cat);
        assert_eq!(read_vector(&stream, b, 5).unwrap(), horse);
    }

    #[test]
    fn test_empty_vector_takes_no_space() {
        let mut writer = VectorWriter::new(Vec::new(), 40);
        let offset = writer.append(&TermVector::new()).unwrap();
        assert_eq!(offset, 40);
        assert_eq!(writer.position, 40);
    }

    #[test]
    fn test_truncated_vector() {
        let mut buf = Vec::new();
        write_vector(&TermVector::from_text("dog"), &mut buf).unwrap();
        buf.truncate(20);

        let err = read_vector(&buf, 0, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSegment);
    }

    #[test]
    fn test_unset_offset() {
        let err = read_vector(&[], -1, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingOffset);
    }
}
