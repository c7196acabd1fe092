use std::io::{self, Write};

/// Write sink that tracks the current file pointer and a running CRC32 of
/// everything written through it.
pub struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
    hasher: crc32fast::Hasher,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            written: 0,
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Bytes written so far, i.e. the file pointer of the next byte.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// CRC32 of all bytes written so far.
    pub fn checksum(&self) -> u64 {
        self.hasher.clone().finalize() as u64
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_and_checksum() {
        let mut out = CountingWriter::new(Vec::new());
        out.write_all(b"block").unwrap();
        out.write_all(b"tree").unwrap();
        assert_eq!(out.position(), 9);
        assert_eq!(out.checksum(), crc32fast::hash(b"blocktree") as u64);
        assert_eq!(out.into_inner(), b"blocktree".to_vec());
    }
}
