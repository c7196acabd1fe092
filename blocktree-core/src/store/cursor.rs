use byteorder::{ByteOrder, LittleEndian};

use crate::directories::OwnedBytes;
use crate::error::{Error, Result};

/// Positioned reader over an [`OwnedBytes`] handle.
///
/// Every cursor owns its position; clones share the underlying buffer.
#[derive(Clone, Debug, Default)]
pub struct ByteCursor {
    data: OwnedBytes,
    pos: usize,
}

impl ByteCursor {
    pub fn new(data: OwnedBytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Replace the underlying bytes and rewind to 0.
    pub fn reset(&mut self, data: OwnedBytes) {
        self.data = data;
        self.pos = 0;
    }

    pub fn bytes(&self) -> &OwnedBytes {
        &self.data
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.data.len() as u64 {
            return Err(Error::Corruption(format!(
                "seek to {} past end of {} byte input",
                pos,
                self.data.len()
            )));
        }
        self.pos = pos as usize;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::Corruption(format!(
                "read past EOF: need {} bytes at {}, have {}",
                n,
                self.pos,
                self.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let v = LittleEndian::read_u32(self.read_slice(4)?);
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let v = LittleEndian::read_u64(self.read_slice(8)?);
        Ok(v)
    }

    pub fn read_vint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::Corruption("varint too long".into()));
            }
        }
    }

    /// Read a varint that must fit in 32 bits (counts, lengths, codes).
    pub fn read_vint_u32(&mut self) -> Result<u32> {
        let v = self.read_vint()?;
        u32::try_from(v).map_err(|_| Error::Corruption(format!("vint {} overflows u32", v)))
    }

    /// Borrow the next `n` bytes.
    pub fn read_slice(&mut self, n: usize) -> Result<&[u8]> {
        self.ensure(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data.as_slice()[start..start + n])
    }

    /// Zero-copy handle on the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<OwnedBytes> {
        self.ensure(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(self.data.slice(start..start + n))
    }

    /// Length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint_u32()? as usize;
        let bytes = self.read_slice(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Corruption(format!("invalid utf-8 string: {}", e)))
    }
}
