//! Codec headers and checksummed footers.
//!
//! Header: magic u32 | codec name (vint length + bytes) | version u32.
//! Footer: inverted magic u32 | algorithm id u32 | CRC32 as u64. The checksum
//! covers every byte of the file before the checksum field itself.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::cursor::ByteCursor;
use super::vint::{vint_len, write_vint};
use super::writer::CountingWriter;
use crate::directories::OwnedBytes;
use crate::error::{Error, Result};

pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;
pub const FOOTER_LENGTH: usize = 16;

const CHECKSUM_ALGORITHM: u32 = 0;

pub fn write_header<W: Write + ?Sized>(out: &mut W, codec: &str, version: u32) -> Result<()> {
    if codec.is_empty() || codec.len() >= 128 || !codec.is_ascii() {
        return Err(Error::InvalidArgument(format!(
            "codec name must be 1..128 ascii bytes: {:?}",
            codec
        )));
    }
    out.write_u32::<LittleEndian>(CODEC_MAGIC)?;
    write_vint(out, codec.len() as u64)?;
    out.write_all(codec.as_bytes())?;
    out.write_u32::<LittleEndian>(version)?;
    Ok(())
}

/// Encoded header size for `codec`.
pub fn header_length(codec: &str) -> usize {
    4 + vint_len(codec.len() as u64) + codec.len() + 4
}

/// Validate the header at the cursor position and return its version.
pub fn check_header(input: &mut ByteCursor, codec: &str, min: u32, max: u32) -> Result<u32> {
    let magic = input.read_u32()?;
    if magic != CODEC_MAGIC {
        return Err(Error::Corruption(format!(
            "codec header mismatch: expected {:#x}, got {:#x}",
            CODEC_MAGIC, magic
        )));
    }
    let actual = input.read_string()?;
    if actual != codec {
        return Err(Error::Corruption(format!(
            "codec mismatch: expected {:?}, got {:?}",
            codec, actual
        )));
    }
    let version = input.read_u32()?;
    if version < min || version > max {
        return Err(Error::VersionMismatch {
            codec: codec.to_string(),
            version,
            min,
            max,
        });
    }
    Ok(version)
}

pub fn write_footer<W: Write>(out: &mut CountingWriter<W>) -> Result<()> {
    out.write_u32::<LittleEndian>(FOOTER_MAGIC)?;
    out.write_u32::<LittleEndian>(CHECKSUM_ALGORITHM)?;
    let checksum = out.checksum();
    out.write_u64::<LittleEndian>(checksum)?;
    Ok(())
}

/// Validate footer structure and return the stored checksum without hashing
/// the file.
pub fn check_footer(input: &mut ByteCursor) -> Result<u64> {
    if input.len() < FOOTER_LENGTH {
        return Err(Error::Corruption(format!(
            "file too short for footer: {} bytes",
            input.len()
        )));
    }
    input.seek((input.len() - FOOTER_LENGTH) as u64)?;
    let magic = input.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(Error::Corruption(format!(
            "codec footer mismatch: expected {:#x}, got {:#x}",
            FOOTER_MAGIC, magic
        )));
    }
    let algorithm = input.read_u32()?;
    if algorithm != CHECKSUM_ALGORITHM {
        return Err(Error::Corruption(format!(
            "unknown checksum algorithm {}",
            algorithm
        )));
    }
    let checksum = input.read_u64()?;
    if checksum >> 32 != 0 {
        return Err(Error::Corruption(format!(
            "illegal checksum value {:#x}",
            checksum
        )));
    }
    Ok(checksum)
}

/// Fast path: footer checksum value only.
pub fn retrieve_checksum(bytes: &OwnedBytes) -> Result<u64> {
    let mut input = ByteCursor::new(bytes.clone());
    check_footer(&mut input)
}

/// Hash the whole file and compare against the footer.
pub fn checksum_entire_file(bytes: &OwnedBytes) -> Result<u64> {
    let mut input = ByteCursor::new(bytes.clone());
    let expected = check_footer(&mut input)?;
    let actual = crc32fast::hash(&bytes[..bytes.len() - 8]) as u64;
    if actual != expected {
        return Err(Error::Corruption(format!(
            "checksum failed: expected {:#x}, actual {:#x}",
            expected, actual
        )));
    }
    Ok(actual)
}
