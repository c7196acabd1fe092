//! Shared, immutable byte buffers
//!
//! `OwnedBytes` is the file handle every reader in this crate works on. Cloning
//! is cheap (one `Arc` bump) and slices share the same backing storage, so each
//! cursor can take its own handle with an independent position.

use std::fmt;
use std::io;
use std::ops::{Deref, Range};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

#[derive(Clone)]
enum Backing {
    Heap(Arc<Vec<u8>>),
    Mapped(Arc<Mmap>),
}

#[derive(Clone)]
pub struct OwnedBytes {
    data: Backing,
    range: Range<usize>,
}

impl OwnedBytes {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: Backing::Heap(Arc::new(data)),
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Memory-map a file read-only.
    pub fn open_mmap(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        // SAFETY: segment files are write-once; nothing truncates them while mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        let len = mmap.len();
        Ok(Self {
            data: Backing::Mapped(Arc::new(mmap)),
            range: 0..len,
        })
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Sub-slice relative to this handle. Panics if `range` is out of bounds,
    /// like slice indexing.
    pub fn slice(&self, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "slice {:?} out of bounds for {} bytes",
            range,
            self.len()
        );
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        Self {
            data: self.data.clone(),
            range: start..end,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            Backing::Heap(v) => &v[self.range.clone()],
            Backing::Mapped(m) => &m[self.range.clone()],
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// True when the bytes live in a memory mapping rather than on the heap.
    pub fn is_mapped(&self) -> bool {
        matches!(self.data, Backing::Mapped(_))
    }
}

impl Default for OwnedBytes {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<u8>> for OwnedBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for OwnedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for OwnedBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl PartialEq for OwnedBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for OwnedBytes {}

impl fmt::Debug for OwnedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBytes")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_slice_shares_backing() {
        let bytes = OwnedBytes::new(b"hello world".to_vec());
        let world = bytes.slice(6..11);
        assert_eq!(world.as_slice(), b"world");
        let orl = world.slice(1..4);
        assert_eq!(orl.as_slice(), b"orl");
        assert_eq!(orl.len(), 3);
        assert!(!orl.is_mapped());
    }

    #[test]
    fn test_mmap_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"mapped bytes").unwrap();
        drop(file);

        let bytes = OwnedBytes::open_mmap(&path).unwrap();
        assert!(bytes.is_mapped());
        assert_eq!(bytes.as_slice(), b"mapped bytes");
        assert_eq!(bytes.slice(7..12).as_slice(), b"bytes");
    }
}
