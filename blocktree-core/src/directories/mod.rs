//! Byte sources the dictionary reads from

mod owned_bytes;

pub use owned_bytes::OwnedBytes;
