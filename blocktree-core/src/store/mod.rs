//! Low-level storage primitives: varints, positioned readers, counting
//! writers and codec headers/footers.

mod codec;
mod cursor;
mod vint;
mod writer;

pub use codec::{
    CODEC_MAGIC, FOOTER_LENGTH, FOOTER_MAGIC, check_footer, check_header, checksum_entire_file,
    header_length, retrieve_checksum, write_footer, write_header,
};
pub use cursor::ByteCursor;
pub use vint::{common_prefix_len, read_vint, vint_len, write_vint};
pub use writer::CountingWriter;
