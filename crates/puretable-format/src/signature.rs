//! Container and block signatures (magic bytes).

use crate::error::FormatError;

/// The 8-byte container magic signature, shaped like the HDF5 one so that
/// text-mode transfers and truncation are detectable.
pub const CONTAINER_SIGNATURE: [u8; 8] = [0x89, b'P', b'T', b'B', b'\r', b'\n', 0x1A, b'\n'];

/// Signature of a table directory block.
pub const DIRECTORY_SIGNATURE: [u8; 4] = *b"PTDR";

/// Signature of a table header inside a directory.
pub const TABLE_HEADER_SIGNATURE: [u8; 4] = *b"PTHD";

/// Check that `data` starts with the container signature.
pub fn check_signature(data: &[u8]) -> Result<(), FormatError> {
    if data.len() >= 8 && data[..8] == CONTAINER_SIGNATURE {
        Ok(())
    } else {
        Err(FormatError::SignatureNotFound)
    }
}
