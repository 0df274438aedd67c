//! Class file prologue decoding.
//!
//! Only the first eight bytes are ever read: the `0xCAFEBABE` magic, then the
//! minor version, then the major version, all big-endian.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::version::ClassFileVersion;

pub const CLASS_FILE_MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("invalid class file magic {magic:#010x}")]
    InvalidFormat { magic: u32 },

    #[error("failed to read class file header: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads the class file version from the start of `reader`.
///
/// With `verify` off a wrong magic number is tolerated and the version fields
/// are still decoded. Truncated input surfaces as [`HeaderError::Io`].
/// Exactly eight bytes are consumed on success; the reader is left open.
pub fn read_class_file_version<R: Read>(
    reader: &mut R,
    verify: bool,
) -> Result<ClassFileVersion, HeaderError> {
    let magic = read_u32(reader)?;
    if verify && magic != CLASS_FILE_MAGIC {
        return Err(HeaderError::InvalidFormat { magic });
    }

    // minor precedes major on disk
    let minor = read_u16(reader)?;
    let major = read_u16(reader)?;

    Ok(ClassFileVersion::new(major, minor))
}

/// Reads the version of a standalone `.class` file.
pub fn class_file_version(
    path: &Path,
    verify: bool,
    buffered: bool,
) -> Result<ClassFileVersion, HeaderError> {
    let file = File::open(path)?;
    if buffered {
        read_class_file_version(&mut BufReader::new(file), verify)
    } else {
        read_class_file_version(&mut &file, verify)
    }
}

fn read_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u16<R: Read>(reader: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}
