//! # Store File Headers
//!
//! Every store file begins with a 128-byte zerocopy header: magic bytes,
//! format version, the file's role, and the layout parameters it was
//! created with. `start()` validates all of it - opening a store with
//! mismatched bucket counts or record sizes would silently misread every
//! offset, so a mismatch is fatal.
//!
//! Layout:
//!
//! ```text
//! Offset  Size  Description
//! 0       16    Magic: "chainvault v1" + NULs
//! 16      4     Format version
//! 20      4     File kind (0=lookup, 1=rows, 2=index)
//! 24      8     Bucket count (lookup files, else 0)
//! 32      4     Row value size (fixed-record files, else 0)
//! 36      92    Reserved
//! ```

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::memory::MappedFile;

pub const FILE_HEADER_SIZE: usize = 128;
pub const STORE_MAGIC: &[u8; 16] = b"chainvault v1\x00\x00\x00";
pub const CURRENT_VERSION: u32 = 1;

/// The role a file plays within its table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileKind {
    /// Hash-table lookup file: buckets plus slab or record payload.
    Lookup = 0,
    /// Multimap rows file: linked fixed rows only.
    Rows = 1,
    /// Dense height index file.
    Index = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct StoreFileHeader {
    magic: [u8; 16],
    version: U32,
    kind: U32,
    buckets: U64,
    value_size: U32,
    reserved: [u8; 92],
}

const _: () = assert!(std::mem::size_of::<StoreFileHeader>() == FILE_HEADER_SIZE);

impl StoreFileHeader {
    pub fn new(kind: FileKind, buckets: u64, value_size: u32) -> Self {
        Self {
            magic: *STORE_MAGIC,
            version: U32::new(CURRENT_VERSION),
            kind: U32::new(kind as u32),
            buckets: U64::new(buckets),
            value_size: U32::new(value_size),
            reserved: [0u8; 92],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "buffer too small for store file header: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse store file header: {:?}", e))?;

        ensure!(&header.magic == STORE_MAGIC, "invalid store file magic");
        ensure!(
            header.version.get() == CURRENT_VERSION,
            "unsupported store format version: {} (expected {})",
            header.version.get(),
            CURRENT_VERSION
        );
        Ok(header)
    }
}

/// Stamp a fresh file with its header; the file grows to hold it.
pub fn write_header(file: &MappedFile, header: &StoreFileHeader) -> Result<()> {
    file.resize(FILE_HEADER_SIZE as u64)?;
    let memory = file.access()?;
    memory.write(0, header.as_bytes());
    Ok(())
}

/// Validate an opened file against the layout it is about to be used with.
pub fn check_header(file: &MappedFile, expected: &StoreFileHeader) -> Result<()> {
    let memory = file.access()?;
    let stored = StoreFileHeader::from_bytes(memory.slice(0, FILE_HEADER_SIZE))?;

    ensure!(
        stored.kind.get() == expected.kind.get(),
        "'{}' is the wrong file kind: stored {}, expected {}",
        file.path().display(),
        stored.kind.get(),
        expected.kind.get()
    );
    ensure!(
        stored.buckets.get() == expected.buckets.get(),
        "'{}' was created with {} buckets, configured {}",
        file.path().display(),
        stored.buckets.get(),
        expected.buckets.get()
    );
    ensure!(
        stored.value_size.get() == expected.value_size.get(),
        "'{}' was created with value size {}, configured {}",
        file.path().display(),
        stored.value_size.get(),
        expected.value_size.get()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RemapGate;
    use std::io::Write as _;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn open_file(dir: &std::path::Path) -> Arc<MappedFile> {
        let path = dir.join("header_test");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"X").unwrap();

        let mapped = Arc::new(MappedFile::new(path, RemapGate::default()));
        mapped.open().unwrap();
        mapped
    }

    #[test]
    fn write_then_check() {
        let dir = tempdir().unwrap();
        let file = open_file(dir.path());
        let header = StoreFileHeader::new(FileKind::Lookup, 97, 0);

        write_header(&file, &header).unwrap();
        check_header(&file, &header).unwrap();
    }

    #[test]
    fn mismatched_buckets_are_rejected() {
        let dir = tempdir().unwrap();
        let file = open_file(dir.path());

        write_header(&file, &StoreFileHeader::new(FileKind::Lookup, 97, 0)).unwrap();

        let other = StoreFileHeader::new(FileKind::Lookup, 101, 0);
        assert!(check_header(&file, &other).is_err());
    }

    #[test]
    fn garbage_magic_is_rejected() {
        let dir = tempdir().unwrap();
        let file = open_file(dir.path());

        file.resize(FILE_HEADER_SIZE as u64).unwrap();
        file.access().unwrap().write(0, &[0xAB; FILE_HEADER_SIZE]);

        let expected = StoreFileHeader::new(FileKind::Rows, 0, 8);
        assert!(check_header(&file, &expected).is_err());
    }
}
