//! # Slab Manager
//!
//! Space manager for variable-size values (slabs) living after a header
//! region of a mapped file. The payload size - which includes its own
//! 8-byte prefix - is persisted at `header_size`; slabs are appended after
//! it and addressed by their payload-relative position. A slab is never
//! moved or reclaimed; unlinking from a hash bucket merely orphans it.
//!
//! File region:
//!
//! ```text
//! [ 0 .. header_size )                caller's header (file header, buckets)
//! [ header_size .. +8 )               payload size, little-endian
//! [ header_size + 8 .. )              slabs, back to back
//! ```
//!
//! Because the size prefix occupies position zero, a real slab position is
//! always >= 8 and zero can serve as an out-of-band "unwritten" marker in
//! structures that store slab positions (the block height index does).

use std::sync::Arc;

use eyre::{ensure, Result};
use parking_lot::Mutex;

use crate::memory::MappedFile;

use super::{FileOffset, SLAB_SIZE_PREFIX};

pub struct SlabManager {
    file: Arc<MappedFile>,
    header_size: u64,
    payload_size: Mutex<u64>,
}

impl SlabManager {
    pub fn new(file: Arc<MappedFile>, header_size: u64) -> Self {
        Self {
            file,
            header_size,
            payload_size: Mutex::new(SLAB_SIZE_PREFIX),
        }
    }

    pub fn file(&self) -> &Arc<MappedFile> {
        &self.file
    }

    /// First-run initialization: empty payload, size prefix written out.
    pub fn create(&self) -> Result<()> {
        let mut payload = self.payload_size.lock();
        *payload = SLAB_SIZE_PREFIX;
        self.file.resize(self.header_size + *payload)?;
        self.write_size(*payload)
    }

    /// Read the persisted payload size and sanity-check the file.
    pub fn start(&self) -> Result<()> {
        let mut payload = self.payload_size.lock();

        let memory = self.file.access()?;
        let bytes = memory.slice(self.header_size, SLAB_SIZE_PREFIX as usize);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        *payload = u64::from_le_bytes(raw);

        ensure!(
            *payload >= SLAB_SIZE_PREFIX,
            "slab payload of '{}' is smaller than its own prefix",
            self.file.path().display()
        );
        ensure!(
            self.header_size + *payload <= memory.len() as u64,
            "slab payload of '{}' exceeds file size",
            self.file.path().display()
        );
        Ok(())
    }

    /// Persist the in-memory payload size.
    pub fn sync(&self) -> Result<()> {
        self.write_size(*self.payload_size.lock())
    }

    pub fn payload_size(&self) -> u64 {
        *self.payload_size.lock()
    }

    /// Append a slab of `size` bytes, growing the file; returns its
    /// payload-relative position.
    pub fn new_slab(&self, size: usize) -> Result<FileOffset> {
        let mut payload = self.payload_size.lock();
        let position = *payload;
        *payload += size as u64;

        self.file.resize(self.header_size + *payload)?;
        Ok(position)
    }

    /// Absolute byte offset of a slab position.
    pub fn slab_offset(&self, position: FileOffset) -> FileOffset {
        debug_assert!(
            position >= SLAB_SIZE_PREFIX && position < self.payload_size(),
            "slab position outside payload"
        );
        self.header_size + position
    }

    fn write_size(&self, payload: u64) -> Result<()> {
        let memory = self.file.access()?;
        memory.write(self.header_size, &payload.to_le_bytes());
        Ok(())
    }
}
