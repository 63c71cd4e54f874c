//! # Growable Memory-Mapped File
//!
//! `MappedFile` owns one on-disk region mapped into the process address
//! space. It tracks two sizes:
//!
//! - **logical size**: bytes in use, as requested by the allocators above.
//!   The file is truncated back to this on close.
//! - **capacity**: bytes currently mapped. Growth requests beyond capacity
//!   extend the file with a 50% expansion factor and remap.
//!
//! ## Safety Model
//!
//! Remapping invalidates every address previously derived from the mapping.
//! Protection is split between two locks owned by the layers above:
//!
//! - The store-wide remap gate (shared by all files of one store) is held
//!   shared by every [`Memory`] accessor and exclusively by `grow`, so an
//!   accessor's base pointer is stable for the accessor's whole lifetime.
//! - The sequential lock serializes writers against each other and lets
//!   readers detect and retry torn reads. Reads and writes through a
//!   `Memory` accessor are deliberately *not* mutually excluded; a reader
//!   racing the single writer re-reads under the sequential-lock protocol.
//!
//! Failure to grow the backing file (disk exhaustion) is fatal and is
//! propagated, never retried - a node cannot run without its chain state.

use std::cell::UnsafeCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{bail, ensure, Result, WrapErr};
use memmap2::MmapMut;
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard};
use tracing::debug;

use super::{EXPANSION_DENOMINATOR, EXPANSION_NUMERATOR};

/// Store-wide lock preventing concurrent file remapping. Accessors hold the
/// shared side; growth takes the exclusive side.
pub type RemapGate = Arc<RwLock<()>>;

struct Inner {
    file: Option<File>,
    map: Option<MmapMut>,
    logical_size: u64,
}

/// A single growable memory-mapped file.
///
/// All mutation of the mapping (open, grow, close) happens under the
/// exclusive side of the remap gate; all access happens under the shared
/// side via [`MappedFile::access`].
pub struct MappedFile {
    path: PathBuf,
    gate: RemapGate,
    inner: UnsafeCell<Inner>,
}

// SAFETY: every access to `inner` is mediated by the remap gate - shared
// reads through `access()`, exclusive mutation in open/grow/close. The
// UnsafeCell is only there because growth must happen behind &self (tables
// share the file through an Arc).
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Create a handle for `path`. The file is not touched until `open()`.
    pub fn new<P: AsRef<Path>>(path: P, gate: RemapGate) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            gate,
            inner: UnsafeCell::new(Inner {
                file: None,
                map: None,
                logical_size: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map an existing, non-empty file. Idempotent: re-opening an already
    /// open file is a no-op, which lets `create()` flow into `start()`.
    pub fn open(&self) -> Result<()> {
        let _exclusive = self.gate.write();

        // SAFETY: exclusive gate held, no accessor can exist.
        let inner = unsafe { &mut *self.inner.get() };
        if inner.map.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .wrap_err_with(|| format!("failed to open store file '{}'", self.path.display()))?;

        let capacity = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();

        ensure!(
            capacity > 0,
            "store file '{}' is empty; create the store first",
            self.path.display()
        );

        // SAFETY: the file is opened read-write by this process alone (the
        // interprocess lock one layer up guarantees single-process access),
        // and the mapping is dropped before the File. All addressing goes
        // through bounds-derived offsets redeemed via `access()`.
        let map = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", self.path.display()))?
        };

        debug!(file = %self.path.display(), capacity, "mapped");

        inner.logical_size = capacity;
        inner.file = Some(file);
        inner.map = Some(map);
        Ok(())
    }

    /// Acquire a read accessor. Holds the shared remap gate until dropped,
    /// so offsets resolved through it stay valid for its whole lifetime.
    pub fn access(&self) -> Result<Memory<'_>> {
        // Recursive acquisition: a thread may hold two accessors at once
        // (bucket header and slab payload); a queued growth must not wedge
        // the inner acquisition.
        let guard = self.gate.read_recursive();

        // SAFETY: shared gate held; the mapping cannot be replaced while
        // this accessor is alive.
        let inner = unsafe { &*self.inner.get() };
        let map = match inner.map.as_ref() {
            Some(map) => map,
            None => bail!("store file '{}' is not open", self.path.display()),
        };

        Ok(Memory {
            _guard: guard,
            base: map.as_ptr() as *mut u8,
            len: map.len(),
        })
    }

    /// Current mapped capacity in bytes.
    pub fn capacity(&self) -> u64 {
        let _shared = self.gate.read();
        // SAFETY: shared gate held.
        let inner = unsafe { &*self.inner.get() };
        inner.map.as_ref().map_or(0, |m| m.len() as u64)
    }

    pub fn logical_size(&self) -> u64 {
        let _shared = self.gate.read();
        // SAFETY: shared gate held.
        let inner = unsafe { &*self.inner.get() };
        inner.logical_size
    }

    /// Set the logical size, growing capacity if needed. Addresses obtained
    /// before a call that grows the file must already have been discarded;
    /// the exclusive gate enforces that no accessor is alive during growth.
    pub fn resize(&self, size: u64) -> Result<()> {
        self.reserve(size)?;

        let _exclusive = self.gate.write();
        // SAFETY: exclusive gate held.
        let inner = unsafe { &mut *self.inner.get() };
        inner.logical_size = size;
        Ok(())
    }

    /// Ensure capacity for at least `required` bytes. Takes the gate
    /// upgradably so concurrent readers drain before the remap, and a
    /// no-growth call costs only a shared acquisition.
    pub fn reserve(&self, required: u64) -> Result<()> {
        let upgradable = self.gate.upgradable_read();

        // SAFETY: upgradable gate held - excludes writers to inner.
        let capacity = unsafe { (*self.inner.get()).map.as_ref().map_or(0, |m| m.len() as u64) };
        if required <= capacity {
            return Ok(());
        }

        let target = required
            .checked_mul(EXPANSION_NUMERATOR)
            .map(|n| n / EXPANSION_DENOMINATOR)
            .unwrap_or(required);

        let _exclusive = RwLockUpgradableReadGuard::upgrade(upgradable);

        // SAFETY: exclusive gate held, no accessor can exist.
        let inner = unsafe { &mut *self.inner.get() };
        let file = match inner.file.as_ref() {
            Some(file) => file,
            None => bail!("store file '{}' is not open", self.path.display()),
        };

        debug!(file = %self.path.display(), from = capacity, to = target, "resizing");

        if let Some(map) = inner.map.as_ref() {
            map.flush()
                .wrap_err_with(|| format!("failed to flush '{}' before remap", self.path.display()))?;
        }

        // Disk exhaustion surfaces here; it is fatal and propagated as-is.
        file.set_len(target).wrap_err_with(|| {
            format!(
                "failed to grow '{}' to {} bytes",
                self.path.display(),
                target
            )
        })?;

        // SAFETY: the old mapping is dropped on assignment; no accessor is
        // alive (exclusive gate), and the file now covers `target` bytes.
        let map = unsafe {
            MmapMut::map_mut(file)
                .wrap_err_with(|| format!("failed to remap '{}' after grow", self.path.display()))?
        };
        inner.map = Some(map);
        Ok(())
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        let _shared = self.gate.read();
        // SAFETY: shared gate held; flush takes &self on the mapping.
        let inner = unsafe { &*self.inner.get() };
        if let Some(map) = inner.map.as_ref() {
            map.flush()
                .wrap_err_with(|| format!("failed to flush '{}'", self.path.display()))?;
        }
        Ok(())
    }

    /// Flush, unmap and truncate the file to its logical size. Must not be
    /// called while accessors are alive in other threads; the caller joins
    /// its workers first (documented store contract).
    pub fn close(&self) -> Result<()> {
        let _exclusive = self.gate.write();

        // SAFETY: exclusive gate held.
        let inner = unsafe { &mut *self.inner.get() };
        if let Some(map) = inner.map.take() {
            map.flush()
                .wrap_err_with(|| format!("failed to flush '{}' on close", self.path.display()))?;
            drop(map);
        }
        if let Some(file) = inner.file.take() {
            file.set_len(inner.logical_size).wrap_err_with(|| {
                format!(
                    "failed to truncate '{}' to logical size {}",
                    self.path.display(),
                    inner.logical_size
                )
            })?;
            debug!(file = %self.path.display(), size = inner.logical_size, "unmapped");
        }
        Ok(())
    }
}

/// A short-lived view into a mapped file, pinned against remapping.
///
/// Offsets are resolved to addresses only through this accessor, never
/// cached across its lifetime. Reads may race the single writer; the
/// sequential lock above detects such torn reads and retries them.
pub struct Memory<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    base: *mut u8,
    len: usize,
}

impl Memory<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolve `offset..offset + len` to a byte slice.
    ///
    /// Out-of-range resolution means a corrupt link or a logic error above;
    /// it stops the process rather than reading unrelated table bytes.
    pub fn slice(&self, offset: u64, len: usize) -> &[u8] {
        let offset = offset as usize;
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "offset {offset}+{len} past end of mapping ({})",
            self.len
        );
        // SAFETY: bounds checked above; base is valid for `self.len` bytes
        // for the accessor's lifetime (shared remap gate held).
        unsafe { std::slice::from_raw_parts(self.base.add(offset), len) }
    }

    /// Resolve `offset..` to the end of the mapping; used for
    /// self-describing variable-length records.
    pub fn slice_from(&self, offset: u64) -> &[u8] {
        let offset = offset as usize;
        assert!(offset <= self.len, "offset {offset} past end of mapping");
        self.slice(offset as u64, self.len - offset)
    }

    /// Copy `bytes` into the mapping at `offset`.
    ///
    /// Only ever called from within the single-writer critical section; the
    /// sequential lock makes a concurrent reader discard anything it read
    /// while this ran.
    pub fn write(&self, offset: u64, bytes: &[u8]) {
        let offset = offset as usize;
        assert!(
            offset
                .checked_add(bytes.len())
                .is_some_and(|end| end <= self.len),
            "write {offset}+{} past end of mapping ({})",
            bytes.len(),
            self.len
        );
        // SAFETY: bounds checked above; the mapping is writable and stable
        // while the shared gate is held. Concurrent readers tolerate the
        // race by protocol (sequential-lock retry).
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(offset), bytes.len());
        }
    }
}
