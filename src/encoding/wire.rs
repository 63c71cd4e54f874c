//! # Wire Cursor
//!
//! Bounds-checked little-endian cursors over byte slices, mirroring the
//! fixed on-disk record layouts. `Writer` writes into a pre-sized buffer
//! (records are allocated at their exact serialized size, so running out of
//! room indicates a sizing bug and panics); `Reader` decodes bytes that may
//! come from a damaged file and therefore returns `eyre::Result` on
//! underrun or malformed content.

use eyre::{ensure, Result, WrapErr};

use super::varint::{decode_varint, encode_varint, varint_len};

/// Serialized size of a length-prefixed byte string.
pub fn sized_bytes_len(bytes: &[u8]) -> usize {
    varint_len(bytes.len() as u64) + bytes.len()
}

/// Little-endian writer over a fixed-size output buffer.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    position: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        assert!(end <= self.buf.len(), "record write past allocated size");
        self.buf[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }

    pub fn put_varint(&mut self, value: u64) {
        let written = encode_varint(value, &mut self.buf[self.position..]);
        self.position += written;
    }

    /// Length-prefixed byte string.
    pub fn put_sized_bytes(&mut self, bytes: &[u8]) {
        self.put_varint(bytes.len() as u64);
        self.put_bytes(bytes);
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_sized_bytes(value.as_bytes());
    }

    /// Zero-fill up to `len` total bytes written; fixed-capacity slots in
    /// record rows are padded so identical content always serializes to
    /// identical bytes.
    pub fn pad_to(&mut self, len: usize) {
        assert!(self.position <= len, "record overflows fixed slot");
        self.buf[self.position..len].fill(0);
        self.position = len;
    }
}

/// Little-endian reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.get_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.get_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.get_array()?))
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.get_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        ensure!(
            self.remaining() >= len,
            "record truncated: needed {} bytes, {} remain",
            len,
            self.remaining()
        );
        let start = self.position;
        self.position += len;
        Ok(&self.buf[start..self.position])
    }

    pub fn get_varint(&mut self) -> Result<u64> {
        let (value, read) = decode_varint(&self.buf[self.position..])?;
        self.position += read;
        Ok(value)
    }

    pub fn get_sized_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_varint()?;
        self.get_bytes(len as usize)
    }

    pub fn get_string(&mut self) -> Result<String> {
        let bytes = self.get_sized_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .wrap_err("record string is not valid UTF-8")
    }

    /// Skip the zero padding of a fixed-capacity slot.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.get_bytes(len).map(|_| ())
    }
}
