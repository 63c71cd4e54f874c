//! # Encoding Module
//!
//! Serialization utilities for the fixed little-endian record formats:
//!
//! - **Wire cursor**: bounds-checked reader and writer over byte slices
//! - **Varint encoding**: compact-size integers for length prefixes

pub mod varint;
pub mod wire;

pub use varint::{decode_varint, encode_varint, varint_len};
pub use wire::{Reader, Writer};
