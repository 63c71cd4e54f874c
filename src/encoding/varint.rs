//! # Compact-Size Integer Encoding
//!
//! Variable-length integer encoding used for length prefixes inside records
//! (script bytes, symbol strings, transaction counts). The format is the
//! classic compact-size scheme of the bitcoin wire protocol:
//!
//! | Value Range              | Bytes | Format                     |
//! |--------------------------|-------|----------------------------|
//! | 0 - 252                  | 1     | `[value]`                  |
//! | 253 - 65535              | 3     | `[0xFD, u16 little-endian]`|
//! | 65536 - 4294967295       | 5     | `[0xFE, u32 little-endian]`|
//! | 4294967296 - u64::MAX    | 9     | `[0xFF, u64 little-endian]`|
//!
//! Non-canonical encodings (a wider marker for a value that fits a narrower
//! one) are rejected on decode so that record bytes have exactly one valid
//! form - content comparison of serialized rows relies on this.
//!
//! All functions operate on byte slices directly and allocate nothing.

use eyre::{ensure, Result};

pub fn varint_len(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Encode `value` into `buf`, returning the number of bytes written.
/// `buf` must hold at least `varint_len(value)` bytes.
pub fn encode_varint(value: u64, buf: &mut [u8]) -> usize {
    match value {
        0..=0xFC => {
            buf[0] = value as u8;
            1
        }
        0xFD..=0xFFFF => {
            buf[0] = 0xFD;
            buf[1..3].copy_from_slice(&(value as u16).to_le_bytes());
            3
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf[0] = 0xFE;
            buf[1..5].copy_from_slice(&(value as u32).to_le_bytes());
            5
        }
        _ => {
            buf[0] = 0xFF;
            buf[1..9].copy_from_slice(&value.to_le_bytes());
            9
        }
    }
}

/// Decode a compact-size integer, returning `(value, bytes_read)`.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize)> {
    ensure!(!buf.is_empty(), "empty buffer for varint decode");

    match buf[0] {
        marker @ 0..=0xFC => Ok((marker as u64, 1)),
        0xFD => {
            ensure!(buf.len() >= 3, "truncated 3-byte varint");
            let value = u16::from_le_bytes([buf[1], buf[2]]) as u64;
            ensure!(value >= 0xFD, "non-canonical varint: {} as 3 bytes", value);
            Ok((value, 3))
        }
        0xFE => {
            ensure!(buf.len() >= 5, "truncated 5-byte varint");
            let value = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as u64;
            ensure!(value > 0xFFFF, "non-canonical varint: {} as 5 bytes", value);
            Ok((value, 5))
        }
        0xFF => {
            ensure!(buf.len() >= 9, "truncated 9-byte varint");
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[1..9]);
            let value = u64::from_le_bytes(bytes);
            ensure!(
                value > 0xFFFF_FFFF,
                "non-canonical varint: {} as 9 bytes",
                value
            );
            Ok((value, 9))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_len_boundaries() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(0xFC), 1);
        assert_eq!(varint_len(0xFD), 3);
        assert_eq!(varint_len(0xFFFF), 3);
        assert_eq!(varint_len(0x1_0000), 5);
        assert_eq!(varint_len(0xFFFF_FFFF), 5);
        assert_eq!(varint_len(0x1_0000_0000), 9);
        assert_eq!(varint_len(u64::MAX), 9);
    }

    #[test]
    fn round_trip_boundaries() {
        let values = [
            0,
            1,
            0xFC,
            0xFD,
            0xFFFF,
            0x1_0000,
            0xFFFF_FFFF,
            0x1_0000_0000,
            u64::MAX,
        ];

        for value in values {
            let mut buf = [0u8; 9];
            let written = encode_varint(value, &mut buf);
            assert_eq!(written, varint_len(value));

            let (decoded, read) = decode_varint(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(read, written);
        }
    }

    #[test]
    fn decode_rejects_empty_buffer() {
        assert!(decode_varint(&[]).is_err());
    }

    #[test]
    fn decode_rejects_truncated_encoding() {
        assert!(decode_varint(&[0xFD, 0x01]).is_err());
        assert!(decode_varint(&[0xFE, 0x01, 0x02]).is_err());
        assert!(decode_varint(&[0xFF, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn decode_rejects_non_canonical_encoding() {
        // 1 encoded with a 3-byte marker.
        assert!(decode_varint(&[0xFD, 0x01, 0x00]).is_err());
        // 0xFFFF encoded with a 5-byte marker.
        assert!(decode_varint(&[0xFE, 0xFF, 0xFF, 0x00, 0x00]).is_err());
    }
}
