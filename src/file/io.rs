//! Bounds-checked little-endian reading and writing of primitive values.
//!
//! CIL stores every multi-byte operand in little-endian order. The helpers here decode them
//! through the [`CilIO`] trait, which maps each primitive to its fixed-size byte array. Because
//! conversion goes through `from_le_bytes`, a big-endian host gets the correctly reversed value
//! for integers as well as for `f32`/`f64` operands without any extra work.
//!
//! # Key Components
//!
//! - [`CilIO`] - byte array conversion for `u8`..`u64`, `i8`..`i64`, `f32`, `f64`
//! - [`read_le`] / [`read_le_at`] - read from the start of a slice or at an advancing offset
//! - [`write_le`] / [`write_le_at`] - the mirror image, used when encoding bodies
//!
//! # Examples
//!
//! ```rust
//! use dothook::file::io::{read_le_at, write_le_at};
//!
//! let mut buffer = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut buffer, &mut offset, 0x2A_u16)?;
//! write_le_at(&mut buffer, &mut offset, 1.5_f32)?;
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&buffer, &mut offset)?, 0x2A);
//! assert_eq!(read_le_at::<f32>(&buffer, &mut offset)?, 1.5);
//! # Ok::<(), dothook::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Every function returns [`crate::Error::OutOfRange`] when the buffer is too short. The offset is
//! only advanced after a successful read or write.

use crate::{Error::OutOfRange, Result};

/// Conversion between a primitive and its little-endian byte representation.
///
/// Implemented for all integer widths used by CIL operands and for both float widths.
pub trait CilIO: Sized {
    /// Fixed-size byte array holding one value.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Build the value from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Produce the little-endian bytes of this value
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfRange`] if `data` is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfRange`] if fewer than `size_of::<T>()` bytes remain. The offset
/// is left untouched in that case.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfRange)?;
    if end > data.len() {
        return Err(OutOfRange);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfRange);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Writes `value` to the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfRange`] if `data` is too short.
pub fn write_le<T: CilIO>(data: &mut [u8], value: T) -> Result<()> {
    let mut offset = 0_usize;
    write_le_at(data, &mut offset, value)
}

/// Writes `value` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfRange`] if the value does not fit.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(OutOfRange)?;
    if end > data.len() {
        return Err(OutOfRange);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u8() {
        let result = read_le::<u8>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x01);
    }

    #[test]
    fn read_le_i16() {
        let result = read_le::<i16>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0201);
    }

    #[test]
    fn read_le_u32() {
        let result = read_le::<u32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0403_0201);
    }

    #[test]
    fn read_le_i64() {
        let result = read_le::<i64>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0807060504030201);
    }

    #[test]
    fn read_le_negative() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(read_le::<i32>(&data).unwrap(), -1);
        assert_eq!(read_le::<i8>(&data).unwrap(), -1);
    }

    #[test]
    fn read_le_floats() {
        // 1.0f32 and -2.5f64 as stored in a CIL stream
        let single = [0x00, 0x00, 0x80, 0x3F];
        let double = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0xC0];

        assert_eq!(read_le::<f32>(&single).unwrap(), 1.0);
        assert_eq!(read_le::<f64>(&double).unwrap(), -2.5);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 0x0201);
        assert_eq!(offset, 2);
        assert_eq!(read_le_at::<u32>(&TEST_BUFFER, &mut offset).unwrap(), 0x0605_0403);
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_past_end() {
        let mut offset = 6;
        assert!(matches!(
            read_le_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(crate::Error::OutOfRange)
        ));
        assert_eq!(offset, 6);

        assert!(read_le::<u64>(&TEST_BUFFER[1..]).is_err());
        assert!(read_le::<u8>(&[]).is_err());
    }

    #[test]
    fn write_le_at_advances() {
        let mut buffer = [0u8; 7];
        let mut offset = 0;
        write_le_at(&mut buffer, &mut offset, 0x1234_u16).unwrap();
        write_le_at(&mut buffer, &mut offset, -2_i32).unwrap();
        write_le_at(&mut buffer, &mut offset, 0x7F_u8).unwrap();

        assert_eq!(buffer, [0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(offset, 7);
    }

    #[test]
    fn write_past_end() {
        let mut buffer = [0u8; 3];
        assert!(write_le(&mut buffer, 1_u32).is_err());
        assert_eq!(buffer, [0, 0, 0]);
    }
}
