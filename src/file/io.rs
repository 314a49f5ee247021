//! Big-endian primitive reading and writing.
//!
//! Every multi-byte quantity in a class file is stored big-endian. The [`ClassIO`] trait
//! abstracts over the primitive types that appear in the format so that
//! [`read_be_at`] and [`write_be`] can be written once.
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::file::io::{read_be_at, write_be};
//!
//! let mut buffer = Vec::new();
//! write_be(&mut buffer, 0xCAFE_u16);
//! write_be(&mut buffer, -2_i32);
//!
//! let mut offset = 0;
//! assert_eq!(read_be_at::<u16>(&buffer, &mut offset)?, 0xCAFE);
//! assert_eq!(read_be_at::<i32>(&buffer, &mut offset)?, -2);
//! # Ok::<(), classscope::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Primitive types that can be decoded from and encoded to big-endian bytes.
pub trait ClassIO: Sized + Copy {
    /// Fixed-size byte representation
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decodes a value from big-endian bytes.
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes a value into big-endian bytes.
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $size:literal),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $size];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io! {
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

/// Reads a `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Reads a `T` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Appends `value` in big-endian encoding to `out`.
pub fn write_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrites the bytes at `offset` with the big-endian encoding of `value`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
pub fn patch_be_at<T: ClassIO>(out: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > out.len() {
        return Err(OutOfBounds);
    }

    out[offset..end].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];

    #[test]
    fn read_be_u32() {
        let result = read_be::<u32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0xCAFE_BABE);
    }

    #[test]
    fn read_be_sequence() {
        let mut offset = 0;
        assert_eq!(read_be_at::<u32>(&TEST_BUFFER, &mut offset).unwrap(), 0xCAFE_BABE);
        assert_eq!(read_be_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 0);
        assert_eq!(read_be_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 52);
        assert_eq!(offset, 8);
        assert!(read_be_at::<u8>(&TEST_BUFFER, &mut offset).is_err());
    }

    #[test]
    fn read_be_signed_and_float() {
        let mut buffer = Vec::new();
        write_be(&mut buffer, -1_i16);
        write_be(&mut buffer, 1.5_f32);
        write_be(&mut buffer, -3.25_f64);

        let mut offset = 0;
        assert_eq!(read_be_at::<i16>(&buffer, &mut offset).unwrap(), -1);
        assert_eq!(read_be_at::<f32>(&buffer, &mut offset).unwrap(), 1.5);
        assert_eq!(read_be_at::<f64>(&buffer, &mut offset).unwrap(), -3.25);
    }

    #[test]
    fn errors() {
        let buffer = [0xFF, 0xFF];
        assert!(read_be::<u32>(&buffer).is_err());

        let mut offset = usize::MAX;
        assert!(read_be_at::<u8>(&buffer, &mut offset).is_err());
    }

    #[test]
    fn patch() {
        let mut buffer = vec![0_u8; 4];
        patch_be_at(&mut buffer, 2, 0x1234_u16).unwrap();
        assert_eq!(buffer, vec![0, 0, 0x12, 0x34]);
        assert!(patch_be_at(&mut buffer, 3, 0x1234_u16).is_err());
    }
}
