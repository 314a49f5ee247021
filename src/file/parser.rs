//! Cursor-based byte stream parser for class-file structures.
//!
//! [`Parser`] keeps a position inside a byte slice and offers bounds-checked, big-endian
//! reads. It is used for the class-file container, attribute payloads and method
//! bytecode alike.
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
//! parser.advance_by(2)?;
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! # Ok::<(), classscope::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Result,
};

/// A bounds-checked big-endian reader over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the cursor has not reached the end of the data.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of bytes left after the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Moves the cursor to `pos`. Seeking to the very end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is beyond the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Moves the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if that would pass the end of the data.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Advances the cursor to the next multiple of `alignment`, measured from `base`.
    ///
    /// Used for the padding of `tableswitch` and `lookupswitch`, whose operands are
    /// aligned relative to the start of the method code.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding passes the end of the data.
    pub fn align_from(&mut self, base: usize, alignment: usize) -> Result<()> {
        let relative = self.position.saturating_sub(base);
        let padding = (alignment - (relative % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Returns the current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the complete underlying data.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the byte under the cursor without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Reads a big-endian `T` and advances the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Reads `len` raw bytes and advances the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }

    /// Reads a `u2` length followed by that many bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_u16_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_be::<u16>()?;
        self.read_bytes(usize::from(len))
    }

    /// Reads a `u4` length followed by that many bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_u32_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_be::<u32>()?;
        let len = usize::try_from(len).map_err(|_| out_of_bounds_error!())?;
        self.read_bytes(len)
    }

    /// Runs `f` and restores the cursor if it fails.
    ///
    /// # Errors
    /// Returns whatever `f` returns.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_sequential_reads() {
        let data = [0x00, 0x03, 0xAB, 0xCD, 0xEF, 0xFF, 0xFF, 0xFF, 0xFE];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_u16_prefixed().unwrap(), &[0xAB, 0xCD, 0xEF]);
        assert_eq!(parser.read_be::<i32>().unwrap(), -2);
        assert!(!parser.has_more_data());
        assert!(matches!(parser.read_be::<u8>(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn test_seek_and_peek() {
        let data = [1, 2, 3];
        let mut parser = Parser::new(&data);

        parser.seek(2).unwrap();
        assert_eq!(parser.peek_byte().unwrap(), 3);
        parser.seek(3).unwrap();
        assert!(parser.peek_byte().is_err());
        assert!(parser.seek(4).is_err());
    }

    #[test]
    fn test_align_from() {
        let data = [0_u8; 16];
        let mut parser = Parser::new(&data);

        // relative offset 6 pads up to 8
        parser.seek(8).unwrap();
        parser.align_from(2, 4).unwrap();
        assert_eq!(parser.pos(), 10);

        parser.align_from(2, 4).unwrap();
        assert_eq!(parser.pos(), 10);
    }

    #[test]
    fn test_transactional_restores() {
        let data = [0x00, 0x05, 0x01];
        let mut parser = Parser::new(&data);

        let result = parser.transactional(|p| {
            let _ = p.read_be::<u16>()?;
            p.read_be::<u32>()
        });
        assert!(result.is_err());
        assert_eq!(parser.pos(), 0);
    }
}
