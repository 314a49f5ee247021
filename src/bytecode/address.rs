//! Byte addresses inside a method's code array.

use std::fmt;

use crate::Result;

/// Offset of an instruction from the start of its method's code array.
///
/// Jump operands are stored relative to the branching instruction, so the decoder and the
/// block builder compute absolute targets through [`Address::offset`].
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u32);

impl Address {
    /// The first instruction of every method.
    pub const ZERO: Address = Address(0);

    /// Creates an address from a raw byte offset.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Address(value)
    }

    /// Returns the raw byte offset.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Applies a signed relative jump offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the result would be negative or exceed `u32`.
    pub fn offset(self, delta: i32) -> Result<Address> {
        let target = i64::from(self.0) + i64::from(delta);
        u32::try_from(target)
            .map(Address)
            .map_err(|_| malformed_error!("Jump from {} by {} leaves the code array", self.0, delta))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Address(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset() {
        let base = Address::new(10);
        assert_eq!(base.offset(5).unwrap(), Address::new(15));
        assert_eq!(base.offset(-10).unwrap(), Address::ZERO);
        assert!(base.offset(-11).is_err());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(Address::new(42).to_string(), "42");
        assert_eq!(format!("{:?}", Address::new(42)), "@42");
    }
}
