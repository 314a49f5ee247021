use std::fmt;

use thiserror::Error;

use crate::bytecode::Address;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

macro_rules! unsupported_error {
    ($context:expr, $msg:expr) => {
        crate::Error::Unsupported {
            context: $context,
            message: $msg.to_string(),
        }
    };

    ($context:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Unsupported {
            context: $context,
            message: format!($fmt, $($arg)*),
        }
    };
}

macro_rules! consistency_error {
    ($context:expr, $msg:expr) => {
        crate::Error::InternalConsistency {
            context: $context,
            message: $msg.to_string(),
        }
    };

    ($context:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::InternalConsistency {
            context: $context,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// Identifies where in the input a method-level error happened.
///
/// Every [`Error::Unsupported`] and [`Error::InternalConsistency`] carries one of these, so
/// a driver compiling thousands of methods can report failures precisely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MethodContext {
    /// Internal name of the owning class, e.g. `java/lang/String`
    pub class: String,
    /// Method name followed by its descriptor, e.g. `add(II)I`
    pub method: String,
    /// Bytecode address of the offending instruction, if known
    pub address: Option<Address>,
}

impl MethodContext {
    /// Creates a context for the given class and method without an address.
    #[must_use]
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        MethodContext {
            class: class.into(),
            method: method.into(),
            address: None,
        }
    }

    /// Returns a copy of this context pointing at `address`.
    #[must_use]
    pub fn at(&self, address: Address) -> Self {
        MethodContext {
            class: self.class.clone(),
            method: self.method.clone(),
            address: Some(address),
        }
    }
}

impl fmt::Display for MethodContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.method)?;
        if let Some(address) = self.address {
            write!(f, " @ {address}")?;
        }
        Ok(())
    }
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Parse errors
/// - [`Error::Malformed`] - Corrupted or invalid class-file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::UnknownConstantTag`] - Constant pool entry with an unknown tag
/// - [`Error::InvalidConstant`] - Constant pool reference to a missing or mistyped entry
///
/// ## Method errors
/// - [`Error::Unsupported`] - Recognised construct the compiler does not handle
/// - [`Error::InternalConsistency`] - A construction invariant was violated
/// - [`Error::InMethod`] - A parse error raised while compiling a specific method
///
/// ## I/O and Analysis Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GraphError`] - Invalid graph operation
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// Includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// A constant pool entry carries a tag this parser does not know.
    #[error("Unknown constant pool tag {tag} at index {index} (pool size {count})")]
    UnknownConstantTag {
        /// The raw tag byte
        tag: u8,
        /// Pool index of the offending entry
        index: u16,
        /// Declared pool size
        count: u16,
    },

    /// A cross-reference points at a missing entry or an entry of the wrong kind.
    #[error("Invalid constant pool reference #{index}, expected {expected}")]
    InvalidConstant {
        /// The referenced index
        index: u16,
        /// Kind of entry the caller expected
        expected: &'static str,
    },

    /// A recognised instruction, attribute or reference kind that is not handled.
    #[error("Unsupported construct in {context}: {message}")]
    Unsupported {
        /// Owning class, method and address
        context: MethodContext,
        /// What exactly is unsupported
        message: String,
    },

    /// An invariant of the compiler was violated.
    ///
    /// This is always a defect (or an input shape the compiler cannot model), never a
    /// recoverable user error. Only the method under construction is affected.
    #[error("Internal consistency error in {context}: {message}")]
    InternalConsistency {
        /// Owning class, method and address
        context: MethodContext,
        /// Description of the violated invariant
        message: String,
    },

    /// A parse-level error raised while compiling a method.
    #[error("{context}: {source}")]
    InMethod {
        /// Owning class, method and address
        context: MethodContext,
        /// The original error
        #[source]
        source: Box<Error>,
    },

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Graph operation error.
    #[error("{0}")]
    GraphError(String),
}

impl Error {
    /// Attaches method context to errors that do not carry any yet.
    ///
    /// [`Error::Unsupported`] and [`Error::InternalConsistency`] already name their method
    /// and are returned unchanged.
    #[must_use]
    pub fn in_method(self, context: &MethodContext) -> Self {
        match self {
            Error::Unsupported { .. }
            | Error::InternalConsistency { .. }
            | Error::InMethod { .. } => self,
            other => Error::InMethod {
                context: context.clone(),
                source: Box::new(other),
            },
        }
    }

    /// Returns true for errors caused by malformed input.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        match self {
            Error::Malformed { .. }
            | Error::OutOfBounds
            | Error::Empty
            | Error::UnknownConstantTag { .. }
            | Error::InvalidConstant { .. } => true,
            Error::InMethod { source, .. } => source.is_parse_error(),
            _ => false,
        }
    }

    /// Returns true for [`Error::Unsupported`].
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }

    /// Returns true for [`Error::InternalConsistency`].
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::InternalConsistency { .. })
    }

    /// The method context, if this error carries one.
    #[must_use]
    pub fn context(&self) -> Option<&MethodContext> {
        match self {
            Error::Unsupported { context, .. }
            | Error::InternalConsistency { context, .. }
            | Error::InMethod { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = MethodContext::new("demo/Main", "add(II)I");
        assert_eq!(ctx.to_string(), "demo/Main.add(II)I");
        assert_eq!(ctx.at(Address::new(7)).to_string(), "demo/Main.add(II)I @ 7");
    }

    #[test]
    fn test_in_method_wraps_parse_errors_only() {
        let ctx = MethodContext::new("A", "m()V");

        let wrapped = out_of_bounds_error!().in_method(&ctx);
        assert!(wrapped.is_parse_error());
        assert_eq!(wrapped.context(), Some(&ctx));

        let internal = consistency_error!(ctx.at(Address::new(3)), "broken").in_method(&ctx);
        assert!(internal.is_internal());
        assert_eq!(
            internal.context().and_then(|c| c.address),
            Some(Address::new(3))
        );
    }

    #[test]
    fn test_malformed_macro() {
        let err = malformed_error!("bad magic {:#x}", 0xdead_u32);
        match err {
            Error::Malformed { message, .. } => assert_eq!(message, "bad magic 0xdead"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
