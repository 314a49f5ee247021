//! Input abstraction for class-file bytes.
//!
//! A [`File`] owns the raw bytes of a single `.class` file. The bytes either come from a
//! memory-mapped file on disk ([`File::from_file`]) or from an owned buffer
//! ([`File::from_mem`]). Both variants sit behind the [`Backend`] trait so the parser
//! never needs to know where its input lives.
//!
//! # Key Components
//!
//! - [`File`] - validated byte container handed to the class-file parser
//! - [`Backend`] - storage abstraction implemented by the physical and memory backends
//! - [`parser::Parser`] - bounds-checked big-endian cursor
//! - [`io`] - primitive decoding and encoding helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use classscope::File;
//!
//! let file = File::from_file("Example.class".as_ref())?;
//! assert!(file.has_class_magic());
//! # Ok::<(), classscope::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{Error::Empty, Result};

use memory::Memory;
use physical::Physical;

/// Magic number that opens every class file.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Storage abstraction for class-file bytes.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the complete data.
    fn data(&self) -> &[u8];

    /// Returns the size of the data in bytes.
    fn len(&self) -> usize;
}

/// The raw bytes of one class file.
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Memory-maps the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped and
    /// [`crate::Error::Empty`] for a zero-length file.
    pub fn from_file(path: &Path) -> Result<File> {
        let input = Physical::new(path)?;
        Self::load(input)
    }

    /// Wraps an owned buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
        })
    }

    /// Returns the total size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the file has no data. Never true for a loaded [`File`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the complete data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Returns true if the data starts with [`CLASS_MAGIC`].
    #[must_use]
    pub fn has_class_magic(&self) -> bool {
        io::read_be::<u32>(self.data()).is_ok_and(|magic| magic == CLASS_MAGIC)
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").field("len", &self.len()).finish()
    }
}
