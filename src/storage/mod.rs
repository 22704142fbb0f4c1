//! Directory abstraction backing the on-disk projection.

mod fs;
mod mem;

pub use fs::FsDir;
pub use mem::MemDir;

use crate::error::ArborError;

/// A handle to one directory of the projection. `write_file` must replace
/// atomically: readers never observe a partial file.
pub trait Directory: Send {
    /// Opens (or with `create`, makes) a subdirectory.
    fn subdir(&self, name: &str, create: bool) -> Result<Box<dyn Directory>, ArborError>;

    /// Atomically replaces `name` with `bytes`.
    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), ArborError>;

    fn read_file(&self, name: &str) -> Result<Vec<u8>, ArborError>;

    /// Whether a subdirectory with this name exists.
    fn has_subdir(&self, name: &str) -> bool;

    fn clone_dir(&self) -> Box<dyn Directory>;
}

impl Clone for Box<dyn Directory> {
    fn clone(&self) -> Self {
        self.clone_dir()
    }
}
