//! Access to the attribute tree and device nodes backing the IIO bus.

use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Blocking,
    NonBlocking,
}

/// A hierarchical key-value namespace of text attributes, plus the character devices
/// that stream ring buffer contents.
///
/// Reads of a non-blocking stream that has no data available must fail with
/// [`io::ErrorKind::WouldBlock`].
pub trait AttributeTree {
    type Stream: io::Read;

    /// Directory whose children are the devices on the bus.
    fn bus_dir(&self) -> &Path;
    /// Directory holding the ring buffer event and access nodes.
    fn dev_dir(&self) -> &Path;

    fn read(&self, path: &Path) -> io::Result<String>;
    fn write(&self, path: &Path, value: &str) -> io::Result<()>;
    fn list(&self, dir: &Path) -> io::Result<Vec<String>>;
    fn is_dir(&self, path: &Path) -> bool;

    fn open_stream(&self, path: &Path, mode: StreamMode) -> io::Result<Self::Stream>;
}

impl<T: AttributeTree + ?Sized> AttributeTree for &T {
    type Stream = T::Stream;

    fn bus_dir(&self) -> &Path { (**self).bus_dir() }
    fn dev_dir(&self) -> &Path { (**self).dev_dir() }

    fn read(&self, path: &Path) -> io::Result<String> { (**self).read(path) }
    fn write(&self, path: &Path, value: &str) -> io::Result<()> { (**self).write(path, value) }
    fn list(&self, dir: &Path) -> io::Result<Vec<String>> { (**self).list(dir) }
    fn is_dir(&self, path: &Path) -> bool { (**self).is_dir(path) }

    fn open_stream(&self, path: &Path, mode: StreamMode) -> io::Result<Self::Stream> {
        (**self).open_stream(path, mode)
    }
}

#[cfg(unix)]
#[path = "linux.rs"]
pub mod imp;

pub mod memory;

#[cfg(unix)]
pub use imp::{SysfsTree, Fd};
pub use memory::{MemoryTree, MemoryStream, Chunk};
