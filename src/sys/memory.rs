//! In-memory attribute tree with scripted streams.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cancel::CancellationToken;
use super::{AttributeTree, StreamMode};

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Data returned by reads; a read shorter than the chunk leaves the rest for the next read.
    Bytes(Vec<u8>),
    /// A single read fails with `WouldBlock`.
    WouldBlock,
    /// A single read fails with this kind of error.
    Fail(io::ErrorKind),
    /// Cancels the token and continues with the next chunk within the same read.
    Cancel(CancellationToken),
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    Attr { value: String, frozen: bool },
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<PathBuf, Node>,
    streams: BTreeMap<PathBuf, Vec<Chunk>>,
    writes: Vec<(PathBuf, String)>,
    opened: usize,
}

#[derive(Debug, Clone)]
pub struct MemoryTree {
    bus_dir: PathBuf,
    dev_dir: PathBuf,
    inner: Arc<Mutex<Inner>>,
    closed: Arc<AtomicUsize>,
}

impl MemoryTree {
    pub fn new(bus_dir: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> MemoryTree {
        let tree = MemoryTree {
            bus_dir: bus_dir.into(),
            dev_dir: dev_dir.into(),
            inner: Default::default(),
            closed: Default::default(),
        };
        tree.insert_dir(tree.bus_dir.clone());
        tree.insert_dir(tree.dev_dir.clone());
        tree
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a poisoned lock only means a test panicked while holding it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a directory and all of its parents.
    pub fn insert_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut inner = self.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break
            }
            inner.nodes.entry(ancestor.to_owned()).or_insert(Node::Dir);
        }
    }

    /// Creates or replaces an attribute, creating its parent directories.
    pub fn insert_attr(&self, path: impl Into<PathBuf>, value: impl Into<String>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.insert_dir(parent);
        }
        self.lock().nodes.insert(path, Node::Attr { value: value.into(), frozen: false });
    }

    /// Makes an attribute ignore writes, as a read-only or rejecting node would.
    pub fn freeze(&self, path: impl AsRef<Path>) {
        if let Some(Node::Attr { frozen, .. }) = self.lock().nodes.get_mut(path.as_ref()) {
            *frozen = true;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.lock().nodes.retain(|node_path, _| !node_path.starts_with(path));
    }

    /// Defines the contents of a stream node; every open replays them from the start.
    pub fn insert_stream(&self, path: impl Into<PathBuf>, chunks: Vec<Chunk>) {
        self.lock().streams.insert(path.into(), chunks);
    }

    pub fn attr(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.lock().nodes.get(path.as_ref()) {
            Some(Node::Attr { value, .. }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Every value written to `path`, in order, including ignored writes.
    pub fn writes_to(&self, path: impl AsRef<Path>) -> Vec<String> {
        self.lock().writes.iter()
            .filter(|(write_path, _)| write_path == path.as_ref())
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn opened_streams(&self) -> usize {
        self.lock().opened
    }

    pub fn closed_streams(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AttributeTree for MemoryTree {
    type Stream = MemoryStream;

    fn bus_dir(&self) -> &Path {
        &self.bus_dir
    }

    fn dev_dir(&self) -> &Path {
        &self.dev_dir
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        match self.lock().nodes.get(path) {
            Some(Node::Attr { value, .. }) => Ok(value.clone()),
            Some(Node::Dir) => Err(io::Error::new(io::ErrorKind::Other, "is a directory")),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn write(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut inner = self.lock();
        inner.writes.push((path.to_owned(), value.to_owned()));
        match inner.nodes.get_mut(path) {
            Some(Node::Attr { frozen: true, .. }) => Ok(()),
            Some(Node::Attr { value: stored, .. }) => {
                *stored = value.to_owned();
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(io::ErrorKind::Other, "is a directory")),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let inner = self.lock();
        match inner.nodes.get(dir) {
            Some(Node::Dir) => (),
            Some(Node::Attr { .. }) => return Err(io::Error::new(io::ErrorKind::Other, "not a directory")),
            None => return Err(io::ErrorKind::NotFound.into()),
        }
        Ok(inner.nodes.keys()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().nodes.get(path), Some(Node::Dir))
    }

    fn open_stream(&self, path: &Path, mode: StreamMode) -> io::Result<MemoryStream> {
        let mut inner = self.lock();
        let chunks = inner.streams.get(path).cloned().ok_or(io::ErrorKind::NotFound)?;
        inner.opened += 1;
        log::trace!("open({:?}, {:?})", path, mode);
        Ok(MemoryStream {
            chunks: chunks.into(),
            closed: self.closed.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryStream {
    chunks: VecDeque<Chunk>,
    closed: Arc<AtomicUsize>,
}

impl io::Read for MemoryStream {
    fn read(&mut self, data: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.chunks.pop_front() {
                None => return Ok(0),
                Some(Chunk::Bytes(mut bytes)) => {
                    let count = bytes.len().min(data.len());
                    data[..count].copy_from_slice(&bytes[..count]);
                    if count < bytes.len() {
                        self.chunks.push_front(Chunk::Bytes(bytes.split_off(count)));
                    }
                    return Ok(count)
                }
                Some(Chunk::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
                Some(Chunk::Fail(kind)) => return Err(kind.into()),
                Some(Chunk::Cancel(token)) => token.cancel(),
            }
        }
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use super::*;

    #[test]
    fn test_list_and_read() {
        let tree = MemoryTree::new("/bus", "/dev/iio");
        tree.insert_attr("/bus/device0/name", "imu0\n");
        tree.insert_attr("/bus/device0/accel_x_raw", "12");
        let mut names = tree.list(Path::new("/bus/device0")).unwrap();
        names.sort();
        assert_eq!(names, ["accel_x_raw", "name"]);
        assert_eq!(tree.list(Path::new("/bus")).unwrap(), ["device0"]);
        assert_eq!(tree.read(Path::new("/bus/device0/name")).unwrap(), "imu0\n");
        assert_eq!(tree.read(Path::new("/bus/device0/nope")).unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_frozen_attr() {
        let tree = MemoryTree::new("/bus", "/dev/iio");
        tree.insert_attr("/bus/enable", "0");
        tree.freeze("/bus/enable");
        tree.write(Path::new("/bus/enable"), "1").unwrap();
        assert_eq!(tree.attr("/bus/enable").as_deref(), Some("0"));
        assert_eq!(tree.writes_to("/bus/enable"), ["1"]);
    }

    #[test]
    fn test_stream_script() {
        let tree = MemoryTree::new("/bus", "/dev/iio");
        let token = CancellationToken::new();
        tree.insert_stream("/dev/iio/ring_access0", vec![
            Chunk::Bytes(vec![1, 2, 3]),
            Chunk::WouldBlock,
            Chunk::Cancel(token.clone()),
            Chunk::Bytes(vec![4]),
        ]);
        {
            let mut stream = tree.open_stream(Path::new("/dev/iio/ring_access0"), StreamMode::NonBlocking).unwrap();
            let mut buf = [0u8; 2];
            assert_eq!(stream.read(&mut buf).unwrap(), 2);
            assert_eq!(stream.read(&mut buf).unwrap(), 1);
            assert_eq!(buf[0], 3);
            assert_eq!(stream.read(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
            assert!(!token.is_cancelled());
            assert_eq!(stream.read(&mut buf).unwrap(), 1);
            assert!(token.is_cancelled());
            assert_eq!(stream.read(&mut buf).unwrap(), 0);
        }
        assert_eq!(tree.opened_streams(), 1);
        assert_eq!(tree.closed_streams(), 1);
    }
}
