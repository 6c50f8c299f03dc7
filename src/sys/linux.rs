use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use libc::{c_int, c_void};

use crate::config::TreeConfig;
use super::{AttributeTree, StreamMode};

#[derive(Debug)]
pub struct Fd(c_int);

impl Fd {
    pub fn open(path: &Path, mode: StreamMode) -> io::Result<Fd> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
        let flags = match mode {
            StreamMode::Blocking => libc::O_RDONLY,
            StreamMode::NonBlocking => libc::O_RDONLY | libc::O_SYNC | libc::O_NONBLOCK,
        };
        unsafe {
            let fd = libc::open(c_path.as_ptr(), flags);
            if fd == -1 {
                Err(io::Error::last_os_error())
            } else {
                log::trace!("open({:?}, {:?}) = {}", path, mode, fd);
                Ok(Fd(fd))
            }
        }
    }
}

impl io::Read for Fd {
    fn read(&mut self, data: &mut [u8]) -> io::Result<usize> {
        unsafe {
            let bytes_read = libc::read(self.0, data.as_mut_ptr() as *mut c_void, data.len());
            if bytes_read < 0 {
                // EAGAIN surfaces as `io::ErrorKind::WouldBlock`
                Err(io::Error::last_os_error())
            } else {
                Ok(bytes_read as usize)
            }
        }
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            if libc::close(self.0) == -1 {
                log::warn!("error closing fd {}: {}", self.0, io::Error::last_os_error())
            } else {
                log::trace!("close({})", self.0);
            }
        }
    }
}

/// The attribute tree as exposed by sysfs, with ring buffers under a device node directory.
#[derive(Debug, Clone)]
pub struct SysfsTree {
    bus_dir: PathBuf,
    dev_dir: PathBuf,
}

impl SysfsTree {
    pub fn new(config: &TreeConfig) -> SysfsTree {
        SysfsTree {
            bus_dir: config.sysfs_dir.clone(),
            dev_dir: config.dev_dir.clone(),
        }
    }
}

impl Default for SysfsTree {
    fn default() -> Self {
        SysfsTree::new(&TreeConfig::default())
    }
}

impl AttributeTree for SysfsTree {
    type Stream = Fd;

    fn bus_dir(&self) -> &Path {
        &self.bus_dir
    }

    fn dev_dir(&self) -> &Path {
        &self.dev_dir
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, value: &str) -> io::Result<()> {
        // attributes are never created, only replaced
        let mut file = std::fs::OpenOptions::new().write(true).truncate(true).open(path)?;
        io::Write::write_all(&mut file, value.as_bytes())
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn open_stream(&self, path: &Path, mode: StreamMode) -> io::Result<Fd> {
        Fd::open(path, mode)
    }
}
