//! Discovery of Linux industrial I/O devices and acquisition from their ring buffers.

mod abi;
mod attr;
mod cancel;
mod capture;
mod config;
mod device;
mod scan;
mod trigger;

#[cfg(test)]
mod fixture;

pub mod sys;

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{} not found", path.display())]
    NotFound {
        path: PathBuf,
    },
    #[error("cannot parse {}: {}", path.display(), reason)]
    Parse {
        path: PathBuf,
        reason: String,
    },
    #[error("I/O error on {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: wrote {:?}, read back {:?}", path.display(), expected, actual)]
    VerifyMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("unrecognized event code {0:#x}")]
    UnrecognizedEvent(i32),
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn from_io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        let path = path.into();
        match error.kind() {
            io::ErrorKind::NotFound => Error::NotFound { path },
            _ => Error::Io { path, source: error },
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Parse { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use attr::{
    read_int,
    read_float,
    read_string,
    list_children,
    write_int,
    write_string,
    write_verify_int,
    write_verify_string,
};

pub use cancel::CancellationToken;

pub use capture::{
    EventData,
    FillLevel,
    SessionState,
    Session,
    SessionStats,
};

pub use config::{
    TreeConfig,
    AcquisitionConfig,
};

pub use device::{
    SensorKind,
    Channel,
    RingBuffer,
    Device,
    Bus,
};

pub use scan::{
    ScanElement,
    SampleField,
    SampleLayout,
    SampleSet,
    sign_extend,
    storage_bytes,
};

pub use trigger::{
    get_trigger,
    set_trigger,
};
