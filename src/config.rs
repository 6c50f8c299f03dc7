//! Where to find the bus, and how to run the ring buffer.

use std::path::PathBuf;

use crate::abi;

pub const DEFAULT_RING_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Directory listing the devices on the IIO bus.
    pub sysfs_dir: PathBuf,
    /// Directory holding `ring_event_line*` and `ring_access*` nodes.
    pub dev_dir: PathBuf,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            sysfs_dir: abi::SYSFS_DIR.into(),
            dev_dir: abi::DEV_DIR.into(),
        }
    }
}

impl TreeConfig {
    /// Defaults, overridden by `IIO_SYSFS_DIR` and `IIO_DEV_DIR` when set.
    pub fn from_env() -> TreeConfig {
        let mut config = TreeConfig::default();
        if let Some(dir) = std::env::var_os("IIO_SYSFS_DIR") {
            config.sysfs_dir = dir.into();
        }
        if let Some(dir) = std::env::var_os("IIO_DEV_DIR") {
            config.dev_dir = dir.into();
        }
        log::debug!("TreeConfig::from_env() = {:?}", config);
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Ring buffer length, in sample sets.
    pub ring_length: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig { ring_length: DEFAULT_RING_LENGTH }
    }
}
