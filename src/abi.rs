//! Naming conventions of the IIO sysfs ABI.
//!
//! This is the only place that knows how attribute and device node names are spelled;
//! everything else asks for names through these helpers.

use std::path::{Path, PathBuf};

/// Discovery root of the IIO bus.
pub const SYSFS_DIR: &str = "/sys/bus/iio/devices";
/// Directory holding the ring buffer character devices.
pub const DEV_DIR: &str = "/dev/iio";

/// Separator between name segments, e.g. `accel_x_scale`.
pub const SEPARATOR: char = '_';
/// Bus entries containing this character are sub-objects of a device.
pub const SUBOBJECT_SEPARATOR: char = ':';

pub const ATTR_NAME: &str = "name";

pub const MOD_RAW: &str = "raw";
pub const MOD_SCALE: &str = "scale";
pub const MOD_OFFSET: &str = "offset";

/// Marker of the ring buffer control directory, `device0:buffer0`.
pub const BUFFER_MARKER: &str = ":buffer";

pub const RING_LENGTH: &str = "length";
pub const RING_ENABLE: &str = "ring_enable";
pub const RING_BPS: &str = "bps";

pub const SCAN_ELEMENTS_DIR: &str = "scan_elements";
pub const SCAN_EN: &str = "en";
pub const SCAN_BITS: &str = "bits";
pub const SCAN_INDEX: &str = "index";
/// Name of the scan element carrying the capture timestamp.
pub const SCAN_TIMESTAMP: &str = "timestamp";

pub const TRIGGER_DIR: &str = "trigger";
pub const TRIGGER_CURRENT: &str = "current_trigger";

/// Event codes the kernel emits when the ring buffer reaches a fill threshold.
pub const EVENT_CODE_RING_50_FULL: i32 = 200;
pub const EVENT_CODE_RING_75_FULL: i32 = 201;
pub const EVENT_CODE_RING_100_FULL: i32 = 202;

/// `{name}_{postfix}`
pub fn with_postfix(name: &str, postfix: &str) -> String {
    format!("{}{}{}", name, SEPARATOR, postfix)
}

/// Strips `_{postfix}` from `name`, if present.
pub fn strip_postfix<'a>(name: &'a str, postfix: &str) -> Option<&'a str> {
    name.strip_suffix(postfix)?.strip_suffix(SEPARATOR)
}

pub fn attr_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

pub fn scan_elements_dir(buffer_dir: &Path) -> PathBuf {
    buffer_dir.join(SCAN_ELEMENTS_DIR)
}

pub fn trigger_dir(device_dir: &Path) -> PathBuf {
    device_dir.join(TRIGGER_DIR)
}

pub fn ring_event_path(dev_dir: &Path, buffer: u32) -> PathBuf {
    dev_dir.join(format!("ring_event_line{}", buffer))
}

pub fn ring_access_path(dev_dir: &Path, buffer: u32) -> PathBuf {
    dev_dir.join(format!("ring_access{}", buffer))
}

/// Parses the decimal number terminating `name`, e.g. `7` in `device7`.
pub fn trailing_number(name: &str) -> Option<u32> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    name[name.len() - digits..].parse().ok()
}

/// Parses the decimal number starting `name`, e.g. `3` in `03_accel_z`.
pub fn leading_number(name: &str) -> Option<u32> {
    let digits = name.len() - name.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    name[..digits].parse().ok()
}

/// Progressively shorter forms of a channel name, most specific first:
/// `accel_x_y` yields `accel_x_y`, `accel_x`, `accel`.
pub fn name_prefixes(name: &str) -> impl Iterator<Item = &str> {
    let depth = name.split(SEPARATOR).count();
    let mut rest = Some(name);
    (0..depth).map_while(move |_| {
        let current = rest?;
        rest = current.rfind(SEPARATOR).map(|pos| &current[..pos]);
        Some(current)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_postfix() {
        assert_eq!(with_postfix("accel_x", MOD_SCALE), "accel_x_scale");
        assert_eq!(strip_postfix("accel_x_raw", MOD_RAW), Some("accel_x"));
        assert_eq!(strip_postfix("accel_xraw", MOD_RAW), None);
        assert_eq!(strip_postfix("accel_x_en", MOD_RAW), None);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(trailing_number("device12"), Some(12));
        assert_eq!(trailing_number("device0:buffer3"), Some(3));
        assert_eq!(trailing_number("trigger"), None);
        assert_eq!(leading_number("03_accel_z_en"), Some(3));
        assert_eq!(leading_number("accel_z_en"), None);
    }

    #[test]
    fn test_name_prefixes() {
        assert_eq!(name_prefixes("accel_x").collect::<Vec<_>>(), ["accel_x", "accel"]);
        assert_eq!(name_prefixes("in_accel_y").collect::<Vec<_>>(), ["in_accel_y", "in_accel", "in"]);
        assert_eq!(name_prefixes("temp").collect::<Vec<_>>(), ["temp"]);
    }

    #[test]
    fn test_ring_paths() {
        let dev = Path::new("/dev/iio");
        assert_eq!(ring_event_path(dev, 0), Path::new("/dev/iio/ring_event_line0"));
        assert_eq!(ring_access_path(dev, 2), Path::new("/dev/iio/ring_access2"));
    }
}
