//! Attribute trees shared by the unit tests.

use crate::sys::MemoryTree;

pub const BUS: &str = "/sys/bus/iio/devices";
pub const DEV: &str = "/dev/iio";
pub const RING: &str = "device0:buffer0";

/// `imu0` with two accelerometer axes, a thermometer and a ring buffer, plus `baro1`
/// without one.
pub fn imu_tree() -> MemoryTree {
    let tree = MemoryTree::new(BUS, DEV);
    let imu = format!("{BUS}/device0");
    tree.insert_attr(format!("{imu}/name"), "imu0\n");
    tree.insert_attr(format!("{imu}/accel_x_raw"), "100\n");
    tree.insert_attr(format!("{imu}/accel_x_scale"), "0.01\n");
    tree.insert_attr(format!("{imu}/accel_x_offset"), "0\n");
    tree.insert_attr(format!("{imu}/accel_y_raw"), "-50\n");
    tree.insert_attr(format!("{imu}/accel_scale"), "0.5\n");
    tree.insert_attr(format!("{imu}/temp_raw"), "300\n");
    tree.insert_attr(format!("{imu}/temp_offset"), "-10\n");
    tree.insert_attr(format!("{imu}/sampling_frequency"), "100\n");
    tree.insert_attr(format!("{imu}/trigger/current_trigger"), "imu0-dev0\n");

    let ring = format!("{imu}/{RING}");
    tree.insert_attr(format!("{ring}/length"), "0\n");
    tree.insert_attr(format!("{ring}/ring_enable"), "0\n");
    tree.insert_attr(format!("{ring}/bps"), "2\n");
    let scan = format!("{ring}/scan_elements");
    for (entry, bits, enabled) in [
        ("00_accel_x", 14, 1),
        ("01_accel_y", 14, 1),
        ("02_temp", 12, 0),
        ("03_timestamp", 64, 1),
    ] {
        tree.insert_attr(format!("{scan}/{entry}_bits"), format!("{bits}\n"));
        tree.insert_attr(format!("{scan}/{entry}_en"), format!("{enabled}\n"));
    }
    // the bus also lists device sub-objects
    tree.insert_dir(format!("{BUS}/{RING}"));

    let baro = format!("{BUS}/device1");
    tree.insert_attr(format!("{baro}/name"), "baro1\n");
    tree.insert_attr(format!("{baro}/pressure0_raw"), "1013\n");
    tree
}

/// One sample set of [`imu_tree`]: two 14-bit fields and a timestamp.
pub fn sample_set(accel_x: u16, accel_y: u16, timestamp: i64) -> Vec<u8> {
    let mut set = Vec::new();
    set.extend(accel_x.to_le_bytes());
    set.extend(accel_y.to_le_bytes());
    set.extend([0; 4]);
    set.extend(timestamp.to_le_bytes());
    set
}
