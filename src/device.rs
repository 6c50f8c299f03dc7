use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use crate::{abi, attr, Error, Result};
use crate::sys::AttributeTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensorKind {
    Accel,
    Gyro,
    Magn,
    Temp,
    Pressure,
    Voltage,
}

/// Channel name prefixes, checked in order. An indexed prefix only matches when a channel
/// number follows it.
const SENSOR_PREFIXES: [(&str, SensorKind, bool); 7] = [
    ("accel",    SensorKind::Accel,    false),
    ("gyro",     SensorKind::Gyro,     false),
    ("magn",     SensorKind::Magn,     false),
    ("temp",     SensorKind::Temp,     false),
    ("pressure", SensorKind::Pressure, false),
    ("voltage",  SensorKind::Voltage,  false),
    ("in",       SensorKind::Voltage,  true), // in0, in1, ...
];

impl SensorKind {
    /// Classify a channel by the longest prefix of its name found in the prefix table;
    /// of prefixes of equal length, the one listed first wins.
    pub fn classify(channel_name: &str) -> Option<SensorKind> {
        let mut best: Option<(&str, SensorKind)> = None;
        for &(prefix, kind, indexed) in SENSOR_PREFIXES.iter() {
            let Some(rest) = channel_name.strip_prefix(prefix) else { continue };
            if indexed && !rest.starts_with(|c: char| c.is_ascii_digit()) {
                continue
            }
            if best.map_or(true, |(best, _)| prefix.len() > best.len()) {
                best = Some((prefix, kind));
            }
        }
        best.map(|(_, kind)| kind)
    }

    pub fn header(self) -> &'static str {
        match self {
            Self::Accel    => "Accelerometers",
            Self::Gyro     => "Gyroscopes",
            Self::Magn     => "Magnetometers",
            Self::Temp     => "Temperatures",
            Self::Pressure => "Barometers",
            Self::Voltage  => "Voltages",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Accel    => "g",
            Self::Gyro     => "rad/s",
            Self::Magn     => "Gs",
            Self::Temp     => "°C",
            Self::Pressure => "hPa",
            Self::Voltage  => "V",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub kind: SensorKind,
    pub raw: f64,
    pub scale: f64,
    pub offset: f64,
    /// Number of the device this channel belongs to.
    pub device: u32,
}

impl Channel {
    /// The last raw reading in physical units.
    pub fn value(&self) -> f64 {
        (self.raw + self.offset) * self.scale
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer {
    number: u32,
    path: PathBuf,
    event_path: PathBuf,
    access_path: PathBuf,
    device: u32,
}

impl RingBuffer {
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Control directory, holding `length`, `ring_enable` and friends.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Node delivering fill-threshold events.
    pub fn event_path(&self) -> &Path {
        &self.event_path
    }

    /// Node delivering packed sample sets.
    pub fn access_path(&self) -> &Path {
        &self.access_path
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn bytes_per_sample<T: AttributeTree>(&self, tree: &T) -> Result<i64> {
        attr::read_int(tree, &self.path, abi::RING_BPS)
    }

    pub fn length<T: AttributeTree>(&self, tree: &T) -> Result<i64> {
        attr::read_int(tree, &self.path, abi::RING_LENGTH)
    }

    pub fn is_enabled<T: AttributeTree>(&self, tree: &T) -> Result<bool> {
        Ok(attr::read_int(tree, &self.path, abi::RING_ENABLE)? != 0)
    }
}

/// An IIO device. Channels and the ring buffer are discovered on first use and
/// kept for the lifetime of the device.
#[derive(Debug)]
pub struct Device<T: AttributeTree> {
    tree: T,
    name: String,
    path: PathBuf,
    number: u32,
    channels: OnceCell<Vec<Channel>>,
    ring_buffer: OnceCell<Option<RingBuffer>>,
}

impl<T: AttributeTree> Device<T> {
    /// Opens the device whose attributes live in `path`, without consulting the bus.
    pub fn open_path(tree: T, path: impl Into<PathBuf>) -> Result<Device<T>> {
        let path = path.into();
        if !tree.is_dir(&path) {
            return Err(Error::NotFound { path })
        }
        let Some(number) = path.file_name()
                .and_then(|dir_name| abi::trailing_number(&dir_name.to_string_lossy())) else {
            return Err(Error::parse(path, "directory name carries no device number"))
        };
        let name = attr::read_string(&tree, &path, abi::ATTR_NAME)?;
        log::debug!("open_path({:?}) = {:?} #{}", path, name, number);
        Ok(Device {
            tree,
            name,
            path,
            number,
            channels: OnceCell::new(),
            ring_buffer: OnceCell::new(),
        })
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Reads `{channel}_{modifier}`, falling back to the attribute shared by the channel
    /// family (`accel_x_scale`, then `accel_scale`), and finally to `default`.
    pub fn resolve_modifier(&self, channel_name: &str, modifier: &str, default: f64) -> f64 {
        for name in abi::name_prefixes(channel_name) {
            match attr::read_float(&self.tree, &self.path, &abi::with_postfix(name, modifier)) {
                Ok(value) => return value,
                Err(error) => log::trace!("resolve_modifier({:?}): {}", name, error),
            }
        }
        default
    }

    /// Channels with a raw attribute, sorted by name.
    pub fn channels(&self) -> Result<&[Channel]> {
        if let Some(channels) = self.channels.get() {
            return Ok(channels)
        }
        let channels = self.discover_channels()?;
        Ok(self.channels.get_or_init(|| channels))
    }

    pub fn channel(&self, name: &str) -> Result<Option<&Channel>> {
        Ok(self.channels()?.iter().find(|channel| channel.name == name))
    }

    fn discover_channels(&self) -> Result<Vec<Channel>> {
        let mut channels = Vec::new();
        for attr_name in attr::list_children(&self.tree, &self.path)? {
            let Some(name) = abi::strip_postfix(&attr_name, abi::MOD_RAW) else { continue };
            let Some(kind) = SensorKind::classify(name) else {
                let error = Error::parse(abi::attr_path(&self.path, &attr_name),
                    "channel name matches no sensor category");
                log::warn!("skipping channel: {}", error);
                continue
            };
            channels.push(Channel {
                name: name.to_owned(),
                kind,
                raw: self.resolve_modifier(name, abi::MOD_RAW, 1.0),
                scale: self.resolve_modifier(name, abi::MOD_SCALE, 1.0),
                offset: self.resolve_modifier(name, abi::MOD_OFFSET, 0.0),
                device: self.number,
            });
        }
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels.dedup_by(|a, b| a.name == b.name);
        log::debug!("channels({:?}) = {:?}",
            self.name, channels.iter().map(|channel| &channel.name).collect::<Vec<_>>());
        Ok(channels)
    }

    /// The ring buffer of this device, if it has one.
    pub fn ring_buffer(&self) -> Result<Option<&RingBuffer>> {
        if let Some(ring_buffer) = self.ring_buffer.get() {
            return Ok(ring_buffer.as_ref())
        }
        let ring_buffer = self.discover_ring_buffer()?;
        Ok(self.ring_buffer.get_or_init(|| ring_buffer).as_ref())
    }

    fn discover_ring_buffer(&self) -> Result<Option<RingBuffer>> {
        let mut entries = attr::list_children(&self.tree, &self.path)?;
        entries.sort();
        for entry in entries {
            let Some((_, suffix)) = entry.split_once(abi::BUFFER_MARKER) else { continue };
            let Ok(number) = suffix.parse::<u32>() else {
                log::warn!("skipping ring buffer {:?}: no buffer number", entry);
                continue
            };
            let ring_buffer = RingBuffer {
                number,
                path: abi::attr_path(&self.path, &entry),
                event_path: abi::ring_event_path(self.tree.dev_dir(), number),
                access_path: abi::ring_access_path(self.tree.dev_dir(), number),
                device: self.number,
            };
            log::debug!("ring_buffer({:?}) = {:?}", self.name, ring_buffer);
            return Ok(Some(ring_buffer))
        }
        Ok(None)
    }
}

/// The devices on the IIO bus.
#[derive(Debug, Clone)]
pub struct Bus<T: AttributeTree> {
    tree: T,
}

#[cfg(unix)]
impl Bus<crate::sys::SysfsTree> {
    /// The system bus, with locations taken from [`crate::TreeConfig::from_env`].
    pub fn open() -> Bus<crate::sys::SysfsTree> {
        Bus::with_tree(crate::sys::SysfsTree::new(&crate::TreeConfig::from_env()))
    }
}

impl<T: AttributeTree + Clone> Bus<T> {
    pub fn with_tree(tree: T) -> Bus<T> {
        Bus { tree }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    /// Every top-level device on the bus, ordered by device number. Entries that cannot be
    /// opened are skipped.
    pub fn list_devices(&self) -> Result<Vec<Device<T>>> {
        let bus_dir = self.tree.bus_dir();
        let mut devices = Vec::new();
        for entry in attr::list_children(&self.tree, bus_dir)? {
            if entry.contains(abi::SUBOBJECT_SEPARATOR) {
                continue
            }
            match Device::open_path(self.tree.clone(), abi::attr_path(bus_dir, &entry)) {
                Ok(device) => devices.push(device),
                Err(error) => log::warn!("skipping device {:?}: {}", entry, error),
            }
        }
        devices.sort_by(|a, b| (a.number, &a.path).cmp(&(b.number, &b.path)));
        Ok(devices)
    }

    pub fn open_device_by_name(&self, name: &str) -> Result<Device<T>> {
        self.list_devices()?
            .into_iter()
            .find(|device| device.name == name)
            .ok_or_else(|| Error::NotFound { path: abi::attr_path(self.tree.bus_dir(), name) })
    }

    pub fn open_device_path(&self, path: impl Into<PathBuf>) -> Result<Device<T>> {
        Device::open_path(self.tree.clone(), path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixture::{self, BUS};
    use crate::sys::MemoryTree;

    #[test]
    fn test_classify() {
        assert_eq!(SensorKind::classify("accel_x"), Some(SensorKind::Accel));
        assert_eq!(SensorKind::classify("gyro_z"), Some(SensorKind::Gyro));
        assert_eq!(SensorKind::classify("magn_y"), Some(SensorKind::Magn));
        assert_eq!(SensorKind::classify("temp"), Some(SensorKind::Temp));
        assert_eq!(SensorKind::classify("pressure0"), Some(SensorKind::Pressure));
        assert_eq!(SensorKind::classify("in0"), Some(SensorKind::Voltage));
        assert_eq!(SensorKind::classify("voltage1"), Some(SensorKind::Voltage));
        assert_eq!(SensorKind::classify("illuminance0"), None);
        assert_eq!(SensorKind::classify(""), None);
        assert_eq!(SensorKind::classify("in12"), Some(SensorKind::Voltage));
        assert_eq!(SensorKind::classify("in_accel_x"), None);
        assert_eq!(SensorKind::classify("incli_x"), None);
        assert_eq!(SensorKind::classify("intensity_both"), None);
        assert_eq!(SensorKind::classify("in"), None);
    }

    #[test]
    fn test_single_device_catalog() {
        let tree = MemoryTree::new(BUS, fixture::DEV);
        tree.insert_attr(format!("{BUS}/device0/name"), "imu0\n");
        tree.insert_attr(format!("{BUS}/device0/accel_x_raw"), "12\n");
        tree.insert_attr(format!("{BUS}/device0/accel_x_scale"), "0.01\n");
        tree.insert_attr(format!("{BUS}/device0/accel_x_offset"), "0\n");
        tree.insert_dir(format!("{BUS}/device0/device0:buffer0"));

        let bus = Bus::with_tree(tree);
        let devices = bus.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.name(), "imu0");
        assert_eq!(device.number(), 0);

        let channels = device.channels().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "accel_x");
        assert_eq!(channels[0].kind, SensorKind::Accel);
        assert_eq!(channels[0].raw, 12.0);
        assert_eq!(channels[0].scale, 0.01);
        assert_eq!(channels[0].offset, 0.0);

        let ring_buffer = device.ring_buffer().unwrap().unwrap();
        assert_eq!(ring_buffer.number(), 0);
        assert_eq!(ring_buffer.path(), Path::new(&format!("{BUS}/device0/device0:buffer0")));
        assert_eq!(ring_buffer.event_path(), Path::new("/dev/iio/ring_event_line0"));
        assert_eq!(ring_buffer.access_path(), Path::new("/dev/iio/ring_access0"));
    }

    #[test]
    fn test_list_devices_skips_subobjects() {
        let bus = Bus::with_tree(fixture::imu_tree());
        let devices = bus.list_devices().unwrap();
        let names = devices.iter().map(|device| device.name()).collect::<Vec<_>>();
        assert_eq!(names, ["imu0", "baro1"]);
    }

    #[test]
    fn test_list_devices_skips_unreadable() {
        let tree = fixture::imu_tree();
        tree.remove(format!("{BUS}/device1/name"));
        let devices = Bus::with_tree(tree).list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name(), "imu0");
    }

    #[test]
    fn test_unnumbered_entry_skipped() {
        let tree = fixture::imu_tree();
        tree.insert_attr(format!("{BUS}/iio_sysfs_trigger/name"), "iio_sysfs_trigger\n");
        let bus = Bus::with_tree(tree);
        let devices = bus.list_devices().unwrap();
        let numbers = devices.iter().map(|device| device.number()).collect::<Vec<_>>();
        assert_eq!(numbers, [0, 1]);
        assert!(matches!(bus.open_device_path(format!("{BUS}/iio_sysfs_trigger")), Err(Error::Parse { .. })));
        assert!(matches!(bus.open_device_by_name("iio_sysfs_trigger"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_open_device() {
        let bus = Bus::with_tree(fixture::imu_tree());
        assert_eq!(bus.open_device_by_name("baro1").unwrap().number(), 1);
        assert!(matches!(bus.open_device_by_name("nope"), Err(Error::NotFound { .. })));
        let device = bus.open_device_path(format!("{BUS}/device0")).unwrap();
        assert_eq!(device.name(), "imu0");
        assert!(matches!(bus.open_device_path(format!("{BUS}/device9")), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_channels_sorted_and_cached() {
        let bus = Bus::with_tree(fixture::imu_tree());
        let device = bus.open_device_by_name("imu0").unwrap();
        let first = device.channels().unwrap();
        let names = first.iter().map(|channel| channel.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["accel_x", "accel_y", "temp"]);

        // later changes to the tree are not picked up
        bus.tree().insert_attr(format!("{BUS}/device0/accel_z_raw"), "1\n");
        let second = device.channels().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_unclassified_channel_excluded() {
        let tree = fixture::imu_tree();
        tree.insert_attr(format!("{BUS}/device0/illuminance0_raw"), "7\n");
        let device = Bus::with_tree(tree).open_device_by_name("imu0").unwrap();
        let channels = device.channels().unwrap();
        assert!(channels.iter().all(|channel| channel.name != "illuminance0"));
        assert_eq!(channels.len(), 3);
    }

    #[test]
    fn test_modifier_fallback() {
        let device = Bus::with_tree(fixture::imu_tree()).open_device_by_name("imu0").unwrap();
        // accel_x has its own scale, accel_y inherits accel_scale
        assert_eq!(device.resolve_modifier("accel_x", "scale", 1.0), 0.01);
        assert_eq!(device.resolve_modifier("accel_y", "scale", 1.0), 0.5);
        assert_eq!(device.resolve_modifier("accel_y", "offset", 0.0), 0.0);
        assert_eq!(device.resolve_modifier("temp", "offset", 0.0), -10.0);
        assert_eq!(device.resolve_modifier("temp", "scale", 1.0), 1.0);

        let temp = device.channel("temp").unwrap().unwrap();
        assert_eq!(temp.value(), (300.0 - 10.0) * 1.0);
    }

    #[test]
    fn test_ring_buffer_attributes() {
        let device = Bus::with_tree(fixture::imu_tree()).open_device_by_name("imu0").unwrap();
        let ring_buffer = device.ring_buffer().unwrap().unwrap();
        assert_eq!(ring_buffer.bytes_per_sample(device.tree()).unwrap(), 2);
        assert_eq!(ring_buffer.length(device.tree()).unwrap(), 0);
        assert!(!ring_buffer.is_enabled(device.tree()).unwrap());

        let baro = Bus::with_tree(fixture::imu_tree()).open_device_by_name("baro1").unwrap();
        assert!(baro.ring_buffer().unwrap().is_none());
    }
}
