//! Scan elements, and decoding of the packed sample sets they describe.

use std::path::Path;

use crate::{abi, attr, Error, Result};
use crate::device::{Channel, Device, RingBuffer};
use crate::sys::AttributeTree;

const TIMESTAMP_BYTES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanElement {
    pub name: String,
    /// Position of the element within a sample set; lower indices come first.
    pub index: u32,
    pub bits: u32,
    pub enabled: bool,
}

impl ScanElement {
    /// The channel this element carries samples of.
    pub fn channel<'d, T: AttributeTree>(&self, device: &'d Device<T>) -> Result<Option<&'d Channel>> {
        device.channel(&self.name)
    }

    pub fn is_timestamp(&self) -> bool {
        self.name == abi::SCAN_TIMESTAMP
    }
}

impl RingBuffer {
    /// Scan elements of this buffer, ordered by index. Elements whose attributes cannot be
    /// read are skipped.
    pub fn scan_elements<T: AttributeTree>(&self, tree: &T) -> Result<Vec<ScanElement>> {
        let dir = abi::scan_elements_dir(self.path());
        let mut elements = Vec::new();
        for entry in attr::list_children(tree, &dir)? {
            let Some(base) = abi::strip_postfix(&entry, abi::SCAN_EN) else { continue };
            match read_scan_element(tree, &dir, base) {
                Ok(element) => elements.push(element),
                Err(error) => log::warn!("skipping scan element {:?}: {}", entry, error),
            }
        }
        elements.sort_by_key(|element| element.index);
        log::debug!("scan_elements({:?}) = {:?}", self.path(), elements);
        Ok(elements)
    }
}

fn read_u32<T: AttributeTree>(tree: &T, dir: &Path, name: &str) -> Result<u32> {
    let value = attr::read_int(tree, dir, name)?;
    u32::try_from(value).map_err(|_| Error::parse(abi::attr_path(dir, name), format!("{} is out of range", value)))
}

// `03_accel_z` carries its index in the name; otherwise it is in `{base}_index`
fn read_scan_element<T: AttributeTree>(tree: &T, dir: &Path, base: &str) -> Result<ScanElement> {
    let (index, name) = match abi::leading_number(base) {
        Some(index) => {
            let name = base.trim_start_matches(|c: char| c.is_ascii_digit());
            (index, name.strip_prefix(abi::SEPARATOR).unwrap_or(name))
        }
        None => (read_u32(tree, dir, &abi::with_postfix(base, abi::SCAN_INDEX))?, base),
    };
    Ok(ScanElement {
        name: name.to_owned(),
        index,
        bits: read_u32(tree, dir, &abi::with_postfix(base, abi::SCAN_BITS))?,
        enabled: attr::read_int(tree, dir, &abi::with_postfix(base, abi::SCAN_EN))? != 0,
    })
}

/// Bytes a field of `bits` occupies in a sample set: the smallest power of two that holds it.
pub fn storage_bytes(bits: u32) -> usize {
    (bits as usize).div_ceil(8).max(1).next_power_of_two()
}

/// Sign-extends the low `bits` bits of `raw` as a two's complement number.
pub fn sign_extend(raw: u32, bits: u32) -> i32 {
    let shift = 32 - bits.clamp(1, 32);
    ((raw << shift) as i32) >> shift
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleField {
    pub name: String,
    pub bits: u32,
    /// Byte offset within the sample set.
    pub offset: usize,
    pub storage: usize,
    pub scale: f64,
    pub cal_offset: f64,
}

impl SampleField {
    fn extract(&self, set: &[u8]) -> i32 {
        let mut bytes = [0u8; 4];
        bytes[..self.storage].copy_from_slice(&set[self.offset..][..self.storage]);
        sign_extend(u32::from_le_bytes(bytes), self.bits)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    pub timestamp: i64,
    pub raw: Vec<i32>,
    /// `raw * scale + offset` for every enabled field, in layout order.
    pub values: Vec<f64>,
}

/// Geometry of one sample set: the enabled fields in index order, each padded to
/// [`storage_bytes`], followed by an 8-byte aligned `i64` timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleLayout {
    fields: Vec<SampleField>,
    timestamp_offset: usize,
    size: usize,
}

impl SampleLayout {
    /// Builds the layout of `elements`, calibrating each field with the channel of the same
    /// name, or with the modifiers of that name if the device has no such channel.
    pub fn new<T: AttributeTree>(device: &Device<T>, elements: &[ScanElement]) -> Result<SampleLayout> {
        let channels = device.channels()?;
        SampleLayout::build(elements, |name| {
            match channels.iter().find(|channel| channel.name == name) {
                Some(channel) => (channel.scale, channel.offset),
                None => (device.resolve_modifier(name, abi::MOD_SCALE, 1.0),
                         device.resolve_modifier(name, abi::MOD_OFFSET, 0.0)),
            }
        })
    }

    pub(crate) fn build<F>(elements: &[ScanElement], calibration: F) -> Result<SampleLayout>
            where F: Fn(&str) -> (f64, f64) {
        let mut enabled = elements.iter()
            .filter(|element| element.enabled && !element.is_timestamp())
            .collect::<Vec<_>>();
        enabled.sort_by_key(|element| element.index);

        let mut fields = Vec::with_capacity(enabled.len());
        let mut offset = 0;
        for element in enabled {
            if !(1..=32).contains(&element.bits) {
                return Err(Error::parse(abi::with_postfix(&element.name, abi::SCAN_BITS),
                    format!("unsupported field width of {} bits", element.bits)))
            }
            let (scale, cal_offset) = calibration(&element.name);
            let storage = storage_bytes(element.bits);
            fields.push(SampleField {
                name: element.name.clone(),
                bits: element.bits,
                offset,
                storage,
                scale,
                cal_offset,
            });
            offset += storage;
        }
        let timestamp_offset = offset.next_multiple_of(TIMESTAMP_BYTES);
        let layout = SampleLayout {
            fields,
            timestamp_offset,
            size: timestamp_offset + TIMESTAMP_BYTES,
        };
        log::debug!("SampleLayout::build() = {:?}", layout);
        Ok(layout)
    }

    pub fn fields(&self) -> &[SampleField] {
        &self.fields
    }

    pub fn timestamp_offset(&self) -> usize {
        self.timestamp_offset
    }

    /// Size of one sample set, in bytes.
    pub fn set_size(&self) -> usize {
        self.size
    }

    /// Decodes one sample set, or returns `None` if `set` is too short to hold one.
    pub fn decode(&self, set: &[u8]) -> Option<SampleSet> {
        let set = set.get(..self.size)?;
        let raw = self.fields.iter().map(|field| field.extract(set)).collect::<Vec<_>>();
        let values = self.fields.iter().zip(raw.iter())
            .map(|(field, &sample)| sample as f64 * field.scale + field.cal_offset)
            .collect();
        let mut timestamp = [0u8; TIMESTAMP_BYTES];
        timestamp.copy_from_slice(&set[self.timestamp_offset..][..TIMESTAMP_BYTES]);
        Some(SampleSet { timestamp: i64::from_le_bytes(timestamp), raw, values })
    }

    /// Decodes every whole sample set in `data`; a trailing partial set is ignored.
    pub fn decode_all<'a>(&'a self, data: &'a [u8]) -> impl Iterator<Item = SampleSet> + 'a {
        data.chunks_exact(self.size).filter_map(|set| self.decode(set))
    }
}
