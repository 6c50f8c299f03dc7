//! Selection of the trigger that paces capture into the ring buffer.

use crate::{abi, attr, Result};
use crate::device::Device;
use crate::sys::AttributeTree;

pub fn get_trigger<T: AttributeTree>(device: &Device<T>) -> Result<String> {
    attr::read_string(device.tree(), &abi::trigger_dir(device.path()), abi::TRIGGER_CURRENT)
}

/// Binds the trigger named `trigger_name`, failing unless the device reports it as bound
/// afterwards.
pub fn set_trigger<T: AttributeTree>(device: &Device<T>, trigger_name: &str) -> Result<()> {
    log::debug!("set_trigger({:?}, {:?})", device.name(), trigger_name);
    attr::write_verify_string(device.tree(), &abi::trigger_dir(device.path()), abi::TRIGGER_CURRENT, trigger_name)
}
