//! Static device information cache
//!
//! Assigns a [`DeviceId`] to every identity path it sees and caches the
//! metadata and Device Interface for that device, so repeated activations of
//! the same physical device reuse the same id and interface.

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use super::{DeviceHandle, DeviceInterface, DeviceMetadata, MemoryResource};
use crate::domain::{DeviceError, DeviceId};

#[derive(Default)]
struct DeviceRecord {
    metadata: Option<DeviceMetadata>,
    interface: Option<Arc<dyn DeviceInterface>>,
}

/// Device id assignment plus per-device static info
#[derive(Default)]
pub struct DeviceRegistry {
    ids: HashMap<String, DeviceId>,
    records: HashMap<DeviceId, DeviceRecord>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the device id for `handle`, assigning the next free id the
    /// first time an identity path is seen
    pub fn device_id(&mut self, handle: &dyn DeviceHandle) -> DeviceId {
        let path = handle.identity_path();
        let next = DeviceId(self.ids.len() as u64);
        let id = *self.ids.entry(path).or_insert_with_key(|path| {
            debug!("Registered device {next} at {path}");
            next
        });
        self.records.entry(id).or_default();
        id
    }

    /// Device id previously assigned to `handle`, without registering it
    #[must_use]
    pub fn lookup(&self, handle: &dyn DeviceHandle) -> Option<DeviceId> {
        self.ids.get(&handle.identity_path()).copied()
    }

    /// Re-read static metadata for a device
    ///
    /// A cached Device Interface survives the refresh.
    ///
    /// # Errors
    /// Returns an error if the handle cannot provide its metadata.
    pub fn update_device(
        &mut self,
        id: DeviceId,
        handle: &dyn DeviceHandle,
    ) -> Result<&DeviceMetadata, DeviceError> {
        let metadata = handle.metadata()?;
        debug!(
            "Device {id} ({}): {} PLIO / {} GMIO trace streams, {} memory banks",
            metadata.name,
            metadata.direct_streams,
            metadata.memory_mapped_streams,
            metadata.memory_banks.len()
        );
        let record = self.records.entry(id).or_default();
        Ok(record.metadata.insert(metadata))
    }

    /// Cached metadata, if the device has been updated
    #[must_use]
    pub fn metadata(&self, id: DeviceId) -> Option<&DeviceMetadata> {
        self.records.get(&id)?.metadata.as_ref()
    }

    /// Memory resource `bank` of device `id`
    #[must_use]
    pub fn memory(&self, id: DeviceId, bank: u8) -> Option<&MemoryResource> {
        self.metadata(id)?.memory(bank)
    }

    /// Cached Device Interface
    #[must_use]
    pub fn interface(&self, id: DeviceId) -> Option<Arc<dyn DeviceInterface>> {
        self.records.get(&id)?.interface.clone()
    }

    /// Return the cached Device Interface, opening one through `handle` if
    /// none exists yet
    ///
    /// # Errors
    /// Returns the handle's error if the interface cannot be opened; nothing
    /// is cached in that case.
    pub fn interface_or_open(
        &mut self,
        id: DeviceId,
        handle: &dyn DeviceHandle,
    ) -> Result<Arc<dyn DeviceInterface>, DeviceError> {
        if let Some(intf) = self.interface(id) {
            return Ok(intf);
        }
        let intf = handle.open_interface()?;
        self.records.entry(id).or_default().interface = Some(Arc::clone(&intf));
        Ok(intf)
    }

    /// Number of distinct devices seen
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;

    fn sim(path: &str) -> SimulatedDevice {
        SimulatedDevice::new(
            path,
            DeviceMetadata {
                name: "sim".to_string(),
                direct_streams: 1,
                memory_mapped_streams: 0,
                memory_banks: vec![MemoryResource::new("DDR[0]", 1 << 20)],
                ps_memory_size: 0,
            },
        )
    }

    #[test]
    fn test_same_path_same_id() {
        let mut registry = DeviceRegistry::new();
        let a = sim("/sys/bus/pci/devices/0000:03:00.1");
        let b = sim("/sys/bus/pci/devices/0000:04:00.1");

        let id_a = registry.device_id(&a);
        let id_b = registry.device_id(&b);
        assert_ne!(id_a, id_b);
        assert_eq!(registry.device_id(&a), id_a);
        assert_eq!(registry.device_count(), 2);
    }

    #[test]
    fn test_update_and_memory_lookup() {
        let mut registry = DeviceRegistry::new();
        let dev = sim("/dev/sim0");
        let id = registry.device_id(&dev);
        assert!(registry.metadata(id).is_none());

        registry.update_device(id, &dev).unwrap();
        assert_eq!(registry.memory(id, 0).map(|m| m.capacity), Some(1 << 20));
        assert!(registry.memory(id, 3).is_none());
    }

    #[test]
    fn test_interface_cached_once() {
        let mut registry = DeviceRegistry::new();
        let dev = sim("/dev/sim0");
        let id = registry.device_id(&dev);

        let first = registry.interface_or_open(id, &dev).unwrap();
        let second = registry.interface_or_open(id, &dev).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dev.counters().interfaces_opened(), 1);
    }

    #[test]
    fn test_interface_failure_not_cached() {
        let mut registry = DeviceRegistry::new();
        let dev = sim("/dev/sim0").with_broken_layout("no debug_ip_layout section");
        let id = registry.device_id(&dev);

        assert!(registry.interface_or_open(id, &dev).is_err());
        assert!(registry.interface(id).is_none());
    }
}
