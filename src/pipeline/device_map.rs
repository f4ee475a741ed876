//! Device path to volume mapping rebuilt during restore.

use std::collections::BTreeMap;

use crate::cloud::BlockDevice;

/// Volume restored into one device slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSlot {
    /// Restored volume.
    pub volume_id: String,
    /// Whether the original volume was bootable.
    pub bootable: bool,
}

/// Restored volumes keyed by the device path their source occupied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceMap {
    slots: BTreeMap<String, DeviceSlot>,
}

impl DeviceMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `volume_id` at `device`, returning any slot it replaced.
    pub fn insert(
        &mut self,
        device: impl Into<String>,
        volume_id: impl Into<String>,
        bootable: bool,
    ) -> Option<DeviceSlot> {
        self.slots.insert(
            device.into(),
            DeviceSlot {
                volume_id: volume_id.into(),
                bootable,
            },
        )
    }

    /// Returns the volume restored into `device`.
    #[must_use]
    pub fn volume_for(&self, device: &str) -> Option<&str> {
        self.slots.get(device).map(|slot| slot.volume_id.as_str())
    }

    /// Number of mapped devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no device has been mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates `(device, volume id)` pairs in device order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slots
            .iter()
            .map(|(device, slot)| (device.as_str(), slot.volume_id.as_str()))
    }

    /// Device the replacement server boots from: the first bootable slot,
    /// otherwise the lowest device path.
    #[must_use]
    pub fn boot_device(&self) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.bootable)
            .or_else(|| self.slots.iter().next())
            .map(|(device, _)| device.as_str())
    }

    /// Builds the block-device mapping, boot volume first.
    ///
    /// Restored volumes outlive the server, so none is deleted on
    /// termination.
    #[must_use]
    pub fn block_devices(&self) -> Vec<BlockDevice> {
        let boot = self.boot_device();
        let mut devices: Vec<BlockDevice> = self
            .slots
            .iter()
            .map(|(device, slot)| BlockDevice {
                volume_id: slot.volume_id.clone(),
                device_name: device.clone(),
                boot_index: (Some(device.as_str()) == boot).then_some(0),
                delete_on_termination: false,
            })
            .collect();
        devices.sort_by_key(|device| device.boot_index.is_none());
        devices
    }
}
