use std::path::Path;

use crate::internal::access::decision::{AccessAction, AccessDecision, AccessScope, DeviceTarget};
use crate::internal::device::bus::BusResolver;
use crate::internal::device::mapping::DeviceMappingTable;
use crate::internal::device::number::{DeviceInspector, DeviceNumber, ResolvedDevice};
use crate::internal::device::slot::DeviceSlot;

/// Translates allocator slots into the devices that currently sit behind them.
pub struct DeviceIdentityResolver<'a> {
    table: &'a DeviceMappingTable,
    buses: &'a dyn BusResolver,
    inspector: &'a dyn DeviceInspector,
}

impl<'a> DeviceIdentityResolver<'a> {
    pub fn new(
        table: &'a DeviceMappingTable,
        buses: &'a dyn BusResolver,
        inspector: &'a dyn DeviceInspector,
    ) -> Self {
        Self {
            table,
            buses,
            inspector,
        }
    }

    pub fn resolve(&self, slot: &DeviceSlot) -> crate::Result<ResolvedDevice> {
        let entry = self.table.get(slot.index)?;
        if entry.slot_path != slot.path {
            log::error!(
                "Device mapping disagrees with the allocation: slot {} is {} in the mapping, \
                 but {} was allocated; using bus id {}",
                slot.index,
                entry.slot_path,
                slot.path,
                entry.bus
            );
        }
        log::debug!("Device {} is mapped to bus id {}", slot.path, entry.bus);

        let Some(real_path) = self.buses.resolve_current_path(&entry.bus) else {
            log::warn!(
                "Bus id {} of device {} cannot be resolved by the driver",
                entry.bus,
                slot.path
            );
            return Ok(ResolvedDevice::Unresolved);
        };
        match self.inspector.device_number(&real_path) {
            Some(device) => {
                log::debug!(
                    "Device {} is currently {} ({device})",
                    slot.path,
                    real_path.display()
                );
                Ok(ResolvedDevice::Present { real_path, device })
            }
            None => {
                log::warn!(
                    "Device node {} of bus id {} is not usable",
                    real_path.display(),
                    entry.bus
                );
                Ok(ResolvedDevice::Unresolved)
            }
        }
    }

    /// Some device of the same class as the one behind `slot`.
    ///
    /// Tried in order: the slot's own path, the driver's control device, and the
    /// current nodes of the other slots in the mapping.
    fn device_class_of(&self, slot: &DeviceSlot) -> Option<DeviceNumber> {
        if let Some(device) = self.inspector.device_number(Path::new(&slot.path)) {
            return Some(device);
        }
        if let Some(device) = self
            .buses
            .control_device_path()
            .and_then(|path| self.inspector.device_number(&path))
        {
            return Some(device);
        }
        self.table
            .entries()
            .iter()
            .filter(|entry| entry.slot_index != slot.index)
            .filter_map(|entry| self.buses.resolve_current_path(&entry.bus))
            .find_map(|path| self.inspector.device_number(&path))
    }

    /// Decides whether the scope may use the device behind `slot`.
    ///
    /// A device that cannot be resolved is always denied, as a whole device class (see
    /// [`Self::device_class_of`]). `None` is returned only when no device of the managed
    /// class can be identified on the host at all; nothing is allowed implicitly then.
    pub fn decide(
        &self,
        slot: &DeviceSlot,
        scope: AccessScope,
    ) -> crate::Result<Option<AccessDecision>> {
        let decision = match self.resolve(slot)? {
            ResolvedDevice::Present { real_path, device } => {
                let action = if slot.allocated {
                    log::debug!(
                        "Allowing access to device {device} ({}) for {scope}",
                        real_path.display()
                    );
                    AccessAction::Allow
                } else {
                    log::debug!(
                        "Not allowing access to device {device} ({}) for {scope}{}",
                        real_path.display(),
                        if slot.requested {
                            ", it was requested but not allocated"
                        } else {
                            ""
                        }
                    );
                    AccessAction::Deny
                };
                Some(AccessDecision {
                    target: DeviceTarget::Device(device),
                    action,
                    scope,
                })
            }
            ResolvedDevice::Unresolved => match self.device_class_of(slot) {
                Some(device) => {
                    log::warn!(
                        "Denying device class {}:{} of unresolved device {} for {scope}",
                        device.kind.as_char(),
                        device.major,
                        slot.path
                    );
                    Some(AccessDecision {
                        target: DeviceTarget::Class {
                            kind: device.kind,
                            major: device.major,
                        },
                        action: AccessAction::Deny,
                        scope,
                    })
                }
                None => {
                    log::warn!(
                        "Device {} is unresolved and no device of its class is known, \
                         it stays denied for {scope}",
                        slot.path
                    );
                    None
                }
            },
        };
        Ok(decision)
    }
}
