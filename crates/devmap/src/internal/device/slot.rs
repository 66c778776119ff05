use serde::{Deserialize, Serialize};

/// A generic resource slot as seen by the allocator.
///
/// `path` is the device path the allocator believes belongs to the slot. It is stable
/// across reboots, but the driver may have renumbered the physical device behind it,
/// so it is only used as a key into the mapping table.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct DeviceSlot {
    pub path: String,
    pub index: usize,
    #[serde(default)]
    pub requested: bool,
    #[serde(default)]
    pub allocated: bool,
}

impl DeviceSlot {
    pub fn new(path: impl Into<String>, index: usize, allocated: bool) -> Self {
        Self {
            path: path.into(),
            index,
            requested: allocated,
            allocated,
        }
    }

    pub fn requested(mut self, requested: bool) -> Self {
        self.requested = requested;
        self
    }
}
