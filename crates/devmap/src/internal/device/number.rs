use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use nix::sys::stat::{SFlag, major, minor, stat};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum DeviceKind {
    Char,
    Block,
}

impl DeviceKind {
    pub fn as_char(&self) -> char {
        match self {
            DeviceKind::Char => 'c',
            DeviceKind::Block => 'b',
        }
    }
}

/// Kernel identity of a device node (`st_rdev` of its inode).
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DeviceNumber {
    pub kind: DeviceKind,
    pub major: u32,
    pub minor: u32,
}

impl DeviceNumber {
    pub fn char(major: u32, minor: u32) -> Self {
        Self {
            kind: DeviceKind::Char,
            major,
            minor,
        }
    }
}

impl Display for DeviceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}:{}", self.kind.as_char(), self.major, self.minor)
    }
}

/// Looks up the device number behind a path.
///
/// Returns `None` when the path does not exist or is not a character/block device.
pub trait DeviceInspector {
    fn device_number(&self, path: &Path) -> Option<DeviceNumber>;
}

/// Reads device numbers with `stat(2)`.
#[derive(Default, Debug, Clone, Copy)]
pub struct SysDeviceInspector;

impl DeviceInspector for SysDeviceInspector {
    fn device_number(&self, path: &Path) -> Option<DeviceNumber> {
        let st = match stat(path) {
            Ok(st) => st,
            Err(error) => {
                log::debug!("Cannot stat device {}: {error}", path.display());
                return None;
            }
        };
        let file_type = SFlag::from_bits_truncate(st.st_mode & SFlag::S_IFMT.bits());
        let kind = if file_type == SFlag::S_IFCHR {
            DeviceKind::Char
        } else if file_type == SFlag::S_IFBLK {
            DeviceKind::Block
        } else {
            log::debug!("{} is not a device node", path.display());
            return None;
        };
        Some(DeviceNumber {
            kind,
            major: major(st.st_rdev) as u32,
            minor: minor(st.st_rdev) as u32,
        })
    }
}

/// Current identity of a device slot, as reported by the live driver.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResolvedDevice {
    Present {
        real_path: PathBuf,
        device: DeviceNumber,
    },
    /// The driver does not know the bus anymore (detached device, stale mapping).
    Unresolved,
}

impl ResolvedDevice {
    pub fn major(&self) -> Option<u32> {
        match self {
            ResolvedDevice::Present { device, .. } => Some(device.major),
            ResolvedDevice::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolvedDevice::Present { .. })
    }
}
