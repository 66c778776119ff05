use std::fmt::{Display, Formatter};
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::internal::common::utils::{format_comma_delimited, read_at_most};

pub const DEFAULT_DRIVER_ROOT: &str = "/proc/driver/nvidia/gpus";
pub const DEFAULT_DEVICE_PREFIX: &str = "/dev/nvidia";

const INFORMATION_FILE: &str = "information";
const CONTROL_DEVICE_SUFFIX: &str = "ctl";
const DEVICE_MINOR_KEY: &str = "Device Minor";
/// The information block is a handful of lines, anything longer is not what we expect.
const INFORMATION_SIZE_LIMIT: usize = 64 * 1024;

/// PCI location of a device (`domain:bus:device.function`, e.g. `0000:3b:00.0`).
#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct BusLocation(String);

impl BusLocation {
    /// Accepts the `DDDD:BB:DD.F` shape that the driver uses for its directories.
    pub fn parse(value: &str) -> Option<Self> {
        let bytes = value.as_bytes();
        let valid = bytes.len() >= 12
            && bytes[4] == b':'
            && bytes[7] == b':'
            && bytes[10] == b'.'
            && value
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.');
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BusLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live view of the GPU driver.
///
/// Nothing is cached, every call asks the driver again.
pub trait BusResolver {
    /// Bus locations of all devices currently attached to the driver.
    /// An unavailable driver interface yields an empty list.
    fn list_attached_buses(&self) -> Vec<BusLocation>;

    /// Current device node of the device at `bus`, or `None` if the driver does not
    /// report it (detached device, missing field).
    fn resolve_current_path(&self, bus: &BusLocation) -> Option<PathBuf>;

    /// Node of the driver's control device, which shares the major number of the GPUs.
    fn control_device_path(&self) -> Option<PathBuf> {
        None
    }
}

/// Reads the NVIDIA driver's procfs tree (`/proc/driver/nvidia/gpus/<bus>/information`).
#[derive(Debug, Clone)]
pub struct NvidiaProcResolver {
    driver_root: PathBuf,
    device_prefix: String,
}

impl NvidiaProcResolver {
    pub fn new(driver_root: PathBuf, device_prefix: String) -> Self {
        Self {
            driver_root,
            device_prefix,
        }
    }

    pub fn driver_root(&self) -> &Path {
        &self.driver_root
    }

    fn read_information(&self, bus: &BusLocation) -> std::io::Result<String> {
        let path = self.driver_root.join(bus.as_str()).join(INFORMATION_FILE);
        let file = File::open(path)?;
        let content = read_at_most(file, INFORMATION_SIZE_LIMIT)?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }
}

impl BusResolver for NvidiaProcResolver {
    fn list_attached_buses(&self) -> Vec<BusLocation> {
        let entries = match std::fs::read_dir(&self.driver_root) {
            Ok(entries) => entries,
            Err(error) => {
                log::debug!(
                    "Cannot list NVIDIA bus ids in {}: {error}",
                    self.driver_root.display()
                );
                return Vec::new();
            }
        };
        let mut buses: Vec<BusLocation> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let bus = BusLocation::parse(&name);
                if bus.is_none() {
                    log::debug!("Ignoring driver entry {name}, it is not a bus id");
                }
                bus
            })
            .collect();
        buses.sort();
        log::debug!(
            "Found {} bus ids: {}",
            buses.len(),
            format_comma_delimited(&buses)
        );
        buses
    }

    fn control_device_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from(format!("{}{CONTROL_DEVICE_SUFFIX}", self.device_prefix)))
    }

    fn resolve_current_path(&self, bus: &BusLocation) -> Option<PathBuf> {
        let information = match self.read_information(bus) {
            Ok(information) => information,
            Err(error) => {
                log::debug!("No driver information for bus id {bus}: {error}");
                return None;
            }
        };
        let minor = parse_device_minor(&information);
        if minor.is_none() {
            log::debug!("Driver information for bus id {bus} has no device minor");
        }
        minor.map(|minor| {
            log::debug!("Bus id {bus} is currently device minor {minor}");
            PathBuf::from(format!("{}{minor}", self.device_prefix))
        })
    }
}

/// Finds the `Device Minor` value in the driver's key/value information block.
///
/// Example of the block:
/// ```text
/// Model:           Tesla V100-SXM2-16GB
/// IRQ:             95
/// GPU UUID:        GPU-d2a5b1e0-1b2c-3d4e-5f60-718293a4b5c6
/// Device Minor:    2
/// Bus Location:    0000:3b:00.0
/// ```
fn parse_device_minor(information: &str) -> Option<u32> {
    information.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == DEVICE_MINOR_KEY {
            value.trim().parse::<u32>().ok()
        } else {
            None
        }
    })
}
