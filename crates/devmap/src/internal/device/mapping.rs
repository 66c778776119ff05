use std::cell::OnceCell;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::internal::common::error::fatal;
use crate::internal::device::bus::{BusLocation, BusResolver};
use crate::internal::device::slot::DeviceSlot;

const CACHE_FILE_PREFIX: &str = "gpu_mapping";
const BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";
const BOOT_HEADER_PREFIX: &str = "# boot ";

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct DeviceMappingEntry {
    pub slot_index: usize,
    pub slot_path: String,
    pub bus: BusLocation,
}

/// Assignment of allocator slots to physical devices, indexed by slot index.
///
/// Built once per host boot and never modified afterwards.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct DeviceMappingTable {
    entries: Vec<DeviceMappingEntry>,
}

impl DeviceMappingTable {
    /// Assigns buses to slots in allocator order; slot `i` lands at position `slot.index`.
    pub fn build(slots: &[DeviceSlot], buses: Vec<BusLocation>) -> crate::Result<Self> {
        if slots.len() > buses.len() {
            return fatal(format!(
                "{} GPU slots are configured but the driver reports only {} devices; \
                 are there generic resources besides GPUs?",
                slots.len(),
                buses.len()
            ));
        }

        let mut buses = VecDeque::from(buses);
        let mut entries: Vec<Option<DeviceMappingEntry>> = vec![None; slots.len()];
        for slot in slots {
            if slot.index >= entries.len() {
                return fatal(format!(
                    "Device {} has index {}, which cannot be used as a slot index (slot count {})",
                    slot.path,
                    slot.index,
                    entries.len()
                ));
            }
            if let Some(entry) = &entries[slot.index] {
                return fatal(format!(
                    "Devices {} and {} share slot index {}",
                    entry.slot_path, slot.path, slot.index
                ));
            }
            let Some(bus) = buses.pop_front() else {
                return fatal("Ran out of bus ids while mapping devices".to_string());
            };
            log::debug!(
                "Mapping device {} (slot {}) to bus id {bus}",
                slot.path,
                slot.index
            );
            entries[slot.index] = Some(DeviceMappingEntry {
                slot_index: slot.index,
                slot_path: slot.path.clone(),
                bus,
            });
        }

        // Every index is in range and unique, so all positions are filled
        let entries: Vec<DeviceMappingEntry> = entries.into_iter().flatten().collect();
        if entries.len() != slots.len() {
            return fatal("Device mapping has unfilled slots".to_string());
        }
        Ok(Self { entries })
    }

    /// Parses the cache format: one `<bus>,<slot path>` line per slot, in slot index order.
    /// Lines starting with `#` are ignored.
    pub fn parse(content: &str) -> crate::Result<Self> {
        let mut entries = Vec::new();
        for line in content
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        {
            let Some((bus, slot_path)) = line.split_once(',') else {
                return fatal(format!("Invalid device mapping line `{line}`"));
            };
            let Some(bus) = BusLocation::parse(bus.trim()) else {
                return fatal(format!("Invalid bus id in device mapping line `{line}`"));
            };
            entries.push(DeviceMappingEntry {
                slot_index: entries.len(),
                slot_path: slot_path.trim().to_string(),
                bus,
            });
        }
        Ok(Self { entries })
    }

    pub fn to_cache_string(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{},{}\n", entry.bus, entry.slot_path))
            .collect()
    }

    /// Bounds-checked lookup; an index outside of the table is a fatal inconsistency.
    pub fn get(&self, slot_index: usize) -> crate::Result<&DeviceMappingEntry> {
        match self.entries.get(slot_index) {
            Some(entry) => Ok(entry),
            None => fatal(format!(
                "Slot index {slot_index} is outside of the device mapping (size {})",
                self.entries.len()
            )),
        }
    }

    pub fn entries(&self) -> &[DeviceMappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn mapping_cache_path(state_dir: &Path, hostname: &str) -> PathBuf {
    state_dir.join(format!("{CACHE_FILE_PREFIX}.{hostname}"))
}

fn current_boot_id() -> Option<String> {
    match std::fs::read_to_string(BOOT_ID_PATH) {
        Ok(id) => Some(id.trim().to_string()).filter(|id| !id.is_empty()),
        Err(error) => {
            log::debug!("Cannot read boot id from {BOOT_ID_PATH}: {error}");
            None
        }
    }
}

fn cached_boot_id(content: &str) -> Option<&str> {
    content
        .lines()
        .next()
        .and_then(|line| line.strip_prefix(BOOT_HEADER_PREFIX))
        .map(str::trim)
}

/// Host-wide cache of the [`DeviceMappingTable`].
///
/// The first process on the host that needs the table discovers the buses and writes
/// the cache file; everyone else loads it. The table is memoized for the lifetime of
/// the store.
///
/// When the store knows the boot id, the cache starts with a `# boot <id>` header and a
/// cache written during another boot is discovered again.
pub struct DeviceMappingStore {
    cache_path: PathBuf,
    boot_id: Option<String>,
    table: OnceCell<DeviceMappingTable>,
}

impl DeviceMappingStore {
    pub fn new(cache_path: PathBuf) -> Self {
        Self {
            cache_path,
            boot_id: None,
            table: OnceCell::new(),
        }
    }

    pub fn with_boot_id(mut self, boot_id: Option<String>) -> Self {
        self.boot_id = boot_id;
        self
    }

    pub fn for_host(state_dir: &Path) -> Self {
        let hostname = gethostname::gethostname();
        Self::new(mapping_cache_path(state_dir, &hostname.to_string_lossy()))
            .with_boot_id(current_boot_id())
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn build_or_load(
        &self,
        slots: &[DeviceSlot],
        resolver: &dyn BusResolver,
    ) -> crate::Result<&DeviceMappingTable> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }
        let table = self.load_or_build_locked(slots, resolver)?;
        Ok(self.table.get_or_init(|| table))
    }

    /// Holds an exclusive lock on `<cache>.lock` so that concurrent first-time builders
    /// do not both discover and write; the loser of the race loads the winner's table.
    fn load_or_build_locked(
        &self,
        slots: &[DeviceSlot],
        resolver: &dyn BusResolver,
    ) -> crate::Result<DeviceMappingTable> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        fs2::FileExt::lock_exclusive(&lock_file)?;

        let result = self.load_or_build(slots, resolver);

        if let Err(error) = fs2::FileExt::unlock(&lock_file) {
            log::warn!(
                "Cannot unlock {}: {error}",
                self.lock_path().display()
            );
        }
        result
    }

    fn load_or_build(
        &self,
        slots: &[DeviceSlot],
        resolver: &dyn BusResolver,
    ) -> crate::Result<DeviceMappingTable> {
        let content = match std::fs::read_to_string(&self.cache_path) {
            Ok(content) => Some(content),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => return Err(error.into()),
        };
        match content {
            None => log::info!(
                "No device mapping found at {}, discovering GPUs",
                self.cache_path.display()
            ),
            Some(content) if content.trim().is_empty() => log::warn!(
                "Device mapping {} is empty, discovering GPUs again",
                self.cache_path.display()
            ),
            Some(content) if self.is_from_other_boot(&content) => log::info!(
                "Device mapping {} was written before the last reboot, discovering GPUs again",
                self.cache_path.display()
            ),
            Some(content) => {
                log::debug!(
                    "Loading device mapping from {}",
                    self.cache_path.display()
                );
                return DeviceMappingTable::parse(&content);
            }
        }

        if slots.is_empty() {
            return Err(crate::Error::GenericError(format!(
                "No GPU slots are known, device mapping {} cannot be built",
                self.cache_path.display()
            )));
        }
        let table = DeviceMappingTable::build(slots, resolver.list_attached_buses())?;
        self.persist(&table)?;
        Ok(table)
    }

    fn is_from_other_boot(&self, content: &str) -> bool {
        self.boot_id
            .as_deref()
            .is_some_and(|boot_id| cached_boot_id(content) != Some(boot_id))
    }

    /// Writes into a temporary file next to the cache and renames it into place,
    /// so readers never see a partially written table.
    fn persist(&self, table: &DeviceMappingTable) -> crate::Result<()> {
        let directory = self
            .cache_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(directory)?;
        if let Some(boot_id) = &self.boot_id {
            writeln!(file, "{BOOT_HEADER_PREFIX}{boot_id}")?;
        }
        file.write_all(table.to_cache_string().as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.cache_path)
            .map_err(|error| error.error)?;
        log::info!(
            "Device mapping with {} entries stored in {}",
            table.len(),
            self.cache_path.display()
        );
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.cache_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }
}
