use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::internal::cgroup::{CgroupTree, Instantiated};
use crate::internal::device::bus::{BusLocation, BusResolver};
use crate::internal::device::number::{DeviceInspector, DeviceNumber};
use crate::internal::device::slot::DeviceSlot;

pub const NVIDIA_MAJOR: u32 = 195;

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn bus(value: &str) -> BusLocation {
    BusLocation::parse(value).unwrap()
}

/// Node with `count` GPUs, `/dev/nvidia<i>` is slot `i`.
pub fn gpu_slots(allocated: &[bool]) -> Vec<DeviceSlot> {
    allocated
        .iter()
        .enumerate()
        .map(|(index, allocated)| {
            DeviceSlot::new(format!("/dev/nvidia{index}"), index, *allocated).requested(true)
        })
        .collect()
}

/// Driver with a fixed set of buses; each bus reports a device minor or nothing.
pub struct FakeBusResolver {
    buses: Vec<(BusLocation, Option<u32>)>,
    list_calls: Cell<usize>,
}

impl FakeBusResolver {
    pub fn new(buses: &[(&str, Option<u32>)]) -> Self {
        Self {
            buses: buses
                .iter()
                .map(|(location, minor)| (bus(location), *minor))
                .collect(),
            list_calls: Cell::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }
}

impl BusResolver for FakeBusResolver {
    fn list_attached_buses(&self) -> Vec<BusLocation> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.buses.iter().map(|(bus, _)| bus.clone()).collect()
    }

    fn resolve_current_path(&self, bus: &BusLocation) -> Option<PathBuf> {
        self.buses
            .iter()
            .find(|(b, _)| b == bus)
            .and_then(|(_, minor)| *minor)
            .map(|minor| PathBuf::from(format!("/dev/nvidia{minor}")))
    }

    fn control_device_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/dev/nvidiactl"))
    }
}

#[derive(Default)]
pub struct FakeInspector {
    devices: HashMap<PathBuf, DeviceNumber>,
}

impl FakeInspector {
    /// `/dev/nvidia0..count` and `/dev/nvidiactl` with the NVIDIA major number.
    pub fn nvidia(count: u32) -> Self {
        let mut devices: HashMap<PathBuf, DeviceNumber> = (0..count)
            .map(|minor| {
                (
                    PathBuf::from(format!("/dev/nvidia{minor}")),
                    DeviceNumber::char(NVIDIA_MAJOR, minor),
                )
            })
            .collect();
        devices.insert(
            PathBuf::from("/dev/nvidiactl"),
            DeviceNumber::char(NVIDIA_MAJOR, 255),
        );
        Self { devices }
    }

    /// Same inspector with the node at `path` gone.
    pub fn without(mut self, path: &str) -> Self {
        self.devices.remove(Path::new(path));
        self
    }
}

impl DeviceInspector for FakeInspector {
    fn device_number(&self, path: &Path) -> Option<DeviceNumber> {
        self.devices.get(path).copied()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CgroupOp {
    Instantiate(String),
    Lock(String),
    Unlock(String),
    SetParam(String, String, String),
    AddPids(String, Vec<u32>),
    Delete(String),
}

impl Display for CgroupOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CgroupOp::Instantiate(path) => write!(f, "instantiate {path}"),
            CgroupOp::Lock(path) => write!(f, "lock {path}"),
            CgroupOp::Unlock(path) => write!(f, "unlock {path}"),
            CgroupOp::SetParam(path, name, value) => write!(f, "{path}: {name} {value}"),
            CgroupOp::AddPids(path, pids) => write!(f, "{path}: add {pids:?}"),
            CgroupOp::Delete(path) => write!(f, "delete {path}"),
        }
    }
}

#[derive(Default)]
pub struct TreeState {
    pub groups: BTreeSet<String>,
    pub ops: Vec<CgroupOp>,
    pub pids: HashMap<String, Vec<u32>>,
    pub fail_instantiate: Option<String>,
    pub fail_delete: Option<String>,
    pub fail_lock: bool,
    pub fail_params: bool,
    pub fail_add_pids: bool,
}

/// In-memory cgroup hierarchy that records every operation in order.
#[derive(Default, Clone)]
pub struct RecordingCgroupTree {
    state: Rc<RefCell<TreeState>>,
}

pub struct RecordedLock {
    state: Rc<RefCell<TreeState>>,
    path: String,
}

impl Drop for RecordedLock {
    fn drop(&mut self) {
        self.state
            .borrow_mut()
            .ops
            .push(CgroupOp::Unlock(self.path.clone()));
    }
}

impl RecordingCgroupTree {
    pub fn with_groups(groups: &[&str]) -> Self {
        let tree = Self::default();
        tree.state
            .borrow_mut()
            .groups
            .extend(groups.iter().map(|g| g.to_string()));
        tree
    }

    pub fn state(&self) -> std::cell::RefMut<'_, TreeState> {
        self.state.borrow_mut()
    }

    pub fn ops(&self) -> Vec<CgroupOp> {
        self.state.borrow().ops.clone()
    }

    /// Operation log, one operation per line.
    pub fn log(&self) -> String {
        self.state
            .borrow()
            .ops
            .iter()
            .map(|op| op.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn has_group(&self, path: &str) -> bool {
        self.state.borrow().groups.contains(path)
    }

    /// `<param> <value>` lines written into the group, in order.
    pub fn params(&self, path: &str) -> Vec<String> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                CgroupOp::SetParam(p, name, value) if p == path => {
                    Some(format!("{name} {value}"))
                }
                _ => None,
            })
            .collect()
    }
}

impl CgroupTree for RecordingCgroupTree {
    type Lock = RecordedLock;

    fn instantiate(&self, path: &str, _owner: Option<(u32, u32)>) -> crate::Result<Instantiated> {
        let mut state = self.state.borrow_mut();
        state.ops.push(CgroupOp::Instantiate(path.to_string()));
        if state.fail_instantiate.as_deref() == Some(path) {
            return Err(crate::Error::CgroupError(format!("cannot create {path}")));
        }
        if state.groups.insert(path.to_string()) {
            Ok(Instantiated::Created)
        } else {
            Ok(Instantiated::Existing)
        }
    }

    fn lock(&self, path: &str) -> crate::Result<Self::Lock> {
        let mut state = self.state.borrow_mut();
        if state.fail_lock {
            return Err(crate::Error::LockError(format!("{path} is locked")));
        }
        state.ops.push(CgroupOp::Lock(path.to_string()));
        Ok(RecordedLock {
            state: self.state.clone(),
            path: path.to_string(),
        })
    }

    fn set_param(&self, path: &str, name: &str, value: &str) -> crate::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_params {
            return Err(crate::Error::CgroupError(format!("cannot write {name}")));
        }
        state.ops.push(CgroupOp::SetParam(
            path.to_string(),
            name.to_string(),
            value.to_string(),
        ));
        Ok(())
    }

    fn add_pids(&self, path: &str, pids: &[u32]) -> crate::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_add_pids {
            return Err(crate::Error::CgroupError(format!("cannot attach to {path}")));
        }
        state.ops.push(CgroupOp::AddPids(path.to_string(), pids.to_vec()));
        for group_pids in state.pids.values_mut() {
            group_pids.retain(|pid| !pids.contains(pid));
        }
        state
            .pids
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(pids);
        Ok(())
    }

    fn pids(&self, path: &str) -> crate::Result<Vec<u32>> {
        Ok(self
            .state
            .borrow()
            .pids
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    fn delete(&self, path: &str) -> crate::Result<()> {
        let mut state = self.state.borrow_mut();
        state.ops.push(CgroupOp::Delete(path.to_string()));
        let prefix = format!("{path}/");
        if state.fail_delete.as_deref() == Some(path)
            || state.groups.iter().any(|group| group.starts_with(&prefix))
            || state.pids.get(path).is_some_and(|pids| !pids.is_empty())
        {
            return Err(crate::Error::CgroupError(format!("{path} is busy")));
        }
        state.groups.remove(path);
        Ok(())
    }
}
