#[macro_use]
pub mod internal;

pub use crate::internal::common::ids::{JobId, StepId};

pub type Error = internal::common::error::DevError;
pub type Result<T> = std::result::Result<T, Error>;

pub mod device {
    pub use crate::internal::device::bus::{
        BusLocation, BusResolver, DEFAULT_DEVICE_PREFIX, DEFAULT_DRIVER_ROOT, NvidiaProcResolver,
    };
    pub use crate::internal::device::identity::DeviceIdentityResolver;
    pub use crate::internal::device::mapping::{
        DeviceMappingEntry, DeviceMappingStore, DeviceMappingTable, mapping_cache_path,
    };
    pub use crate::internal::device::number::{
        DeviceInspector, DeviceKind, DeviceNumber, ResolvedDevice, SysDeviceInspector,
    };
    pub use crate::internal::device::slot::DeviceSlot;
}

pub mod access {
    pub use crate::internal::access::decision::{
        AccessAction, AccessDecision, AccessScope, DeviceTarget,
    };
    pub use crate::internal::access::defaults::load_allowed_devices;
    pub use crate::internal::access::plan::{AccessPlan, AccessWrite, ProgramReport};
}

pub mod cgroup {
    pub use crate::internal::cgroup::fs::{DEFAULT_DEVICES_MOUNTPOINT, FsCgroupTree};
    pub use crate::internal::cgroup::{CgroupTree, Instantiated};
}

pub mod orchestrator {
    pub use crate::internal::orchestrator::context::{StepContext, StepKind};
    pub use crate::internal::orchestrator::paths::ScopePaths;
    pub use crate::internal::orchestrator::step::{DeviceCgroupOrchestrator, SetupReport, SetupState};
}
