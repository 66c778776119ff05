use devmap::access::{DeviceTarget, load_allowed_devices};
use devmap::cgroup::FsCgroupTree;
use devmap::device::{DeviceMappingStore, NvidiaProcResolver, SysDeviceInspector};
use devmap::orchestrator::DeviceCgroupOrchestrator;

use crate::common::config::GuardConfig;

/// Node-level services shared by all commands.
pub struct GuardSettings {
    config: GuardConfig,
    tree: FsCgroupTree,
    buses: NvidiaProcResolver,
    inspector: SysDeviceInspector,
    mapping: DeviceMappingStore,
}

impl GuardSettings {
    pub fn new(config: GuardConfig) -> Self {
        let tree = FsCgroupTree::new(config.cgroup_mountpoint.clone());
        let buses =
            NvidiaProcResolver::new(config.driver_root.clone(), config.device_prefix.clone());
        let mapping = DeviceMappingStore::for_host(&config.state_dir);
        Self {
            config,
            tree,
            buses,
            inspector: SysDeviceInspector,
            mapping,
        }
    }

    pub fn buses(&self) -> &NvidiaProcResolver {
        &self.buses
    }

    pub fn inspector(&self) -> &SysDeviceInspector {
        &self.inspector
    }

    pub fn mapping(&self) -> &DeviceMappingStore {
        &self.mapping
    }

    pub fn load_defaults(&self) -> devmap::Result<Vec<DeviceTarget>> {
        load_allowed_devices(&self.config.allowed_devices_file, &self.inspector)
    }

    pub fn orchestrator(
        &self,
        defaults: Vec<DeviceTarget>,
    ) -> DeviceCgroupOrchestrator<'_, FsCgroupTree> {
        DeviceCgroupOrchestrator::new(
            self.tree.clone(),
            self.config.root_cgroup(),
            defaults,
            &self.mapping,
            &self.buses,
            &self.inspector,
        )
        .with_vacate_timeout(self.config.vacate_timeout())
    }
}
