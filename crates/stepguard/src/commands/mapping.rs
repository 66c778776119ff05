use clap::Parser;

use devmap::device::{DeviceIdentityResolver, DeviceSlot, ResolvedDevice};

use crate::common::allocation::load_allocation;
use crate::common::cli::AllocationOpts;
use crate::common::settings::GuardSettings;

#[derive(Parser)]
pub struct MappingOpts {
    #[clap(flatten)]
    pub allocation: AllocationOpts,
}

/// Prints one line per slot: `<index> <slot path> <bus id> <current device>`.
///
/// Builds the mapping first if this is the first use on the host.
pub fn command_mapping(settings: &GuardSettings, opts: MappingOpts) -> anyhow::Result<()> {
    let ctx = load_allocation(&opts.allocation.allocation)?;
    let table = settings
        .mapping()
        .build_or_load(ctx.node_devices(), settings.buses())?;
    let resolver = DeviceIdentityResolver::new(table, settings.buses(), settings.inspector());

    for entry in table.entries() {
        let slot = DeviceSlot::new(entry.slot_path.clone(), entry.slot_index, false);
        let current = match resolver.resolve(&slot)? {
            ResolvedDevice::Present { real_path, device } => {
                format!("{} ({device})", real_path.display())
            }
            ResolvedDevice::Unresolved => "unresolved".to_string(),
        };
        println!(
            "{} {} {} {current}",
            entry.slot_index, entry.slot_path, entry.bus
        );
    }
    log::debug!(
        "Device mapping is stored in {}",
        settings.mapping().cache_path().display()
    );
    Ok(())
}
