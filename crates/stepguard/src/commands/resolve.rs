use clap::Parser;

use devmap::device::{BusLocation, BusResolver, DeviceInspector};

use crate::common::settings::GuardSettings;

#[derive(Parser)]
pub struct ResolveOpts {
    /// PCI bus id, e.g. `0000:3b:00.0`
    pub bus: String,
}

pub fn command_resolve(settings: &GuardSettings, opts: ResolveOpts) -> anyhow::Result<()> {
    let Some(bus) = BusLocation::parse(&opts.bus) else {
        anyhow::bail!("`{}` is not a PCI bus id", opts.bus);
    };
    let Some(path) = settings.buses().resolve_current_path(&bus) else {
        anyhow::bail!(
            "Bus id {bus} is not known to the driver ({})",
            settings.buses().driver_root().display()
        );
    };
    match settings.inspector().device_number(&path) {
        Some(device) => println!("{bus} {} {device}", path.display()),
        None => println!("{bus} {} -", path.display()),
    }
    Ok(())
}
