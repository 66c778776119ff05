use clap::Parser;

use crate::common::allocation::load_allocation;
use crate::common::cli::AllocationOpts;
use crate::common::settings::GuardSettings;

#[derive(Parser)]
pub struct TeardownOpts {
    #[clap(flatten)]
    pub allocation: AllocationOpts,
}

pub fn command_teardown(settings: &GuardSettings, opts: TeardownOpts) -> anyhow::Result<()> {
    let ctx = load_allocation(&opts.allocation.allocation)?;
    settings.orchestrator(Vec::new()).teardown(&ctx)?;
    log::debug!("Device cgroups of step {}.{} removed", ctx.job_id, ctx.step);
    Ok(())
}
