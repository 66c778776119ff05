use clap::Parser;

use crate::common::allocation::load_allocation;
use crate::common::cli::AllocationOpts;
use crate::common::settings::GuardSettings;

#[derive(Parser)]
pub struct AddPidOpts {
    #[clap(flatten)]
    pub allocation: AllocationOpts,

    /// Process to move into the step's device cgroup
    pub pid: u32,
}

pub fn command_add_pid(settings: &GuardSettings, opts: AddPidOpts) -> anyhow::Result<()> {
    let ctx = load_allocation(&opts.allocation.allocation)?;
    settings.orchestrator(Vec::new()).add_pid(&ctx, opts.pid)?;
    log::debug!(
        "Process {} added to device cgroup of step {}.{}",
        opts.pid,
        ctx.job_id,
        ctx.step
    );
    Ok(())
}
