use clap::Parser;

use crate::common::allocation::load_allocation;
use crate::common::cli::AllocationOpts;
use crate::common::settings::GuardSettings;

#[derive(Parser)]
pub struct CreateOpts {
    #[clap(flatten)]
    pub allocation: AllocationOpts,
}

pub fn command_create(settings: &GuardSettings, opts: CreateOpts) -> anyhow::Result<()> {
    let ctx = load_allocation(&opts.allocation.allocation)?;
    let defaults = settings.load_defaults()?;
    let orchestrator = settings.orchestrator(defaults);

    let report = orchestrator.create(&ctx)?;
    let written = report.job.written + report.step.map(|r| r.written).unwrap_or(0);
    log::info!(
        "Devices of step {}.{} are constrained ({written} rules written, {} cgroups created)",
        ctx.job_id,
        ctx.step,
        report.created.len()
    );
    if report.failed_writes() > 0 {
        anyhow::bail!(
            "{} device rules of step {}.{} could not be written",
            report.failed_writes(),
            ctx.job_id,
            ctx.step
        );
    }
    Ok(())
}
