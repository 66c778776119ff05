use std::path::PathBuf;

use clap::Parser;

use crate::commands::add_pid::AddPidOpts;
use crate::commands::create::CreateOpts;
use crate::commands::mapping::MappingOpts;
use crate::commands::resolve::ResolveOpts;
use crate::commands::teardown::TeardownOpts;
use crate::common::config::DEFAULT_CONFIG_PATH;

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Path to the configuration file
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        global = true,
        env = "STEPGUARD_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help_heading("GLOBAL OPTIONS")
    )]
    pub config: PathBuf,

    /// Enables more detailed log output
    #[arg(
        short,
        long,
        env = "STEPGUARD_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS")
    )]
    pub verbose: bool,
}

/// Allocation record of the step, as written by the step daemon
#[derive(Parser)]
pub struct AllocationOpts {
    /// Path to the JSON allocation record
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub allocation: PathBuf,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::STEPGUARD_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Creates the device cgroups of a step and attaches the step process to them
    Create(CreateOpts),
    /// Removes the device cgroups of a finished step
    Teardown(TeardownOpts),
    /// Adds a process to the device cgroup of a step
    AddPid(AddPidOpts),
    /// Prints the mapping of GPU slots to devices
    Mapping(MappingOpts),
    /// Prints the device currently attached at a PCI bus id
    Resolve(ResolveOpts),
}
