use clap::{CommandFactory, FromArgMatches};

use stepguard::commands::add_pid::command_add_pid;
use stepguard::commands::create::command_create;
use stepguard::commands::mapping::command_mapping;
use stepguard::commands::resolve::command_resolve;
use stepguard::commands::teardown::command_teardown;
use stepguard::common::cli::{RootOptions, SubCommand};
use stepguard::common::config::GuardConfig;
use stepguard::common::error::GuardError;
use stepguard::common::settings::GuardSettings;
use stepguard::common::setup::setup_logging;

/// Misconfiguration of the node, as opposed to a problem of a single step.
fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<devmap::Error>()
        .is_some_and(|e| e.is_fatal())
        || error
            .downcast_ref::<GuardError>()
            .is_some_and(|e| e.is_fatal())
}

fn main() {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.verbose);

    let result = GuardConfig::load(&top_opts.common.config)
        .map_err(anyhow::Error::from)
        .and_then(|config| {
            let settings = GuardSettings::new(config);
            match top_opts.subcmd {
                SubCommand::Create(opts) => command_create(&settings, opts),
                SubCommand::Teardown(opts) => command_teardown(&settings, opts),
                SubCommand::AddPid(opts) => command_add_pid(&settings, opts),
                SubCommand::Mapping(opts) => command_mapping(&settings, opts),
                SubCommand::Resolve(opts) => command_resolve(&settings, opts),
            }
        });

    if let Err(error) = result {
        if is_fatal(&error) {
            log::error!("Fatal error, the node needs attention: {error:?}");
        } else {
            log::error!("{error:?}");
        }
        std::process::exit(1);
    }
}
