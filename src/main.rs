use std::process::ExitCode;

use clap::Parser;
use epyc_power::config::Cli;
use log::error;

fn main() -> ExitCode {
	let env = env_logger::Env::default().default_filter_or("info");
	env_logger::init_from_env(env);

	let result = Cli::parse().into_config().and_then(epyc_power::run);
	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{e}");
			ExitCode::FAILURE
		},
	}
}
