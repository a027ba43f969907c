use std::path::PathBuf;

use clap::{Arg, Command};

use pimd::config::Config;
use pimd::logging::init_tracing;

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let matches = Command::new("pimd")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Personal Information Management storage daemon")
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("PATH")
				.help("Path to a TOML config file"),
		)
		.arg(
			Arg::new("bind")
				.short('b')
				.long("bind")
				.value_name("ADDRESS")
				.help("Override the TCP bind address"),
		)
		.get_matches();

	let mut config = match matches.get_one::<String>("config") {
		Some(path) => Config::load_from_file(&PathBuf::from(path))?,
		None => Config::default(),
	}
	.apply_env_overrides();

	if let Some(bind) = matches.get_one::<String>("bind") {
		config.bind_address = bind.clone();
	}

	init_tracing();

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(pimd::serve::run(config))?;

	Ok(())
}

// vim: ts=4
