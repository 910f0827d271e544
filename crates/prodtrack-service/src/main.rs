//! Main entry point for the prodtrack service.
//!
//! Loads configuration, builds the production engine over the configured
//! storage backend and executes one command, printing its result as JSON on
//! stdout. Logs go to stderr.

use clap::Parser;
use prodtrack_config::Config;
use std::process::ExitCode;

mod cli;
mod commands;
mod factory_registry;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	match run(args).await {
		Ok(output) => {
			println!("{}", output);
			ExitCode::SUCCESS
		},
		Err(e) => {
			tracing::error!(error = %e, "Command failed");
			eprintln!("error: {}", e);
			ExitCode::FAILURE
		},
	}
}

async fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
	let config_path = args.config.to_string_lossy().into_owned();
	let config = Config::from_file(&config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = factory_registry::build_engine_from_config(config.clone()).await?;
	let actor = args.actor();
	let output = commands::execute(&engine, &config, actor, args.command).await?;
	Ok(serde_json::to_string_pretty(&output)?)
}
