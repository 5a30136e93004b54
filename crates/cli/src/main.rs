use checkin_cli::cli::Cli;
use checkin_cli::config::Env;
use checkin_cli::{commands, logging};
use clap::Parser;
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let env = Env::from_process();
	if let Err(err) = commands::dispatch(cli, &env).await {
		if err.is_configuration() {
			error!(target = "checkin", "{}", err);
		} else {
			error!(target = "checkin", error = %err, "command failed");
		}
		std::process::exit(1);
	}
}
