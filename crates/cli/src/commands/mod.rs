mod fuli;
mod refresh;
mod spin;

use crate::cli::{Cli, Commands};
use crate::config::Env;
use crate::error::Result;

pub async fn dispatch(cli: Cli, env: &Env) -> Result<()> {
	let Cli { verbose: _, command } = cli;

	match command {
		Commands::Refresh(args) => refresh::run(&args, env).await,
		Commands::Spin(args) => spin::run(&args, env).await,
		Commands::Fuli(args) => fuli::run(&args, env).await,
	}
}
