
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::styles::cli_styles;

/// Maximum spins per `spin` run.
pub const DEFAULT_MAX_SPINS: u32 = 6;

#[derive(Parser, Debug)]
#[command(name = "checkin")]
#[command(about = "Daily check-in automation for up.x666.me and fuli.hxi.me")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Log in through linux.do in a real browser and obtain a fresh bearer token.
	Refresh(RefreshArgs),
	/// Spin the up.x666.me check-in wheel with BEARER_TOKEN.
	Spin(SpinArgs),
	/// Draw on the fuli.hxi.me lucky wheel with FULI_COOKIE.
	Fuli(FuliArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RefreshArgs {
	/// Run the browser without a window (also CHECKIN_HEADLESS=1).
	#[arg(long)]
	pub headless: bool,

	/// Directory for failure screenshots (default: CHECKIN_ARTIFACTS_DIR or ".").
	#[arg(long, value_name = "DIR")]
	pub artifacts_dir: Option<PathBuf>,

	/// Browser executable (default: CHROME_PATH or auto-detect).
	#[arg(long, value_name = "PATH")]
	pub browser: Option<PathBuf>,

	/// Do not check the new token against /api/user/info.
	#[arg(long)]
	pub skip_verify: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SpinArgs {
	/// Stop after this many successful spins.
	#[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_SPINS)]
	pub max_spins: u32,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FuliArgs {
	/// Number of draws to attempt (default: random 1-3).
	#[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=10))]
	pub draws: Option<u32>,
}
