use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default filter for a verbosity level. `RUST_LOG` overrides it.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = progress from our crates, warnings from everything else
	// 1 (-v) = debug for our crates (stage checks, lookups, CDP commands)
	// 2+ (-vv) = trace for ours, debug for dependencies
	match verbosity {
		0 => "warn,checkin=info,checkin_cli=info,checkin_runtime=warn",
		1 => "info,checkin=debug,checkin_cli=debug,checkin_runtime=debug",
		_ => "debug,checkin=trace,checkin_cli=trace,checkin_runtime=trace",
	}
}

/// Installs the global subscriber. Everything goes to stderr so stdout only
/// carries command results.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
