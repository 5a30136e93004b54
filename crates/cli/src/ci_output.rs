//! Publishing a refreshed token to later CI steps.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::config::CiOutput;

/// Variable later workflow steps read the token from.
pub const TOKEN_VARIABLE: &str = "NEW_BEARER_TOKEN";

/// Workflow command hiding `value` in the rest of the job log.
pub fn mask_command(value: &str) -> String {
	format!("::add-mask::{value}")
}

/// Appends `name=value` to a `$GITHUB_ENV`-style file.
pub fn append_env_var(path: &Path, name: &str, value: &str) -> io::Result<()> {
	if value.contains('\n') {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, "multi-line values are not supported"));
	}
	let mut file = OpenOptions::new().create(true).append(true).open(path)?;
	writeln!(file, "{name}={value}")
}

/// Masks and exports `token` as configured. Failures are logged only.
pub fn publish_token(ci: &CiOutput, token: &str) {
	if ci.mask {
		// Workflow commands are read from stdout.
		println!("{}", mask_command(token));
	}

	let Some(path) = ci.env_file.as_deref() else {
		return;
	};
	match append_env_var(path, TOKEN_VARIABLE, token) {
		Ok(()) => info!(path = %path.display(), "exported {TOKEN_VARIABLE}"),
		Err(e) => warn!(path = %path.display(), "failed to write CI environment file: {}", e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn appends_without_clobbering() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("github_env");
		std::fs::write(&path, "EXISTING=1\n").unwrap();

		append_env_var(&path, TOKEN_VARIABLE, "abc123").unwrap();

		assert_eq!(std::fs::read_to_string(&path).unwrap(), "EXISTING=1\nNEW_BEARER_TOKEN=abc123\n");
	}

	#[test]
	fn multi_line_values_are_refused() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("github_env");
		assert!(append_env_var(&path, TOKEN_VARIABLE, "a\nEVIL=1").is_err());
		assert!(!path.exists());
	}

	#[test]
	fn publish_survives_unwritable_path() {
		let ci = CiOutput {
			env_file: Some("/nonexistent/dir/github_env".into()),
			mask: false,
		};
		publish_token(&ci, "abc123");
	}

	#[test]
	fn mask_command_format() {
		assert_eq!(mask_command("abc"), "::add-mask::abc");
	}
}
