//! Configuration from the process environment.
//!
//! The environment is read exactly once into an [`Env`] snapshot; each
//! command then builds its own config struct from the snapshot plus its CLI
//! arguments. Empty values count as absent.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use checkin::{Credentials, FlowConfig, LaunchOptions};
use thiserror::Error;

use crate::api::{FULI_BASE_URL, RELYING_PARTY_BASE_URL};
use crate::cli::{FuliArgs, RefreshArgs, SpinArgs};

pub const LINUXDO_USERNAME: &str = "LINUXDO_USERNAME";
pub const LINUXDO_PASSWORD: &str = "LINUXDO_PASSWORD";
pub const BEARER_TOKEN: &str = "BEARER_TOKEN";
pub const FULI_COOKIE: &str = "FULI_COOKIE";
pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const CHROME_PATH: &str = "CHROME_PATH";
pub const GITHUB_ENV: &str = "GITHUB_ENV";
pub const GITHUB_ACTIONS: &str = "GITHUB_ACTIONS";
pub const CHECKIN_ARTIFACTS_DIR: &str = "CHECKIN_ARTIFACTS_DIR";
pub const CHECKIN_HEADLESS: &str = "CHECKIN_HEADLESS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
	#[error("missing required environment variables: {}", .0.join(", "))]
	Missing(Vec<&'static str>),
}

/// Snapshot of the process environment.
#[derive(Debug, Clone, Default)]
pub struct Env {
	vars: HashMap<String, String>,
}

impl Env {
	/// Captures the current process environment. Non-UTF-8 entries are skipped.
	pub fn from_process() -> Self {
		Self::from_pairs(
			std::env::vars_os().filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?))),
		)
	}

	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let vars = pairs
			.into_iter()
			.map(|(key, value)| (key.into(), value.into()))
			.filter(|(_, value): &(String, String)| !value.trim().is_empty())
			.collect();
		Self { vars }
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.vars.get(key).map(|value| value.trim())
	}

	/// `1`, `true` or `yes`, case-insensitively.
	pub fn flag(&self, key: &str) -> bool {
		self.get(key)
			.is_some_and(|value| ["1", "true", "yes"].iter().any(|on| value.eq_ignore_ascii_case(on)))
	}

	/// Values for `keys`, or every missing key.
	fn require<const N: usize>(&self, keys: [&'static str; N]) -> Result<[String; N], ConfigError> {
		let missing: Vec<&'static str> = keys.iter().copied().filter(|key| self.get(key).is_none()).collect();
		if !missing.is_empty() {
			return Err(ConfigError::Missing(missing));
		}
		Ok(keys.map(|key| self.get(key).unwrap_or_default().to_string()))
	}

	fn telegram(&self) -> Option<TelegramConfig> {
		Some(TelegramConfig {
			bot_token: self.get(TELEGRAM_BOT_TOKEN)?.to_string(),
			chat_id: self.get(TELEGRAM_CHAT_ID)?.to_string(),
		})
	}
}

/// Telegram bot credentials. Notifications are disabled without them.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramConfig {
	pub bot_token: String,
	pub chat_id: String,
}

impl fmt::Debug for TelegramConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TelegramConfig")
			.field("bot_token", &"<redacted>")
			.field("chat_id", &self.chat_id)
			.finish()
	}
}

/// Where a refreshed token is published for later CI steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiOutput {
	/// `$GITHUB_ENV` file.
	pub env_file: Option<PathBuf>,
	/// Running under GitHub Actions: mask the token in the job log.
	pub mask: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
	pub credentials: Credentials,
	pub flow: FlowConfig,
	pub launch: LaunchOptions,
	pub telegram: Option<TelegramConfig>,
	pub ci: CiOutput,
	/// Check the new token against the relying-party API.
	pub verify: bool,
	pub api_base: String,
}

impl RefreshConfig {
	pub fn from_env(env: &Env, args: &RefreshArgs) -> Result<Self, ConfigError> {
		let [username, password] = env.require([LINUXDO_USERNAME, LINUXDO_PASSWORD])?;

		let artifacts_dir = args
			.artifacts_dir
			.clone()
			.or_else(|| env.get(CHECKIN_ARTIFACTS_DIR).map(PathBuf::from))
			.unwrap_or_else(|| PathBuf::from("."));

		Ok(Self {
			credentials: Credentials { username, password },
			flow: FlowConfig {
				artifacts_dir,
				..FlowConfig::default()
			},
			launch: LaunchOptions {
				executable: args.browser.clone().or_else(|| env.get(CHROME_PATH).map(PathBuf::from)),
				headless: args.headless || env.flag(CHECKIN_HEADLESS),
				extra_args: Vec::new(),
			},
			telegram: env.telegram(),
			ci: CiOutput {
				env_file: env.get(GITHUB_ENV).map(PathBuf::from),
				mask: env.flag(GITHUB_ACTIONS),
			},
			verify: !args.skip_verify,
			api_base: RELYING_PARTY_BASE_URL.to_string(),
		})
	}
}

#[derive(Debug, Clone)]
pub struct SpinConfig {
	pub token: String,
	pub max_spins: u32,
	/// Pause after each successful spin.
	pub pause: Duration,
	pub api_base: String,
}

impl SpinConfig {
	pub fn from_env(env: &Env, args: &SpinArgs) -> Result<Self, ConfigError> {
		let [token] = env.require([BEARER_TOKEN])?;
		Ok(Self {
			token,
			max_spins: args.max_spins,
			pause: Duration::from_secs(2),
			api_base: RELYING_PARTY_BASE_URL.to_string(),
		})
	}
}

#[derive(Debug, Clone)]
pub struct FuliConfig {
	pub cookie: String,
	/// Fixed number of draws; random 1-3 when absent.
	pub draws: Option<u32>,
	/// Bounds of the random pause between draws, in seconds.
	pub pause_secs: (u64, u64),
	pub telegram: Option<TelegramConfig>,
	pub base_url: String,
}

impl FuliConfig {
	pub fn from_env(env: &Env, args: &FuliArgs) -> Result<Self, ConfigError> {
		let [cookie] = env.require([FULI_COOKIE])?;
		Ok(Self {
			cookie,
			draws: args.draws,
			pause_secs: (2, 5),
			telegram: env.telegram(),
			base_url: FULI_BASE_URL.to_string(),
		})
	}
}
