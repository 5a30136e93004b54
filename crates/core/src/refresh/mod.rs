//! Credential refresh.
//!
//! [`Refresher::run`] launches a browser, walks the relying party's OAuth
//! login with the identity provider and extracts the bearer token the relying
//! party hands back. The walk is an explicit state machine: each [`Stage`]
//! inspects the page, and yields a [`Transition`] to the next stage, to success
//! or to a [`FailureReason`]. Every wait is a bounded poll, so every run ends
//! in a definite [`RefreshOutcome`].
//!
//! ```text
//! Launch -> Navigate -> AwaitProvider -> Challenge -> LoginForm -> AwaitLeaveLogin -> Consent -> AwaitCallback -> Extract
//!                                                         \________________________________/^
//!                                                           (already signed in at provider)
//! ```

mod extract;
mod flow;
mod poll;
pub mod selectors;

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

pub use extract::{EXTRACTION_PLAN, Extraction, ExtractionStep, TokenSource};
pub use poll::poll_until;

use crate::driver::{BrowserSession, Launcher};
use crate::token::Token;
use flow::Flow;

/// Where the flow is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
	Launch,
	Navigate,
	AwaitProvider,
	Challenge,
	LoginForm,
	AwaitLeaveLogin,
	Consent,
	AwaitCallback,
	Extract,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Stage::Launch => "launch",
			Stage::Navigate => "navigate",
			Stage::AwaitProvider => "await-provider",
			Stage::Challenge => "challenge",
			Stage::LoginForm => "login-form",
			Stage::AwaitLeaveLogin => "await-leave-login",
			Stage::Consent => "consent",
			Stage::AwaitCallback => "await-callback",
			Stage::Extract => "extract",
		})
	}
}

/// Result of one stage.
#[derive(Debug)]
pub(crate) enum Transition {
	Next(Stage),
	Done(Extraction),
	Fail(FailureReason),
}

/// Why a refresh failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
	#[error("browser failed to start after {attempts} attempts: {message}")]
	LaunchFailed { attempts: u32, message: String },

	#[error("login control not found on the relying-party page")]
	LoginControlNotFound,

	#[error("no redirect to the identity provider within {secs}s")]
	ProviderTimeout { secs: u64 },

	#[error("browser challenge still present after {secs}s")]
	ChallengeTimeout { secs: u64 },

	#[error("login form did not appear within {secs}s")]
	LoginFormMissing { secs: u64 },

	#[error("login form has no {0}")]
	FormIncomplete(&'static str),

	#[error("identity provider rejected the login: {0}")]
	LoginRejected(String),

	#[error("still on the login page after {secs}s")]
	LoginTimeout { secs: u64 },

	#[error("no consent control found")]
	NoConsentControl,

	#[error("no redirect back to the relying party within {secs}s")]
	CallbackTimeout { secs: u64 },

	#[error("token not found by any extraction method")]
	TokenNotFound,

	#[error("unexpected browser error: {0}")]
	Unexpected(String),
}

impl FailureReason {
	/// Stable name for diagnostics, used as the screenshot file stem.
	pub fn diagnostic_name(&self) -> &'static str {
		match self {
			FailureReason::LaunchFailed { .. } => "launch_failed",
			FailureReason::LoginControlNotFound => "login_button_not_found",
			FailureReason::ProviderTimeout { .. } => "provider_redirect_timeout",
			FailureReason::ChallengeTimeout { .. } => "cloudflare_blocked",
			FailureReason::LoginFormMissing { .. } => "login_form_missing",
			FailureReason::FormIncomplete(_) => "login_form_incomplete",
			FailureReason::LoginRejected(_) => "login_rejected",
			FailureReason::LoginTimeout { .. } => "login_timeout",
			FailureReason::NoConsentControl => "no_consent_control",
			FailureReason::CallbackTimeout { .. } => "callback_timeout",
			FailureReason::TokenNotFound => "token_not_found",
			FailureReason::Unexpected(_) => "unexpected_error",
		}
	}
}

/// A failed run.
#[derive(Debug, Clone)]
pub struct RefreshFailure {
	pub stage: Stage,
	pub reason: FailureReason,
	/// Page location when the failure was detected.
	pub url: Option<String>,
	/// Diagnostic screenshot, when one could be taken.
	pub screenshot: Option<PathBuf>,
}

impl fmt::Display for RefreshFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (stage: {})", self.reason, self.stage)
	}
}

/// Terminal result of [`Refresher::run`].
#[derive(Debug)]
pub enum RefreshOutcome {
	Success(Extraction),
	Failed(RefreshFailure),
}

impl RefreshOutcome {
	pub fn token(&self) -> Option<&Token> {
		match self {
			RefreshOutcome::Success(extraction) => Some(&extraction.token),
			RefreshOutcome::Failed(_) => None,
		}
	}
}

/// Identity-provider login.
#[derive(Clone)]
pub struct Credentials {
	pub username: String,
	pub password: String,
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// The two sites the flow moves between.
#[derive(Debug, Clone)]
pub struct Site {
	/// Relying-party page holding the login control.
	pub home_url: String,
	/// Registrable domain of the relying party; subdomains match.
	pub relying_party_domain: String,
	/// Registrable domain of the identity provider; subdomains match.
	pub provider_domain: String,
	/// Path prefix of the provider's login page.
	pub login_path: String,
}

impl Site {
	/// True when the host of `location` belongs to the relying party.
	///
	/// Only the host counts: provider URLs carry the relying party in their
	/// `redirect_uri` parameter.
	pub fn is_relying_party(&self, location: &str) -> bool {
		host_in_domain(location, &self.relying_party_domain)
	}

	pub fn is_provider(&self, location: &str) -> bool {
		host_in_domain(location, &self.provider_domain)
	}

	/// True when `location` is on the provider's login page.
	pub fn is_login_page(&self, location: &str) -> bool {
		self.is_provider(location)
			&& Url::parse(location).is_ok_and(|url| url.path().starts_with(self.login_path.as_str()))
	}
}

/// `host == domain` or `host` ends with `.domain`, ignoring ASCII case.
fn host_in_domain(location: &str, domain: &str) -> bool {
	let Ok(url) = Url::parse(location) else {
		return false;
	};
	let Some(host) = url.host_str() else {
		return false;
	};
	let host = host.to_ascii_lowercase();
	let domain = domain.trim_start_matches('.').to_ascii_lowercase();
	!domain.is_empty()
		&& (host == domain || host.strip_suffix(domain.as_str()).is_some_and(|rest| rest.ends_with('.')))
}

impl Default for Site {
	fn default() -> Self {
		Self {
			home_url: "https://up.x666.me".into(),
			relying_party_domain: "x666.me".into(),
			provider_domain: "linux.do".into(),
			login_path: "/login".into(),
		}
	}
}

/// Timing budget and environment for one run.
#[derive(Debug, Clone)]
pub struct FlowConfig {
	pub site: Site,
	/// Screenshot directory.
	pub artifacts_dir: PathBuf,

	pub launch_attempts: u32,
	pub launch_retry_delay: Duration,

	/// Pause after a navigation before the page is inspected.
	pub settle: Duration,
	/// Pause after the extraction reload.
	pub reload_settle: Duration,
	/// Pause between filling the password and submitting.
	pub submit_delay: Duration,

	pub login_control_timeout: Duration,
	pub provider_timeout: Duration,
	pub challenge_timeout: Duration,
	pub login_form_timeout: Duration,
	/// Budget for each remaining form control once the username field is filled.
	pub field_timeout: Duration,
	pub leave_login_timeout: Duration,
	pub consent_timeout: Duration,
	pub callback_timeout: Duration,

	/// Interval for location polls.
	pub url_poll: Duration,
	pub challenge_poll: Duration,
	/// Interval for form-related element polls.
	pub form_poll: Duration,
}

impl Default for FlowConfig {
	fn default() -> Self {
		Self {
			site: Site::default(),
			artifacts_dir: PathBuf::from("."),
			launch_attempts: 2,
			launch_retry_delay: Duration::from_secs(3),
			settle: Duration::from_secs(3),
			reload_settle: Duration::from_secs(5),
			submit_delay: Duration::from_secs(1),
			login_control_timeout: Duration::from_secs(10),
			provider_timeout: Duration::from_secs(15),
			challenge_timeout: Duration::from_secs(120),
			login_form_timeout: Duration::from_secs(30),
			field_timeout: Duration::from_secs(10),
			leave_login_timeout: Duration::from_secs(60),
			consent_timeout: Duration::from_secs(20),
			callback_timeout: Duration::from_secs(30),
			url_poll: Duration::from_millis(500),
			challenge_poll: Duration::from_secs(3),
			form_poll: Duration::from_secs(1),
		}
	}
}

/// Runs the refresh flow against browsers from a [`Launcher`].
pub struct Refresher<'a> {
	credentials: &'a Credentials,
	config: &'a FlowConfig,
}

impl<'a> Refresher<'a> {
	pub fn new(credentials: &'a Credentials, config: &'a FlowConfig) -> Self {
		Self { credentials, config }
	}

	/// Runs one refresh to completion.
	///
	/// The browser session is closed exactly once on every path that
	/// launched one.
	pub async fn run<L: Launcher>(&self, launcher: &L) -> RefreshOutcome {
		let mut session = match self.launch(launcher).await {
			Ok(session) => session,
			Err(reason) => {
				warn!(target = "checkin", stage = %Stage::Launch, %reason, "refresh failed");
				return RefreshOutcome::Failed(RefreshFailure {
					stage: Stage::Launch,
					reason,
					url: None,
					screenshot: None,
				});
			}
		};

		let outcome = Flow::new(session.page(), self.credentials, self.config).drive().await;

		if let Err(e) = session.close().await {
			warn!(target = "checkin", "failed to close browser: {}", e);
		}
		outcome
	}

	async fn launch<L: Launcher>(&self, launcher: &L) -> Result<L::Session, FailureReason> {
		let attempts = self.config.launch_attempts.max(1);
		let mut last_error = String::new();

		for attempt in 1..=attempts {
			match launcher.launch().await {
				Ok(session) => {
					info!(target = "checkin", attempt, "browser started");
					return Ok(session);
				}
				Err(e) => {
					warn!(target = "checkin", attempt, attempts, "browser launch failed: {}", e);
					last_error = e.to_string();
					if attempt < attempts {
						tokio::time::sleep(self.config.launch_retry_delay).await;
					}
				}
			}
		}

		Err(FailureReason::LaunchFailed {
			attempts,
			message: last_error,
		})
	}
}
