//! `checkin refresh`: obtain, verify and publish a new bearer token.

use checkin::{ChromeLauncher, Launcher, RefreshFailure, RefreshOutcome, Refresher, Token};
use tracing::{error, info, warn};

use crate::api::RelyingPartyClient;
use crate::ci_output::publish_token;
use crate::cli::RefreshArgs;
use crate::config::{Env, RefreshConfig};
use crate::error::{CheckinError, Result};
use crate::notify::{Notifier, escape_html, notifier_for};

/// Characters of the token shown in logs and notifications.
const TOKEN_PREVIEW: usize = 8;

pub async fn run(args: &RefreshArgs, env: &Env) -> Result<()> {
	// Configuration errors end the run before any browser or network action.
	let config = RefreshConfig::from_env(env, args)?;
	let notifier = notifier_for(config.telegram.clone());
	let launcher = ChromeLauncher::new(config.launch.clone());

	let token = execute(&config, &launcher, notifier.as_ref()).await?;

	// Printed last so a manual run ends with something to copy.
	println!("{}", token.as_str());
	Ok(())
}

/// Refreshes, verifies and publishes a token, sending exactly one
/// notification for the outcome.
pub async fn execute<L: Launcher>(config: &RefreshConfig, launcher: &L, notifier: &dyn Notifier) -> Result<Token> {
	info!(username = %config.credentials.username, "refreshing bearer token");

	let extraction = match Refresher::new(&config.credentials, &config.flow).run(launcher).await {
		RefreshOutcome::Success(extraction) => extraction,
		RefreshOutcome::Failed(failure) => {
			error!(stage = %failure.stage, "token refresh failed: {}", failure.reason);
			notify_failure(notifier, &failure).await;
			return Err(CheckinError::RefreshFailed(failure.to_string()));
		}
	};
	let token = extraction.token;
	info!(source = %extraction.source, token = %token.preview(TOKEN_PREVIEW), "token refreshed");

	if config.verify {
		if let Err(e) = verify(&config.api_base, &token).await {
			error!("new token failed verification: {}", e);
			deliver(notifier.send_text(&rejected_message(&e.to_string())).await);
			return Err(e);
		}
	}

	publish_token(&config.ci, token.as_str());
	deliver(notifier.send_text(&success_message(&token)).await);
	Ok(token)
}

async fn verify(api_base: &str, token: &Token) -> Result<()> {
	let client = RelyingPartyClient::new(api_base, token.as_str())?;
	let info = client.user_info().await.map_err(CheckinError::TokenRejected)?;
	info!(
		username = info.username.as_deref().unwrap_or("unknown"),
		balance = info.balance.unwrap_or_default(),
		"token verified"
	);
	Ok(())
}

async fn notify_failure(notifier: &dyn Notifier, failure: &RefreshFailure) {
	let result = match &failure.screenshot {
		Some(path) => notifier.send_photo(path, &failure_caption(failure)).await,
		None => notifier.send_text(&failure_message(failure)).await,
	};
	deliver(result);
}

fn deliver(result: anyhow::Result<()>) {
	if let Err(e) = result {
		warn!("notification not delivered: {:#}", e);
	}
}

fn timestamp() -> String {
	chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn success_message(token: &Token) -> String {
	format!(
		"✅ <b>up.x666.me token refreshed</b>\n\n⏰ Time: {}\n🔑 New token: <code>{}</code>\n\n📝 Update the BEARER_TOKEN secret if it is not updated automatically.",
		timestamp(),
		escape_html(&token.preview(TOKEN_PREVIEW)),
	)
}

fn failure_caption(failure: &RefreshFailure) -> String {
	format!(
		"🚨 <b>Token refresh failed</b>\n{}\nStage: {}\nURL: {}",
		escape_html(&failure.reason.to_string()),
		failure.stage,
		escape_html(failure.url.as_deref().unwrap_or("unknown")),
	)
}

fn failure_message(failure: &RefreshFailure) -> String {
	format!(
		"🚨 <b>up.x666.me token refresh failed</b>\n\n⏰ Time: {}\n❌ {}\n📍 Stage: {}\n🔗 URL: {}\n\nPossible causes: wrong linux.do credentials, a changed login flow, or network problems. Check the job log and update the token manually.",
		timestamp(),
		escape_html(&failure.reason.to_string()),
		failure.stage,
		escape_html(failure.url.as_deref().unwrap_or("unknown")),
	)
}

fn rejected_message(reason: &str) -> String {
	format!(
		"🚨 <b>up.x666.me token refresh failed</b>\n\n⏰ Time: {}\n❌ The new token was rejected: {}",
		timestamp(),
		escape_html(reason),
	)
}
