//! Stage handlers and the driver loop.

use std::path::PathBuf;

use checkin_runtime::Result;
use tracing::{debug, error, info, warn};

use super::extract::extract;
use super::poll::poll_until;
use super::selectors::{
	CHALLENGE_CHECKBOX, CONSENT_CONTROL, LOGIN_CONTROL, LOGIN_ERROR, PASSWORD_FIELD, SUBMIT_CONTROL, USERNAME_FIELD,
	has_challenge_markers,
};
use super::{Credentials, FailureReason, FlowConfig, RefreshFailure, RefreshOutcome, Stage, Transition};
use crate::driver::{ElementRef, PageDriver};
use crate::lookup::{Lookup, find_first};

/// What the login-form poll saw.
enum FormState {
	Form(ElementRef),
	AlreadySignedIn,
}

/// What the leave-login poll saw.
enum LeaveState {
	Left(String),
	Rejected(String),
}

/// What the consent poll saw.
enum ConsentState {
	Control(ElementRef),
	Skipped,
}

pub(crate) struct Flow<'a, P: ?Sized> {
	page: &'a P,
	credentials: &'a Credentials,
	config: &'a FlowConfig,
}

impl<'a, P> Flow<'a, P>
where
	P: PageDriver + ?Sized,
{
	pub(crate) fn new(page: &'a P, credentials: &'a Credentials, config: &'a FlowConfig) -> Self {
		Self {
			page,
			credentials,
			config,
		}
	}

	/// Runs stages from [`Stage::Navigate`] until a terminal transition.
	pub(crate) async fn drive(&self) -> RefreshOutcome {
		let mut stage = Stage::Navigate;
		loop {
			info!(target = "checkin", %stage, "entering stage");
			let transition = match self.step(stage).await {
				Ok(transition) => transition,
				Err(e) => {
					error!(target = "checkin", %stage, "unexpected error: {}", e);
					Transition::Fail(FailureReason::Unexpected(e.to_string()))
				}
			};

			match transition {
				Transition::Next(next) => stage = next,
				Transition::Done(extraction) => return RefreshOutcome::Success(extraction),
				Transition::Fail(reason) => return RefreshOutcome::Failed(self.fail(stage, reason).await),
			}
		}
	}

	async fn step(&self, stage: Stage) -> Result<Transition> {
		match stage {
			// The session exists by the time a flow is driven.
			Stage::Launch => Ok(Transition::Next(Stage::Navigate)),
			Stage::Navigate => self.navigate().await,
			Stage::AwaitProvider => Ok(self.await_provider().await),
			Stage::Challenge => Ok(self.challenge().await),
			Stage::LoginForm => self.login_form().await,
			Stage::AwaitLeaveLogin => Ok(self.await_leave_login().await),
			Stage::Consent => self.consent().await,
			Stage::AwaitCallback => Ok(self.await_callback().await),
			Stage::Extract => Ok(match extract(self.page, self.config).await {
				Some(extraction) => Transition::Done(extraction),
				None => Transition::Fail(FailureReason::TokenNotFound),
			}),
		}
	}

	async fn navigate(&self) -> Result<Transition> {
		self.page.goto(&self.config.site.home_url).await?;
		tokio::time::sleep(self.config.settle).await;

		let Some(control) = self
			.wait_for(LOGIN_CONTROL, self.config.login_control_timeout)
			.await
		else {
			return Ok(Transition::Fail(FailureReason::LoginControlNotFound));
		};
		self.page.click(&control).await?;
		info!(target = "checkin", control = control.label(), "clicked login control");
		Ok(Transition::Next(Stage::AwaitProvider))
	}

	async fn await_provider(&self) -> Transition {
		let site = &self.config.site;
		match self
			.wait_for_location(self.config.provider_timeout, |url| site.is_provider(url))
			.await
		{
			Some(url) => {
				info!(target = "checkin", %url, "reached identity provider");
				Transition::Next(Stage::Challenge)
			}
			None => Transition::Fail(FailureReason::ProviderTimeout {
				secs: self.config.provider_timeout.as_secs(),
			}),
		}
	}

	async fn challenge(&self) -> Transition {
		let this = self;
		let cleared = poll_until(self.config.challenge_timeout, self.config.challenge_poll, move || async move {
			let html = this
				.page
				.content()
				.await
				.inspect_err(|e| debug!(target = "checkin", "cannot read page content: {}", e))
				.ok()?;
			if !has_challenge_markers(&html) {
				return Some(());
			}
			info!(target = "checkin", "waiting for browser challenge");
			this.click_challenge_checkbox().await;
			None
		})
		.await;

		match cleared {
			Some(()) => {
				info!(target = "checkin", "challenge cleared");
				Transition::Next(Stage::LoginForm)
			}
			None => Transition::Fail(FailureReason::ChallengeTimeout {
				secs: self.config.challenge_timeout.as_secs(),
			}),
		}
	}

	async fn login_form(&self) -> Result<Transition> {
		let this = self;
		let outcome = poll_until(self.config.login_form_timeout, self.config.form_poll, move || async move {
			if let Some(field) = this.find_now(USERNAME_FIELD).await {
				return Some(FormState::Form(field));
			}
			if this.signed_in_elsewhere().await {
				return Some(FormState::AlreadySignedIn);
			}
			None
		})
		.await;

		let username_field = match outcome {
			Some(FormState::Form(field)) => field,
			Some(FormState::AlreadySignedIn) => {
				info!(target = "checkin", "already signed in at identity provider");
				return Ok(Transition::Next(Stage::Consent));
			}
			None => {
				return Ok(Transition::Fail(FailureReason::LoginFormMissing {
					secs: self.config.login_form_timeout.as_secs(),
				}));
			}
		};

		self.page.fill(&username_field, &self.credentials.username).await?;
		info!(target = "checkin", username = %self.credentials.username, "filled username");

		let Some(password_field) = self.wait_for(PASSWORD_FIELD, self.config.field_timeout).await else {
			return Ok(Transition::Fail(FailureReason::FormIncomplete("password field")));
		};
		self.page.fill(&password_field, &self.credentials.password).await?;
		debug!(target = "checkin", "filled password");
		tokio::time::sleep(self.config.submit_delay).await;

		let Some(submit) = self.wait_for(SUBMIT_CONTROL, self.config.field_timeout).await else {
			return Ok(Transition::Fail(FailureReason::FormIncomplete("submit control")));
		};
		self.page.click(&submit).await?;
		info!(target = "checkin", "submitted login form");
		Ok(Transition::Next(Stage::AwaitLeaveLogin))
	}

	async fn await_leave_login(&self) -> Transition {
		let this = self;
		let site = &self.config.site;
		let outcome = poll_until(self.config.leave_login_timeout, self.config.form_poll, move || async move {
			let url = this.page.url().await.ok()?;
			if !site.is_login_page(&url) {
				return Some(LeaveState::Left(url));
			}
			if let Some(message) = this.visible_login_error().await {
				return Some(LeaveState::Rejected(message));
			}
			if this.page.content().await.is_ok_and(|html| has_challenge_markers(&html)) {
				info!(target = "checkin", "challenge reappeared after submit");
				this.click_challenge_checkbox().await;
			}
			None
		})
		.await;

		match outcome {
			Some(LeaveState::Left(url)) => {
				info!(target = "checkin", %url, "left login page");
				Transition::Next(Stage::Consent)
			}
			Some(LeaveState::Rejected(message)) => Transition::Fail(FailureReason::LoginRejected(message)),
			None => Transition::Fail(FailureReason::LoginTimeout {
				secs: self.config.leave_login_timeout.as_secs(),
			}),
		}
	}

	async fn consent(&self) -> Result<Transition> {
		let this = self;
		let site = &self.config.site;
		let outcome = poll_until(self.config.consent_timeout, self.config.url_poll, move || async move {
			if this.page.url().await.is_ok_and(|url| site.is_relying_party(&url)) {
				return Some(ConsentState::Skipped);
			}
			this.find_now(CONSENT_CONTROL).await.map(ConsentState::Control)
		})
		.await;

		match outcome {
			Some(ConsentState::Control(control)) => {
				self.page.click(&control).await?;
				info!(target = "checkin", control = control.label(), "granted consent");
				Ok(Transition::Next(Stage::AwaitCallback))
			}
			Some(ConsentState::Skipped) => {
				info!(target = "checkin", "consent not required");
				Ok(Transition::Next(Stage::AwaitCallback))
			}
			None => Ok(Transition::Fail(FailureReason::NoConsentControl)),
		}
	}

	async fn await_callback(&self) -> Transition {
		let site = &self.config.site;
		match self
			.wait_for_location(self.config.callback_timeout, |url| site.is_relying_party(url))
			.await
		{
			Some(url) => {
				info!(target = "checkin", %url, "returned to relying party");
				Transition::Next(Stage::Extract)
			}
			None => Transition::Fail(FailureReason::CallbackTimeout {
				secs: self.config.callback_timeout.as_secs(),
			}),
		}
	}

	/// Records a failure: logs the location and saves a screenshot.
	async fn fail(&self, stage: Stage, reason: FailureReason) -> RefreshFailure {
		let url = self.page.url().await.ok();
		warn!(
			target = "checkin",
			%stage,
			%reason,
			url = url.as_deref().unwrap_or("<unknown>"),
			"refresh failed"
		);
		if let Ok(title) = self.page.title().await {
			debug!(target = "checkin", %title, "page title at failure");
		}
		let screenshot = self.capture(reason.diagnostic_name()).await;
		RefreshFailure {
			stage,
			reason,
			url,
			screenshot,
		}
	}

	async fn capture(&self, name: &str) -> Option<PathBuf> {
		let bytes = match self.page.screenshot().await {
			Ok(bytes) => bytes,
			Err(e) => {
				warn!(target = "checkin", "could not take screenshot: {}", e);
				return None;
			}
		};

		let dir = &self.config.artifacts_dir;
		let path = dir.join(format!("{name}.png"));
		let written = match tokio::fs::create_dir_all(dir).await {
			Ok(()) => tokio::fs::write(&path, &bytes).await,
			Err(e) => Err(e),
		};
		match written {
			Ok(()) => {
				info!(target = "checkin", path = %path.display(), "saved screenshot");
				Some(path)
			}
			Err(e) => {
				warn!(target = "checkin", path = %path.display(), "could not save screenshot: {}", e);
				None
			}
		}
	}

	/// Single lookup pass; errors count as "not found".
	async fn find_now(&self, chain: &[Lookup]) -> Option<ElementRef> {
		match find_first(self.page, chain).await {
			Ok(found) => found,
			Err(e) => {
				debug!(target = "checkin", "lookup failed: {}", e);
				None
			}
		}
	}

	async fn wait_for(&self, chain: &'static [Lookup], timeout: std::time::Duration) -> Option<ElementRef> {
		let this = self;
		poll_until(timeout, self.config.form_poll, move || this.find_now(chain)).await
	}

	async fn wait_for_location<F>(&self, timeout: std::time::Duration, accept: F) -> Option<String>
	where
		F: Fn(&str) -> bool + Copy,
	{
		let page = self.page;
		poll_until(timeout, self.config.url_poll, move || async move {
			page.url().await.ok().filter(|url| accept(url.as_str()))
		})
		.await
	}

	async fn click_challenge_checkbox(&self) {
		if let Some(checkbox) = self.find_now(CHALLENGE_CHECKBOX).await {
			match self.page.click(&checkbox).await {
				Ok(()) => info!(target = "checkin", "clicked challenge checkbox"),
				Err(e) => debug!(target = "checkin", "challenge checkbox click failed: {}", e),
			}
		}
	}

	async fn visible_login_error(&self) -> Option<String> {
		let element = self.find_now(LOGIN_ERROR).await?;
		let text = self.page.text_of(&element).await.ok()?;
		let text = text.trim();
		(!text.is_empty()).then(|| text.to_string())
	}

	/// True when the provider already redirected onward: back to the relying
	/// party, or straight to the consent page.
	async fn signed_in_elsewhere(&self) -> bool {
		let site = &self.config.site;
		if let Ok(url) = self.page.url().await {
			if site.is_relying_party(&url) {
				return true;
			}
			if site.is_login_page(&url) {
				return false;
			}
		}
		self.find_now(CONSENT_CONTROL).await.is_some()
	}
}
