//! Scriptable in-memory browser for tests.
//!
//! [`FakePage`] keeps a current URL, a set of visible elements keyed by
//! [`Lookup`], `localStorage` contents and captured headers. Clicking an
//! element can navigate. All timing uses tokio's clock, so tests can run
//! with paused time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use checkin_runtime::{Error, Result};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::driver::{BrowserSession, CapturedAuthorization, ElementRef, Launcher, PageDriver};
use crate::lookup::Lookup;
use crate::refresh::selectors::{CONSENT_CONTROL, LOGIN_CONTROL, PASSWORD_FIELD, SUBMIT_CONTROL, USERNAME_FIELD};

/// HTML served while a challenge is active.
pub const CHALLENGE_HTML: &str = "<html><head><title>Just a moment...</title></head><body>Checking your browser</body></html>";

/// Bytes returned by [`FakePage::screenshot`].
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Debug, Clone)]
struct FakeElement {
	text: String,
	navigates_to: Option<String>,
	/// Element disappears once the page is at a different URL than this.
	only_at: Option<String>,
}

#[derive(Default)]
struct State {
	url: String,
	html: String,
	challenge_until: Option<Instant>,
	elements: HashMap<Lookup, FakeElement>,
	storage: HashMap<String, String>,
	storage_after_reload: HashMap<String, String>,
	authorizations: Vec<CapturedAuthorization>,
	authorizations_after_reload: Vec<CapturedAuthorization>,
	fills: Vec<(String, String)>,
	calls: Vec<String>,
	fail_everything: bool,
}

/// In-memory [`PageDriver`].
pub struct FakePage {
	state: Mutex<State>,
}

impl FakePage {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			state: Mutex::new(State {
				url: url.into(),
				html: "<html><body></body></html>".into(),
				..State::default()
			}),
		}
	}

	/// A provider login that succeeds: the home page's login control leads
	/// to the provider login form, and submitting it navigates to `after_submit`.
	pub fn with_login_flow(self, provider_login_url: &str, after_submit: &str) -> Self {
		self.with_element_at(LOGIN_CONTROL[0], "登录", None, Some(provider_login_url))
			.with_element_at(USERNAME_FIELD[0], "", Some(provider_login_url), None)
			.with_element_at(PASSWORD_FIELD[0], "", Some(provider_login_url), None)
			.with_element_at(SUBMIT_CONTROL[0], "登录", Some(provider_login_url), Some(after_submit))
	}

	/// A consent page control that navigates to `callback`.
	pub fn with_consent(self, consent_url: &str, callback: &str) -> Self {
		self.with_element_at(CONSENT_CONTROL[0], "授权", Some(consent_url), Some(callback))
	}

	/// Adds an element visible everywhere.
	pub fn with_element(self, lookup: Lookup, text: &str) -> Self {
		self.with_element_at(lookup, text, None, None)
	}

	/// Adds an element, optionally only visible at `only_at`, optionally
	/// navigating to `navigates_to` when clicked.
	pub fn with_element_at(self, lookup: Lookup, text: &str, only_at: Option<&str>, navigates_to: Option<&str>) -> Self {
		self.state.lock().elements.insert(
			lookup,
			FakeElement {
				text: text.to_string(),
				navigates_to: navigates_to.map(str::to_string),
				only_at: only_at.map(str::to_string),
			},
		);
		self
	}

	/// Serves [`CHALLENGE_HTML`] for `duration` from now.
	pub fn with_challenge_for(self, duration: Duration) -> Self {
		self.state.lock().challenge_until = Some(Instant::now() + duration);
		self
	}

	pub fn with_storage(self, key: &str, value: &str) -> Self {
		self.state.lock().storage.insert(key.into(), value.into());
		self
	}

	/// Storage entry that only appears after a reload.
	pub fn with_storage_after_reload(self, key: &str, value: &str) -> Self {
		self.state.lock().storage_after_reload.insert(key.into(), value.into());
		self
	}

	pub fn with_authorization(self, url: Option<&str>, value: &str) -> Self {
		self.state.lock().authorizations.push(CapturedAuthorization {
			url: url.map(str::to_string),
			value: value.into(),
		});
		self
	}

	/// Header that only gets captured after a reload.
	pub fn with_authorization_after_reload(self, url: Option<&str>, value: &str) -> Self {
		self.state.lock().authorizations_after_reload.push(CapturedAuthorization {
			url: url.map(str::to_string),
			value: value.into(),
		});
		self
	}

	/// Makes every operation fail like a dead connection.
	pub fn failing(self) -> Self {
		self.state.lock().fail_everything = true;
		self
	}

	/// Moves the page without going through a click.
	pub fn set_url(&self, url: &str) {
		self.state.lock().url = url.to_string();
	}

	pub fn current_url(&self) -> String {
		self.state.lock().url.clone()
	}

	/// Notable operations in order: `goto:`, `reload`, `click:`, `fill:`,
	/// `storage:`, `authorizations`, `screenshot`.
	pub fn calls(&self) -> Vec<String> {
		self.state.lock().calls.clone()
	}

	/// `(lookup, value)` pairs passed to `fill`.
	pub fn fills(&self) -> Vec<(String, String)> {
		self.state.lock().fills.clone()
	}

	fn record(&self, call: impl Into<String>) -> Result<()> {
		let mut state = self.state.lock();
		state.calls.push(call.into());
		if state.fail_everything {
			return Err(Error::ChannelClosed);
		}
		Ok(())
	}

	fn check_alive(&self) -> Result<()> {
		if self.state.lock().fail_everything {
			return Err(Error::ChannelClosed);
		}
		Ok(())
	}

	fn element(&self, handle: &str) -> Result<FakeElement> {
		let state = self.state.lock();
		state
			.elements
			.iter()
			.find(|(lookup, _)| lookup.to_string() == handle)
			.map(|(_, element)| element.clone())
			.ok_or_else(|| Error::Evaluation(format!("stale element {handle}")))
	}
}

#[async_trait]
impl PageDriver for FakePage {
	async fn goto(&self, url: &str) -> Result<()> {
		self.record(format!("goto:{url}"))?;
		self.state.lock().url = url.to_string();
		Ok(())
	}

	async fn reload(&self) -> Result<()> {
		self.record("reload")?;
		let mut state = self.state.lock();
		let storage = std::mem::take(&mut state.storage_after_reload);
		state.storage.extend(storage);
		let headers = std::mem::take(&mut state.authorizations_after_reload);
		state.authorizations.extend(headers);
		Ok(())
	}

	async fn url(&self) -> Result<String> {
		self.check_alive()?;
		Ok(self.current_url())
	}

	async fn title(&self) -> Result<String> {
		self.check_alive()?;
		Ok("fake".into())
	}

	async fn content(&self) -> Result<String> {
		self.check_alive()?;
		let state = self.state.lock();
		match state.challenge_until {
			Some(until) if Instant::now() < until => Ok(CHALLENGE_HTML.into()),
			_ => Ok(state.html.clone()),
		}
	}

	async fn find(&self, lookup: &Lookup) -> Result<Option<ElementRef>> {
		self.check_alive()?;
		let state = self.state.lock();
		let visible = state
			.elements
			.get(lookup)
			.is_some_and(|element| element.only_at.as_ref().is_none_or(|at| *at == state.url));
		Ok(visible.then(|| ElementRef::new(lookup.to_string(), lookup.to_string())))
	}

	async fn click(&self, element: &ElementRef) -> Result<()> {
		self.record(format!("click:{}", element.label()))?;
		let target = self.element(element.handle())?;
		if let Some(url) = target.navigates_to {
			self.state.lock().url = url;
		}
		Ok(())
	}

	async fn fill(&self, element: &ElementRef, value: &str) -> Result<()> {
		self.record(format!("fill:{}", element.label()))?;
		self.element(element.handle())?;
		self.state.lock().fills.push((element.label().to_string(), value.to_string()));
		Ok(())
	}

	async fn text_of(&self, element: &ElementRef) -> Result<String> {
		self.check_alive()?;
		Ok(self.element(element.handle())?.text)
	}

	async fn storage_item(&self, key: &str) -> Result<Option<String>> {
		self.record(format!("storage:{key}"))?;
		Ok(self.state.lock().storage.get(key).cloned())
	}

	async fn captured_authorizations(&self) -> Result<Vec<CapturedAuthorization>> {
		self.record("authorizations")?;
		Ok(self.state.lock().authorizations.iter().rev().cloned().collect())
	}

	async fn screenshot(&self) -> Result<Vec<u8>> {
		self.record("screenshot")?;
		Ok(FAKE_PNG.to_vec())
	}
}

/// Hands out sessions over one shared [`FakePage`].
pub struct FakeLauncher {
	page: Arc<FakePage>,
	failures_left: AtomicU32,
	launches: AtomicU32,
	closes: Arc<AtomicU32>,
}

impl FakeLauncher {
	pub fn new(page: FakePage) -> Self {
		Self {
			page: Arc::new(page),
			failures_left: AtomicU32::new(0),
			launches: AtomicU32::new(0),
			closes: Arc::new(AtomicU32::new(0)),
		}
	}

	/// The first `failures` launches fail.
	pub fn failing_first(self, failures: u32) -> Self {
		self.failures_left.store(failures, Ordering::SeqCst);
		self
	}

	pub fn page(&self) -> &FakePage {
		&self.page
	}

	/// Launch attempts, including failed ones.
	pub fn launches(&self) -> u32 {
		self.launches.load(Ordering::SeqCst)
	}

	/// `close` calls across all sessions.
	pub fn closes(&self) -> u32 {
		self.closes.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Launcher for FakeLauncher {
	type Session = FakeSession;

	async fn launch(&self) -> Result<FakeSession> {
		self.launches.fetch_add(1, Ordering::SeqCst);
		let failed = self
			.failures_left
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();
		if failed {
			return Err(Error::LaunchFailed("fake launch failure".into()));
		}
		Ok(FakeSession {
			page: Arc::clone(&self.page),
			closes: Arc::clone(&self.closes),
		})
	}
}

pub struct FakeSession {
	page: Arc<FakePage>,
	closes: Arc<AtomicU32>,
}

#[async_trait]
impl BrowserSession for FakeSession {
	type Page = FakePage;

	fn page(&self) -> &FakePage {
		&self.page
	}

	async fn close(&mut self) -> Result<()> {
		self.closes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}
