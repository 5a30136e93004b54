//! The seam between the refresh flow and a browser.
//!
//! The flow only ever talks to [`PageDriver`], [`BrowserSession`] and
//! [`Launcher`]; [`crate::page::CdpPage`] and [`crate::browser`] implement
//! them over the DevTools protocol, [`crate::testing`] implements them in
//! memory.

use async_trait::async_trait;
use checkin_runtime::Result;

use crate::lookup::Lookup;

/// Handle to a DOM element found by a [`Lookup`].
///
/// Handles are only valid until the page navigates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
	handle: String,
	label: String,
}

impl ElementRef {
	pub fn new(handle: impl Into<String>, label: impl Into<String>) -> Self {
		Self {
			handle: handle.into(),
			label: label.into(),
		}
	}

	/// Backend-specific handle (a remote object id for CDP pages).
	pub fn handle(&self) -> &str {
		&self.handle
	}

	/// The lookup that produced this element, for logs.
	pub fn label(&self) -> &str {
		&self.label
	}
}

/// An `Authorization` request header observed in the page's network traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedAuthorization {
	/// Request URL, when known.
	pub url: Option<String>,
	/// Raw header value (usually `Bearer <token>`).
	pub value: String,
}

/// One browser tab.
#[async_trait]
pub trait PageDriver: Send + Sync {
	/// Navigates and waits for the document to finish loading.
	async fn goto(&self, url: &str) -> Result<()>;

	/// Reloads and waits for the document to finish loading.
	async fn reload(&self) -> Result<()>;

	/// Current location.
	async fn url(&self) -> Result<String>;

	async fn title(&self) -> Result<String>;

	/// Serialized HTML of the current document.
	async fn content(&self) -> Result<String>;

	/// Returns the first visible element matching `lookup`.
	///
	/// Absence is `Ok(None)`, never an error.
	async fn find(&self, lookup: &Lookup) -> Result<Option<ElementRef>>;

	async fn click(&self, element: &ElementRef) -> Result<()>;

	/// Replaces the element's value with `value` as if typed.
	async fn fill(&self, element: &ElementRef, value: &str) -> Result<()>;

	/// Trimmed visible text of the element.
	async fn text_of(&self, element: &ElementRef) -> Result<String>;

	/// `localStorage.getItem(key)`.
	async fn storage_item(&self, key: &str) -> Result<Option<String>>;

	/// Authorization headers seen so far, most recent first.
	async fn captured_authorizations(&self) -> Result<Vec<CapturedAuthorization>>;

	/// PNG screenshot of the viewport.
	async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// A launched browser owning one page.
#[async_trait]
pub trait BrowserSession: Send {
	type Page: PageDriver;

	fn page(&self) -> &Self::Page;

	/// Terminates the browser. Calling it again is a no-op.
	async fn close(&mut self) -> Result<()>;
}

/// Starts browser sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
	type Session: BrowserSession;

	async fn launch(&self) -> Result<Self::Session>;
}
