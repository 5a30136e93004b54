//! Browser-driven credential refresh.
//!
//! Drives a real browser through the relying party's OAuth login with the
//! identity provider and pulls the resulting bearer token out of the page.
//!
//! * [`driver`] - the page/session/launcher seam the flow is written against
//! * [`page`] - the DevTools-backed implementation of that seam
//! * [`browser`] - launching and tearing down a real browser session
//! * [`lookup`] - ordered DOM lookup strategies
//! * [`refresh`] - the refresh state machine and token extraction
//! * [`token`] - the bearer token type

pub mod browser;
pub mod driver;
pub mod lookup;
pub mod page;
pub mod refresh;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use browser::{ChromeLauncher, ChromeSession};
pub use checkin_runtime::{Error, LaunchOptions, Result};
pub use driver::{BrowserSession, CapturedAuthorization, ElementRef, Launcher, PageDriver};
pub use lookup::Lookup;
pub use refresh::{Credentials, FailureReason, FlowConfig, RefreshFailure, RefreshOutcome, Refresher, Site, Stage};
pub use token::Token;
