//! Real browser sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkin_runtime::{BrowserProcess, Connection, LaunchOptions, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::driver::{BrowserSession, Launcher};
use crate::page::CdpPage;

/// How long the browser gets to exit after `Browser.close` before it is killed.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Launches local Chrome/Chromium instances.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
	options: LaunchOptions,
}

impl ChromeLauncher {
	pub fn new(options: LaunchOptions) -> Self {
		Self { options }
	}
}

#[async_trait]
impl Launcher for ChromeLauncher {
	type Session = ChromeSession;

	async fn launch(&self) -> Result<ChromeSession> {
		ChromeSession::start(&self.options).await
	}
}

/// A browser process, its DevTools connection and the one page we drive.
///
/// Field order matters: the page (and its recorder task) goes first, the
/// process (and its profile directory) last.
pub struct ChromeSession {
	page: CdpPage,
	connection: Arc<Connection>,
	process: BrowserProcess,
	closed: bool,
}

impl ChromeSession {
	pub async fn start(options: &LaunchOptions) -> Result<Self> {
		let process = BrowserProcess::launch(options).await?;
		let connection = Connection::connect(process.ws_url()).await?;
		let page = CdpPage::open(Arc::clone(&connection)).await?;
		Ok(Self {
			page,
			connection,
			process,
			closed: false,
		})
	}
}

#[async_trait]
impl BrowserSession for ChromeSession {
	type Page = CdpPage;

	fn page(&self) -> &CdpPage {
		&self.page
	}

	async fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;

		// The browser usually drops the socket before answering.
		if let Err(e) = self.connection.send("Browser.close", json!({}), None).await {
			debug!(target = "checkin", "Browser.close: {}", e);
		}
		self.process.terminate(CLOSE_GRACE).await?;
		info!(target = "checkin", "browser closed");
		Ok(())
	}
}
