//! Browser process management.
//!
//! Locates a Chromium-family executable, launches it with remote debugging on
//! a free local port and an isolated throwaway profile, and discovers the
//! DevTools WebSocket endpoint from `/json/version`.
//!
//! The executable is resolved in the following order:
//! 1. Explicit path (e.g. from `CHROME_PATH`) when it exists
//! 2. Well-known install locations for the current platform
//! 3. Command names on `PATH` (Linux), skipping snap-packaged wrappers

use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use checkin_protocol::cdp::VersionInfo;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Ports scanned for a free remote-debugging listener.
pub const DEBUG_PORT_RANGE: RangeInclusive<u16> = 9222..=9322;

/// Arguments that make the automated browser look like an ordinary one and
/// keep it quiet in CI containers.
const STEALTH_ARGS: &[&str] = &[
	"--disable-blink-features=AutomationControlled",
	"--no-sandbox",
	"--disable-dev-shm-usage",
	"--disable-gpu",
	"--no-first-run",
	"--no-default-browser-check",
	"--disable-infobars",
	"--disable-popup-blocking",
	"--disable-extensions",
	"--disable-background-networking",
	"--window-size=1920,1080",
];

/// How long to wait for the debugging endpoint after spawning.
const ENDPOINT_ATTEMPTS: u32 = 30;
const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Options for [`BrowserProcess::launch`].
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
	/// Explicit browser executable; auto-detected when absent or missing.
	pub executable: Option<PathBuf>,
	/// Run without a visible window (`--headless=new`).
	pub headless: bool,
	/// Extra command-line arguments appended after the defaults.
	pub extra_args: Vec<String>,
}

impl LaunchOptions {
	/// Full argument list for a launch on `port` with profile `profile_dir`.
	pub fn args(&self, port: u16, profile_dir: &Path) -> Vec<String> {
		let mut args = vec![
			format!("--remote-debugging-port={port}"),
			format!("--user-data-dir={}", profile_dir.display()),
		];
		args.extend(STEALTH_ARGS.iter().map(|arg| arg.to_string()));
		if self.headless {
			args.push("--headless=new".to_string());
		}
		args.extend(self.extra_args.iter().cloned());
		args.push("about:blank".to_string());
		args
	}
}

/// A running browser launched by us.
///
/// The child is spawned with kill-on-drop, so dropping this value without
/// calling [`BrowserProcess::terminate`] still takes the browser down.
pub struct BrowserProcess {
	child: Child,
	port: u16,
	version: VersionInfo,
	/// Deleted on drop, after the browser is gone.
	_profile: TempDir,
}

impl BrowserProcess {
	/// Spawns the browser and waits until its DevTools endpoint answers.
	pub async fn launch(options: &LaunchOptions) -> Result<Self> {
		let executable = find_browser_executable(options.executable.as_deref()).ok_or(Error::BrowserNotFound)?;
		let port = find_free_port(DEBUG_PORT_RANGE).ok_or_else(|| {
			Error::LaunchFailed(format!(
				"no free debugging port in {}..={}",
				DEBUG_PORT_RANGE.start(),
				DEBUG_PORT_RANGE.end()
			))
		})?;
		let profile = tempfile::Builder::new().prefix("checkin-profile-").tempdir()?;

		let args = options.args(port, profile.path());
		info!(
			target = "checkin_runtime",
			executable = %executable.display(),
			port,
			headless = options.headless,
			"launching browser"
		);
		debug!(target = "checkin_runtime", ?args, "browser arguments");

		let child = Command::new(&executable)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("failed to spawn {}: {e}", executable.display())))?;

		let mut process = Self {
			child,
			port,
			version: VersionInfo {
				web_socket_debugger_url: String::new(),
				browser: None,
			},
			_profile: profile,
		};
		process.version = process.wait_for_endpoint().await?;
		info!(
			target = "checkin_runtime",
			browser = process.version.browser.as_deref().unwrap_or("unknown"),
			"browser ready"
		);
		Ok(process)
	}

	async fn wait_for_endpoint(&mut self) -> Result<VersionInfo> {
		for attempt in 0..ENDPOINT_ATTEMPTS {
			tokio::time::sleep(ENDPOINT_POLL_INTERVAL).await;

			if let Some(status) = self.child.try_wait()? {
				return Err(Error::LaunchFailed(format!("browser exited during startup with {status}")));
			}

			match fetch_version(self.port).await {
				Ok(info) => return Ok(info),
				Err(e) if attempt + 1 < ENDPOINT_ATTEMPTS => {
					debug!(target = "checkin_runtime", attempt, "debugging endpoint not ready: {}", e);
				}
				Err(e) => return Err(e),
			}
		}

		Err(Error::LaunchFailed(format!(
			"browser launched but debugging endpoint not available on port {}",
			self.port
		)))
	}

	/// Browser-level DevTools WebSocket URL.
	pub fn ws_url(&self) -> &str {
		&self.version.web_socket_debugger_url
	}

	/// Waits up to `grace` for a voluntary exit, then kills the process.
	pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
		if self.child.try_wait()?.is_some() {
			return Ok(());
		}

		match tokio::time::timeout(grace, self.child.wait()).await {
			Ok(status) => {
				let status = status?;
				debug!(target = "checkin_runtime", %status, "browser exited");
			}
			Err(_) => {
				warn!(target = "checkin_runtime", "browser did not exit within {:?}, killing", grace);
				self.child.kill().await?;
			}
		}
		Ok(())
	}
}

/// Fetches the `/json/version` discovery document from a local debugging port.
pub async fn fetch_version(port: u16) -> Result<VersionInfo> {
	let url = format!("http://127.0.0.1:{port}/json/version");

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(2))
		.build()
		.map_err(|e| Error::ConnectionFailed(format!("failed to create HTTP client: {e}")))?;

	let response = client
		.get(&url)
		.send()
		.await
		.map_err(|e| Error::ConnectionFailed(format!("failed to connect to port {port}: {e}")))?;

	if !response.status().is_success() {
		return Err(Error::ConnectionFailed(format!(
			"unexpected response from port {port}: {}",
			response.status()
		)));
	}

	response
		.json()
		.await
		.map_err(|e| Error::ProtocolError(format!("failed to parse /json/version: {e}")))
}

/// Returns the first port in `range` that can be bound on the loopback interface.
pub fn find_free_port(range: RangeInclusive<u16>) -> Option<u16> {
	range.into_iter().find(|port| TcpListener::bind(("127.0.0.1", *port)).is_ok())
}

/// Finds a Chrome/Chromium executable, preferring `explicit` when it exists.
pub fn find_browser_executable(explicit: Option<&Path>) -> Option<PathBuf> {
	if let Some(path) = explicit {
		if path.exists() {
			return Some(path.to_path_buf());
		}
		warn!(target = "checkin_runtime", path = %path.display(), "configured browser path does not exist, auto-detecting");
	}

	let fixed: &[&str] = if cfg!(target_os = "macos") {
		&[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
		]
	} else if cfg!(target_os = "windows") {
		&[
			r"C:\Program Files\Google\Chrome\Application\chrome.exe",
			r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
		]
	} else {
		&[
			"/usr/bin/google-chrome",
			"/usr/bin/google-chrome-stable",
			"/opt/google/chrome/chrome",
			"/usr/bin/chromium",
			"/usr/bin/chromium-browser",
		]
	};

	if let Some(found) = fixed.iter().map(PathBuf::from).find(|path| path.exists()) {
		return Some(found);
	}

	if cfg!(target_os = "windows") {
		if let Some(local) = std::env::var_os("LOCALAPPDATA") {
			let path = PathBuf::from(local).join(r"Google\Chrome\Application\chrome.exe");
			if path.exists() {
				return Some(path);
			}
		}
		return None;
	}

	["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
		.iter()
		.filter_map(|name| which::which(name).ok())
		.find(|path| !is_snap_wrapper(path))
}

/// Snap-packaged browsers cannot read a profile directory under `/tmp`.
fn is_snap_wrapper(path: &Path) -> bool {
	let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
	resolved.components().any(|c| c.as_os_str() == "snap")
}
