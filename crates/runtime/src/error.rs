//! Error types for the browser runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the browser.
#[derive(Debug, Error)]
pub enum Error {
	/// No usable browser executable was found.
	#[error("Browser executable not found. Install Chrome/Chromium or set CHROME_PATH.")]
	BrowserNotFound,

	/// Failed to spawn the browser or reach its debugging endpoint.
	#[error("Failed to launch browser: {0}")]
	LaunchFailed(String),

	/// Failed to establish the DevTools WebSocket connection.
	#[error("Failed to connect to browser: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (WebSocket I/O).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (malformed or unexpected frames).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error answered by the browser for a command.
	#[error("{method} failed ({code}): {message}")]
	Remote {
		method: String,
		code: i64,
		message: String,
	},

	/// JavaScript evaluated in the page threw.
	#[error("Evaluation failed: {0}")]
	Evaluation(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Timeout waiting for operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Connection closed while a command was in flight.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}
}
