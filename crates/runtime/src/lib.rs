//! Browser runtime for the checkin workspace.
//!
//! Launches an isolated Chromium-family browser with remote debugging enabled
//! and speaks the DevTools protocol to it over a WebSocket.
//!
//! * [`driver`] - locate, launch, and tear down the browser process
//! * [`connection`] - request/response correlation and event fan-out
//! * [`transport`] - WebSocket framing

pub mod connection;
pub mod driver;
pub mod error;
pub mod transport;

pub use connection::Connection;
pub use driver::{BrowserProcess, LaunchOptions};
pub use error::{Error, Result};
