//! Records `Authorization` request headers from a page's network events.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use checkin_protocol::cdp::Event;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::driver::CapturedAuthorization;

/// Most recent headers kept.
pub const CAPTURE_CAPACITY: usize = 200;

/// Request URLs remembered for correlating `ExtraInfo` events.
const URL_MEMORY: usize = 512;

#[derive(Default)]
struct State {
	captured: VecDeque<CapturedAuthorization>,
	urls: HashMap<String, String>,
}

/// Shared log of captured authorization headers.
#[derive(Clone, Default)]
pub struct NetworkLog {
	state: Arc<Mutex<State>>,
}

impl NetworkLog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Captured headers, most recent first.
	pub fn snapshot(&self) -> Vec<CapturedAuthorization> {
		self.state.lock().captured.iter().rev().cloned().collect()
	}

	/// Feeds one protocol event into the log.
	pub fn observe(&self, event: &Event) {
		match event.method.as_str() {
			"Network.requestWillBeSent" => {
				let request_id = event.params["requestId"].as_str();
				let request = &event.params["request"];
				let url = request["url"].as_str();

				let mut state = self.state.lock();
				if let (Some(id), Some(url)) = (request_id, url) {
					if state.urls.len() >= URL_MEMORY {
						state.urls.clear();
					}
					state.urls.insert(id.to_string(), url.to_string());
				}
				if let Some(value) = authorization_header(&request["headers"]) {
					push(&mut state, url.map(str::to_string), value);
				}
			}
			"Network.requestWillBeSentExtraInfo" => {
				let Some(value) = authorization_header(&event.params["headers"]) else {
					return;
				};
				let mut state = self.state.lock();
				let url = event.params["requestId"]
					.as_str()
					.and_then(|id| state.urls.get(id).cloned());
				push(&mut state, url, value);
			}
			_ => {}
		}
	}

	/// Spawns a task feeding events for `session_id` into this log until the
	/// connection closes.
	pub fn spawn_recorder(&self, mut events: broadcast::Receiver<Event>, session_id: String) -> JoinHandle<()> {
		let log = self.clone();
		tokio::spawn(async move {
			loop {
				match events.recv().await {
					Ok(event) if event.session_id.as_deref() == Some(session_id.as_str()) => log.observe(&event),
					Ok(_) => {}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						debug!(target = "checkin", skipped, "network recorder lagged");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}
}

fn push(state: &mut State, url: Option<String>, value: String) {
	// ExtraInfo frequently repeats the header already seen on the request.
	if state.captured.back().is_some_and(|last| last.value == value && last.url == url) {
		return;
	}
	trace!(target = "checkin", url = url.as_deref().unwrap_or("<unknown>"), "captured authorization header");
	if state.captured.len() == CAPTURE_CAPACITY {
		state.captured.pop_front();
	}
	state.captured.push_back(CapturedAuthorization { url, value });
}

/// Header names are case-insensitive and vary between HTTP/1 and HTTP/2.
fn authorization_header(headers: &Value) -> Option<String> {
	headers
		.as_object()?
		.iter()
		.find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
		.and_then(|(_, value)| value.as_str())
		.map(str::to_string)
}
