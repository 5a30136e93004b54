//! DevTools protocol connection layer.
//!
//! This module implements the request/response correlation layer on top of the transport.
//! It handles:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Fanning events out to subscribers
//! - Bounding every command with a timeout
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send`] with method, params and optional session
//! 2. Connection generates a unique ID and registers a oneshot channel
//! 3. Request is serialized and queued on the transport
//! 4. Caller awaits the oneshot receiver (bounded by the command timeout)
//! 5. [`Connection::run`] receives the response and resolves the oneshot by ID
//! 6. Events are broadcast to every [`Connection::subscribe`] receiver


use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use checkin_protocol::cdp::{ErrorPayload, Event, Message, Request};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::transport::{TransportParts, WebSocketTransport};

/// Default upper bound for a single protocol command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the event broadcast ring; slow subscribers skip older events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type Reply = std::result::Result<Value, ErrorPayload>;

/// Pending request callbacks keyed by request ID.
type CallbackMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Reply>>>>;

/// RAII guard ensuring callback cleanup when a request is abandoned
/// (timeout, dropped future, or failed enqueue).
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if !self.completed && self.callbacks.lock().remove(&self.id).is_some() {
			debug!(target = "checkin_runtime", id = self.id, "CancelGuard: removed orphaned callback");
		}
	}
}

/// DevTools connection to one browser.
///
/// Uses sequential request IDs and oneshot channels for correlation.
pub struct Connection {
	/// Sequential request ID counter
	last_id: AtomicU32,
	callbacks: CallbackMap,
	/// Queue drained by the transport writer task
	outbound_tx: mpsc::UnboundedSender<String>,
	events: broadcast::Sender<Event>,
	command_timeout: Duration,
}

impl Connection {
	/// Creates a connection writing frames into `outbound_tx`.
	///
	/// Incoming frames must be fed through [`Connection::run`].
	pub fn new(outbound_tx: mpsc::UnboundedSender<String>) -> Self {
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		Self {
			last_id: AtomicU32::new(1),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			outbound_tx,
			events,
			command_timeout: DEFAULT_COMMAND_TIMEOUT,
		}
	}

	pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
		self.command_timeout = timeout;
		self
	}

	/// Opens a WebSocket to `ws_url` and starts the dispatch loop.
	pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
		let TransportParts {
			outbound_tx,
			inbound_rx,
			reader,
			writer,
		} = WebSocketTransport::connect(ws_url).await?;
		let connection = Arc::new(Connection::new(outbound_tx));
		tokio::spawn(Arc::clone(&connection).run(inbound_rx));
		tokio::spawn(watch_transport(reader, writer));
		Ok(connection)
	}

	/// Returns a receiver for every event arriving after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.events.subscribe()
	}

	/// Returns true once the transport writer is gone.
	pub fn is_closed(&self) -> bool {
		self.outbound_tx.is_closed()
	}

	/// Sends a command and awaits its result.
	///
	/// `session_id` addresses an attached target; `None` talks to the browser.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		debug!(target = "checkin_runtime", id, method, session = ?session_id, "Sending command");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);
		let mut guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let request = Request {
			id,
			method: method.to_string(),
			params,
			session_id: session_id.map(str::to_string),
		};
		let frame = serde_json::to_string(&request)?;

		if self.outbound_tx.send(frame).is_err() {
			error!(target = "checkin_runtime", "Failed to queue command: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		let reply = match tokio::time::timeout(self.command_timeout, rx).await {
			Ok(Ok(reply)) => reply,
			Ok(Err(_)) => return Err(Error::ChannelClosed),
			Err(_) => {
				return Err(Error::Timeout(format!(
					"{method} did not answer within {}ms",
					self.command_timeout.as_millis()
				)));
			}
		};
		guard.complete();

		reply.map_err(|payload| Error::Remote {
			method: method.to_string(),
			code: payload.code,
			message: payload.message,
		})
	}

	/// Runs the dispatch loop until the inbound channel closes.
	///
	/// Pending commands are failed with [`Error::ChannelClosed`] on exit.
	pub async fn run(self: Arc<Self>, mut inbound_rx: mpsc::UnboundedReceiver<String>) {
		while let Some(frame) = inbound_rx.recv().await {
			match serde_json::from_str::<Message>(&frame) {
				Ok(message) => {
					if let Err(e) = self.dispatch(message) {
						debug!(target = "checkin_runtime", "Error dispatching message: {}", e);
					}
				}
				Err(e) => error!(target = "checkin_runtime", "Failed to parse message: {}", e),
			}
		}

		let pending = {
			let mut callbacks = self.callbacks.lock();
			let count = callbacks.len();
			callbacks.clear();
			count
		};
		debug!(target = "checkin_runtime", pending, "Connection closed");
	}

	fn dispatch(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let callback = self.callbacks.lock().remove(&response.id).ok_or_else(|| {
					Error::ProtocolError(format!("Cannot find request to respond: id={}", response.id))
				})?;

				let reply = match response.error {
					Some(payload) => Err(payload),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(reply);
				Ok(())
			}
			Message::Event(event) => {
				// No subscribers is fine: nobody asked for this domain's events.
				let _ = self.events.send(event);
				Ok(())
			}
			Message::Unknown(value) => {
				debug!(target = "checkin_runtime", "Unknown message type (ignored): {}", value);
				Ok(())
			}
		}
	}
}

/// Waits for both transport tasks and reports the first socket failure.
async fn watch_transport(reader: JoinHandle<Result<()>>, writer: JoinHandle<Result<()>>) -> Result<()> {
	let (read, write) = tokio::join!(reader, writer);
	let mut outcome = Ok(());
	for (side, result) in [("reader", read), ("writer", write)] {
		let result = result.unwrap_or_else(|e| Err(Error::TransportError(format!("{side} task failed: {e}"))));
		if let Err(e) = result {
			warn!(target = "checkin_runtime", side, "Transport ended with error: {}", e);
			if outcome.is_ok() {
				outcome = Err(e);
			}
		}
	}
	if outcome.is_ok() {
		debug!(target = "checkin_runtime", "Transport closed");
	}
	outcome
}
