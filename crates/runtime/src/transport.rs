//! WebSocket transport for the DevTools protocol.
//!
//! The browser exposes one WebSocket per debugging endpoint. Each protocol
//! message is a single text frame holding one JSON document, so unlike a
//! pipe transport no length-prefix framing is needed.
//!
//! [`WebSocketTransport::connect`] splits the socket into two background
//! tasks bridged by unbounded channels:
//!
//! * writer: `outbound_tx` → socket
//! * reader: socket → `inbound_rx`
//!
//! Dropping every `outbound_tx` closes the socket; the reader ends when the
//! browser closes its side, which in turn closes `inbound_rx`. Both tasks
//! resolve to [`Error::TransportError`] when the socket fails underneath them.


use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Channel ends produced by a connected transport.
pub struct TransportParts {
	/// Frames queued here are written to the socket in order.
	pub outbound_tx: mpsc::UnboundedSender<String>,
	/// Text frames received from the socket.
	pub inbound_rx: mpsc::UnboundedReceiver<String>,
	pub reader: JoinHandle<Result<()>>,
	pub writer: JoinHandle<Result<()>>,
}

pub struct WebSocketTransport;

impl WebSocketTransport {
	/// Connects to a `ws://` debugger URL and starts the I/O tasks.
	pub async fn connect(url: &str) -> Result<TransportParts> {
		let (socket, _response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		debug!(target = "checkin_runtime", url, "websocket connected");

		let (mut sink, mut stream) = socket.split();
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

		let writer = tokio::spawn(async move {
			while let Some(frame) = outbound_rx.recv().await {
				if let Err(e) = sink.send(WsMessage::Text(frame)).await {
					error!(target = "checkin_runtime", "Transport write error: {}", e);
					return Err(Error::TransportError(format!("write failed: {e}")));
				}
			}
			let _ = sink.close().await;
			Ok(())
		});

		let reader = tokio::spawn(async move {
			while let Some(frame) = stream.next().await {
				match frame {
					Ok(WsMessage::Text(text)) => {
						if inbound_tx.send(text).is_err() {
							break;
						}
					}
					Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
						Ok(text) => {
							if inbound_tx.send(text).is_err() {
								break;
							}
						}
						Err(e) => debug!(target = "checkin_runtime", "Dropping non-UTF-8 binary frame: {}", e),
					},
					Ok(WsMessage::Close(reason)) => {
						debug!(target = "checkin_runtime", ?reason, "websocket closed by peer");
						break;
					}
					Ok(_) => {}
					Err(e) => {
						debug!(target = "checkin_runtime", "Transport read error: {}", e);
						return Err(Error::TransportError(format!("read failed: {e}")));
					}
				}
			}
			Ok(())
		});

		Ok(TransportParts {
			outbound_tx,
			inbound_rx,
			reader,
			writer,
		})
	}
}
