//! Chrome DevTools Protocol message envelopes.
//!
//! CDP speaks JSON-RPC-like frames over a WebSocket:
//!
//! 1. Client sends [`Request`] with a unique `id`
//! 2. Browser answers with a [`Response`] carrying the same `id`
//! 3. Browser pushes [`Event`]s (no `id`) for enabled domains
//!
//! With flattened target sessions every frame may carry a `sessionId`
//! naming the attached page target it belongs to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
	/// Unique request ID for correlating responses.
	pub id: u32,
	/// Domain-qualified method name (e.g. `"Page.navigate"`).
	pub method: String,
	/// Method parameters as JSON object.
	pub params: Value,
	/// Target session the command is addressed to (browser-level when absent).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
	/// Request ID this response correlates to.
	pub id: u32,
	/// Success result (mutually exclusive with error).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Protocol error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// JSON-RPC error code (e.g. `-32000` for generic server errors).
	pub code: i64,
	/// Error message.
	pub message: String,
	/// Optional extra detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Notification pushed by the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	/// Domain-qualified event name (e.g. `"Network.requestWillBeSent"`).
	pub method: String,
	#[serde(default)]
	pub params: Value,
	/// Session of the target that emitted the event.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Discriminated union of incoming frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Event message (has `method`, no `id`)
	Event(Event),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}

/// Subset of the `/json/version` discovery document.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser", default)]
	pub browser: Option<String>,
}

/// Result of `Runtime.evaluate` / `Runtime.callFunctionOn`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
	pub result: RemoteObject,
	#[serde(default)]
	pub exception_details: Option<ExceptionDetails>,
}

/// Mirror object of a JavaScript value living in the page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub subtype: Option<String>,
	/// Present when the value was returned by value.
	#[serde(default)]
	pub value: Option<Value>,
	/// Handle to the live object when returned by reference.
	#[serde(default)]
	pub object_id: Option<String>,
	#[serde(default)]
	pub description: Option<String>,
}

impl RemoteObject {
	/// Returns true for `null` and `undefined`.
	pub fn is_nullish(&self) -> bool {
		self.kind == "undefined" || self.subtype.as_deref() == Some("null")
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	pub text: String,
	#[serde(default)]
	pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
	/// Best human-readable description of the thrown value.
	pub fn message(&self) -> String {
		self.exception
			.as_ref()
			.and_then(|e| e.description.clone())
			.unwrap_or_else(|| self.text.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_serializes_session_only_when_present() {
		let request = Request {
			id: 7,
			method: "Page.navigate".into(),
			params: serde_json::json!({ "url": "https://example.com" }),
			session_id: None,
		};
		let json = serde_json::to_value(&request).unwrap();
		assert_eq!(json["id"], 7);
		assert!(json.get("sessionId").is_none());

		let scoped = Request {
			session_id: Some("S1".into()),
			..request
		};
		let json = serde_json::to_value(&scoped).unwrap();
		assert_eq!(json["sessionId"], "S1");
	}

	#[test]
	fn message_deserialization_response() {
		let json = r#"{"id": 42, "result": {"frameId": "F"}}"#;
		match serde_json::from_str::<Message>(json).unwrap() {
			Message::Response(response) => {
				assert_eq!(response.id, 42);
				assert!(response.result.is_some());
				assert!(response.error.is_none());
			}
			other => panic!("Expected Response, got {other:?}"),
		}
	}

	#[test]
	fn message_deserialization_error_response() {
		let json = r#"{"id": 3, "error": {"code": -32000, "message": "Cannot navigate"}, "sessionId": "S"}"#;
		match serde_json::from_str::<Message>(json).unwrap() {
			Message::Response(response) => {
				let error = response.error.unwrap();
				assert_eq!(error.code, -32000);
				assert_eq!(error.message, "Cannot navigate");
				assert_eq!(response.session_id.as_deref(), Some("S"));
			}
			other => panic!("Expected Response, got {other:?}"),
		}
	}

	#[test]
	fn message_deserialization_event() {
		let json = r#"{"method": "Network.requestWillBeSent", "params": {"requestId": "1"}, "sessionId": "S"}"#;
		match serde_json::from_str::<Message>(json).unwrap() {
			Message::Event(event) => {
				assert_eq!(event.method, "Network.requestWillBeSent");
				assert_eq!(event.params["requestId"], "1");
				assert_eq!(event.session_id.as_deref(), Some("S"));
			}
			other => panic!("Expected Event, got {other:?}"),
		}
	}

	#[test]
	fn remote_object_nullish() {
		let null: RemoteObject = serde_json::from_str(r#"{"type": "object", "subtype": "null", "value": null}"#).unwrap();
		assert!(null.is_nullish());
		let element: RemoteObject =
			serde_json::from_str(r#"{"type": "object", "subtype": "node", "objectId": "1.2.3", "description": "button.login-btn"}"#).unwrap();
		assert!(!element.is_nullish());
		assert_eq!(element.object_id.as_deref(), Some("1.2.3"));
	}

	#[test]
	fn exception_prefers_description() {
		let details: ExceptionDetails = serde_json::from_str(
			r#"{"text": "Uncaught", "exception": {"type": "object", "description": "TypeError: x is not a function"}}"#,
		)
		.unwrap();
		assert_eq!(details.message(), "TypeError: x is not a function");
	}
}
