//! [`PageDriver`] over a DevTools page target.
//!
//! A [`CdpPage`] owns one tab created through `Target.createTarget` and
//! attached with flattened sessions, so every command travels over the
//! browser connection tagged with the page's `sessionId`.

mod network;
mod scripts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use checkin_protocol::cdp::{EvaluateResult, RemoteObject};
use checkin_runtime::{Connection, Error, Result};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use network::{CAPTURE_CAPACITY, NetworkLog};

use crate::driver::{CapturedAuthorization, ElementRef, PageDriver};
use crate::lookup::Lookup;

/// Upper bound for a navigation to reach `readyState === "complete"`.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct CdpPage {
	connection: Arc<Connection>,
	target_id: String,
	session_id: String,
	network: NetworkLog,
	recorder: JoinHandle<()>,
}

impl CdpPage {
	/// Creates a blank tab, attaches to it and enables the domains the
	/// refresh flow depends on.
	pub async fn open(connection: Arc<Connection>) -> Result<Self> {
		let created = connection
			.send("Target.createTarget", json!({ "url": "about:blank" }), None)
			.await?;
		let target_id = string_field(&created, "targetId", "Target.createTarget")?;

		let attached = connection
			.send("Target.attachToTarget", json!({ "targetId": target_id, "flatten": true }), None)
			.await?;
		let session_id = string_field(&attached, "sessionId", "Target.attachToTarget")?;
		debug!(target = "checkin", %target_id, %session_id, "attached to page target");

		// Subscribe before Network.enable so no early request is missed.
		let network = NetworkLog::new();
		let recorder = network.spawn_recorder(connection.subscribe(), session_id.clone());

		let page = Self {
			connection,
			target_id,
			session_id,
			network,
			recorder,
		};
		page.call("Page.enable", json!({})).await?;
		page.call("Network.enable", json!({})).await?;
		page.call(
			"Page.addScriptToEvaluateOnNewDocument",
			json!({ "source": scripts::WEBDRIVER_MASK }),
		)
		.await?;
		Ok(page)
	}

	pub fn target_id(&self) -> &str {
		&self.target_id
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value> {
		self.connection.send(method, params, Some(&self.session_id)).await
	}

	async fn evaluate(&self, expression: &str, by_value: bool) -> Result<RemoteObject> {
		let result = self
			.call(
				"Runtime.evaluate",
				json!({ "expression": expression, "returnByValue": by_value, "awaitPromise": true }),
			)
			.await?;
		unwrap_evaluation(serde_json::from_value(result)?)
	}

	async fn evaluate_value(&self, expression: &str) -> Result<Value> {
		Ok(self.evaluate(expression, true).await?.value.unwrap_or(Value::Null))
	}

	async fn call_on(&self, element: &ElementRef, function: &str, by_value: bool) -> Result<RemoteObject> {
		let result = self
			.call(
				"Runtime.callFunctionOn",
				json!({
					"objectId": element.handle(),
					"functionDeclaration": function,
					"returnByValue": by_value,
					"awaitPromise": true,
				}),
			)
			.await?;
		unwrap_evaluation(serde_json::from_value(result)?)
	}

	/// Waits for the document to finish loading.
	///
	/// Evaluation errors while the old document is torn down are expected
	/// and retried. Running out of time is logged, not fatal: challenge
	/// pages keep loading resources long after they become usable.
	async fn wait_for_load(&self) {
		let deadline = Instant::now() + NAVIGATION_TIMEOUT;
		loop {
			match self.evaluate_value(scripts::READY_STATE).await {
				Ok(Value::String(state)) if state == "complete" => return,
				Ok(_) => {}
				Err(e) => debug!(target = "checkin", "readyState check failed: {}", e),
			}
			if Instant::now() >= deadline {
				warn!(target = "checkin", "page did not finish loading within {:?}", NAVIGATION_TIMEOUT);
				return;
			}
			tokio::time::sleep(READY_POLL_INTERVAL).await;
		}
	}
}

impl Drop for CdpPage {
	fn drop(&mut self) {
		self.recorder.abort();
	}
}

#[async_trait]
impl PageDriver for CdpPage {
	async fn goto(&self, url: &str) -> Result<()> {
		debug!(target = "checkin", url, "navigating");
		let result = self.call("Page.navigate", json!({ "url": url })).await?;
		if let Some(error) = result["errorText"].as_str().filter(|e| !e.is_empty()) {
			return Err(Error::ProtocolError(format!("navigation to {url} failed: {error}")));
		}
		self.wait_for_load().await;
		Ok(())
	}

	async fn reload(&self) -> Result<()> {
		debug!(target = "checkin", "reloading");
		self.call("Page.reload", json!({})).await?;
		self.wait_for_load().await;
		Ok(())
	}

	async fn url(&self) -> Result<String> {
		let info = self
			.connection
			.send("Target.getTargetInfo", json!({ "targetId": self.target_id }), None)
			.await?;
		info["targetInfo"]["url"]
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| Error::ProtocolError("Target.getTargetInfo returned no url".into()))
	}

	async fn title(&self) -> Result<String> {
		Ok(self.evaluate_value(scripts::TITLE).await?.as_str().unwrap_or_default().to_string())
	}

	async fn content(&self) -> Result<String> {
		Ok(self
			.evaluate_value(scripts::OUTER_HTML)
			.await?
			.as_str()
			.unwrap_or_default()
			.to_string())
	}

	async fn find(&self, lookup: &Lookup) -> Result<Option<ElementRef>> {
		let object = self.evaluate(&scripts::find(lookup), false).await?;
		if object.is_nullish() {
			return Ok(None);
		}
		Ok(object.object_id.map(|id| ElementRef::new(id, lookup.to_string())))
	}

	async fn click(&self, element: &ElementRef) -> Result<()> {
		self.call_on(element, scripts::CLICK_FN, true).await?;
		Ok(())
	}

	async fn fill(&self, element: &ElementRef, value: &str) -> Result<()> {
		self.call_on(element, scripts::FOCUS_AND_CLEAR_FN, true).await?;
		self.call("Input.insertText", json!({ "text": value })).await?;
		self.call_on(element, scripts::COMMIT_INPUT_FN, true).await?;
		Ok(())
	}

	async fn text_of(&self, element: &ElementRef) -> Result<String> {
		let object = self.call_on(element, scripts::TEXT_FN, true).await?;
		Ok(object
			.value
			.as_ref()
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string())
	}

	async fn storage_item(&self, key: &str) -> Result<Option<String>> {
		match self.evaluate_value(&scripts::storage_item(key)).await? {
			Value::String(value) => Ok(Some(value)),
			_ => Ok(None),
		}
	}

	async fn captured_authorizations(&self) -> Result<Vec<CapturedAuthorization>> {
		Ok(self.network.snapshot())
	}

	async fn screenshot(&self) -> Result<Vec<u8>> {
		let result = self.call("Page.captureScreenshot", json!({ "format": "png" })).await?;
		let data = string_field(&result, "data", "Page.captureScreenshot")?;
		STANDARD
			.decode(data)
			.map_err(|e| Error::ProtocolError(format!("screenshot is not valid base64: {e}")))
	}
}

fn string_field(value: &Value, field: &str, method: &str) -> Result<String> {
	value[field]
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| Error::ProtocolError(format!("{method} returned no {field}")))
}

fn unwrap_evaluation(result: EvaluateResult) -> Result<RemoteObject> {
	match result.exception_details {
		Some(details) => Err(Error::Evaluation(details.message())),
		None => Ok(result.result),
	}
}
