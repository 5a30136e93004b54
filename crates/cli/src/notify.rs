//! Operator notifications.
//!
//! Sends messages via the Telegram Bot API (`sendMessage`, and `sendPhoto`
//! for failure screenshots). Handles 429 rate limits by respecting the
//! `parameters.retry_after` field returned in the JSON response body.
//! Delivery failures are returned to the caller, which logs them; they never
//! fail a command.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Maximum number of attempts for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (characters).
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Telegram `sendPhoto` caption limit (characters).
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

const MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);
const PHOTO_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Notifier: Send + Sync {
	/// Sends an HTML-formatted text message.
	async fn send_text(&self, text: &str) -> anyhow::Result<()>;

	/// Sends an image with an HTML-formatted caption.
	async fn send_photo(&self, image: &Path, caption: &str) -> anyhow::Result<()>;
}

/// Used when no bot is configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
	async fn send_text(&self, _text: &str) -> anyhow::Result<()> {
		info!("telegram not configured, skipping notification");
		Ok(())
	}

	async fn send_photo(&self, _image: &Path, _caption: &str) -> anyhow::Result<()> {
		info!("telegram not configured, skipping notification");
		Ok(())
	}
}

/// Builds the notifier for an optional Telegram configuration.
pub fn notifier_for(config: Option<TelegramConfig>) -> Box<dyn Notifier> {
	match config {
		Some(config) => Box::new(TelegramNotifier::new(config)),
		None => Box::new(DisabledNotifier),
	}
}

pub struct TelegramNotifier {
	config: TelegramConfig,
	client: Client,
	api_base: String,
}

impl TelegramNotifier {
	pub fn new(config: TelegramConfig) -> Self {
		Self {
			config,
			client: Client::new(),
			api_base: TELEGRAM_API_BASE.to_string(),
		}
	}

	/// Points the notifier at a different Bot API server.
	pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
		self.api_base = api_base.into();
		self
	}

	fn method_url(&self, method: &str) -> String {
		format!(
			"{}/bot{}/{method}",
			self.api_base.trim_end_matches('/'),
			self.config.bot_token
		)
	}

	/// Sends the request built by `build`, retrying on 429.
	async fn send_with_retry<F>(&self, method: &str, build: F) -> anyhow::Result<()>
	where
		F: Fn() -> anyhow::Result<RequestBuilder> + Send + Sync,
	{
		let mut attempts = 0;

		loop {
			attempts += 1;

			let response = build()?
				.send()
				.await
				.with_context(|| format!("Telegram {method} request failed"))?;
			let status = response.status();

			if status.is_success() {
				debug!(method, "Telegram notification sent");
				return Ok(());
			}

			if status.as_u16() == 429 {
				let body: serde_json::Value = response.json().await.unwrap_or_default();
				let retry_after = body
					.get("parameters")
					.and_then(|p| p.get("retry_after"))
					.and_then(|v| v.as_u64())
					.map(Duration::from_secs);

				if attempts >= MAX_RATE_LIMIT_RETRIES {
					warn!(
						"Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
						MAX_RATE_LIMIT_RETRIES, retry_after
					);
					bail!("Telegram rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} attempts");
				}

				let wait = retry_after.unwrap_or(Duration::from_secs(1));
				debug!(
					"Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
					wait, attempts, MAX_RATE_LIMIT_RETRIES
				);
				tokio::time::sleep(wait).await;
				continue;
			}

			let body = response.text().await.unwrap_or_default();
			bail!("Telegram {method} failed: {status} - {body}");
		}
	}
}

#[async_trait]
impl Notifier for TelegramNotifier {
	async fn send_text(&self, text: &str) -> anyhow::Result<()> {
		let url = self.method_url("sendMessage");
		let payload = json!({
			"chat_id": self.config.chat_id,
			"text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT),
			"parse_mode": "HTML",
		});
		self.send_with_retry("sendMessage", || {
			Ok(self.client.post(&url).timeout(MESSAGE_TIMEOUT).json(&payload))
		})
		.await
	}

	async fn send_photo(&self, image: &Path, caption: &str) -> anyhow::Result<()> {
		let bytes = tokio::fs::read(image)
			.await
			.with_context(|| format!("failed to read {}", image.display()))?;
		let file_name = image
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| "screenshot.png".to_string());
		let caption = truncate_message(caption, TELEGRAM_CAPTION_LIMIT);
		let url = self.method_url("sendPhoto");

		self.send_with_retry("sendPhoto", || {
			let photo = Part::bytes(bytes.clone())
				.file_name(file_name.clone())
				.mime_str("image/png")?;
			let form = Form::new()
				.text("chat_id", self.config.chat_id.clone())
				.text("caption", caption.clone())
				.text("parse_mode", "HTML")
				.part("photo", photo);
			Ok(self.client.post(&url).timeout(PHOTO_TIMEOUT).multipart(form))
		})
		.await
	}
}

/// Truncates `text` to at most `limit` characters, marking the cut.
pub fn truncate_message(text: &str, limit: usize) -> String {
	if text.chars().count() <= limit {
		return text.to_string();
	}
	let suffix = "\n\n[truncated]";
	let budget = limit.saturating_sub(suffix.chars().count());
	let truncated: String = text.chars().take(budget).collect();
	format!("{truncated}{suffix}")
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			_ => escaped.push(c),
		}
	}
	escaped
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{StubResponse, StubServer};

	fn notifier(server: &StubServer) -> TelegramNotifier {
		TelegramNotifier::new(TelegramConfig {
			bot_token: "123:ABC".into(),
			chat_id: "42".into(),
		})
		.with_api_base(server.url.clone())
	}

	#[tokio::test]
	async fn send_text_posts_html_message() {
		let server = StubServer::start(vec![StubResponse::json(200, r#"{"ok": true}"#)]).await;
		notifier(&server).send_text("<b>done</b>").await.unwrap();

		let requests = server.requests();
		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].path, "/bot123:ABC/sendMessage");
		let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
		assert_eq!(body["chat_id"], "42");
		assert_eq!(body["text"], "<b>done</b>");
		assert_eq!(body["parse_mode"], "HTML");
	}

	#[tokio::test]
	async fn rate_limit_is_retried() {
		let server = StubServer::start(vec![
			StubResponse::json(429, r#"{"ok": false, "parameters": {"retry_after": 0}}"#),
			StubResponse::json(200, r#"{"ok": true}"#),
		])
		.await;
		notifier(&server).send_text("hello").await.unwrap();
		assert_eq!(server.requests().len(), 2);
	}

	#[tokio::test]
	async fn rate_limit_gives_up_after_three_attempts() {
		let server = StubServer::start(vec![StubResponse::json(
			429,
			r#"{"ok": false, "parameters": {"retry_after": 0}}"#,
		)])
		.await;
		let err = notifier(&server).send_text("hello").await.unwrap_err();
		assert!(err.to_string().contains("rate limit"));
		assert_eq!(server.requests().len(), 3);
	}

	#[tokio::test]
	async fn other_errors_are_not_retried() {
		let server = StubServer::start(vec![StubResponse::json(400, r#"{"ok": false, "description": "chat not found"}"#)]).await;
		let err = notifier(&server).send_text("hello").await.unwrap_err();
		assert!(err.to_string().contains("chat not found"));
		assert_eq!(server.requests().len(), 1);
	}

	#[tokio::test]
	async fn send_photo_uploads_multipart() {
		let dir = tempfile::tempdir().unwrap();
		let image = dir.path().join("cloudflare_blocked.png");
		std::fs::write(&image, b"\x89PNGdata").unwrap();

		let server = StubServer::start(vec![StubResponse::json(200, r#"{"ok": true}"#)]).await;
		notifier(&server).send_photo(&image, "challenge <timeout>").await.unwrap();

		let request = &server.requests()[0];
		assert_eq!(request.path, "/bot123:ABC/sendPhoto");
		assert!(request.header("content-type").unwrap().starts_with("multipart/form-data"));
		let body = request.body_text();
		assert!(body.contains("name=\"caption\""));
		assert!(body.contains("challenge <timeout>"));
		assert!(body.contains("filename=\"cloudflare_blocked.png\""));
		assert!(body.contains("PNGdata"));
	}

	#[tokio::test]
	async fn missing_photo_is_an_error_without_request() {
		let server = StubServer::start(vec![StubResponse::json(200, r#"{"ok": true}"#)]).await;
		let result = notifier(&server).send_photo(Path::new("/nonexistent/shot.png"), "x").await;
		assert!(result.is_err());
		assert!(server.requests().is_empty());
	}

	#[test]
	fn truncation_respects_character_limit() {
		let text = "界".repeat(5000);
		let truncated = truncate_message(&text, TELEGRAM_MESSAGE_LIMIT);
		assert_eq!(truncated.chars().count(), TELEGRAM_MESSAGE_LIMIT);
		assert!(truncated.ends_with("[truncated]"));
		assert_eq!(truncate_message("short", TELEGRAM_CAPTION_LIMIT), "short");
	}

	#[test]
	fn html_is_escaped() {
		assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
	}
}
