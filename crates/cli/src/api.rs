//! HTTP clients for the relying party and the draw site.

use std::time::Duration;

use checkin_protocol::api::{SpinResponse, UserInfo};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const RELYING_PARTY_BASE_URL: &str = "https://up.x666.me";
pub const FULI_BASE_URL: &str = "https://fuli.hxi.me";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("invalid {header} header value")]
	InvalidHeader { header: &'static str },

	#[error("failed to build HTTP client: {0}")]
	Client(#[source] reqwest::Error),

	#[error("request to {endpoint} failed: {source}")]
	Transport {
		endpoint: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("{endpoint} returned HTTP {status}: {body}")]
	Status { endpoint: String, status: u16, body: String },

	#[error("{endpoint} returned an unexpected body: {source}")]
	Decode {
		endpoint: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("{endpoint} reported failure")]
	Rejected { endpoint: String },
}

fn header_value(header: &'static str, value: &str) -> Result<HeaderValue, ApiError> {
	HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader { header })
}

fn build_client(headers: HeaderMap) -> Result<Client, ApiError> {
	Client::builder()
		.default_headers(headers)
		.timeout(REQUEST_TIMEOUT)
		.build()
		.map_err(ApiError::Client)
}

/// Reads a 2xx JSON body, mapping everything else to [`ApiError`].
async fn read_json<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, ApiError> {
	let status = response.status();
	let body = response.text().await.map_err(|source| ApiError::Transport {
		endpoint: endpoint.to_string(),
		source,
	})?;
	debug!(endpoint, status = status.as_u16(), "API response");

	if !status.is_success() {
		return Err(ApiError::Status {
			endpoint: endpoint.to_string(),
			status: status.as_u16(),
			body,
		});
	}
	serde_json::from_str(&body).map_err(|source| ApiError::Decode {
		endpoint: endpoint.to_string(),
		source,
	})
}

/// `up.x666.me` API authenticated with a bearer token.
pub struct RelyingPartyClient {
	client: Client,
	base: String,
}

impl RelyingPartyClient {
	pub fn new(base: &str, token: &str) -> Result<Self, ApiError> {
		let base = base.trim_end_matches('/').to_string();
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
		headers.insert(AUTHORIZATION, header_value("authorization", &format!("Bearer {token}"))?);
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		headers.insert(ORIGIN, header_value("origin", &base)?);
		headers.insert(REFERER, header_value("referer", &format!("{base}/"))?);
		headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

		Ok(Self {
			client: build_client(headers)?,
			base,
		})
	}

	/// `GET /api/user/info`. A body without `success` or a username is a rejection.
	pub async fn user_info(&self) -> Result<UserInfo, ApiError> {
		let endpoint = format!("{}/api/user/info", self.base);
		let response = self
			.client
			.get(&endpoint)
			.send()
			.await
			.map_err(|source| ApiError::Transport {
				endpoint: endpoint.clone(),
				source,
			})?;
		let info: UserInfo = read_json(&endpoint, response).await?;
		if !info.success && info.username.is_none() {
			return Err(ApiError::Rejected { endpoint });
		}
		Ok(info)
	}

	/// `POST /api/checkin/spin`. An unsuccessful spin is returned, not an error.
	pub async fn spin(&self) -> Result<SpinResponse, ApiError> {
		let endpoint = format!("{}/api/checkin/spin", self.base);
		let response = self
			.client
			.post(&endpoint)
			.send()
			.await
			.map_err(|source| ApiError::Transport {
				endpoint: endpoint.clone(),
				source,
			})?;
		read_json(&endpoint, response).await
	}
}

/// `fuli.hxi.me` wheel authenticated with a session cookie.
pub struct FuliClient {
	client: Client,
	base: String,
}

impl FuliClient {
	pub fn new(base: &str, cookie: &str) -> Result<Self, ApiError> {
		let base = base.trim_end_matches('/').to_string();
		let mut headers = HeaderMap::new();
		headers.insert(COOKIE, header_value("cookie", cookie)?);
		headers.insert(ORIGIN, header_value("origin", &base)?);
		headers.insert(REFERER, header_value("referer", &format!("{base}/wheel"))?);
		headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

		Ok(Self {
			client: build_client(headers)?,
			base,
		})
	}

	/// `POST /api/wheel`; the prize payload is site-defined JSON.
	pub async fn draw(&self) -> Result<Value, ApiError> {
		let endpoint = format!("{}/api/wheel", self.base);
		let response = self
			.client
			.post(&endpoint)
			.send()
			.await
			.map_err(|source| ApiError::Transport {
				endpoint: endpoint.clone(),
				source,
			})?;
		read_json(&endpoint, response).await
	}
}
