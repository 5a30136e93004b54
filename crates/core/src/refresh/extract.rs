//! Token extraction on the relying party after the OAuth callback.

use std::fmt;

use tracing::{debug, info, warn};
use url::Url;

use super::{FlowConfig, Site};
use super::selectors::{TOKEN_QUERY_PARAMETER, TOKEN_STORAGE_KEYS};
use crate::driver::PageDriver;
use crate::token::Token;

/// One step of the extraction plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStep {
	QueryParameter,
	Storage,
	NetworkHeader,
	Reload,
}

/// Steps in the order they are tried; the first plausible token wins.
pub const EXTRACTION_PLAN: [ExtractionStep; 6] = [
	ExtractionStep::QueryParameter,
	ExtractionStep::Storage,
	ExtractionStep::NetworkHeader,
	ExtractionStep::Reload,
	ExtractionStep::Storage,
	ExtractionStep::NetworkHeader,
];

/// Where a token was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
	QueryParameter,
	Storage { key: &'static str },
	NetworkHeader { url: Option<String> },
}

impl fmt::Display for TokenSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TokenSource::QueryParameter => write!(f, "callback URL parameter"),
			TokenSource::Storage { key } => write!(f, "localStorage[{key}]"),
			TokenSource::NetworkHeader { .. } => write!(f, "Authorization header"),
		}
	}
}

/// A token and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
	pub token: Token,
	pub source: TokenSource,
	/// Found only after reloading the callback page.
	pub after_reload: bool,
}

/// Walks [`EXTRACTION_PLAN`] on the current page.
///
/// Individual strategy failures are logged and skipped; `None` means every
/// step came up empty.
pub(crate) async fn extract<P>(page: &P, config: &FlowConfig) -> Option<Extraction>
where
	P: PageDriver + ?Sized,
{
	tokio::time::sleep(config.settle).await;

	let mut after_reload = false;
	for step in EXTRACTION_PLAN {
		let found = match step {
			ExtractionStep::Reload => {
				info!(target = "checkin", "no token yet, reloading page");
				if let Err(e) = page.reload().await {
					warn!(target = "checkin", "reload failed: {}", e);
				}
				tokio::time::sleep(config.reload_settle).await;
				after_reload = true;
				continue;
			}
			ExtractionStep::QueryParameter => from_query(page).await,
			ExtractionStep::Storage => from_storage(page).await,
			ExtractionStep::NetworkHeader => from_headers(page, &config.site).await,
		};

		if let Some((token, source)) = found {
			info!(target = "checkin", %source, after_reload, token = %token.preview(20), "token extracted");
			return Some(Extraction {
				token,
				source,
				after_reload,
			});
		}
		debug!(target = "checkin", ?step, "extraction step found nothing");
	}
	None
}

async fn from_query<P: PageDriver + ?Sized>(page: &P) -> Option<(Token, TokenSource)> {
	let location = page
		.url()
		.await
		.inspect_err(|e| debug!(target = "checkin", "cannot read location: {}", e))
		.ok()?;
	token_from_url(&location).map(|token| (token, TokenSource::QueryParameter))
}

async fn from_storage<P: PageDriver + ?Sized>(page: &P) -> Option<(Token, TokenSource)> {
	for &key in TOKEN_STORAGE_KEYS {
		match page.storage_item(key).await {
			Ok(Some(value)) => {
				if let Some(token) = Token::parse(&value) {
					return Some((token, TokenSource::Storage { key }));
				}
			}
			Ok(None) => {}
			Err(e) => debug!(target = "checkin", key, "cannot read localStorage: {}", e),
		}
	}
	None
}

async fn from_headers<P: PageDriver + ?Sized>(page: &P, site: &Site) -> Option<(Token, TokenSource)> {
	let captured = page
		.captured_authorizations()
		.await
		.inspect_err(|e| debug!(target = "checkin", "cannot read captured headers: {}", e))
		.ok()?;

	captured
		.into_iter()
		.filter(|header| header.url.as_deref().is_none_or(|url| site.is_relying_party(url)))
		.find_map(|header| {
			Token::parse(&header.value).map(|token| (token, TokenSource::NetworkHeader { url: header.url }))
		})
}

/// Plausible `token` query parameter of `location`.
pub(crate) fn token_from_url(location: &str) -> Option<Token> {
	let url = Url::parse(location).ok()?;
	url.query_pairs()
		.find(|(name, _)| name == TOKEN_QUERY_PARAMETER)
		.and_then(|(_, value)| Token::parse(&value))
}
