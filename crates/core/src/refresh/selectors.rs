//! Lookup chains and page markers for the relying party and the identity provider.

use crate::lookup::Lookup;

/// Login control on the relying-party home page.
pub const LOGIN_CONTROL: &[Lookup] = &[
	Lookup::Css("button.login-btn"),
	Lookup::Text("登录"),
	Lookup::Text("Login"),
];

pub const USERNAME_FIELD: &[Lookup] = &[Lookup::Css("#login-account-name"), Lookup::Css("input[name='login']")];

pub const PASSWORD_FIELD: &[Lookup] = &[
	Lookup::Css("#login-account-password"),
	Lookup::Css("input[name='password']"),
];

pub const SUBMIT_CONTROL: &[Lookup] = &[Lookup::Css("#login-button")];

pub const LOGIN_ERROR: &[Lookup] = &[Lookup::Css(".alert-error, #modal-alert, .login-error")];

/// Affirmative control on the OAuth consent page.
pub const CONSENT_CONTROL: &[Lookup] = &[
	Lookup::Text("授权"),
	Lookup::Text("Authorize"),
	Lookup::Text("允许"),
	Lookup::Text("Allow"),
];

pub const CHALLENGE_CHECKBOX: &[Lookup] = &[Lookup::Css("input[type='checkbox']")];

/// Lowercase substrings identifying a Cloudflare interstitial.
pub const CHALLENGE_MARKERS: &[&str] = &["just a moment", "请稍候", "checking your browser", "cf-browser-verification"];

/// `localStorage` keys that may hold the relying party's token, in priority order.
pub const TOKEN_STORAGE_KEYS: &[&str] = &["userToken", "token", "access_token", "auth_token"];

/// Query parameter carrying the token on the OAuth callback.
pub const TOKEN_QUERY_PARAMETER: &str = "token";

/// True when `html` looks like a challenge interstitial.
pub fn has_challenge_markers(html: &str) -> bool {
	let lower = html.to_lowercase();
	CHALLENGE_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn challenge_markers_are_case_insensitive() {
		assert!(has_challenge_markers("<title>Just a moment...</title>"));
		assert!(has_challenge_markers("<div id=\"CF-BROWSER-VERIFICATION\">"));
		assert!(has_challenge_markers("<p>请稍候…</p>"));
		assert!(!has_challenge_markers("<form id=\"login-form\"></form>"));
	}
}
