use std::fmt;

/// Prefix stripped from `Authorization` header values.
const BEARER_PREFIX: &str = "bearer ";

/// Placeholder strings pages store where a real token would go.
const PLACEHOLDERS: &[&str] = &["null", "undefined", "false", "none"];

/// A plausible bearer token.
///
/// `Debug` only shows a short prefix so tokens never end up in logs whole.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
	/// Normalizes `raw` and returns it if it looks like a token.
	///
	/// Surrounding whitespace and quotes and a leading `Bearer ` are
	/// stripped. Empty values, values containing whitespace and
	/// placeholders like `null` are rejected.
	pub fn parse(raw: &str) -> Option<Self> {
		let mut value = raw.trim_start();
		if value
			.get(..BEARER_PREFIX.len())
			.is_some_and(|head| head.eq_ignore_ascii_case(BEARER_PREFIX))
		{
			value = &value[BEARER_PREFIX.len()..];
		}
		let value = value.trim().trim_matches('"').trim();

		if value.is_empty() || value.chars().any(char::is_whitespace) {
			return None;
		}
		if PLACEHOLDERS.iter().any(|p| value.eq_ignore_ascii_case(p)) {
			return None;
		}
		Some(Self(value.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}

	/// First `chars` characters followed by an ellipsis.
	pub fn preview(&self, chars: usize) -> String {
		let head: String = self.0.chars().take(chars).collect();
		if head.len() == self.0.len() { head } else { format!("{head}...") }
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Token({})", self.preview(6))
	}
}
