//! Ordered DOM lookup strategies.
//!
//! Every element the refresh flow touches is described by a chain of
//! [`Lookup`]s tried in order; the first visible match wins.

use std::fmt;

use checkin_runtime::Result;
use tracing::trace;

use crate::driver::{ElementRef, PageDriver};

/// One way of locating an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
	/// CSS selector.
	Css(&'static str),
	/// Clickable element (button, link, role=button, input button) whose
	/// visible text contains the given string.
	Text(&'static str),
}

impl fmt::Display for Lookup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Lookup::Css(selector) => write!(f, "css:{selector}"),
			Lookup::Text(text) => write!(f, "text:{text}"),
		}
	}
}

/// Tries each lookup in `chain` and returns the first match.
pub async fn find_first<P>(page: &P, chain: &[Lookup]) -> Result<Option<ElementRef>>
where
	P: PageDriver + ?Sized,
{
	for lookup in chain {
		if let Some(element) = page.find(lookup).await? {
			trace!(target = "checkin", %lookup, "element found");
			return Ok(Some(element));
		}
	}
	Ok(None)
}
