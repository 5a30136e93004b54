//! JavaScript snippets evaluated in the page.

use crate::lookup::Lookup;

/// Injected into every new document before page scripts run.
pub const WEBDRIVER_MASK: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
"#;

pub const READY_STATE: &str = "document.readyState";
pub const TITLE: &str = "document.title";
pub const OUTER_HTML: &str = "document.documentElement ? document.documentElement.outerHTML : ''";

/// Shared visibility predicate, prepended to lookup expressions.
const VISIBLE_FN: &str = r#"
const visible = (el) => {
	if (!el || !el.isConnected) return false;
	const style = window.getComputedStyle(el);
	if (style.visibility === 'hidden' || style.display === 'none') return false;
	const rect = el.getBoundingClientRect();
	return rect.width > 0 && rect.height > 0;
};
"#;

/// Elements considered for text lookups.
const CLICKABLE: &str = "button, a, [role='button'], input[type='submit'], input[type='button']";

/// Expression resolving to the first visible element for `lookup`, or `null`.
pub fn find(lookup: &Lookup) -> String {
	match lookup {
		Lookup::Css(selector) => format!(
			"(() => {{ {VISIBLE_FN} for (const el of document.querySelectorAll({sel})) {{ if (visible(el)) return el; }} return null; }})()",
			sel = js_string(selector),
		),
		Lookup::Text(needle) => format!(
			"(() => {{ {VISIBLE_FN} const needle = {needle}; \
			 for (const el of document.querySelectorAll({clickable})) {{ \
			   const text = (el.innerText || el.value || '').trim(); \
			   if (text.includes(needle) && visible(el)) return el; \
			 }} return null; }})()",
			needle = js_string(needle),
			clickable = js_string(CLICKABLE),
		),
	}
}

pub const CLICK_FN: &str = "function() { this.scrollIntoView({ block: 'center' }); this.click(); }";

pub const FOCUS_AND_CLEAR_FN: &str = "function() { this.focus(); if ('value' in this) { this.value = ''; } }";

pub const COMMIT_INPUT_FN: &str = "function() { \
	this.dispatchEvent(new Event('input', { bubbles: true })); \
	this.dispatchEvent(new Event('change', { bubbles: true })); }";

pub const TEXT_FN: &str = "function() { return (this.innerText || this.textContent || '').trim(); }";

/// Expression reading one `localStorage` key.
pub fn storage_item(key: &str) -> String {
	format!("window.localStorage.getItem({})", js_string(key))
}

fn js_string(value: &str) -> String {
	// A JSON string literal is a valid JS string literal.
	serde_json::Value::from(value).to_string()
}
