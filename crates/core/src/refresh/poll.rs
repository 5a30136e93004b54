use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Calls `check` every `interval` until it yields a value or `timeout` elapses.
///
/// The check always runs at least once, and once more at the deadline, so a
/// condition that becomes true exactly at the deadline is still observed.
/// Returns `None` on timeout.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> Option<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Option<T>>,
{
	let deadline = Instant::now() + timeout;
	loop {
		if let Some(value) = check().await {
			return Some(value);
		}
		let now = Instant::now();
		if now >= deadline {
			return None;
		}
		tokio::time::sleep(interval.min(deadline - now)).await;
	}
}
