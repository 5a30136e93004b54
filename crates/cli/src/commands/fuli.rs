//! `checkin fuli`: lucky-wheel draws on the draw site.

use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::FuliClient;
use crate::cli::FuliArgs;
use crate::config::{Env, FuliConfig};
use crate::error::Result;
use crate::notify::{Notifier, escape_html, notifier_for};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuliSummary {
	pub planned: u32,
	/// Responses of the successful draws, in order.
	pub results: Vec<Value>,
}

pub async fn run(args: &FuliArgs, env: &Env) -> Result<()> {
	let config = FuliConfig::from_env(env, args)?;
	let client = FuliClient::new(&config.base_url, &config.cookie)?;
	let notifier = notifier_for(config.telegram.clone());
	execute(&client, &config, notifier.as_ref()).await?;
	Ok(())
}

/// Draws until the plan is done or a draw fails, then sends one summary.
/// Running out of draws is not an error.
pub async fn execute(client: &FuliClient, config: &FuliConfig, notifier: &dyn Notifier) -> Result<FuliSummary> {
	let planned = config.draws.unwrap_or_else(|| rand::rng().random_range(1..=3));
	info!(planned, "starting draws");

	let mut summary = FuliSummary {
		planned,
		results: Vec::new(),
	};
	for attempt in 1..=planned {
		match client.draw().await {
			Ok(result) => {
				info!(attempt, %result, "draw succeeded");
				summary.results.push(result);
			}
			Err(e) => {
				warn!(attempt, "draw failed, stopping: {}", e);
				break;
			}
		}
		if attempt < planned {
			let pause = random_pause(config.pause_secs);
			info!("waiting {:?}", pause);
			tokio::time::sleep(pause).await;
		}
	}

	info!(succeeded = summary.results.len(), planned, "draws finished");
	if let Err(e) = notifier.send_text(&summary_message(&summary)).await {
		warn!("notification not delivered: {:#}", e);
	}
	Ok(summary)
}

fn random_pause((low, high): (u64, u64)) -> Duration {
	Duration::from_secs(rand::rng().random_range(low..=high.max(low)))
}

fn summary_message(summary: &FuliSummary) -> String {
	let results: Vec<String> = summary
		.results
		.iter()
		.enumerate()
		.map(|(i, result)| format!("  Draw {}: {}", i + 1, escape_html(&result.to_string())))
		.collect();
	format!(
		"✅ <b>fuli.hxi.me wheel finished</b>\n\n⏰ Time: {}\n🎲 Draws: {}/{}\n📋 Results:\n{}",
		chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
		summary.results.len(),
		summary.planned,
		results.join("\n"),
	)
}
