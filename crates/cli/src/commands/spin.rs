//! `checkin spin`: use the day's wheel spins on the relying party.

use tracing::{info, warn};

use crate::api::RelyingPartyClient;
use crate::cli::SpinArgs;
use crate::config::{Env, SpinConfig};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpinSummary {
	/// Successful spins.
	pub spins: u32,
	/// Draw chances won across all spins.
	pub earned: i64,
	pub final_balance: Option<f64>,
}

pub async fn run(args: &SpinArgs, env: &Env) -> Result<()> {
	let config = SpinConfig::from_env(env, args)?;
	let client = RelyingPartyClient::new(&config.api_base, &config.token)?;
	let summary = execute(&client, &config).await?;
	info!(
		spins = summary.spins,
		earned = summary.earned,
		balance = summary.final_balance.unwrap_or_default(),
		"spin run finished"
	);
	Ok(())
}

pub async fn execute(client: &RelyingPartyClient, config: &SpinConfig) -> Result<SpinSummary> {
	let info = client.user_info().await?;
	info!(
		username = info.username.as_deref().unwrap_or("unknown"),
		balance = info.balance.unwrap_or_default(),
		"signed in"
	);

	let mut summary = SpinSummary::default();
	for attempt in 1..=config.max_spins {
		let spin = match client.spin().await {
			Ok(spin) => spin,
			Err(e) => {
				warn!(attempt, "spin request failed: {}", e);
				break;
			}
		};
		let reply = spin.message.as_deref().unwrap_or("");
		if !spin.success {
			info!(attempt, reply, "no spins left");
			break;
		}

		summary.spins += 1;
		summary.earned += spin.times.unwrap_or_default();
		if spin.new_balance.is_some() {
			summary.final_balance = spin.new_balance;
		}
		info!(attempt, times = spin.times.unwrap_or_default(), reply, "spin succeeded");

		if attempt < config.max_spins {
			tokio::time::sleep(config.pause).await;
		}
	}

	match client.user_info().await {
		Ok(info) if info.balance.is_some() => summary.final_balance = info.balance,
		Ok(_) => {}
		Err(e) => warn!("could not read final balance: {}", e),
	}
	Ok(summary)
}
