//! Payloads of the reward-site HTTP APIs.
//!
//! The relying party (`up.x666.me`) answers with loosely-typed JSON; every
//! field except `success` is optional and numeric fields may arrive as
//! integers or floats.

use serde::{Deserialize, Serialize};

/// `GET /api/user/info`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
	#[serde(default)]
	pub success: bool,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub balance: Option<f64>,
}

/// `POST /api/checkin/spin`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpinResponse {
	#[serde(default)]
	pub success: bool,
	#[serde(default)]
	pub message: Option<String>,
	/// Draw chances won by this spin.
	#[serde(default)]
	pub times: Option<i64>,
	#[serde(default)]
	pub new_balance: Option<f64>,
}
