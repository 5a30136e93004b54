use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, CheckinError>;

/// Every variant ends the process with exit status 1.
#[derive(Debug, Error)]
pub enum CheckinError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("token refresh failed: {0}")]
	RefreshFailed(String),

	#[error("refreshed token was rejected: {0}")]
	TokenRejected(#[source] ApiError),

	#[error(transparent)]
	Api(#[from] ApiError),
}

impl CheckinError {
	/// True when the failure happened before any network or browser action.
	pub fn is_configuration(&self) -> bool {
		matches!(self, CheckinError::Config(_))
	}
}
