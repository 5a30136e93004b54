pub mod api;
pub mod ci_output;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod styles;
#[cfg(test)]
mod test_support;
