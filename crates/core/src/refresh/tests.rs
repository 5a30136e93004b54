use std::time::Duration;

use tempfile::TempDir;
use tokio::time::Instant;

use super::*;
use crate::lookup::Lookup;
use crate::testing::{FAKE_PNG, FakeLauncher, FakePage};

const HOME: &str = "https://up.x666.me";
const LOGIN_CONTROL_CSS: Lookup = Lookup::Css("button.login-btn");
const PROVIDER_LOGIN: &str = "https://linux.do/login";
const AUTHORIZE: &str = "https://linux.do/oauth2/authorize?client_id=abc";
/// Authorize URL as the provider really serves it, naming the relying party in its query.
const AUTHORIZE_WITH_REDIRECT: &str =
	"https://connect.linux.do/oauth2/authorize?client_id=abc&redirect_uri=https%3A%2F%2Fup.x666.me%2Fcallback";

fn credentials() -> Credentials {
	Credentials {
		username: "alice".into(),
		password: "hunter2".into(),
	}
}

fn config(artifacts: &TempDir) -> FlowConfig {
	FlowConfig {
		artifacts_dir: artifacts.path().to_path_buf(),
		..FlowConfig::default()
	}
}

async fn run(launcher: &FakeLauncher, config: &FlowConfig) -> RefreshOutcome {
	let credentials = credentials();
	Refresher::new(&credentials, config).run(launcher).await
}

fn expect_failure(outcome: RefreshOutcome) -> RefreshFailure {
	match outcome {
		RefreshOutcome::Failed(failure) => failure,
		RefreshOutcome::Success(extraction) => panic!("Expected failure, got {extraction:?}"),
	}
}

fn expect_success(outcome: RefreshOutcome) -> Extraction {
	match outcome {
		RefreshOutcome::Success(extraction) => extraction,
		RefreshOutcome::Failed(failure) => panic!("Expected success, got {failure}"),
	}
}

#[tokio::test(start_paused = true)]
async fn token_from_callback_query_parameter() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/?token=abc123");
	let launcher = FakeLauncher::new(page);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);

	assert_eq!(extraction.token.as_str(), "abc123");
	assert_eq!(extraction.source, TokenSource::QueryParameter);
	assert!(!extraction.after_reload);
	assert_eq!(launcher.closes(), 1);
	assert_eq!(
		launcher.page().fills(),
		vec![
			("css:#login-account-name".to_string(), "alice".to_string()),
			("css:#login-account-password".to_string(), "hunter2".to_string()),
		]
	);
	assert!(!launcher.page().calls().contains(&"screenshot".to_string()));
}

#[tokio::test(start_paused = true)]
async fn persistent_challenge_fails_with_screenshot() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/?token=abc123")
		.with_challenge_for(Duration::from_secs(125));
	let launcher = FakeLauncher::new(page);
	let start = Instant::now();

	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);

	assert_eq!(failure.stage, Stage::Challenge);
	assert_eq!(failure.reason, FailureReason::ChallengeTimeout { secs: 120 });
	assert_eq!(failure.url.as_deref(), Some(PROVIDER_LOGIN));
	let screenshot = failure.screenshot.expect("screenshot path");
	assert_eq!(screenshot, artifacts.path().join("cloudflare_blocked.png"));
	assert_eq!(std::fs::read(&screenshot).unwrap(), FAKE_PNG);
	assert_eq!(launcher.closes(), 1);

	// 3s settle, then the 120s challenge budget.
	let elapsed = start.elapsed();
	assert!(elapsed >= Duration::from_secs(120), "{elapsed:?}");
	assert!(elapsed <= Duration::from_secs(127), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn challenge_that_clears_continues_to_login() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/?token=abc123")
		.with_challenge_for(Duration::from_secs(20))
		.with_element(Lookup::Css("input[type='checkbox']"), "");
	let launcher = FakeLauncher::new(page);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);
	assert_eq!(extraction.token.as_str(), "abc123");
	assert!(
		launcher
			.page()
			.calls()
			.contains(&"click:css:input[type='checkbox']".to_string())
	);
}

#[tokio::test(start_paused = true)]
async fn missing_consent_control_fails_after_budget() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_login_flow(PROVIDER_LOGIN, AUTHORIZE);
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);
	let elapsed = start.elapsed();

	assert_eq!(failure.stage, Stage::Consent);
	assert_eq!(failure.reason, FailureReason::NoConsentControl);
	assert_eq!(failure.reason.to_string(), "no consent control found");
	assert!(artifacts.path().join("no_consent_control.png").exists());
	assert_eq!(launcher.closes(), 1);
	// Navigate settle 3s + provider 0s + submit delay 1s + leave-login 0s + consent 20s.
	assert!(elapsed >= Duration::from_secs(20), "{elapsed:?}");
	assert!(elapsed <= Duration::from_secs(25), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn consent_control_leads_to_callback() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, AUTHORIZE)
		.with_consent(AUTHORIZE, "https://up.x666.me/oauth/callback")
		.with_storage("token", "Bearer from-storage");
	let launcher = FakeLauncher::new(page);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);

	assert_eq!(extraction.token.as_str(), "from-storage");
	assert_eq!(extraction.source, TokenSource::Storage { key: "token" });
	assert!(launcher.page().calls().contains(&"click:text:授权".to_string()));
}

#[tokio::test(start_paused = true)]
async fn extraction_order_is_query_storage_headers_reload() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/dashboard")
		.with_authorization(Some("https://cdn.example.com/x"), "Bearer wrong-site")
		.with_authorization_after_reload(Some("https://up.x666.me/api/user/info"), "Bearer from-header");
	let launcher = FakeLauncher::new(page);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);

	assert_eq!(extraction.token.as_str(), "from-header");
	assert!(extraction.after_reload);
	assert_eq!(
		extraction.source,
		TokenSource::NetworkHeader {
			url: Some("https://up.x666.me/api/user/info".into())
		}
	);

	let extraction_calls: Vec<String> = launcher
		.page()
		.calls()
		.into_iter()
		.filter(|c| c.starts_with("storage:") || c == "authorizations" || c == "reload")
		.collect();
	let pass = ["storage:userToken", "storage:token", "storage:access_token", "storage:auth_token", "authorizations"];
	let mut expected: Vec<String> = pass.iter().map(|s| s.to_string()).collect();
	expected.push("reload".into());
	expected.extend(pass.iter().map(|s| s.to_string()));
	assert_eq!(extraction_calls, expected);
}

#[tokio::test(start_paused = true)]
async fn storage_wins_over_header_within_a_pass() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/")
		.with_storage("access_token", "null")
		.with_storage("auth_token", "stored")
		.with_authorization(None, "Bearer header");
	let launcher = FakeLauncher::new(page);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);
	assert_eq!(extraction.token.as_str(), "stored");
	assert_eq!(extraction.source, TokenSource::Storage { key: "auth_token" });
	assert!(!launcher.page().calls().contains(&"reload".to_string()));
}

#[tokio::test(start_paused = true)]
async fn exhausted_extraction_is_token_not_found() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/");
	let launcher = FakeLauncher::new(page);

	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);
	assert_eq!(failure.stage, Stage::Extract);
	assert_eq!(failure.reason, FailureReason::TokenNotFound);
	assert!(artifacts.path().join("token_not_found.png").exists());
}

#[tokio::test(start_paused = true)]
async fn login_error_message_fails_fast() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, PROVIDER_LOGIN)
		.with_element(Lookup::Css(".alert-error, #modal-alert, .login-error"), " 用户名或密码错误 ");
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);
	assert_eq!(failure.reason, FailureReason::LoginRejected("用户名或密码错误".into()));
	assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn stuck_on_login_page_times_out() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_login_flow(PROVIDER_LOGIN, PROVIDER_LOGIN);
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);
	assert_eq!(failure.stage, Stage::AwaitLeaveLogin);
	assert_eq!(failure.reason, FailureReason::LoginTimeout { secs: 60 });
	// 3s settle + 1s submit delay + 60s.
	assert_eq!(start.elapsed(), Duration::from_secs(64));
}

#[tokio::test(start_paused = true)]
async fn missing_login_control_fails_navigate() {
	let artifacts = TempDir::new().unwrap();
	let launcher = FakeLauncher::new(FakePage::new("about:blank"));

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);
	assert_eq!(failure.stage, Stage::Navigate);
	assert_eq!(failure.reason, FailureReason::LoginControlNotFound);
	assert_eq!(failure.url.as_deref(), Some(HOME));
	assert_eq!(start.elapsed(), Duration::from_secs(13));
}

#[tokio::test(start_paused = true)]
async fn already_signed_in_skips_login_form() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_element_at(
		Lookup::Css("button.login-btn"),
		"登录",
		None,
		Some("https://linux.do/oauth2/approve"),
	);
	let page = page.with_consent(
		"https://linux.do/oauth2/approve",
		"https://up.x666.me/?token=signed-in",
	);
	let launcher = FakeLauncher::new(page);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);
	assert_eq!(extraction.token.as_str(), "signed-in");
	assert!(launcher.page().fills().is_empty());
}

#[tokio::test(start_paused = true)]
async fn launch_is_retried_once() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/?token=abc123");
	let launcher = FakeLauncher::new(page).failing_first(1);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);
	assert_eq!(extraction.token.as_str(), "abc123");
	assert_eq!(launcher.launches(), 2);
	assert_eq!(launcher.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn launch_gives_up_after_two_attempts() {
	let artifacts = TempDir::new().unwrap();
	let launcher = FakeLauncher::new(FakePage::new("about:blank")).failing_first(5);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);

	assert_eq!(failure.stage, Stage::Launch);
	assert!(matches!(failure.reason, FailureReason::LaunchFailed { attempts: 2, .. }));
	assert_eq!(launcher.launches(), 2);
	assert_eq!(launcher.closes(), 0);
	assert_eq!(failure.screenshot, None);
	assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn browser_errors_become_unexpected_failures() {
	let artifacts = TempDir::new().unwrap();
	let launcher = FakeLauncher::new(FakePage::new("about:blank").failing());

	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);
	assert_eq!(failure.stage, Stage::Navigate);
	assert!(matches!(failure.reason, FailureReason::Unexpected(_)));
	assert_eq!(failure.screenshot, None);
	assert_eq!(launcher.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn consent_is_granted_when_authorize_url_names_relying_party() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, AUTHORIZE_WITH_REDIRECT)
		.with_consent(AUTHORIZE_WITH_REDIRECT, "https://up.x666.me/callback?token=granted");
	let launcher = FakeLauncher::new(page);

	let extraction = expect_success(run(&launcher, &config(&artifacts)).await);

	assert_eq!(extraction.token.as_str(), "granted");
	assert_eq!(extraction.source, TokenSource::QueryParameter);
	assert!(launcher.page().calls().contains(&"click:text:授权".to_string()));
}

#[tokio::test(start_paused = true)]
async fn callback_wait_ignores_relying_party_in_query() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, AUTHORIZE)
		.with_consent(AUTHORIZE, AUTHORIZE_WITH_REDIRECT);
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);

	assert_eq!(failure.stage, Stage::AwaitCallback);
	assert_eq!(failure.reason, FailureReason::CallbackTimeout { secs: 30 });
	assert_eq!(failure.url.as_deref(), Some(AUTHORIZE_WITH_REDIRECT));
	assert!(artifacts.path().join("callback_timeout.png").exists());
	// 3s settle + 1s submit delay + 30s.
	assert_eq!(start.elapsed(), Duration::from_secs(34));
}

#[tokio::test(start_paused = true)]
async fn provider_headers_are_not_taken_for_tokens() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_login_flow(PROVIDER_LOGIN, "https://up.x666.me/")
		.with_authorization(Some("https://linux.do/session?return=https://up.x666.me/"), "Bearer provider-session");
	let launcher = FakeLauncher::new(page);

	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);
	assert_eq!(failure.reason, FailureReason::TokenNotFound);
}

#[tokio::test(start_paused = true)]
async fn provider_redirect_times_out() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_element(LOGIN_CONTROL_CSS, "登录");
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);

	assert_eq!(failure.stage, Stage::AwaitProvider);
	assert_eq!(failure.reason, FailureReason::ProviderTimeout { secs: 15 });
	assert_eq!(failure.url.as_deref(), Some(HOME));
	// 3s settle + 15s.
	assert_eq!(start.elapsed(), Duration::from_secs(18));
}

#[tokio::test(start_paused = true)]
async fn missing_login_form_times_out() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank").with_element_at(LOGIN_CONTROL_CSS, "登录", None, Some(PROVIDER_LOGIN));
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);

	assert_eq!(failure.stage, Stage::LoginForm);
	assert_eq!(failure.reason, FailureReason::LoginFormMissing { secs: 30 });
	assert!(artifacts.path().join("login_form_missing.png").exists());
	// 3s settle + 30s.
	assert_eq!(start.elapsed(), Duration::from_secs(33));
}

#[tokio::test(start_paused = true)]
async fn login_form_without_password_field_fails() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_element_at(LOGIN_CONTROL_CSS, "登录", None, Some(PROVIDER_LOGIN))
		.with_element_at(Lookup::Css("#login-account-name"), "", Some(PROVIDER_LOGIN), None);
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);

	assert_eq!(failure.stage, Stage::LoginForm);
	assert_eq!(failure.reason, FailureReason::FormIncomplete("password field"));
	assert_eq!(failure.reason.to_string(), "login form has no password field");
	// 3s settle + 10s field wait.
	assert_eq!(start.elapsed(), Duration::from_secs(13));
}

#[tokio::test(start_paused = true)]
async fn login_form_without_submit_control_fails() {
	let artifacts = TempDir::new().unwrap();
	let page = FakePage::new("about:blank")
		.with_element_at(LOGIN_CONTROL_CSS, "登录", None, Some(PROVIDER_LOGIN))
		.with_element_at(Lookup::Css("#login-account-name"), "", Some(PROVIDER_LOGIN), None)
		.with_element_at(Lookup::Css("#login-account-password"), "", Some(PROVIDER_LOGIN), None);
	let launcher = FakeLauncher::new(page);

	let start = Instant::now();
	let failure = expect_failure(run(&launcher, &config(&artifacts)).await);

	assert_eq!(failure.stage, Stage::LoginForm);
	assert_eq!(failure.reason, FailureReason::FormIncomplete("submit control"));
	assert_eq!(launcher.page().fills().len(), 2);
	// 3s settle + 1s submit delay + 10s field wait.
	assert_eq!(start.elapsed(), Duration::from_secs(14));
}

#[test]
fn site_matches_hosts_not_substrings() {
	let site = Site::default();
	assert!(site.is_relying_party("https://up.x666.me/callback?token=x"));
	assert!(site.is_relying_party("https://X666.ME/"));
	assert!(!site.is_relying_party(AUTHORIZE_WITH_REDIRECT));
	assert!(!site.is_relying_party("https://notx666.me/"));
	assert!(!site.is_relying_party("about:blank"));

	assert!(site.is_provider(AUTHORIZE_WITH_REDIRECT));
	assert!(site.is_provider(PROVIDER_LOGIN));
	assert!(!site.is_provider("https://up.x666.me/?next=https://linux.do/"));

	assert!(site.is_login_page("https://linux.do/login?redirect=%2F"));
	assert!(!site.is_login_page(AUTHORIZE));
	assert!(!site.is_login_page("https://up.x666.me/login"));
}

#[test]
fn credentials_debug_hides_password() {
	let debug = format!("{:?}", credentials());
	assert!(debug.contains("alice"));
	assert!(!debug.contains("hunter2"));
}

#[test]
fn diagnostic_names_are_file_stems() {
	let reasons = [
		FailureReason::LoginControlNotFound,
		FailureReason::ChallengeTimeout { secs: 120 },
		FailureReason::NoConsentControl,
		FailureReason::TokenNotFound,
		FailureReason::Unexpected("x".into()),
	];
	for reason in reasons {
		let name = reason.diagnostic_name();
		assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
	}
	assert_eq!(FailureReason::ChallengeTimeout { secs: 1 }.diagnostic_name(), "cloudflare_blocked");
}
