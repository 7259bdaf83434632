//! Deadline and retry behavior of native calls, on a paused clock.

mod common;

use std::time::Duration;

use codex_bridge::native::fake::{FakeCall, FakeEngineBuilder};
use codex_bridge::{BridgeConfig, Error, RetryPolicy};
use common::{client_with, in_conversation};
use tokio::time::Instant;

fn with_timeout_ms(timeout_ms: u64) -> BridgeConfig {
	BridgeConfig {
		timeout_ms: Some(timeout_ms),
		retry_policy: RetryPolicy::none(),
		..BridgeConfig::default()
	}
}

#[tokio::test(start_paused = true)]
async fn slow_submit_times_out_without_poisoning_later_calls() {
	let (client, controller) = client_with(FakeEngineBuilder::new().without_session_configured(), with_timeout_ms(50));
	client.connect().await.unwrap();
	client.create_conversation(Vec::new()).await.unwrap();

	controller.set_delay(FakeCall::Submit, Duration::from_millis(500));
	let started = Instant::now();
	let err = client.submit_text("slow", &[]).await.unwrap_err();
	let elapsed = started.elapsed();

	assert!(err.is_timeout());
	assert_eq!(err.to_string(), "submit timed out after 50ms");
	assert!(elapsed >= Duration::from_millis(50));
	assert!(elapsed < Duration::from_millis(500));

	controller.clear_behavior(FakeCall::Submit);
	client.submit_text("fast", &[]).await.unwrap();

	// The detached call still lands at the engine; its result just has no taker.
	tokio::time::sleep(Duration::from_millis(600)).await;
	let texts: Vec<_> = controller
		.submitted()
		.iter()
		.map(|sent| sent["op"]["items"][0]["text"].as_str().unwrap_or_default().to_string())
		.collect();
	assert_eq!(texts, vec!["fast", "slow"]);
}

#[tokio::test(start_paused = true)]
async fn without_budget_a_hung_call_is_awaited_indefinitely() {
	let (client, controller) = in_conversation().await;
	controller.hang(FakeCall::Submit);

	let outcome = tokio::time::timeout(Duration::from_secs(60), client.submit_text("hi", &[])).await;
	assert!(outcome.is_err());
}

#[tokio::test(start_paused = true)]
async fn poll_timeout_is_delivered_to_subscribers() {
	let (client, _controller) = client_with(FakeEngineBuilder::new().without_session_configured(), with_timeout_ms(50));
	client.connect().await.unwrap();
	let mut events = client.subscribe(None);
	client.create_conversation(Vec::new()).await.unwrap();

	let err = events.next().await.unwrap().unwrap_err();
	assert!(err.is_timeout());
	assert!(err.to_string().starts_with("poll next event timed out"));
	assert!(events.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn hung_connect_times_out_and_stays_disconnected() {
	let (client, controller) = client_with(FakeEngineBuilder::new(), with_timeout_ms(50));
	controller.hang(FakeCall::Connect);

	let err = client.connect().await.unwrap_err();
	assert!(err.is_timeout());
	assert!(!client.is_connected());
	assert!(matches!(client.create_conversation(Vec::new()).await, Err(Error::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn connect_retries_with_backoff() {
	let config = BridgeConfig {
		retry_policy: RetryPolicy {
			max_retries: 2,
			initial_delay_ms: 100,
			backoff_factor: 2.0,
		},
		..BridgeConfig::default()
	};
	let (client, controller) = client_with(FakeEngineBuilder::new().fail_connects(2), config);

	let started = Instant::now();
	client.connect().await.unwrap();

	assert!(client.is_connected());
	assert_eq!(controller.calls(FakeCall::Connect), 3);
	assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_connection_error() {
	let config = BridgeConfig {
		retry_policy: RetryPolicy {
			max_retries: 1,
			initial_delay_ms: 10,
			backoff_factor: 1.0,
		},
		..BridgeConfig::default()
	};
	let (client, controller) = client_with(FakeEngineBuilder::new().fail_connects(3), config);

	let err = client.connect().await.unwrap_err();
	assert!(err.is_connection());
	assert!(err.to_string().contains("failed to load native module"));
	assert_eq!(controller.calls(FakeCall::Connect), 2);
	assert!(!client.is_connected());

	// The last scripted failure is consumed by the first attempt here.
	client.connect().await.unwrap();
	assert!(client.is_connected());
	assert_eq!(controller.calls(FakeCall::Connect), 4);
}

#[tokio::test]
async fn session_creation_is_not_retried() {
	let config = BridgeConfig {
		retry_policy: RetryPolicy {
			max_retries: 5,
			initial_delay_ms: 1,
			backoff_factor: 1.0,
		},
		..BridgeConfig::default()
	};
	let (client, controller) = client_with(FakeEngineBuilder::new(), config);
	client.connect().await.unwrap();
	controller.fail_call(FakeCall::CreateSession, "quota exceeded");

	let err = client.create_conversation(Vec::new()).await.unwrap_err();
	assert!(matches!(err, Error::Session { operation: "create", .. }));
	assert_eq!(controller.calls(FakeCall::CreateSession), 1);
	assert!(!client.has_active_session());
}

#[test]
fn invalid_config_is_rejected_at_build() {
	let (engine, controller) = FakeEngineBuilder::new().build();
	let config = BridgeConfig {
		retry_policy: RetryPolicy {
			backoff_factor: f64::NAN,
			..RetryPolicy::default()
		},
		..BridgeConfig::default()
	};

	let err = codex_bridge::Client::builder(engine).config(config).build().err().unwrap();
	assert!(err.is_validation());
	assert_eq!(controller.calls(FakeCall::Connect), 0);
}
