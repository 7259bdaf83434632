#![allow(dead_code)]

use codex_bridge::native::fake::{FakeEngineBuilder, FakeEngineController};
use codex_bridge::{BridgeConfig, Client};
use tracing_subscriber::EnvFilter;

/// Routes bridge logs to the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub fn client_with(builder: FakeEngineBuilder, config: BridgeConfig) -> (Client, FakeEngineController) {
	init_tracing();
	let (engine, controller) = builder.build();
	let client = Client::builder(engine).config(config).build().unwrap();
	(client, controller)
}

pub async fn connected(builder: FakeEngineBuilder) -> (Client, FakeEngineController) {
	let (client, controller) = client_with(builder, BridgeConfig::default());
	client.connect().await.unwrap();
	(client, controller)
}

/// Client with a live conversation whose stream starts empty.
pub async fn in_conversation() -> (Client, FakeEngineController) {
	let (client, controller) = connected(FakeEngineBuilder::new().without_session_configured()).await;
	client.create_conversation(Vec::new()).await.unwrap();
	(client, controller)
}
