//! # rvcd: RV-C bridge daemon
//!
//! Composition root that wires the MQTT transport to the bridge.
//!
//! ## Responsibilities
//! - Load configuration (`rvc.toml` and environment overrides)
//! - Install the tracing subscriber
//! - Connect to the broker and start the bridge actor
//! - Log every state change the bridge publishes
//! - Handle graceful shutdown on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rvc_adapter_mqtt::MqttTransport;
use rvc_app::bridge::Bridge;
use rvc_app::event_bus::StateChangeBus;
use rvc_app::reducers::StateChange;
use rvc_app::refresh::spawn_refresh_ticker;

use crate::config::Config;

const CHANGE_CAPACITY: usize = 256;
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter).context("parsing log filter")?)
        .init();

    let token = CancellationToken::new();
    let transport_token = CancellationToken::new();
    let changes = StateChangeBus::new(CHANGE_CAPACITY);

    // Transport
    let topics = config.rvc.subscription_topics();
    let (publisher, inbound, mut transport) =
        MqttTransport::connect(&config.mqtt).start(topics, transport_token.clone());

    // Bridge
    let logger = tokio::spawn(log_changes(changes.subscribe(), token.clone()));
    let ticker = spawn_refresh_ticker(config.rvc.availability_policy(), changes.clone(), token.clone());
    let bridge = Bridge::new(config.rvc, publisher.clone(), changes).context("building bridge")?;
    let (_handle, bridge_task) = bridge.spawn(inbound, token.clone());
    tracing::info!("rvcd started");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutting down");

    token.cancel();
    if let Err(error) = bridge_task.await {
        tracing::error!(%error, "bridge task failed");
    }
    if let Some(ticker) = ticker {
        let _ = ticker.await;
    }
    let _ = logger.await;

    if let Err(error) = publisher.disconnect().await {
        tracing::warn!(%error, "disconnect not sent");
    }
    if tokio::time::timeout(DISCONNECT_GRACE, &mut transport).await.is_err() {
        transport_token.cancel();
        let _ = transport.await;
    }

    tracing::info!("rvcd stopped");
    Ok(())
}

async fn log_changes(mut changes: broadcast::Receiver<StateChange>, token: CancellationToken) {
    loop {
        let change = tokio::select! {
            biased;
            () = token.cancelled() => break,
            change = changes.recv() => change,
        };
        match change {
            Ok(StateChange::AvailabilityRefresh) => tracing::debug!("availability refresh"),
            Ok(change) => tracing::info!(kind = change.kind(), key = change.key().unwrap_or_default(), "state changed"),
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "state change logger lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}
