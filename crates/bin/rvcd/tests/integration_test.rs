//! End-to-end tests: a real bridge actor fed through its inbound channel,
//! with commands captured by an in-memory publisher.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rvc_app::bridge::{Bridge, BridgeHandle, DeviceAction};
use rvc_app::codec::{OutboundMessage, RawMessage};
use rvc_app::config::RvcConfig;
use rvc_app::event_bus::StateChangeBus;
use rvc_app::ports::CommandPublisher;
use rvc_app::reducers::StateChange;
use rvc_domain::command::{NackReason, ThermostatRequest};
use rvc_domain::error::RvcError;
use rvc_domain::instance::Instance;

#[derive(Clone)]
struct RecordingPublisher(mpsc::UnboundedSender<OutboundMessage>);

impl CommandPublisher for RecordingPublisher {
    fn publish(&self, message: OutboundMessage) -> impl Future<Output = Result<(), RvcError>> + Send {
        let _ = self.0.send(message);
        async { Ok(()) }
    }
}

struct Harness {
    inbound: mpsc::Sender<RawMessage>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    handle: BridgeHandle,
    changes: StateChangeBus,
    token: CancellationToken,
    task: JoinHandle<()>,
}

fn start(config: RvcConfig) -> Harness {
    let (tx, outbound) = mpsc::unbounded_channel();
    let changes = StateChangeBus::new(256);
    let bridge = Bridge::new(config, RecordingPublisher(tx), changes.clone()).unwrap();
    let (inbound, inbound_rx) = mpsc::channel(64);
    let token = CancellationToken::new();
    let (handle, task) = bridge.spawn(inbound_rx, token.clone());
    Harness {
        inbound,
        outbound,
        handle,
        changes,
        token,
        task,
    }
}

fn dimmer(instance: u8, level: u8) -> RawMessage {
    RawMessage::new(
        format!("rvc/DC_DIMMER_STATUS_3/{instance}"),
        format!(r#"{{"name":"DC_DIMMER_STATUS_3","instance":{instance},"operating status (brightness)":{level}}}"#),
    )
}

fn thermostat(instance: u8, cool: f64) -> RawMessage {
    RawMessage::new(
        format!("rvc/THERMOSTAT_STATUS_1/{instance}"),
        format!(
            r#"{{"name":"THERMOSTAT_STATUS_1","instance":{instance},"operating mode definition":"cool","setpoint temp cool F":{cool}}}"#
        ),
    )
}

fn find<'a>(snapshots: &'a [StateChange], kind: &str, key: &str) -> &'a StateChange {
    snapshots
        .iter()
        .find(|change| change.kind() == kind && change.key() == Some(key))
        .unwrap_or_else(|| panic!("no {kind} {key} in snapshots"))
}

#[tokio::test]
async fn should_mirror_bus_traffic_into_device_state() {
    let harness = start(RvcConfig::default());
    harness.inbound.send(dimmer(46, 100)).await.unwrap();
    harness.inbound.send(thermostat(0, 72.0)).await.unwrap();

    let snapshots = harness.handle.snapshots().await.unwrap();

    let StateChange::Light(sink) = find(&snapshots, "light", "46") else {
        panic!("expected a light");
    };
    assert!(sink.state.on);
    assert!(!sink.assumed);
    let StateChange::Climate(zone) = find(&snapshots, "climate", "0") else {
        panic!("expected a climate zone");
    };
    assert_eq!(zone.state.setpoint_cool, Some(72.0));

    let diagnostics = harness.handle.diagnostics().await.unwrap();
    assert_eq!(diagnostics.recent_messages.len(), 2);
    assert_eq!(diagnostics.decode_failures, 0);

    harness.token.cancel();
    harness.task.await.unwrap();
}

#[tokio::test]
async fn should_publish_commands_for_actions() {
    let mut harness = start(RvcConfig::default());

    harness
        .handle
        .act(DeviceAction::LightOn {
            instance: Instance::from(25),
            brightness: Some(128),
        })
        .await
        .unwrap();
    harness
        .handle
        .act(DeviceAction::Unlock {
            id: "entry_door".to_string(),
        })
        .await
        .unwrap();

    let light = harness.outbound.recv().await.unwrap();
    assert_eq!(light.topic, "node-red/rvc/commands");
    assert_eq!(light.payload, "25 2 50");
    let unlock = harness.outbound.recv().await.unwrap();
    assert_eq!(unlock.payload, "17 2 100");

    harness.token.cancel();
    harness.task.await.unwrap();
}

#[tokio::test]
async fn should_refuse_invalid_requests_without_publishing() {
    let mut harness = start(RvcConfig::default());

    let missing = harness
        .handle
        .act(DeviceAction::Lock {
            id: "cargo_hatch".to_string(),
        })
        .await;
    assert!(matches!(missing, Err(RvcError::NotFound(_))));

    let Err(RvcError::Rejected(nack)) = harness.handle.climate_signature("zero", "temp_up").await else {
        panic!("expected a nack");
    };
    assert_eq!(nack.reason, NackReason::BadInstance("zero".to_string()));

    harness.token.cancel();
    harness.task.await.unwrap();
    assert!(harness.outbound.try_recv().is_err());
}

#[tokio::test]
async fn should_report_absolute_thermostat_commands() {
    let mut harness = start(RvcConfig::default());
    let request = ThermostatRequest {
        mode: Some(2),
        setpoint_heat_f: Some(68.0),
        ..ThermostatRequest::default()
    };
    let change = harness
        .handle
        .act(DeviceAction::SetThermostat {
            instance: "1".to_string(),
            request,
        })
        .await
        .unwrap();
    assert!(change.is_none());

    let topics = [
        harness.outbound.recv().await.unwrap().topic,
        harness.outbound.recv().await.unwrap().topic,
        harness.outbound.recv().await.unwrap().topic,
    ];
    assert_eq!(
        topics,
        [
            "rvcbridge/thermostat_audit",
            "rvc/THERMOSTAT_COMMAND_1/1",
            "rvcbridge/thermostat_ack"
        ]
    );

    let refused = harness
        .handle
        .act(DeviceAction::SetThermostat {
            instance: "1".to_string(),
            request: ThermostatRequest::default(),
        })
        .await;
    let Err(RvcError::Rejected(nack)) = refused else {
        panic!("expected a nack");
    };
    assert_eq!(nack.reason, NackReason::RateLimited(1));
    assert_eq!(harness.outbound.recv().await.unwrap().topic, "rvcbridge/thermostat_nack");

    harness.token.cancel();
    harness.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn should_confirm_signature_when_zone_reports_new_setpoint() {
    let Harness {
        inbound,
        mut outbound,
        handle,
        token,
        task,
        ..
    } = start(RvcConfig::default());
    inbound.send(thermostat(0, 70.0)).await.unwrap();
    handle.snapshots().await.unwrap();

    // answer the first command frame like a thermostat would
    let thermostat_task = tokio::spawn(async move {
        let frame = outbound.recv().await.unwrap();
        assert_eq!(frame.topic, "rvc/THERMOSTAT_COMMAND_1/0");
        inbound.send(thermostat(0, 71.0)).await.unwrap();
        outbound
    });

    let outcome = handle.confirmed_climate_signature("0", "temp_up").await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.baseline.setpoint_cool, Some(70.0));
    assert_eq!(outcome.observed[0].setpoint_cool, Some(71.0));

    let mut outbound = thermostat_task.await.unwrap();
    let mut frames = 1;
    while outbound.try_recv().is_ok() {
        frames += 1;
    }
    assert_eq!(frames, 18);

    token.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn should_stop_publishing_once_cancelled() {
    let mut harness = start(RvcConfig::default());
    let burst = harness.handle.climate_signature("1", "fan_high").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    harness.token.cancel();
    harness.task.await.unwrap();
    assert!(burst.finished().await.cancelled);

    while harness.outbound.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.outbound.try_recv().is_err());
    assert!(matches!(harness.handle.snapshots().await, Err(RvcError::Stopped)));
}

#[tokio::test]
async fn should_broadcast_changes_to_subscribers() {
    let harness = start(RvcConfig::default());
    let mut changes = harness.changes.subscribe();

    harness.inbound.send(dimmer(16, 100)).await.unwrap();

    let change = changes.recv().await.unwrap();
    assert_eq!(change.kind(), "switch");
    assert_eq!(change.key(), Some("16"));

    harness.token.cancel();
    harness.task.await.unwrap();
}
