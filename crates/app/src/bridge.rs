//! The bridge actor.
//!
//! A single task owns the classifier, the discovery bus and every reducer.
//! Inbound messages are processed one at a time to completion, so reducers
//! never observe interleaved updates. Actions and queries reach the actor
//! through a cloneable [`BridgeHandle`]; state changes leave it on the
//! [`StateChangeBus`].

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rvc_domain::command::{CommandIntent, Nack, NackReason, ThermostatRequest};
use rvc_domain::error::{NotFoundError, RvcError};
use rvc_domain::instance::Instance;
use rvc_domain::time::{Timestamp, now};

use crate::burst::{BurstHandle, BurstScheduler, BurstTiming};
use crate::classifier::Classifier;
use crate::codec::{CommandEncoder, OutboundMessage, RawMessage};
use crate::config::RvcConfig;
use crate::diagnostics::DiagnosticsSnapshot;
use crate::discovery_bus::{DiscoveryBus, HandlerId};
use crate::event_bus::StateChangeBus;
use crate::ports::CommandPublisher;
use crate::reducers::{
    ClimateReducer, CoverReducer, LightReducer, LockReducer, Reducer, Reduction, SensorReducer,
    StateChange, SwitchReducer, TrackerReducer,
};
use crate::signature::{
    ConfirmOutcome, SignatureGuard, SignatureJob, ack_message, audit_message, confirm, nack_message,
};

const REQUEST_CAPACITY: usize = 64;

/// A user intent aimed at one device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    LightOn {
        instance: Instance,
        /// Brightness on the 0–255 scale; `None` restores the last level.
        brightness: Option<u8>,
    },
    LightOff {
        instance: Instance,
    },
    Lock {
        id: String,
    },
    Unlock {
        id: String,
    },
    OpenCover {
        id: String,
    },
    CloseCover {
        id: String,
    },
    StopCover {
        id: String,
    },
    SwitchOn {
        instance: Instance,
    },
    SwitchOff {
        instance: Instance,
    },
    ToggleSwitch {
        instance: Instance,
    },
    PressButton {
        key: String,
    },
    /// Absolute mode and setpoint command for a thermostat zone.
    SetThermostat {
        instance: String,
        request: ThermostatRequest,
    },
}

/// A message for the bridge actor.
pub enum BridgeRequest {
    Act {
        action: DeviceAction,
        reply: oneshot::Sender<Result<Option<StateChange>, RvcError>>,
    },
    Signature {
        instance: String,
        action: String,
        reply: oneshot::Sender<Result<BurstHandle, RvcError>>,
    },
    ConfirmedSignature {
        instance: String,
        action: String,
        reply: oneshot::Sender<Result<JoinHandle<ConfirmOutcome>, RvcError>>,
    },
    Snapshots {
        reply: oneshot::Sender<Vec<StateChange>>,
    },
    Diagnostics {
        reply: oneshot::Sender<DiagnosticsSnapshot>,
    },
}

struct Handlers {
    light: HandlerId,
    climate: HandlerId,
    lock: HandlerId,
    cover: HandlerId,
    switch: HandlerId,
}

pub struct Bridge<P> {
    config: RvcConfig,
    classifier: Classifier,
    bus: DiscoveryBus<Reducer>,
    handlers: Handlers,
    encoder: CommandEncoder,
    publisher: P,
    changes: StateChangeBus,
    bursts: BurstScheduler,
    guard: SignatureGuard,
    coercion_failures: u64,
    subscriptions: Vec<String>,
}

impl<P> Bridge<P>
where
    P: CommandPublisher + Clone + Send + Sync + 'static,
{
    /// Build the bridge and register every reducer.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate.
    pub fn new(config: RvcConfig, publisher: P, changes: StateChangeBus) -> Result<Self, RvcError> {
        config.validate()?;
        let classifier = Classifier::new(&config.topic_prefix, config.gps_marker.clone(), config.recent_capacity);
        let mut bus = DiscoveryBus::new(config.replay_capacity);
        let handlers = Handlers {
            light: bus.register(Reducer::Light(LightReducer::new(&config))),
            climate: bus.register(Reducer::Climate(ClimateReducer::new(&config))),
            lock: bus.register(Reducer::Lock(LockReducer::new(&config))),
            cover: bus.register(Reducer::Cover(CoverReducer::new(&config))),
            switch: bus.register(Reducer::Switch(SwitchReducer::new(&config))),
        };
        bus.register(Reducer::Sensor(SensorReducer::new(&config)));
        bus.register(Reducer::Tracker(TrackerReducer::new(&config)));
        let encoder = CommandEncoder::new(
            config.command_format,
            config.topic_prefix.clone(),
            config.command_topic.clone(),
        );
        let guard = SignatureGuard::new(config.thermostat.clone());
        let subscriptions = config.subscription_topics();
        tracing::info!(
            prefix = %config.topic_prefix,
            discovery = config.auto_discovery,
            handlers = bus.len(),
            "bridge ready"
        );
        Ok(Self {
            config,
            classifier,
            bus,
            handlers,
            encoder,
            publisher,
            changes,
            bursts: BurstScheduler::new(),
            guard,
            coercion_failures: 0,
            subscriptions,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RvcConfig {
        &self.config
    }

    pub fn ingest(&mut self, message: &RawMessage) -> usize {
        self.ingest_at(message, now())
    }

    /// Classify one message and fan it out to every reducer.
    ///
    /// Returns the number of state changes published. Nothing is classified
    /// while auto discovery is disabled.
    pub fn ingest_at(&mut self, message: &RawMessage, at: Timestamp) -> usize {
        if let Some(instance) = self.control_instance(&message.topic) {
            self.thermostat_control(instance, &message.payload, at);
            return 0;
        }
        if !self.config.auto_discovery {
            return 0;
        }
        let Some(event) = self.classifier.classify(message) else {
            return 0;
        };
        let mut total = Reduction::default();
        for reduction in self.bus.dispatch(event, at) {
            total.merge(reduction);
        }
        self.coercion_failures += u64::try_from(total.coercion_failures).unwrap_or(u64::MAX);
        let published = total.changes.len();
        for change in total.changes {
            self.changes.publish(change);
        }
        published
    }

    /// Apply an action: update state optimistically and schedule the command.
    ///
    /// Returns the resulting state change, or `None` for stateless buttons.
    ///
    /// # Errors
    ///
    /// Fails for unknown devices and invalid requests. No command is
    /// published in that case; a refused thermostat command only publishes
    /// its nack report.
    pub fn act(&mut self, action: DeviceAction) -> Result<Option<StateChange>, RvcError> {
        let at = now();
        let (intent, change) = match action {
            DeviceAction::LightOn { instance, brightness } => self.lights()?.turn_on(&instance, brightness, at)?,
            DeviceAction::LightOff { instance } => self.lights()?.turn_off(&instance, at)?,
            DeviceAction::Lock { id } => self.locks()?.lock(&id, at)?,
            DeviceAction::Unlock { id } => self.locks()?.unlock(&id, at)?,
            DeviceAction::OpenCover { id } => self.covers()?.open(&id, at)?,
            DeviceAction::CloseCover { id } => self.covers()?.close(&id, at)?,
            DeviceAction::StopCover { id } => self.covers()?.stop(&id, at)?,
            DeviceAction::SwitchOn { instance } => self.switches()?.turn_on(&instance, at)?,
            DeviceAction::SwitchOff { instance } => self.switches()?.turn_off(&instance, at)?,
            DeviceAction::ToggleSwitch { instance } => self.switches()?.toggle(&instance, at)?,
            DeviceAction::PressButton { key } => {
                let intent = self.button_intent(&key)?;
                self.send(&intent, at);
                return Ok(None);
            }
            DeviceAction::SetThermostat { instance, request } => {
                self.set_thermostat(&instance, &request, at)?;
                return Ok(None);
            }
        };
        self.send(&intent, at);
        self.changes.publish(change.clone());
        Ok(Some(change))
    }

    fn button_intent(&self, key: &str) -> Result<CommandIntent, RvcError> {
        let button = self
            .config
            .all_buttons()
            .into_iter()
            .find(|button| button.key == key)
            .ok_or_else(|| NotFoundError::new("button", key))?;
        tracing::info!(button = key, instance = %button.instance, "pressing button");
        CommandIntent::pulse(&button.instance, button.command).map_err(RvcError::from)
    }

    fn send(&self, intent: &CommandIntent, at: Timestamp) {
        self.publish_all(vec![self.encoder.encode(intent, at)]);
    }

    /// Publish `messages` one after the other on a single task.
    fn publish_all(&self, messages: Vec<OutboundMessage>) {
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            for message in messages {
                let topic = message.topic.clone();
                if let Err(error) = publisher.publish(message).await {
                    tracing::warn!(%topic, %error, "command not published");
                }
            }
        });
    }

    /// Validate an absolute thermostat command, then publish the audit
    /// record, the frame (unless transmission is disabled) and the ack.
    fn set_thermostat(&mut self, instance: &str, request: &ThermostatRequest, at: Timestamp) -> Result<(), RvcError> {
        let limits = &self.config.thermostat;
        match self.guard.check_command(instance, request, at) {
            Ok(command) => {
                tracing::info!(
                    instance = command.instance,
                    data = %command.data(),
                    transmit = limits.transmit,
                    "sending thermostat command"
                );
                let mut messages = vec![audit_message(limits, &command, request, at)];
                if limits.transmit {
                    messages.push(self.encoder.encode_thermostat(&command, at));
                }
                messages.push(ack_message(limits, &command, request, at));
                self.publish_all(messages);
                Ok(())
            }
            Err(nack) => {
                tracing::warn!(reason = %nack.reason, instance = %nack.instance, "thermostat command rejected");
                self.publish_all(vec![nack_message(limits, &nack, Some(request))]);
                Err(nack.into())
            }
        }
    }

    /// Instance segment of a message on the thermostat control topic.
    fn control_instance<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let control = self.config.thermostat.control_topic.as_str();
        if control.is_empty() {
            return None;
        }
        topic.strip_prefix(control)?.strip_prefix('/')
    }

    fn thermostat_control(&mut self, instance: &str, payload: &[u8], at: Timestamp) {
        match serde_json::from_slice::<ThermostatRequest>(payload) {
            // the outcome is reported on the ack and nack topics
            Ok(request) => {
                let _ = self.set_thermostat(instance, &request, at);
            }
            Err(error) => {
                tracing::warn!(%instance, %error, "thermostat control payload not decoded");
                let nack = Nack::new(NackReason::InvalidJson, instance, at);
                self.publish_all(vec![nack_message(&self.config.thermostat, &nack, None)]);
            }
        }
    }

    /// Validate a thermostat signature request and start its burst.
    ///
    /// # Errors
    ///
    /// Returns [`RvcError::Rejected`] with a structured negative
    /// acknowledgement when validation fails.
    pub fn climate_signature(&mut self, instance: &str, action: &str) -> Result<BurstHandle, RvcError> {
        let job = self.signature_job(instance, action, now())?;
        Ok(job.start())
    }

    /// Like [`Self::climate_signature`], with the confirm/retry loop running
    /// in its own task.
    ///
    /// # Errors
    ///
    /// Returns [`RvcError::Rejected`] when validation fails.
    pub fn confirmed_climate_signature(
        &mut self,
        instance: &str,
        action: &str,
    ) -> Result<JoinHandle<ConfirmOutcome>, RvcError> {
        let job = self.signature_job(instance, action, now())?;
        let baseline = self
            .climate()?
            .setpoints(&Instance::from(job.instance))
            .unwrap_or_default();
        let limits = self.config.thermostat.clone();
        let changes = self.changes.subscribe();
        Ok(tokio::spawn(async move { confirm(job, &limits, baseline, changes).await }))
    }

    fn signature_job(&mut self, instance: &str, action: &str, at: Timestamp) -> Result<SignatureJob<P>, RvcError> {
        let (instance, action) = self.guard.check(instance, action, at).inspect_err(|nack| {
            tracing::warn!(reason = %nack.reason, instance = %nack.instance, "signature request rejected");
        })?;
        Ok(SignatureJob {
            scheduler: self.bursts.clone(),
            publisher: self.publisher.clone(),
            encoder: self.encoder.clone(),
            timing: BurstTiming::from(&self.config.burst),
            instance,
            action,
        })
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<StateChange> {
        self.snapshots_at(now())
    }

    /// Current state of every known device, availability evaluated at `at`.
    #[must_use]
    pub fn snapshots_at(&self, at: Timestamp) -> Vec<StateChange> {
        self.bus
            .handlers()
            .flat_map(|reducer| reducer.snapshots(at))
            .collect()
    }

    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            prefix: self.config.topic_prefix.clone(),
            command_topic: self.config.command_topic.clone(),
            gps_topic: self.config.gps_topic.clone(),
            discovery_enabled: self.config.auto_discovery,
            active_subscriptions: self.subscriptions.clone(),
            recent_messages: self.classifier.recent().snapshot(),
            decode_failures: self.classifier.decode_failures(),
            classification_misses: self.classifier.misses(),
            coercion_failures: self.coercion_failures,
        }
    }

    /// Stop every burst and drop every reducer. No command is published
    /// once this returns.
    pub async fn shutdown(&mut self) {
        self.bursts.close().await;
        let dropped = self.bus.unregister_all().len();
        self.subscriptions.clear();
        tracing::info!(handlers = dropped, "bridge stopped");
    }

    fn serve(&mut self, request: BridgeRequest) {
        match request {
            BridgeRequest::Act { action, reply } => {
                let _ = reply.send(self.act(action));
            }
            BridgeRequest::Signature { instance, action, reply } => {
                let _ = reply.send(self.climate_signature(&instance, &action));
            }
            BridgeRequest::ConfirmedSignature { instance, action, reply } => {
                let _ = reply.send(self.confirmed_climate_signature(&instance, &action));
            }
            BridgeRequest::Snapshots { reply } => {
                let _ = reply.send(self.snapshots());
            }
            BridgeRequest::Diagnostics { reply } => {
                let _ = reply.send(self.diagnostics());
            }
        }
    }

    /// Process inbound messages and requests until `token` is cancelled or
    /// both channels close, then shut down.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<RawMessage>,
        mut requests: mpsc::Receiver<BridgeRequest>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                Some(message) = inbound.recv() => {
                    self.ingest(&message);
                }
                Some(request) = requests.recv() => self.serve(request),
                else => break,
            }
        }
        self.shutdown().await;
    }

    /// Run the bridge on its own task.
    pub fn spawn(self, inbound: mpsc::Receiver<RawMessage>, token: CancellationToken) -> (BridgeHandle, JoinHandle<()>) {
        let (requests, receiver) = mpsc::channel(REQUEST_CAPACITY);
        let task = tokio::spawn(self.run(inbound, receiver, token));
        (BridgeHandle { requests }, task)
    }

    fn lights(&mut self) -> Result<&mut LightReducer, RvcError> {
        match self.bus.get_mut(self.handlers.light) {
            Some(Reducer::Light(reducer)) => Ok(reducer),
            _ => Err(RvcError::Stopped),
        }
    }

    fn climate(&self) -> Result<&ClimateReducer, RvcError> {
        match self.bus.get(self.handlers.climate) {
            Some(Reducer::Climate(reducer)) => Ok(reducer),
            _ => Err(RvcError::Stopped),
        }
    }

    fn locks(&mut self) -> Result<&mut LockReducer, RvcError> {
        match self.bus.get_mut(self.handlers.lock) {
            Some(Reducer::Lock(reducer)) => Ok(reducer),
            _ => Err(RvcError::Stopped),
        }
    }

    fn covers(&mut self) -> Result<&mut CoverReducer, RvcError> {
        match self.bus.get_mut(self.handlers.cover) {
            Some(Reducer::Cover(reducer)) => Ok(reducer),
            _ => Err(RvcError::Stopped),
        }
    }

    fn switches(&mut self) -> Result<&mut SwitchReducer, RvcError> {
        match self.bus.get_mut(self.handlers.switch) {
            Some(Reducer::Switch(reducer)) => Ok(reducer),
            _ => Err(RvcError::Stopped),
        }
    }
}

/// Cloneable client of a running bridge.
#[derive(Clone)]
pub struct BridgeHandle {
    requests: mpsc::Sender<BridgeRequest>,
}

impl BridgeHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> BridgeRequest) -> Result<T, RvcError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| RvcError::Stopped)?;
        response.await.map_err(|_| RvcError::Stopped)
    }

    /// # Errors
    ///
    /// Fails when the action is refused or the bridge has stopped.
    pub async fn act(&self, action: DeviceAction) -> Result<Option<StateChange>, RvcError> {
        self.request(|reply| BridgeRequest::Act { action, reply }).await?
    }

    /// # Errors
    ///
    /// Fails when the request is rejected or the bridge has stopped.
    pub async fn climate_signature(
        &self,
        instance: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<BurstHandle, RvcError> {
        let (instance, action) = (instance.into(), action.into());
        self.request(|reply| BridgeRequest::Signature {
            instance,
            action,
            reply,
        })
        .await?
    }

    /// Send a signature and wait for the zone to confirm it.
    ///
    /// # Errors
    ///
    /// Fails when the request is rejected or the bridge has stopped. An
    /// unconfirmed change is an `Ok` outcome with `ok: false`.
    pub async fn confirmed_climate_signature(
        &self,
        instance: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<ConfirmOutcome, RvcError> {
        let (instance, action) = (instance.into(), action.into());
        let task = self
            .request(|reply| BridgeRequest::ConfirmedSignature {
                instance,
                action,
                reply,
            })
            .await??;
        task.await.map_err(|_| RvcError::Stopped)
    }

    /// # Errors
    ///
    /// Fails when the bridge has stopped.
    pub async fn snapshots(&self) -> Result<Vec<StateChange>, RvcError> {
        self.request(|reply| BridgeRequest::Snapshots { reply }).await
    }

    /// # Errors
    ///
    /// Fails when the bridge has stopped.
    pub async fn diagnostics(&self) -> Result<DiagnosticsSnapshot, RvcError> {
        self.request(|reply| BridgeRequest::Diagnostics { reply }).await
    }
}
