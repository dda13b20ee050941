//! Thermostat commands: request validation, the confirm/retry loop around
//! signature bursts, and the reports published for absolute commands.

use std::collections::HashMap;

use chrono::TimeDelta;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use rvc_domain::command::{
    Nack, NackReason, SignatureAction, THERMOSTAT_COMMAND_PGN, ThermostatCommand, ThermostatRequest,
};
use rvc_domain::device::climate::SetpointView;
use rvc_domain::time::{Timestamp, epoch_secs};

use crate::burst::{BurstHandle, BurstScheduler, BurstTiming};
use crate::codec::{CommandEncoder, OutboundMessage};
use crate::config::ThermostatConfig;
use crate::ports::CommandPublisher;
use crate::reducers::StateChange;

/// Validates signature requests before anything is published.
pub struct SignatureGuard {
    limits: ThermostatConfig,
    last_accepted: HashMap<u8, Timestamp>,
}

impl SignatureGuard {
    #[must_use]
    pub fn new(limits: ThermostatConfig) -> Self {
        Self {
            limits,
            last_accepted: HashMap::new(),
        }
    }

    /// Accept or refuse a request for `action` on zone `instance`.
    ///
    /// Checks run in order: instance is numeric, instance is in range, the
    /// zone is not rate limited, the action is known. Only accepted requests
    /// count towards the rate limit.
    ///
    /// # Errors
    ///
    /// Returns the [`Nack`] describing the first failed check.
    pub fn check(&mut self, instance: &str, action: &str, at: Timestamp) -> Result<(u8, SignatureAction), Nack> {
        let number = self.admit(instance, at)?;
        let action = action
            .parse::<SignatureAction>()
            .map_err(|reason| Nack::new(reason, instance, at))?;
        self.last_accepted.insert(number, at);
        Ok((number, action))
    }

    /// Accept or refuse an absolute command for zone `instance`.
    ///
    /// The instance and rate checks of [`Self::check`] run first, then the
    /// request fields. Both kinds of request share the rate limit.
    ///
    /// # Errors
    ///
    /// Returns the [`Nack`] describing the first failed check.
    pub fn check_command(
        &mut self,
        instance: &str,
        request: &ThermostatRequest,
        at: Timestamp,
    ) -> Result<ThermostatCommand, Nack> {
        let number = self.admit(instance, at)?;
        let command = request
            .resolve(number)
            .map_err(|reason| Nack::new(reason, instance, at))?;
        self.last_accepted.insert(number, at);
        Ok(command)
    }

    fn admit(&self, instance: &str, at: Timestamp) -> Result<u8, Nack> {
        let nack = |reason: NackReason| Nack::new(reason, instance, at);
        let trimmed = instance.trim();
        let number = trimmed
            .parse::<u8>()
            .ok()
            .filter(|_| trimmed.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| nack(NackReason::BadInstance(instance.to_string())))?;
        if !(self.limits.min_instance..=self.limits.max_instance).contains(&number) {
            return Err(nack(NackReason::InstanceOutOfRange(number)));
        }
        if let Some(last) = self.last_accepted.get(&number) {
            let min_interval = TimeDelta::from_std(self.limits.min_interval()).unwrap_or(TimeDelta::MAX);
            if at - *last < min_interval {
                return Err(nack(NackReason::RateLimited(number)));
            }
        }
        Ok(number)
    }
}

fn frame_report(command: &ThermostatCommand) -> serde_json::Value {
    json!({
        "pgn": THERMOSTAT_COMMAND_PGN,
        "pgn_hex": format!("0x{THERMOSTAT_COMMAND_PGN:05X}"),
        "instance": command.instance,
        "data": command.bytes(),
        "data_hex": command.data(),
        "mode": command.mode,
        "fan_mode": command.fan_mode,
        "fan_speed": command.fan_speed,
        "setpoint_heat_c100": command.setpoint_heat_c100,
        "setpoint_cool_c100": command.setpoint_cool_c100,
    })
}

/// Audit record for an accepted absolute command, published whether or not
/// the frame is transmitted.
#[must_use]
pub fn audit_message(
    limits: &ThermostatConfig,
    command: &ThermostatCommand,
    request: &ThermostatRequest,
    at: Timestamp,
) -> OutboundMessage {
    let body = json!({
        "request": request,
        "frame": frame_report(command),
        "tx_enabled": limits.transmit,
        "ts": epoch_secs(at),
    });
    OutboundMessage {
        topic: limits.audit_topic.clone(),
        payload: body.to_string(),
    }
}

/// Acknowledgement for an accepted absolute command.
#[must_use]
pub fn ack_message(
    limits: &ThermostatConfig,
    command: &ThermostatCommand,
    request: &ThermostatRequest,
    at: Timestamp,
) -> OutboundMessage {
    let status = if limits.transmit { "sent" } else { "monitor_only" };
    let body = json!({
        "status": status,
        "request": request,
        "frame": frame_report(command),
        "ts": epoch_secs(at),
    });
    OutboundMessage {
        topic: limits.ack_topic.clone(),
        payload: body.to_string(),
    }
}

/// Negative acknowledgement for a refused absolute command. `request` is
/// absent when the payload did not decode.
#[must_use]
pub fn nack_message(limits: &ThermostatConfig, nack: &Nack, request: Option<&ThermostatRequest>) -> OutboundMessage {
    let body = json!({
        "status": "nack",
        "reason": nack.reason,
        "instance": nack.instance,
        "request": request,
        "ts": nack.ts,
    });
    OutboundMessage {
        topic: limits.nack_topic.clone(),
        payload: body.to_string(),
    }
}

/// A validated signature burst, ready to be (re)started.
#[derive(Clone)]
pub struct SignatureJob<P> {
    pub scheduler: BurstScheduler,
    pub publisher: P,
    pub encoder: CommandEncoder,
    pub timing: BurstTiming,
    pub instance: u8,
    pub action: SignatureAction,
}

impl<P> SignatureJob<P>
where
    P: CommandPublisher + Clone + Send + Sync + 'static,
{
    /// Start one burst, replacing any burst running for the same zone.
    #[must_use]
    pub fn start(&self) -> BurstHandle {
        let encoder = self.encoder.clone();
        let (instance, action) = (self.instance, self.action);
        tracing::info!(instance, %action, "sending thermostat signature");
        self.scheduler.start(
            format!("thermostat/{instance}"),
            self.publisher.clone(),
            self.timing,
            move |at| encoder.encode_signature(instance, action, at),
        )
    }
}

/// Result of a confirmed signature request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmOutcome {
    pub ok: bool,
    pub action: SignatureAction,
    pub instance: u8,
    pub attempts: u32,
    pub baseline: SetpointView,
    /// Distinct setpoint views reported by the zone while waiting.
    pub observed: Vec<SetpointView>,
}

/// Replay `job` until the zone reports a change matching its action.
///
/// Each attempt runs a full burst and then waits up to the confirm timeout
/// for a matching climate update on `changes`, which must be subscribed
/// before the first burst. Every retry replays the same action. Running out
/// of attempts is reported as `ok: false`, not as an error.
pub async fn confirm<P>(
    job: SignatureJob<P>,
    limits: &ThermostatConfig,
    baseline: SetpointView,
    mut changes: broadcast::Receiver<StateChange>,
) -> ConfirmOutcome
where
    P: CommandPublisher + Clone + Send + Sync + 'static,
{
    let key = job.instance.to_string();
    let mut outcome = ConfirmOutcome {
        ok: false,
        action: job.action,
        instance: job.instance,
        attempts: 0,
        baseline,
        observed: Vec::new(),
    };
    for attempt in 1..=limits.attempts {
        outcome.attempts = attempt;
        if job.start().finished().await.cancelled {
            tracing::debug!(instance = job.instance, attempt, "signature burst superseded");
            break;
        }
        let deadline = Instant::now() + limits.confirm_timeout();
        if wait_for_match(&mut changes, &key, job.action, &baseline, deadline, &mut outcome.observed).await {
            outcome.ok = true;
            tracing::info!(instance = job.instance, action = %job.action, attempt, "thermostat change confirmed");
            return outcome;
        }
        if attempt < limits.attempts {
            tokio::time::sleep(limits.retry_delay()).await;
        }
    }
    tracing::warn!(
        instance = job.instance,
        action = %job.action,
        attempts = outcome.attempts,
        "thermostat change not confirmed"
    );
    outcome
}

async fn wait_for_match(
    changes: &mut broadcast::Receiver<StateChange>,
    key: &str,
    action: SignatureAction,
    baseline: &SetpointView,
    deadline: Instant,
    observed: &mut Vec<SetpointView>,
) -> bool {
    loop {
        match tokio::time::timeout_at(deadline, changes.recv()).await {
            Err(_) | Ok(Err(RecvError::Closed)) => return false,
            Ok(Err(RecvError::Lagged(skipped))) => {
                tracing::debug!(skipped, "confirmation lagged behind state changes");
            }
            Ok(Ok(StateChange::Climate(snapshot))) if snapshot.key == key => {
                let view = snapshot.state.setpoints();
                if !observed.contains(&view) {
                    observed.push(view);
                }
                if action.is_confirmed_by(baseline, &view) {
                    return true;
                }
            }
            Ok(Ok(_)) => {}
        }
    }
}
