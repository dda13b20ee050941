use std::collections::{BTreeMap, BTreeSet};

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::command::CommandIntent;
use rvc_domain::device::Device;
use rvc_domain::device::light::{DimmerStatus, LightState};
use rvc_domain::error::{NotFoundError, RvcError};
use rvc_domain::event::{ClassifiedEvent, DeviceType};
use rvc_domain::instance::Instance;
use rvc_domain::time::Timestamp;

use super::{Reduction, StateChange, observe};
use crate::config::RvcConfig;

fn label_for(labels: &BTreeMap<Instance, String>, instance: &Instance) -> String {
    labels
        .get(instance)
        .cloned()
        .unwrap_or_else(|| format!("RVC Light {instance}"))
}

/// Dimmer loads. Labelled instances exist from startup; any other dimmer
/// instance is created on first sighting, unless a lock, cover or switch
/// owns it.
pub struct LightReducer {
    labels: BTreeMap<Instance, String>,
    dimmable: BTreeSet<Instance>,
    claimed: BTreeSet<Instance>,
    policy: AvailabilityPolicy,
    devices: BTreeMap<Instance, Device<LightState>>,
}

impl LightReducer {
    #[must_use]
    pub fn new(config: &RvcConfig) -> Self {
        let claimed = config.claimed_instances();
        let dimmable = config.lights.dimmable.clone();
        let devices = config
            .lights
            .labels
            .iter()
            .filter(|(instance, _)| !claimed.contains(*instance))
            .map(|(instance, label)| {
                let state = LightState::new(dimmable.contains(instance));
                (instance.clone(), Device::new(instance.to_string(), label.clone(), state))
            })
            .collect();
        Self {
            labels: config.lights.labels.clone(),
            dimmable,
            claimed,
            policy: config.availability_policy(),
            devices,
        }
    }

    pub fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        if event.device_type() != DeviceType::Light {
            return Reduction::default();
        }
        let instance = event.instance();
        if self.claimed.contains(instance) {
            return Reduction::default();
        }
        let decoded = DimmerStatus::decode(event.fields());
        let device = self.devices.entry(instance.clone()).or_insert_with(|| {
            let label = label_for(&self.labels, instance);
            tracing::info!(%instance, %label, "discovered light");
            Device::new(
                instance.to_string(),
                label,
                LightState::new(self.dimmable.contains(instance)),
            )
        });
        let snapshot = observe(device, self.policy, at, &decoded.skipped, |state| {
            state.apply(&decoded.update);
        });
        Reduction {
            changes: vec![StateChange::Light(snapshot)],
            coercion_failures: decoded.skipped.len(),
        }
    }

    fn device_mut(&mut self, instance: &Instance) -> Result<&mut Device<LightState>, RvcError> {
        self.devices
            .get_mut(instance)
            .ok_or_else(|| NotFoundError::new("light", instance.as_str()).into())
    }

    /// Switch a light on, optionally at a 0–255 brightness.
    ///
    /// # Errors
    ///
    /// Fails for unknown lights or non-numeric instances; state is left
    /// untouched in that case.
    pub fn turn_on(
        &mut self,
        instance: &Instance,
        brightness: Option<u8>,
        at: Timestamp,
    ) -> Result<(CommandIntent, StateChange), RvcError> {
        let policy = self.policy;
        let device = self.device_mut(instance)?;
        let mut state = device.state.clone();
        let intent = CommandIntent::on(instance, state.turn_on(brightness))?;
        device.state = state;
        tracing::info!(%instance, level = intent.level(), "turning light on");
        Ok((intent, StateChange::Light(device.snapshot(policy, at))))
    }

    /// # Errors
    ///
    /// Fails for unknown lights or non-numeric instances.
    pub fn turn_off(
        &mut self,
        instance: &Instance,
        at: Timestamp,
    ) -> Result<(CommandIntent, StateChange), RvcError> {
        let policy = self.policy;
        let device = self.device_mut(instance)?;
        let intent = CommandIntent::off(instance)?;
        device.state.turn_off();
        tracing::info!(%instance, "turning light off");
        Ok((intent, StateChange::Light(device.snapshot(policy, at))))
    }

    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        self.devices
            .values()
            .map(|device| StateChange::Light(device.snapshot(self.policy, at)))
            .collect()
    }
}
