use std::collections::BTreeMap;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::command::{CommandCode, CommandIntent};
use rvc_domain::device::Device;
use rvc_domain::device::light::DimmerStatus;
use rvc_domain::device::switch::SwitchState;
use rvc_domain::error::{NotFoundError, RvcError};
use rvc_domain::event::{ClassifiedEvent, DeviceType};
use rvc_domain::instance::Instance;
use rvc_domain::time::Timestamp;

use super::{Reduction, StateChange, observe};
use crate::config::RvcConfig;

/// Non-dimmable relay loads listed in the switch table.
pub struct SwitchReducer {
    policy: AvailabilityPolicy,
    devices: BTreeMap<Instance, Device<SwitchState>>,
}

impl SwitchReducer {
    #[must_use]
    pub fn new(config: &RvcConfig) -> Self {
        let devices = config
            .switches
            .iter()
            .map(|(instance, label)| {
                (
                    instance.clone(),
                    Device::new(instance.to_string(), label.clone(), SwitchState::default()),
                )
            })
            .collect();
        Self {
            policy: config.availability_policy(),
            devices,
        }
    }

    pub fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        if event.device_type() != DeviceType::Light {
            return Reduction::default();
        }
        let Some(device) = self.devices.get_mut(event.instance()) else {
            return Reduction::default();
        };
        let decoded = DimmerStatus::decode(event.fields());
        let snapshot = observe(device, self.policy, at, &decoded.skipped, |state| {
            state.apply(&decoded.update);
        });
        Reduction {
            changes: vec![StateChange::Switch(snapshot)],
            coercion_failures: decoded.skipped.len(),
        }
    }

    /// # Errors
    ///
    /// Fails for unknown switches.
    pub fn turn_on(&mut self, instance: &Instance, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        let intent = CommandIntent::pulse(instance, CommandCode::On)?;
        self.commit(intent, at, |state| state.on = true)
    }

    /// # Errors
    ///
    /// Fails for unknown switches.
    pub fn turn_off(&mut self, instance: &Instance, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        let intent = CommandIntent::off(instance)?;
        self.commit(intent, at, |state| state.on = false)
    }

    /// # Errors
    ///
    /// Fails for unknown switches.
    pub fn toggle(&mut self, instance: &Instance, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        let intent = CommandIntent::new(instance, CommandCode::Toggle, 100)?;
        self.commit(intent, at, |state| state.on = !state.on)
    }

    fn commit(
        &mut self,
        intent: CommandIntent,
        at: Timestamp,
        apply: impl FnOnce(&mut SwitchState),
    ) -> Result<(CommandIntent, StateChange), RvcError> {
        let device = self
            .devices
            .get_mut(intent.instance())
            .ok_or_else(|| NotFoundError::new("switch", intent.instance().as_str()))?;
        apply(&mut device.state);
        tracing::info!(instance = %intent.instance(), code = ?intent.code(), "switching relay");
        let change = StateChange::Switch(device.snapshot(self.policy, at));
        Ok((intent, change))
    }

    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        self.devices
            .values()
            .map(|device| StateChange::Switch(device.snapshot(self.policy, at)))
            .collect()
    }
}
