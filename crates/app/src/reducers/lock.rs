use std::collections::BTreeMap;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::command::{CommandCode, CommandIntent};
use rvc_domain::device::Device;
use rvc_domain::device::light::DimmerStatus;
use rvc_domain::device::lock::{LockDefinition, LockState};
use rvc_domain::error::{NotFoundError, RvcError};
use rvc_domain::event::{ClassifiedEvent, DeviceType};
use rvc_domain::time::Timestamp;

use super::{Reduction, StateChange, observe};
use crate::config::RvcConfig;

/// Door locks, each driven by a lock relay and an unlock relay reporting as
/// dimmer loads.
pub struct LockReducer {
    definitions: Vec<LockDefinition>,
    policy: AvailabilityPolicy,
    devices: BTreeMap<String, Device<LockState>>,
}

impl LockReducer {
    #[must_use]
    pub fn new(config: &RvcConfig) -> Self {
        let devices = config
            .locks
            .iter()
            .map(|def| {
                (
                    def.id.clone(),
                    Device::new(def.id.clone(), def.name.clone(), LockState::default()),
                )
            })
            .collect();
        Self {
            definitions: config.locks.clone(),
            policy: config.availability_policy(),
            devices,
        }
    }

    pub fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        if event.device_type() != DeviceType::Light {
            return Reduction::default();
        }
        let Some((id, role)) = self
            .definitions
            .iter()
            .find_map(|def| def.role_of(event.instance()).map(|role| (&def.id, role)))
        else {
            return Reduction::default();
        };
        let Some(device) = self.devices.get_mut(id) else {
            return Reduction::default();
        };
        let decoded = DimmerStatus::decode(event.fields());
        let snapshot = observe(device, self.policy, at, &decoded.skipped, |state| {
            state.apply(role, &decoded.update);
        });
        Reduction {
            changes: vec![StateChange::Lock(snapshot)],
            coercion_failures: decoded.skipped.len(),
        }
    }

    /// # Errors
    ///
    /// Fails for unknown locks.
    pub fn lock(&mut self, id: &str, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        self.actuate(id, true, at)
    }

    /// # Errors
    ///
    /// Fails for unknown locks.
    pub fn unlock(&mut self, id: &str, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        self.actuate(id, false, at)
    }

    fn actuate(&mut self, id: &str, lock: bool, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        let def = self
            .definitions
            .iter()
            .find(|def| def.id == id)
            .ok_or_else(|| NotFoundError::new("lock", id))?;
        let relay = if lock { &def.lock } else { &def.unlock };
        let intent = CommandIntent::pulse(relay, CommandCode::On)?;
        let device = self
            .devices
            .get_mut(id)
            .ok_or_else(|| NotFoundError::new("lock", id))?;
        if lock {
            device.state.lock();
        } else {
            device.state.unlock();
        }
        tracing::info!(lock = id, instance = %relay, locked = lock, "actuating lock");
        Ok((intent, StateChange::Lock(device.snapshot(self.policy, at))))
    }

    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        self.devices
            .values()
            .map(|device| StateChange::Lock(device.snapshot(self.policy, at)))
            .collect()
    }
}
