//! Per-family device state reducers.
//!
//! Each reducer owns the device map of one family and consumes the
//! classified events of exactly one device type; events of any other type
//! are a no-op. Actions return the [`CommandIntent`] to publish along with
//! the optimistic [`StateChange`], leaving IO to the caller.
//!
//! [`CommandIntent`]: rvc_domain::command::CommandIntent

mod climate;
mod cover;
mod light;
mod lock;
mod sensor;
mod switch;
mod tracker;

pub use climate::ClimateReducer;
pub use cover::CoverReducer;
pub use light::LightReducer;
pub use lock::LockReducer;
pub use sensor::SensorReducer;
pub use switch::SwitchReducer;
pub use tracker::TrackerReducer;

use serde::Serialize;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::device::climate::ClimateState;
use rvc_domain::device::cover::CoverState;
use rvc_domain::device::light::LightState;
use rvc_domain::device::lock::LockState;
use rvc_domain::device::sensor::SensorReading;
use rvc_domain::device::switch::SwitchState;
use rvc_domain::device::tracker::TrackerState;
use rvc_domain::device::{Device, DeviceSnapshot};
use rvc_domain::event::ClassifiedEvent;
use rvc_domain::time::Timestamp;

use crate::discovery_bus::DiscoveryHandler;

/// A device state surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "device", rename_all = "snake_case")]
pub enum StateChange {
    Light(DeviceSnapshot<LightState>),
    Climate(DeviceSnapshot<ClimateState>),
    Lock(DeviceSnapshot<LockState>),
    Cover(DeviceSnapshot<CoverState>),
    Switch(DeviceSnapshot<SwitchState>),
    Sensor(DeviceSnapshot<SensorReading>),
    Tracker(DeviceSnapshot<TrackerState>),
    /// Periodic nudge to re-evaluate availability; carries no state.
    AvailabilityRefresh,
}

impl StateChange {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Light(_) => "light",
            Self::Climate(_) => "climate",
            Self::Lock(_) => "lock",
            Self::Cover(_) => "cover",
            Self::Switch(_) => "switch",
            Self::Sensor(_) => "sensor",
            Self::Tracker(_) => "device_tracker",
            Self::AvailabilityRefresh => "availability_refresh",
        }
    }

    /// Key of the device this change describes.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Light(s) => Some(&s.key),
            Self::Climate(s) => Some(&s.key),
            Self::Lock(s) => Some(&s.key),
            Self::Cover(s) => Some(&s.key),
            Self::Switch(s) => Some(&s.key),
            Self::Sensor(s) => Some(&s.key),
            Self::Tracker(s) => Some(&s.key),
            Self::AvailabilityRefresh => None,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        match self {
            Self::Light(s) => s.available,
            Self::Climate(s) => s.available,
            Self::Lock(s) => s.available,
            Self::Cover(s) => s.available,
            Self::Switch(s) => s.available,
            Self::Sensor(s) => s.available,
            Self::Tracker(s) => s.available,
            Self::AvailabilityRefresh => true,
        }
    }
}

/// Outcome of one reducer handling one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reduction {
    pub changes: Vec<StateChange>,
    pub coercion_failures: usize,
}

impl Reduction {
    pub fn merge(&mut self, other: Reduction) {
        self.changes.extend(other.changes);
        self.coercion_failures += other.coercion_failures;
    }
}

/// Record a message for `device`, apply the decoded update and snapshot it.
pub(crate) fn observe<S: Clone>(
    device: &mut Device<S>,
    policy: AvailabilityPolicy,
    at: Timestamp,
    skipped: &[&'static str],
    apply: impl FnOnce(&mut S),
) -> DeviceSnapshot<S> {
    if device.mark_seen(at) {
        tracing::info!(key = device.key(), label = device.label(), "device confirmed");
    }
    if !skipped.is_empty() {
        tracing::debug!(key = device.key(), ?skipped, "skipped fields that failed coercion");
    }
    apply(&mut device.state);
    device.snapshot(policy, at)
}

/// Every reducer, as registered on the discovery bus.
pub enum Reducer {
    Light(LightReducer),
    Climate(ClimateReducer),
    Lock(LockReducer),
    Cover(CoverReducer),
    Switch(SwitchReducer),
    Sensor(SensorReducer),
    Tracker(TrackerReducer),
}

impl Reducer {
    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        match self {
            Self::Light(r) => r.snapshots(at),
            Self::Climate(r) => r.snapshots(at),
            Self::Lock(r) => r.snapshots(at),
            Self::Cover(r) => r.snapshots(at),
            Self::Switch(r) => r.snapshots(at),
            Self::Sensor(r) => r.snapshots(at),
            Self::Tracker(r) => r.snapshots(at),
        }
    }
}

impl DiscoveryHandler for Reducer {
    type Output = Reduction;

    fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        match self {
            Self::Light(r) => r.handle(event, at),
            Self::Climate(r) => r.handle(event, at),
            Self::Lock(r) => r.handle(event, at),
            Self::Cover(r) => r.handle(event, at),
            Self::Switch(r) => r.handle(event, at),
            Self::Sensor(r) => r.handle(event, at),
            Self::Tracker(r) => r.handle(event, at),
        }
    }
}
