//! Device records and per-family state.
//!
//! A [`Device`] couples a family-specific state value with its
//! [`AvailabilityTracker`]. Reducers own maps of devices and hand out
//! [`DeviceSnapshot`]s to the presentation layer.

pub mod attribute_value;
pub mod climate;
pub mod cover;
pub mod light;
pub mod lock;
pub mod sensor;
pub mod switch;
pub mod tracker;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::availability::{AvailabilityPolicy, AvailabilityTracker};
use crate::fields::FieldReader;
use crate::time::Timestamp;

pub use attribute_value::AttributeValue;

/// Diagnostic attributes copied from status messages.
pub type Diagnostics = BTreeMap<String, AttributeValue>;

/// Diagnostic sub-fields carried by a dimmer-style status message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosticUpdate(Vec<(&'static str, AttributeValue)>);

impl DiagnosticUpdate {
    /// Extract `last command`, `load status` and the bridge timestamp.
    ///
    /// A readable `last command definition` wins over the raw command code.
    #[must_use]
    pub fn decode(reader: &FieldReader<'_>) -> Self {
        let mut entries = Vec::new();
        if let Some(definition) = reader.raw("last command definition") {
            entries.push(("last_command", AttributeValue::from(definition)));
        } else if let Some(code) = reader.text("last command") {
            entries.push(("last_command", AttributeValue::String(format!("Code {code}"))));
        }
        if let Some(status) = reader.raw("load status definition") {
            entries.push(("load_status", AttributeValue::from(status)));
        }
        if let Some(ts) = reader.raw("timestamp") {
            entries.push(("last_update", AttributeValue::from(ts)));
        }
        Self(entries)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge into `target`; keys not mentioned keep their previous value.
    pub fn apply(&self, target: &mut Diagnostics) {
        for (key, value) in &self.0 {
            target.insert((*key).to_string(), value.clone());
        }
    }
}

/// One addressable device: identity, derived state and availability.
#[derive(Debug, Clone, PartialEq)]
pub struct Device<S> {
    key: String,
    label: String,
    availability: AvailabilityTracker,
    pub state: S,
}

impl<S> Device<S> {
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>, state: S) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            availability: AvailabilityTracker::default(),
            state,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn availability(&self) -> &AvailabilityTracker {
        &self.availability
    }

    /// See [`AvailabilityTracker::mark_seen`].
    pub fn mark_seen(&mut self, at: Timestamp) -> bool {
        self.availability.mark_seen(at)
    }

    #[must_use]
    pub fn is_available(&self, policy: AvailabilityPolicy, at: Timestamp) -> bool {
        self.availability.is_available(policy, at)
    }
}

impl<S: Clone> Device<S> {
    #[must_use]
    pub fn snapshot(&self, policy: AvailabilityPolicy, at: Timestamp) -> DeviceSnapshot<S> {
        DeviceSnapshot {
            key: self.key.clone(),
            label: self.label.clone(),
            available: self.is_available(policy, at),
            assumed: self.availability.is_assumed(),
            last_seen: self.availability.last_seen(),
            state: self.state.clone(),
        }
    }
}

/// Point-in-time view of a device for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot<S> {
    pub key: String,
    pub label: String,
    pub available: bool,
    pub assumed: bool,
    pub last_seen: Option<Timestamp>,
    pub state: S,
}
