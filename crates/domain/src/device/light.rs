//! Dimmer loads.

use serde::Serialize;

use crate::device::{DiagnosticUpdate, Diagnostics};
use crate::event::Fields;
use crate::fields::{Decoded, FieldReader, clamp_to_u8};

/// Percentage level reported by dimmer status messages.
pub const LEVEL_FIELD: &str = "operating status (brightness)";

/// Convert a 0–100 level to a 0–255 brightness.
#[must_use]
pub fn level_to_brightness(pct: f64) -> u8 {
    clamp_to_u8(pct.clamp(0.0, 100.0) * 2.55, 255)
}

/// Convert a 0–255 brightness to a 0–100 level.
#[must_use]
pub fn brightness_to_level(brightness: u8) -> u8 {
    clamp_to_u8(f64::from(brightness) / 2.55, 100)
}

/// Typed partial update decoded from a dimmer status message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DimmerStatus {
    pub level: Option<f64>,
    pub state: Option<bool>,
    pub brightness: Option<u8>,
    pub diagnostics: DiagnosticUpdate,
}

impl DimmerStatus {
    #[must_use]
    pub fn decode(fields: &Fields) -> Decoded<Self> {
        let mut reader = FieldReader::new(fields);
        let level = reader.number(LEVEL_FIELD);
        let state = reader
            .text("state")
            .and_then(|s| match s.trim().to_ascii_uppercase().as_str() {
                "ON" => Some(true),
                "OFF" => Some(false),
                _ => None,
            });
        let brightness = reader.number("brightness").map(|b| clamp_to_u8(b, 255));
        let diagnostics = DiagnosticUpdate::decode(&reader);
        reader.finish(Self {
            level,
            state,
            brightness,
            diagnostics,
        })
    }

    /// Whether the load reports a level above zero, when it reports one.
    #[must_use]
    pub fn is_active(&self) -> Option<bool> {
        self.level.map(|pct| pct > 0.0)
    }
}

/// Derived state of a light.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightState {
    pub on: bool,
    pub brightness: u8,
    pub dimmable: bool,
    pub diagnostics: Diagnostics,
}

impl LightState {
    #[must_use]
    pub fn new(dimmable: bool) -> Self {
        Self {
            on: false,
            brightness: 255,
            dimmable,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn apply(&mut self, status: &DimmerStatus) {
        if let Some(pct) = status.level {
            self.brightness = level_to_brightness(pct);
            self.on = self.brightness > 0;
        }
        if let Some(on) = status.state {
            self.on = on;
        }
        if let Some(brightness) = status.brightness {
            self.brightness = brightness;
        }
        status.diagnostics.apply(&mut self.diagnostics);
    }

    /// Optimistically switch on and return the level to command.
    ///
    /// Dimmable loads get `clamp(round(B / 2.55), 1, 100)`, never 0 while
    /// on, and the stored brightness is at least 1. Relay-only loads always
    /// get 100.
    pub fn turn_on(&mut self, brightness: Option<u8>) -> u8 {
        let brightness = brightness
            .unwrap_or(match self.brightness {
                0 => 255,
                current => current,
            })
            .max(1);
        self.on = true;
        self.brightness = brightness;
        if self.dimmable {
            brightness_to_level(brightness).max(1)
        } else {
            100
        }
    }

    pub fn turn_off(&mut self) {
        self.on = false;
        self.brightness = 0;
    }
}
