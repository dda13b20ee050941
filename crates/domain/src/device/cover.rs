//! Awnings and slide-outs driven by extend/retract (and optional stop)
//! instances.

use serde::{Deserialize, Serialize};

use crate::device::Diagnostics;
use crate::device::light::DimmerStatus;
use crate::instance::Instance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverKind {
    Awning,
    Slide,
}

/// Static description of one cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverDefinition {
    pub id: String,
    pub name: String,
    pub kind: CoverKind,
    pub extend: Instance,
    pub retract: Instance,
    #[serde(default)]
    pub stop: Option<Instance>,
}

/// Which motor contact of a cover an instance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverRole {
    Extend,
    Retract,
    Stop,
}

impl CoverDefinition {
    #[must_use]
    pub fn role_of(&self, instance: &Instance) -> Option<CoverRole> {
        if *instance == self.extend {
            Some(CoverRole::Extend)
        } else if *instance == self.retract {
            Some(CoverRole::Retract)
        } else if self.stop.as_ref() == Some(instance) {
            Some(CoverRole::Stop)
        } else {
            None
        }
    }

    #[must_use]
    pub fn instances(&self) -> Vec<&Instance> {
        let mut instances = vec![&self.extend, &self.retract];
        instances.extend(self.stop.as_ref());
        instances
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverState {
    pub is_closed: bool,
    pub is_opening: bool,
    pub is_closing: bool,
    #[serde(skip)]
    extend_active: bool,
    #[serde(skip)]
    retract_active: bool,
    pub diagnostics: Diagnostics,
}

impl Default for CoverState {
    fn default() -> Self {
        Self {
            is_closed: true,
            is_opening: false,
            is_closing: false,
            extend_active: false,
            retract_active: false,
            diagnostics: Diagnostics::new(),
        }
    }
}

impl CoverState {
    /// Apply a status message reported on one of the cover's instances.
    ///
    /// Extend and retract are independent motor signals. When both are
    /// active the retract (closing) signal wins. An active stop signal
    /// clears both.
    pub fn apply(&mut self, role: CoverRole, status: &DimmerStatus) {
        if let Some(active) = status.is_active() {
            match role {
                CoverRole::Extend => self.extend_active = active,
                CoverRole::Retract => self.retract_active = active,
                CoverRole::Stop if active => {
                    self.extend_active = false;
                    self.retract_active = false;
                }
                CoverRole::Stop => {}
            }
            let was_closing = self.is_closing;
            self.is_closing = self.retract_active;
            self.is_opening = self.extend_active && !self.retract_active;
            if self.is_opening {
                self.is_closed = false;
            } else if was_closing && !self.is_closing && role == CoverRole::Retract {
                self.is_closed = true;
            }
        }
        status.diagnostics.apply(&mut self.diagnostics);
    }

    pub fn open(&mut self) {
        self.is_opening = true;
        self.is_closing = false;
        self.is_closed = false;
    }

    pub fn close(&mut self) {
        self.is_opening = false;
        self.is_closing = true;
    }

    pub fn stop(&mut self) {
        self.is_opening = false;
        self.is_closing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(level: u8) -> DimmerStatus {
        let fields = json!({"operating status (brightness)": level});
        DimmerStatus::decode(fields.as_object().unwrap()).update
    }

    fn rear_awning() -> CoverDefinition {
        CoverDefinition {
            id: "rear_awning".to_string(),
            name: "Rear Awning".to_string(),
            kind: CoverKind::Awning,
            extend: Instance::from(19),
            retract: Instance::from(20),
            stop: Some(Instance::from(21)),
        }
    }

    #[test]
    fn should_resolve_roles() {
        let def = rear_awning();
        assert_eq!(def.role_of(&Instance::from(19)), Some(CoverRole::Extend));
        assert_eq!(def.role_of(&Instance::from(20)), Some(CoverRole::Retract));
        assert_eq!(def.role_of(&Instance::from(21)), Some(CoverRole::Stop));
        assert_eq!(def.role_of(&Instance::from(22)), None);
        assert_eq!(def.instances().len(), 3);
    }

    #[test]
    fn should_report_opening_while_extend_is_active() {
        let mut state = CoverState::default();
        state.apply(CoverRole::Extend, &status(100));
        assert!(state.is_opening);
        assert!(!state.is_closing);
        assert!(!state.is_closed);
    }

    #[test]
    fn should_treat_fractional_extend_level_as_moving() {
        let mut state = CoverState::default();
        let fields = json!({"operating status (brightness)": 0.1});
        state.apply(CoverRole::Extend, &DimmerStatus::decode(fields.as_object().unwrap()).update);
        assert!(state.is_opening);
    }

    #[test]
    fn should_report_closing_once_retract_is_active() {
        let mut state = CoverState::default();
        state.apply(CoverRole::Extend, &status(100));
        state.apply(CoverRole::Retract, &status(100));
        assert!(state.is_closing);
        assert!(!state.is_opening);
    }

    #[test]
    fn should_report_closing_after_extend_stops() {
        let mut state = CoverState::default();
        state.apply(CoverRole::Extend, &status(100));
        state.apply(CoverRole::Extend, &status(0));
        assert!(!state.is_opening);
        state.apply(CoverRole::Retract, &status(100));
        assert!(state.is_closing);
        assert!(!state.is_opening);
    }

    #[test]
    fn should_mark_closed_when_retract_finishes() {
        let mut state = CoverState::default();
        state.apply(CoverRole::Extend, &status(100));
        state.apply(CoverRole::Extend, &status(0));
        assert!(!state.is_closed);
        state.apply(CoverRole::Retract, &status(100));
        state.apply(CoverRole::Retract, &status(0));
        assert!(state.is_closed);
        assert!(!state.is_closing);
    }

    #[test]
    fn should_clear_motion_on_stop_signal() {
        let mut state = CoverState::default();
        state.apply(CoverRole::Extend, &status(100));
        state.apply(CoverRole::Stop, &status(100));
        assert!(!state.is_opening);
        assert!(!state.is_closing);
        assert!(!state.is_closed);
    }

    #[test]
    fn should_apply_optimistic_actions() {
        let mut state = CoverState::default();
        state.open();
        assert!(state.is_opening && !state.is_closed);
        state.stop();
        assert!(!state.is_opening && !state.is_closing);
        state.close();
        assert!(state.is_closing);
    }
}
