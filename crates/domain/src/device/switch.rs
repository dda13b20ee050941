//! Relay switches (non-dimmable loads such as a water pump).

use serde::Serialize;

use crate::device::Diagnostics;
use crate::device::light::DimmerStatus;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SwitchState {
    pub on: bool,
    pub diagnostics: Diagnostics,
}

impl SwitchState {
    pub fn apply(&mut self, status: &DimmerStatus) {
        if let Some(active) = status.is_active() {
            self.on = active;
        }
        if let Some(on) = status.state {
            self.on = on;
        }
        status.diagnostics.apply(&mut self.diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_follow_reported_level() {
        let mut state = SwitchState::default();
        let fields = json!({"operating status (brightness)": 100});
        state.apply(&DimmerStatus::decode(fields.as_object().unwrap()).update);
        assert!(state.on);
        let fields = json!({"operating status (brightness)": 0});
        state.apply(&DimmerStatus::decode(fields.as_object().unwrap()).update);
        assert!(!state.on);
    }

    #[test]
    fn should_keep_state_when_message_has_no_level() {
        let mut state = SwitchState { on: true, ..SwitchState::default() };
        let fields = json!({"timestamp": "1.0"});
        state.apply(&DimmerStatus::decode(fields.as_object().unwrap()).update);
        assert!(state.on);
    }
}
