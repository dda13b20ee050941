//! Door locks driven by a pair of momentary instances.

use serde::{Deserialize, Serialize};

use crate::device::Diagnostics;
use crate::device::light::DimmerStatus;
use crate::instance::Instance;

/// Static description of one lock: a lock relay and an unlock relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDefinition {
    pub id: String,
    pub name: String,
    pub lock: Instance,
    pub unlock: Instance,
}

/// Which relay of a lock an instance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRole {
    Lock,
    Unlock,
}

impl LockDefinition {
    #[must_use]
    pub fn role_of(&self, instance: &Instance) -> Option<LockRole> {
        if *instance == self.lock {
            Some(LockRole::Lock)
        } else if *instance == self.unlock {
            Some(LockRole::Unlock)
        } else {
            None
        }
    }

    #[must_use]
    pub fn instances(&self) -> Vec<&Instance> {
        vec![&self.lock, &self.unlock]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockState {
    pub is_locked: bool,
    #[serde(skip)]
    lock_active: bool,
    #[serde(skip)]
    unlock_active: bool,
    pub diagnostics: Diagnostics,
}

impl Default for LockState {
    fn default() -> Self {
        Self {
            is_locked: true,
            lock_active: false,
            unlock_active: false,
            diagnostics: Diagnostics::new(),
        }
    }
}

impl LockState {
    /// Apply a status message reported on one of the lock's relays.
    ///
    /// The state latches: an active lock relay locks, an active unlock relay
    /// unlocks unless the lock relay is still active, and a relay dropping
    /// back to zero changes nothing.
    pub fn apply(&mut self, role: LockRole, status: &DimmerStatus) {
        if let Some(active) = status.is_active() {
            match role {
                LockRole::Lock => self.lock_active = active,
                LockRole::Unlock => self.unlock_active = active,
            }
            if self.lock_active {
                self.is_locked = true;
            } else if active && role == LockRole::Unlock {
                self.is_locked = false;
            }
        }
        status.diagnostics.apply(&mut self.diagnostics);
    }

    pub fn lock(&mut self) {
        self.is_locked = true;
    }

    pub fn unlock(&mut self) {
        self.is_locked = false;
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

    fn entry_door() -> LockDefinition {
        LockDefinition {
            id: "entry_door".to_string(),
            name: "Entry Door".to_string(),
            lock: Instance::from(14),
            unlock: Instance::from(17),
        }
    }

    #[test]
    fn should_resolve_roles() {
        let def = entry_door();
        assert_eq!(def.role_of(&Instance::from(14)), Some(LockRole::Lock));
        assert_eq!(def.role_of(&Instance::from(17)), Some(LockRole::Unlock));
        assert_eq!(def.role_of(&Instance::from(15)), None);
    }

    #[test]
    fn should_default_to_locked() {
        assert!(LockState::default().is_locked);
    }

    #[test]
    fn should_unlock_when_unlock_relay_pulses() {
        let mut state = LockState::default();
        state.apply(LockRole::Unlock, &status(100));
        assert!(!state.is_locked);
    }

    #[test]
    fn should_lock_when_lock_relay_pulses() {
        let mut state = LockState::default();
        state.apply(LockRole::Unlock, &status(100));
        state.apply(LockRole::Unlock, &status(0));
        state.apply(LockRole::Lock, &status(100));
        assert!(state.is_locked);
    }

    #[test]
    fn should_stay_unlocked_after_unlock_pulse_ends() {
        let mut state = LockState::default();
        state.apply(LockRole::Unlock, &status(100));
        state.apply(LockRole::Unlock, &status(0));
        assert!(!state.is_locked);
        state.apply(LockRole::Lock, &status(0));
        assert!(!state.is_locked);
    }

    #[test]
    fn should_stay_locked_after_lock_pulse_ends() {
        let mut state = LockState::default();
        state.apply(LockRole::Unlock, &status(100));
        state.apply(LockRole::Lock, &status(100));
        state.apply(LockRole::Lock, &status(0));
        assert!(state.is_locked);
    }

    #[test]
    fn should_treat_fractional_level_as_active() {
        let mut state = LockState::default();
        let fields = json!({"operating status (brightness)": 0.1});
        state.apply(LockRole::Unlock, &DimmerStatus::decode(fields.as_object().unwrap()).update);
        assert!(!state.is_locked);
    }

    #[test]
    fn should_prefer_lock_when_both_relays_active() {
        let mut state = LockState::default();
        state.apply(LockRole::Lock, &status(100));
        state.apply(LockRole::Unlock, &status(100));
        assert!(state.is_locked);
    }

    #[test]
    fn should_apply_optimistic_actions() {
        let mut state = LockState::default();
        state.unlock();
        assert!(!state.is_locked);
        state.lock();
        assert!(state.is_locked);
    }
}
