//! Bus instance identifiers.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier distinguishing one physical load or zone from another on the
/// bus ("which light", "which AC zone").
///
/// Instances arrive as strings (from topics) or numbers (from payloads) and
/// are kept in their textual form. An instance is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Instance(String);

impl Instance {
    /// Build an instance from its textual form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyInstance`] if `value` is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyInstance);
        }
        if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bus instance number, required by every outbound encoding.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonNumericInstance`] when the instance is
    /// not an integer in `0..=255`.
    pub fn number(&self) -> Result<u8, ValidationError> {
        self.0
            .parse::<u8>()
            .map_err(|_| ValidationError::NonNumericInstance(self.0.clone()))
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Instance {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Instance {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Instance {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Instance> for String {
    fn from(value: Instance) -> Self {
        value.0
    }
}

impl From<u8> for Instance {
    fn from(value: u8) -> Self {
        Self(value.to_string())
    }
}
