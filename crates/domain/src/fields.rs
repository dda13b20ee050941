//! Decoder boundary for status-message payloads.
//!
//! Payloads are schema-free JSON objects. Every device family decodes them
//! into a typed partial update through a [`FieldReader`], which is the only
//! place string-keyed access happens. A present field whose value cannot be
//! coerced is recorded as skipped and leaves the previous state untouched.

use serde_json::Value;

use crate::event::Fields;

/// A typed partial update plus the keys that failed coercion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decoded<T> {
    pub update: T,
    pub skipped: Vec<&'static str>,
}

/// Coerce a JSON value to a finite number.
///
/// Numbers pass through; strings are parsed after trimming. Anything else,
/// including booleans and `null`, is not a number.
#[must_use]
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Render a scalar JSON value as text (`"46"` and `46` both give `"46"`).
#[must_use]
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Round and clamp a number into `0..=max`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_to_u8(value: f64, max: u8) -> u8 {
    value.round().clamp(0.0, f64::from(max)) as u8
}

/// String-keyed view over one payload, collecting coercion failures.
pub struct FieldReader<'a> {
    fields: &'a Fields,
    skipped: Vec<&'static str>,
}

impl<'a> FieldReader<'a> {
    #[must_use]
    pub fn new(fields: &'a Fields) -> Self {
        Self {
            fields,
            skipped: Vec::new(),
        }
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.fields.get(key)
    }

    /// Numeric value of `key`; a present but non-numeric value is skipped.
    pub fn number(&mut self, key: &'static str) -> Option<f64> {
        let value = self.fields.get(key)?;
        let number = coerce_number(value);
        if number.is_none() {
            self.skipped.push(key);
        }
        number
    }

    /// Numeric value of the first present key in priority order.
    ///
    /// The first present key wins even if its value fails coercion; later
    /// alternatives are not consulted in that case.
    pub fn first_number(&mut self, keys: &[&'static str]) -> Option<f64> {
        let key = keys.iter().copied().find(|key| self.has(key))?;
        self.number(key)
    }

    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(scalar_text)
    }

    /// Text value of the first present key in priority order.
    #[must_use]
    pub fn first_text(&self, keys: &[&'static str]) -> Option<String> {
        keys.iter()
            .copied()
            .find(|key| self.has(key))
            .and_then(|key| self.text(key))
    }

    #[must_use]
    pub fn finish<T>(self, update: T) -> Decoded<T> {
        Decoded {
            update,
            skipped: self.skipped,
        }
    }
}
