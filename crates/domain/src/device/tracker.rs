//! GPS position from gpsd TPV reports.

use serde::Serialize;

use crate::event::Fields;
use crate::fields::{Decoded, FieldReader, coerce_number, scalar_text};

/// Typed partial update decoded from a TPV report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GpsFix {
    pub position: Option<(f64, f64)>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub climb: Option<f64>,
    pub time: Option<String>,
    pub mode: Option<String>,
    pub status: Option<String>,
    pub accuracy: Option<f64>,
    pub speed_error: Option<f64>,
}

fn mode_name(value: &serde_json::Value) -> Option<String> {
    let name = match coerce_number(value) {
        Some(n) if (n - 1.0).abs() < f64::EPSILON => "No Fix".to_string(),
        Some(n) if (n - 2.0).abs() < f64::EPSILON => "2D Fix".to_string(),
        Some(n) if (n - 3.0).abs() < f64::EPSILON => "3D Fix".to_string(),
        _ => format!("Mode {}", scalar_text(value)?),
    };
    Some(name)
}

fn status_name(value: &serde_json::Value) -> Option<String> {
    let name = match coerce_number(value) {
        Some(n) if n.abs() < f64::EPSILON => "No Fix".to_string(),
        Some(n) if (n - 1.0).abs() < f64::EPSILON => "Fix".to_string(),
        Some(n) if (n - 2.0).abs() < f64::EPSILON => "DGPS Fix".to_string(),
        _ => format!("Status {}", scalar_text(value)?),
    };
    Some(name)
}

impl GpsFix {
    #[must_use]
    pub fn decode(fields: &Fields) -> Decoded<Self> {
        let mut reader = FieldReader::new(fields);
        let position = if reader.has("lat") && reader.has("lon") {
            let lat = reader.number("lat");
            let lon = reader.number("lon");
            lat.zip(lon)
        } else {
            None
        };
        let accuracy = if reader.has("epx") && reader.has("epy") {
            let epx = reader.number("epx");
            let epy = reader.number("epy");
            epx.zip(epy).map(|(x, y)| x.hypot(y))
        } else {
            None
        };
        let fix = Self {
            position,
            altitude: reader.number("alt"),
            speed: reader.number("speed"),
            heading: reader.number("track"),
            climb: reader.number("climb"),
            time: reader.text("time"),
            mode: reader.raw("mode").and_then(mode_name),
            status: reader.raw("status").and_then(status_name),
            accuracy,
            speed_error: reader.number("eps"),
        };
        reader.finish(fix)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrackerState {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading: Option<f64>,
    pub climb: Option<f64>,
    pub gps_time: Option<String>,
    pub gps_mode: Option<String>,
    pub gps_status: Option<String>,
    /// Horizontal accuracy in meters.
    pub accuracy_m: Option<f64>,
    pub speed_error: Option<f64>,
}

impl TrackerState {
    pub fn apply(&mut self, fix: &GpsFix) {
        fn set<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }
        if let Some((lat, lon)) = fix.position {
            self.latitude = Some(lat);
            self.longitude = Some(lon);
        }
        set(&mut self.altitude_m, fix.altitude.as_ref());
        set(&mut self.speed_kmh, fix.speed.map(|mps| mps * 3.6).as_ref());
        set(&mut self.heading, fix.heading.as_ref());
        set(&mut self.climb, fix.climb.as_ref());
        set(&mut self.gps_time, fix.time.as_ref());
        set(&mut self.gps_mode, fix.mode.as_ref());
        set(&mut self.gps_status, fix.status.as_ref());
        set(&mut self.accuracy_m, fix.accuracy.as_ref());
        set(&mut self.speed_error, fix.speed_error.as_ref());
    }

    /// A tracker has a fix once both coordinates have been reported.
    #[must_use]
    pub fn has_fix(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Decoded<GpsFix> {
        GpsFix::decode(value.as_object().unwrap())
    }

    #[test]
    fn should_decode_tpv_report() {
        let mut state = TrackerState::default();
        state.apply(
            &decode(json!({
                "class": "TPV",
                "lat": 45.5,
                "lon": -122.6,
                "alt": 30.0,
                "speed": 10.0,
                "mode": 3,
                "status": 2,
                "epx": 3.0,
                "epy": 4.0
            }))
            .update,
        );
        assert!(state.has_fix());
        assert_eq!(state.latitude, Some(45.5));
        assert!((state.speed_kmh.unwrap() - 36.0).abs() < 1e-9);
        assert_eq!(state.gps_mode.as_deref(), Some("3D Fix"));
        assert_eq!(state.gps_status.as_deref(), Some("DGPS Fix"));
        assert_eq!(state.accuracy_m, Some(5.0));
    }

    #[test]
    fn should_not_have_fix_without_both_coordinates() {
        let mut state = TrackerState::default();
        state.apply(&decode(json!({"lat": 45.5, "mode": 1})).update);
        assert!(!state.has_fix());
        assert_eq!(state.gps_mode.as_deref(), Some("No Fix"));
    }

    #[test]
    fn should_name_unknown_modes() {
        let fix = decode(json!({"mode": 7, "status": 9})).update;
        assert_eq!(fix.mode.as_deref(), Some("Mode 7"));
        assert_eq!(fix.status.as_deref(), Some("Status 9"));
    }

    #[test]
    fn should_skip_malformed_coordinates() {
        let decoded = decode(json!({"lat": "north", "lon": 1.0}));
        assert_eq!(decoded.update.position, None);
        assert_eq!(decoded.skipped, vec!["lat"]);
    }
}
