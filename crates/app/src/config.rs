//! Bridge configuration: topics, availability, and the static instance
//! tables for every device family.
//!
//! Loaded once at startup and passed into each reducer's constructor.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Deserialize;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::command::CommandCode;
use rvc_domain::device::cover::{CoverDefinition, CoverKind};
use rvc_domain::device::lock::LockDefinition;
use rvc_domain::error::ValidationError;
use rvc_domain::instance::Instance;

/// Wire format for dimmer-style commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandFormat {
    /// `"<instance> <code> <level>"` on the shared command topic.
    #[default]
    Compact,
    /// Named-field JSON frame on `<prefix>/DC_DIMMER_COMMAND_2/<instance>`.
    Structured,
}

/// Dimmer labels and the subset that supports brightness.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LightTable {
    pub labels: BTreeMap<Instance, String>,
    pub dimmable: BTreeSet<Instance>,
}

/// A stateless momentary command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ButtonDefinition {
    pub key: String,
    pub name: String,
    pub instance: Instance,
    #[serde(default = "ButtonDefinition::default_command")]
    pub command: CommandCode,
}

impl ButtonDefinition {
    fn default_command() -> CommandCode {
        CommandCode::On
    }
}

/// Timing of signature bursts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    pub interval_ms: u64,
    pub duration_ms: u64,
}

impl BurstConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            interval_ms: 350,
            duration_ms: 6_000,
        }
    }
}

/// Validation limits, confirmation policy and report topics for thermostat
/// commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    pub min_instance: u8,
    pub max_instance: u8,
    /// Minimum delay between two requests for the same instance.
    pub min_interval_ms: u64,
    pub attempts: u32,
    pub confirm_timeout_ms: u64,
    pub retry_delay_ms: u64,
    /// Absolute command requests arrive on `<control_topic>/<instance>`.
    /// Empty disables the subscription.
    pub control_topic: String,
    pub ack_topic: String,
    pub nack_topic: String,
    pub audit_topic: String,
    /// When disabled, absolute commands are validated and audited but the
    /// frame is not published.
    pub transmit: bool,
}

impl ThermostatConfig {
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    #[must_use]
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            min_instance: 0,
            max_instance: 6,
            min_interval_ms: 250,
            attempts: 3,
            confirm_timeout_ms: 6_000,
            retry_delay_ms: 2_000,
            control_topic: String::new(),
            ack_topic: "rvcbridge/thermostat_ack".to_string(),
            nack_topic: "rvcbridge/thermostat_nack".to_string(),
            audit_topic: "rvcbridge/thermostat_audit".to_string(),
            transmit: true,
        }
    }
}

/// Core configuration of the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RvcConfig {
    /// Prefix of every status topic (`<prefix>/#`).
    pub topic_prefix: String,
    /// When disabled, inbound messages are not classified at all.
    pub auto_discovery: bool,
    /// Shared topic for compact commands.
    pub command_topic: String,
    /// GPS telemetry subscription, empty to disable.
    pub gps_topic: String,
    /// Substring identifying GPS telemetry topics.
    pub gps_marker: String,
    /// Seconds of silence before a device is unavailable, `0` disables.
    pub availability_timeout: u64,
    pub command_format: CommandFormat,
    /// Capacity of the recent-messages diagnostic buffer.
    pub recent_capacity: usize,
    /// Capacity of the discovery bus replay buffer.
    pub replay_capacity: usize,
    pub lights: LightTable,
    pub switches: BTreeMap<Instance, String>,
    pub climate_zones: BTreeMap<Instance, String>,
    pub locks: Vec<LockDefinition>,
    pub covers: Vec<CoverDefinition>,
    pub buttons: Vec<ButtonDefinition>,
    pub burst: BurstConfig,
    pub thermostat: ThermostatConfig,
}

impl RvcConfig {
    #[must_use]
    pub fn availability_policy(&self) -> AvailabilityPolicy {
        AvailabilityPolicy::new(self.availability_timeout)
    }

    /// Topic patterns the transport must subscribe to.
    #[must_use]
    pub fn subscription_topics(&self) -> Vec<String> {
        let mut topics = vec![format!("{}/#", self.topic_prefix)];
        if !self.gps_topic.is_empty() {
            topics.push(self.gps_topic.clone());
        }
        if !self.thermostat.control_topic.is_empty() {
            topics.push(format!("{}/+", self.thermostat.control_topic));
        }
        topics
    }

    /// Instances owned by lock, cover and switch tables, which must never
    /// surface as lights.
    #[must_use]
    pub fn claimed_instances(&self) -> BTreeSet<Instance> {
        self.claims().into_iter().map(|(instance, _)| instance).collect()
    }

    /// Configured buttons plus a lock and an unlock button per lock.
    #[must_use]
    pub fn all_buttons(&self) -> Vec<ButtonDefinition> {
        let mut buttons = self.buttons.clone();
        for lock in &self.locks {
            buttons.push(ButtonDefinition {
                key: format!("{}_lock", lock.id),
                name: format!("{} Lock", lock.name),
                instance: lock.lock.clone(),
                command: CommandCode::On,
            });
            buttons.push(ButtonDefinition {
                key: format!("{}_unlock", lock.id),
                name: format!("{} Unlock", lock.name),
                instance: lock.unlock.clone(),
                command: CommandCode::On,
            });
        }
        buttons
    }

    fn claims(&self) -> Vec<(Instance, String)> {
        let mut claims = Vec::new();
        for lock in &self.locks {
            for instance in lock.instances() {
                claims.push((instance.clone(), format!("lock {}", lock.id)));
            }
        }
        for cover in &self.covers {
            for instance in cover.instances() {
                claims.push((instance.clone(), format!("cover {}", cover.id)));
            }
        }
        for instance in self.switches.keys() {
            claims.push((instance.clone(), format!("switch {instance}")));
        }
        claims
    }

    /// Check the configuration before any reducer is built.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when an instance is claimed twice
    /// across lock, cover and switch tables, when a commanded instance is
    /// not numeric, or when a limit is out of range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic_prefix.trim().is_empty() {
            return Err(ValidationError::OutOfRange {
                field: "topic_prefix",
                constraint: "non-empty",
            });
        }
        if self.burst.interval_ms == 0 || self.burst.duration_ms < self.burst.interval_ms {
            return Err(ValidationError::OutOfRange {
                field: "burst",
                constraint: "a non-zero interval no longer than the duration",
            });
        }
        if self.thermostat.min_instance > self.thermostat.max_instance {
            return Err(ValidationError::OutOfRange {
                field: "thermostat.min_instance",
                constraint: "at most thermostat.max_instance",
            });
        }
        if self.thermostat.attempts == 0 {
            return Err(ValidationError::OutOfRange {
                field: "thermostat.attempts",
                constraint: "at least 1",
            });
        }

        let mut owners: BTreeMap<Instance, String> = BTreeMap::new();
        for (instance, owner) in self.claims() {
            instance.number()?;
            if let Some(first) = owners.get(&instance) {
                return Err(ValidationError::OverlappingInstance {
                    instance: instance.to_string(),
                    first: first.clone(),
                    second: owner,
                });
            }
            owners.insert(instance, owner);
        }
        for button in &self.buttons {
            button.instance.number()?;
        }
        Ok(())
    }
}

fn cover(id: &str, name: &str, kind: CoverKind, extend: u8, retract: u8, stop: Option<u8>) -> CoverDefinition {
    CoverDefinition {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        extend: Instance::from(extend),
        retract: Instance::from(retract),
        stop: stop.map(Instance::from),
    }
}

const DIMMER_LABELS: &[(u8, &str)] = &[
    (25, "Bed Ceiling Lts A"),
    (26, "Bed Ceiling Lts B"),
    (27, "Bed Accent"),
    (28, "Bed Vanity"),
    (29, "Courtesy"),
    (30, "RR Bath Ceiling"),
    (31, "RR Bath Lav Lts"),
    (32, "RR Bath Accent"),
    (33, "Mid Bath Ceiling"),
    (34, "Mid Bath Accent"),
    (35, "Entry Ceiling"),
    (36, "Living Edge"),
    (37, "Livrm Ceiling A"),
    (38, "Livrm Ceiling B"),
    (39, "Livrm Accent A"),
    (40, "Livrm Accent B"),
    (41, "Sofa Ceiling"),
    (42, "Kitchen Ceiling"),
    (44, "D/S Slide"),
    (45, "Dinette"),
    (46, "Sink"),
    (47, "Midship"),
    (51, "Awning D/S"),
    (52, "Awning P/S"),
    (53, "Cargo"),
    (54, "Under Slide"),
    (56, "Bed Reading"),
    (57, "Security D/S"),
    (58, "Security P/S"),
    (59, "Security Motion"),
    (60, "Porch"),
];

const SWITCH_LABELS: &[(u8, &str)] = &[
    (13, "Satellite Dome"),
    (15, "Gen Stop"),
    (16, "Water Pump"),
    (18, "Gen Start"),
];

fn table(entries: &[(u8, &str)]) -> BTreeMap<Instance, String> {
    entries
        .iter()
        .map(|(inst, label)| (Instance::from(*inst), (*label).to_string()))
        .collect()
}

impl Default for LightTable {
    fn default() -> Self {
        Self {
            labels: table(DIMMER_LABELS),
            dimmable: (25_u8..=35).map(Instance::from).collect(),
        }
    }
}

impl Default for RvcConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "rvc".to_string(),
            auto_discovery: true,
            command_topic: "node-red/rvc/commands".to_string(),
            gps_topic: "CP/GPSDATA".to_string(),
            gps_marker: "GPSDATA".to_string(),
            availability_timeout: 300,
            command_format: CommandFormat::Compact,
            recent_capacity: 25,
            replay_capacity: 64,
            lights: LightTable::default(),
            switches: table(SWITCH_LABELS),
            climate_zones: (0_u8..=2)
                .map(|zone| (Instance::from(zone), format!("RVC Climate {zone}")))
                .collect(),
            locks: vec![LockDefinition {
                id: "entry_door".to_string(),
                name: "Entry Door".to_string(),
                lock: Instance::from(14),
                unlock: Instance::from(17),
            }],
            covers: vec![
                cover("rear_awning", "Rear Awning", CoverKind::Awning, 19, 20, Some(21)),
                cover("front_awning", "Front Awning", CoverKind::Awning, 22, 23, Some(24)),
                cover("door_awning", "Door Awning", CoverKind::Awning, 49, 50, None),
                cover("kitchen_slide", "Kitchen Slide", CoverKind::Slide, 181, 182, None),
                cover("super_slide", "Super Slide", CoverKind::Slide, 183, 184, None),
                cover("vanity_slide", "Vanity Slide", CoverKind::Slide, 185, 186, None),
                cover("bed_slide", "Bed Slide", CoverKind::Slide, 187, 188, None),
            ],
            buttons: Vec::new(),
            burst: BurstConfig::default(),
            thermostat: ThermostatConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = RvcConfig::default();
        assert_eq!(config.topic_prefix, "rvc");
        assert!(config.auto_discovery);
        assert_eq!(config.command_topic, "node-red/rvc/commands");
        assert_eq!(config.availability_timeout, 300);
        assert_eq!(config.recent_capacity, 25);
        assert_eq!(config.command_format, CommandFormat::Compact);
        assert_eq!(config.lights.labels.get("46").map(String::as_str), Some("Sink"));
        assert!(config.lights.dimmable.contains("35"));
        assert!(!config.lights.dimmable.contains("36"));
        assert_eq!(config.covers.len(), 7);
        assert_eq!(config.burst.interval(), Duration::from_millis(350));
        assert_eq!(config.thermostat.attempts, 3);
    }

    #[test]
    fn should_validate_default_tables() {
        assert_eq!(RvcConfig::default().validate(), Ok(()));
    }

    #[test]
    fn should_reject_overlapping_claims() {
        let mut config = RvcConfig::default();
        config.switches.insert(Instance::from(20), "Porch Fan".to_string());
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::OverlappingInstance {
                instance: "20".to_string(),
                first: "cover rear_awning".to_string(),
                second: "switch 20".to_string(),
            }
        );
    }

    #[test]
    fn should_reject_non_numeric_claims() {
        let mut config = RvcConfig::default();
        config.switches.insert(Instance::new("pump").unwrap(), "Pump".to_string());
        assert_eq!(
            config.validate(),
            Err(ValidationError::NonNumericInstance("pump".to_string()))
        );
    }

    #[test]
    fn should_reject_zero_burst_interval() {
        let mut config = RvcConfig::default();
        config.burst.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_collect_claimed_instances() {
        let claimed = RvcConfig::default().claimed_instances();
        for inst in ["13", "14", "17", "19", "21", "49", "50", "188"] {
            assert!(claimed.contains(inst), "{inst} should be claimed");
        }
        assert!(!claimed.contains("46"));
    }

    #[test]
    fn should_derive_lock_buttons() {
        let buttons = RvcConfig::default().all_buttons();
        let keys: Vec<_> = buttons.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["entry_door_lock", "entry_door_unlock"]);
        assert_eq!(buttons[1].instance, Instance::from(17));
    }

    #[test]
    fn should_list_subscription_topics() {
        let mut config = RvcConfig::default();
        assert_eq!(config.subscription_topics(), vec!["rvc/#", "CP/GPSDATA"]);
        config.gps_topic.clear();
        assert_eq!(config.subscription_topics(), vec!["rvc/#"]);
    }

    #[test]
    fn should_subscribe_to_thermostat_control_when_configured() {
        let mut config = RvcConfig::default();
        config.thermostat.control_topic = "rvcbridge/thermostat_control".to_string();
        assert_eq!(
            config.subscription_topics(),
            vec!["rvc/#", "CP/GPSDATA", "rvcbridge/thermostat_control/+"]
        );
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r#"
            topic_prefix = "coach"
            availability_timeout = 0
            command_format = "structured"

            [switches]
            "16" = "Water Pump"

            [lights]
            labels = { "25" = "Reading" }
            dimmable = ["25"]

            [[locks]]
            id = "cargo"
            name = "Cargo Door"
            lock = "70"
            unlock = "71"

            [[covers]]
            id = "patio"
            name = "Patio Awning"
            kind = "awning"
            extend = "19"
            retract = "20"

            [[buttons]]
            key = "gen_start"
            name = "Generator Start"
            instance = "18"
            command = 5

            [burst]
            interval_ms = 500
        "#;
        let config: RvcConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.topic_prefix, "coach");
        assert_eq!(config.availability_timeout, 0);
        assert_eq!(config.command_format, CommandFormat::Structured);
        assert_eq!(config.switches.len(), 1);
        assert_eq!(config.lights.labels.len(), 1);
        assert_eq!(config.locks[0].unlock, Instance::from(71));
        assert_eq!(config.covers[0].stop, None);
        assert_eq!(config.buttons[0].command, CommandCode::Toggle);
        assert_eq!(config.burst.interval_ms, 500);
        assert_eq!(config.burst.duration_ms, 6_000);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn should_use_defaults_for_missing_fields() {
        let config: RvcConfig = toml::from_str(r#"command_topic = "bridge/cmd""#).unwrap();
        assert_eq!(config.command_topic, "bridge/cmd");
        assert_eq!(config.topic_prefix, "rvc");
        assert_eq!(config.locks.len(), 1);
    }
}
