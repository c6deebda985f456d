// ── Trait message types ──
//
// Plain records for the device traits the dashboard binds to. They mirror
// the protobuf messages closely enough for an object-mapping layer to
// convert them, nothing more.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::message::require_name;

// ── Devices ──────────────────────────────────────────────────────────

/// A device known to the building-operations server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    /// Trait names the device implements, e.g. `"smartcore.traits.OnOff"`.
    #[serde(default)]
    pub traits: Vec<String>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            floor: None,
            zone: None,
            traits: Vec::new(),
        }
    }

    #[must_use]
    pub fn on_floor(mut self, floor: impl Into<String>) -> Self {
        self.floor = Some(floor.into());
        self
    }

    /// Look up a metadata field by its query name.
    pub fn field(&self, field: &str) -> Option<&str> {
        match field {
            "name" => Some(self.name.as_str()),
            "title" => self.title.as_deref(),
            "floor" => self.floor.as_deref(),
            "zone" => self.zone.as_deref(),
            _ => None,
        }
    }
}

/// A single `field == value` condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: String,
    pub string_equal: String,
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            string_equal: value.into(),
        }
    }
}

/// Conjunction of conditions selecting devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceQuery {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DeviceQuery {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn matches(&self, device: &Device) -> bool {
        self.conditions
            .iter()
            .all(|c| device.field(&c.field) == Some(c.string_equal.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDevicesRequest {
    pub query: DeviceQuery,
    pub page_size: u32,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullDevicesRequest {
    pub query: DeviceQuery,
    pub updates_only: bool,
}

/// Stream message for device pulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullDevicesResponse {
    pub changes: Vec<crate::message::Change<Device>>,
}

// ── OnOff ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnOffState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnOff {
    pub state: OnOffState,
}

impl OnOff {
    pub const ON: Self = Self {
        state: OnOffState::On,
    };
    pub const OFF: Self = Self {
        state: OnOffState::Off,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOnOffRequest {
    pub name: String,
    pub on_off: OnOff,
}

impl UpdateOnOffRequest {
    pub fn new(name: impl Into<String>, on_off: OnOff) -> Result<Self, Error> {
        Ok(Self {
            name: require_name(Some(name.into()), "UpdateOnOffRequest")?,
            on_off,
        })
    }
}

// ── Meter ────────────────────────────────────────────────────────────

/// Accumulated usage reported by a meter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub usage: f64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

// ── AirTemperature ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AirTemperatureMode {
    #[default]
    Auto,
    Heat,
    Cool,
    Off,
}

/// Set point and measured temperature of an HVAC zone, in degrees Celsius.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirTemperature {
    #[serde(default)]
    pub mode: AirTemperatureMode,
    #[serde(default)]
    pub temperature_set_point: Option<f64>,
    #[serde(default)]
    pub ambient_temperature: Option<f64>,
}

/// Write a new set point and/or mode. Only the fields named in
/// `update_mask` are applied by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAirTemperatureRequest {
    pub name: String,
    pub state: AirTemperature,
    pub update_mask: Vec<String>,
}

impl UpdateAirTemperatureRequest {
    pub fn set_point(name: impl Into<String>, celsius: f64) -> Result<Self, Error> {
        Ok(Self {
            name: require_name(Some(name.into()), "UpdateAirTemperatureRequest")?,
            state: AirTemperature {
                temperature_set_point: Some(celsius),
                ..AirTemperature::default()
            },
            update_mask: vec!["temperature_set_point".to_owned()],
        })
    }

    pub fn mode(name: impl Into<String>, mode: AirTemperatureMode) -> Result<Self, Error> {
        Ok(Self {
            name: require_name(Some(name.into()), "UpdateAirTemperatureRequest")?,
            state: AirTemperature {
                mode,
                ..AirTemperature::default()
            },
            update_mask: vec!["mode".to_owned()],
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_all_conditions() {
        let device = Device::new("ahu-1").on_floor("L2");
        assert!(DeviceQuery::all().matches(&device));
        assert!(
            DeviceQuery::all()
                .and(Condition::eq("floor", "L2"))
                .matches(&device)
        );
        assert!(
            !DeviceQuery::all()
                .and(Condition::eq("floor", "L2"))
                .and(Condition::eq("zone", "east"))
                .matches(&device)
        );
    }

    #[test]
    fn unknown_field_never_matches() {
        let device = Device::new("ahu-1");
        assert!(
            !DeviceQuery::all()
                .and(Condition::eq("colour", "red"))
                .matches(&device)
        );
    }

    #[test]
    fn update_on_off_requires_name() {
        assert!(UpdateOnOffRequest::new("", OnOff::ON).is_err());
        assert!(UpdateOnOffRequest::new("lights/1", OnOff::OFF).is_ok());
    }

    #[test]
    fn set_point_update_masks_only_the_set_point() {
        let req = UpdateAirTemperatureRequest::set_point("zone/east", 21.5).unwrap();
        assert_eq!(req.update_mask, vec!["temperature_set_point"]);
        assert_eq!(req.state.temperature_set_point, Some(21.5));
        assert!(UpdateAirTemperatureRequest::mode(" ", AirTemperatureMode::Cool).is_err());
    }
}
