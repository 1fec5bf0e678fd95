use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Generates `Display`/`FromStr` for the upper-case string enums used on the wire.
///
/// An optional trailing catch-all variant is displayed as `UNKNOWN` but never
/// parsed from user input.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? } $(, $other:ident)?) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                    $($name::$other => "UNKNOWN",)?
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(format!("unknown {} `{}`", stringify!($name), s)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Off,
    Auto,
    Heat,
    Cool,
    Eheat,
    Maxheat,
    Maxcool,
    #[serde(other)]
    Unknown,
}

wire_enum!(Mode {
    Off => "OFF",
    Auto => "AUTO",
    Heat => "HEAT",
    Cool => "COOL",
    Eheat => "EHEAT",
    Maxheat => "MAXHEAT",
    Maxcool => "MAXCOOL",
}, Unknown);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanMode {
    Auto,
    Fifteen,
    Thirty,
    Fortyfive,
    Always,
    #[serde(other)]
    Unknown,
}

wire_enum!(FanMode {
    Auto => "AUTO",
    Fifteen => "FIFTEEN",
    Thirty => "THIRTY",
    Fortyfive => "FORTYFIVE",
    Always => "ALWAYS",
}, Unknown);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActiveDemand {
    Off,
    Heat,
    Cool,
    #[serde(other)]
    Unknown,
}

wire_enum!(ActiveDemand {
    Off => "OFF",
    Heat => "HEAT",
    Cool => "COOL",
}, Unknown);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Online,
    Offline,
    Initializing,
    #[serde(other)]
    Unknown,
}

/// Which setpoint a `changeSetpoint` mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetpointKind {
    Heat,
    Cool,
}

wire_enum!(SetpointKind {
    Heat => "HEAT",
    Cool => "COOL",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleOverride {
    Cancelled,
    NextEvent,
    #[serde(rename = "HOURS_01")]
    Hours01,
    #[serde(rename = "HOURS_02")]
    Hours02,
    #[serde(rename = "HOURS_03")]
    Hours03,
    #[serde(rename = "HOURS_04")]
    Hours04,
    #[serde(rename = "HOURS_05")]
    Hours05,
    #[serde(rename = "HOURS_06")]
    Hours06,
    #[serde(rename = "HOURS_07")]
    Hours07,
    #[serde(rename = "HOURS_08")]
    Hours08,
    #[serde(rename = "HOURS_09")]
    Hours09,
    #[serde(rename = "HOURS_10")]
    Hours10,
    #[serde(rename = "HOURS_11")]
    Hours11,
    #[serde(rename = "HOURS_12")]
    Hours12,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }
}

/// Everything needed to rebuild a session after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    /// Long-lived token issued to the account
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Seconds the access token is valid for, counted from `last_refresh`
    pub ttl: Option<i64>,
    /// Unix timestamp (seconds) of the last token issuance
    pub last_refresh: i64,
}

impl Credentials {
    pub fn with_token(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            token: Some(token.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoints {
    pub heat: f64,
    pub cool: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Away {
    pub active: bool,
    #[serde(default)]
    pub setpoints: Option<Setpoints>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fan {
    pub active: bool,
    #[serde(default)]
    pub cfm: Option<f64>,
    pub mode: FanMode,
    pub modes: Vec<FanMode>,
    #[serde(default, rename = "override")]
    pub override_: Option<Value>,
}

/// Humidification or dehumidification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumidityControl {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl HumidityControl {
    pub fn range(&self) -> Range {
        Range {
            min: self.min,
            max: self.max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerLocation {
    pub connection_status: ConnectionStatus,
}

/// Reads an explicit `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Full device-state document returned by the `controller` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active_demand: Option<ActiveDemand>,
    #[serde(default)]
    pub active_schedule_event: Option<Value>,
    #[serde(default)]
    pub airflow: Option<Value>,
    #[serde(default)]
    pub airflow_test_active: Option<bool>,
    pub away: Away,
    pub cool_range: Range,
    #[serde(default)]
    pub deadband: Option<f64>,
    #[serde(default)]
    pub dehumidification: Option<HumidityControl>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub disabled: bool,
    #[serde(default)]
    pub fan: Option<Fan>,
    pub heat_range: Range,
    #[serde(default)]
    pub humidification: Option<HumidityControl>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub indoor_temp: Option<f64>,
    pub location: ControllerLocation,
    pub mode: Mode,
    pub modes: Vec<Mode>,
    #[serde(default)]
    pub outdoor_temp: Option<f64>,
    #[serde(default)]
    pub schedule: Option<Value>,
    #[serde(default)]
    pub schedule_override: Option<ScheduleOverride>,
    pub setpoints: Setpoints,
    #[serde(default)]
    pub temp_override: Option<Value>,
    #[serde(default)]
    pub zone: Option<Value>,
    #[serde(default)]
    pub zone_sensor: Option<Value>,
    #[serde(default)]
    pub zoning: Option<Value>,
    #[serde(default)]
    pub humidity_notification: Option<Value>,
    #[serde(default)]
    pub temperature_notification: Option<Value>,
    #[serde(default)]
    pub access_level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareVersion {
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub bootloader: Option<String>,
    #[serde(default)]
    pub outdoor_control: Option<String>,
}

/// One entry of the `locations` discovery query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: FirmwareVersion,
    #[serde(default, deserialize_with = "null_as_default")]
    pub controllers: Vec<ControllerData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use serde_json::json;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("cool".parse::<Mode>().unwrap(), Mode::Cool);
        assert_eq!("EHEAT".parse::<Mode>().unwrap(), Mode::Eheat);
        assert!("sideways".parse::<Mode>().is_err());
        assert_eq!(Mode::Maxcool.to_string(), "MAXCOOL");
        assert_eq!("always".parse::<FanMode>().unwrap(), FanMode::Always);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_value(Mode::Eheat).unwrap(), "EHEAT");
        assert_eq!(serde_json::to_value(FanMode::Fortyfive).unwrap(), "FORTYFIVE");
        assert_eq!(
            serde_json::to_value(ScheduleOverride::Hours03).unwrap(),
            "HOURS_03"
        );
        assert_eq!(
            serde_json::from_value::<TemperatureUnit>(serde_json::json!("C")).unwrap(),
            TemperatureUnit::Celsius
        );
    }

    #[test]
    fn test_controller_document_parsing() {
        let data: ControllerData =
            serde_json::from_value(mock::controller_document("c1", "Hallway")).unwrap();

        assert_eq!(data.id, "c1");
        assert_eq!(data.name, "Hallway");
        assert_eq!(data.mode, Mode::Heat);
        assert!(data.modes.contains(&Mode::Auto));
        assert_eq!(data.heat_range, Range { min: 50.0, max: 90.0 });
        assert_eq!(data.location.connection_status, ConnectionStatus::Online);
        assert_eq!(data.fan.as_ref().unwrap().mode, FanMode::Auto);
        assert!(data.schedule.is_some());
    }

    #[test]
    fn test_controller_document_with_nulls() {
        let mut doc = mock::controller_document("c1", "Hallway");
        doc["fan"] = Value::Null;
        doc["activeDemand"] = Value::Null;
        doc["humidification"] = Value::Null;

        let data: ControllerData = serde_json::from_value(doc).unwrap();
        assert!(data.fan.is_none());
        assert!(data.active_demand.is_none());
        assert!(data.humidification.is_none());
    }

    #[test]
    fn test_controller_document_with_unseen_values() {
        let mut doc = mock::controller_document("c1", "Hallway");
        doc["mode"] = json!("DRY");
        doc["modes"] = json!(["OFF", "HEAT", "EMHEAT"]);
        doc["fan"]["mode"] = json!("CIRCULATE");
        doc["location"]["connectionStatus"] = json!("PAIRING");
        doc["scheduleOverride"] = json!("HOURS_24");
        doc["disabled"] = Value::Null;

        let data: ControllerData = serde_json::from_value(doc).unwrap();
        assert_eq!(data.mode, Mode::Unknown);
        assert_eq!(data.modes, vec![Mode::Off, Mode::Heat, Mode::Unknown]);
        assert_eq!(data.fan.unwrap().mode, FanMode::Unknown);
        assert_eq!(data.location.connection_status, ConnectionStatus::Unknown);
        assert_eq!(data.schedule_override, Some(ScheduleOverride::Unknown));
        assert!(!data.disabled);
        assert_eq!(Mode::Unknown.to_string(), "UNKNOWN");
        assert!("unknown".parse::<Mode>().is_err());
    }

    #[test]
    fn test_location_document_with_nulls() {
        let data: LocationData = serde_json::from_value(json!({
            "id": "loc1",
            "name": "Home",
            "version": null,
            "controllers": null
        }))
        .unwrap();

        assert_eq!(data.version, FirmwareVersion::default());
        assert!(data.controllers.is_empty());
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let range = Range { min: 50.0, max: 90.0 };
        assert!(range.contains(50.0));
        assert!(range.contains(90.0));
        assert!(!range.contains(49.5));
        assert!(!range.contains(90.5));
        assert_eq!(range.to_string(), "50-90");
    }
}
