use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Rendered in place of any metric the device did not report.
pub const MISSING_MARKER: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "pH")]
    Ph,
    #[serde(rename = "waterTemp")]
    WaterTemp,
    #[serde(rename = "airTemp")]
    AirTemp,
    #[serde(rename = "airHum")]
    AirHum,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Self::Ec,
        Self::Ph,
        Self::WaterTemp,
        Self::AirTemp,
        Self::AirHum,
    ];

    /// Series drawn on the historical chart.
    pub const CHART: [Metric; 4] = [Self::Ec, Self::Ph, Self::AirTemp, Self::AirHum];

    pub fn key(self) -> &'static str {
        match self {
            Self::Ec => "EC",
            Self::Ph => "pH",
            Self::WaterTemp => "waterTemp",
            Self::AirTemp => "airTemp",
            Self::AirHum => "airHum",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ec => "EC (mS/cm)",
            Self::Ph => "pH",
            Self::WaterTemp => "Water Temp (°C)",
            Self::AirTemp => "Air Temp (°C)",
            Self::AirHum => "Air Humidity (%)",
        }
    }
}

impl FromStr for Metric {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.key().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ParseError::UnknownMetric(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Value(f64),
    Missing,
}

impl Measurement {
    pub fn from_json(value: Option<&Value>) -> Self {
        let parsed = match value {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            _ => None,
        };

        match parsed {
            Some(number) if number.is_finite() => Self::Value(number),
            _ => Self::Missing,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(value),
            Self::Missing => None,
        }
    }

    pub fn card_text(self) -> String {
        match self {
            Self::Value(value) => format!("{value:.2}"),
            Self::Missing => MISSING_MARKER.to_string(),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Missing => f.write_str(MISSING_MARKER),
        }
    }
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// One reading object from the sensor API, kept as the device sent it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingRecord {
    fields: Map<String, Value>,
}

impl ReadingRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn measurement(&self, metric: Metric) -> Measurement {
        Measurement::from_json(self.fields.get(metric.key()))
    }

    /// `timestamp` wins over `time`; null counts as absent.
    pub fn raw_timestamp(&self) -> Option<&Value> {
        ["timestamp", "time"]
            .into_iter()
            .filter_map(|key| self.fields.get(key))
            .find(|value| !value.is_null())
    }
}

impl From<Map<String, Value>> for ReadingRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    #[serde(rename = "temperatureC")]
    pub temperature_c: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ms")]
    BahasaMalaysia,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::BahasaMalaysia => "ms",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::BahasaMalaysia => "Bahasa Malaysia",
        }
    }
}

impl FromStr for Language {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "ms" | "bm" | "malay" | "bahasa malaysia" => Ok(Self::BahasaMalaysia),
            _ => Err(ParseError::UnknownLanguage(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "farmSize", default)]
    pub farm_size: String,
    #[serde(rename = "plantType", default)]
    pub plant_type: String,
    #[serde(rename = "ownerName", default)]
    pub owner_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub phone: String,
}
