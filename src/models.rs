// Data model for the Santa route tables and the gateway payloads.
//
// A route file is a CSV timetable with one row per stop: the North Pole
// sentinel, every visited city (grouped by timezone), and the North Pole again.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in the route CSV files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Data Structures
// ============================================================================

/// A city as listed in the source city table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub state: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA zone name, e.g. "Asia/Kolkata"
    pub timezone: String,
    /// Fractional hours, e.g. 5.5
    pub utc_offset: f64,
    pub population: u64,
}

/// The synthetic start/end marker of every route.
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelLocation {
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl SentinelLocation {
    pub fn north_pole() -> Self {
        SentinelLocation {
            name: "North Pole".to_string(),
            country: "Arctic".to_string(),
            latitude: 90.0,
            longitude: 0.0,
        }
    }

    /// Timezone label written for a sentinel stop, e.g. "UTC+14" or "UTC-11".
    pub fn timezone_label(rounded_offset: i32) -> String {
        format!("UTC{:+}", rounded_offset)
    }
}

/// Whether a timezone column holds a sentinel label rather than an IANA name.
pub fn is_sentinel_timezone(timezone: &str) -> bool {
    timezone.starts_with("UTC+") || timezone.starts_with("UTC-")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherFields {
    pub temperature_c: Option<f64>,
    pub condition: Option<String>,
    pub wind_speed_mps: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_gust_mps: Option<f64>,
}

/// One stop of the generated route.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub stop_number: usize,
    pub city: String,
    pub country: String,
    pub state: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub utc_offset: f64,
    pub utc_offset_rounded: i32,
    pub utc_time: DateTime<Utc>,
    pub local_time: NaiveDateTime,
    pub population: u64,
    pub weather: WeatherFields,
}

impl Stop {
    pub fn is_sentinel(&self) -> bool {
        is_sentinel_timezone(&self.timezone)
    }
}

/// Weather values for one stop, keyed by its stop number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherUpdate {
    pub stop_number: usize,
    #[serde(flatten)]
    pub weather: WeatherFields,
}

/// Current conditions as answered by the weather provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature_c: f64,
    pub condition: String,
    pub wind_speed_mps: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_gust_mps: Option<f64>,
}

impl From<WeatherReport> for WeatherFields {
    fn from(report: WeatherReport) -> Self {
        WeatherFields {
            temperature_c: Some(report.temperature_c),
            condition: Some(report.condition),
            wind_speed_mps: report.wind_speed_mps,
            wind_direction_deg: report.wind_direction_deg,
            wind_gust_mps: report.wind_gust_mps,
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Empty input: {0}")]
    EmptyInput(String),
    #[error("File error: {0}")]
    FileError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

// ============================================================================
// Helpers
// ============================================================================

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| TrackerError::ValidationError(format!("Invalid timestamp '{}': {}", value, e)))
}

pub fn get_current_timestamp() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_labels_carry_the_sign() {
        assert_eq!(SentinelLocation::timezone_label(14), "UTC+14");
        assert_eq!(SentinelLocation::timezone_label(-11), "UTC-11");
        assert_eq!(SentinelLocation::timezone_label(0), "UTC+0");
        assert!(is_sentinel_timezone("UTC+0"));
        assert!(!is_sentinel_timezone("UTC"));
        assert!(!is_sentinel_timezone("Europe/London"));
    }

    #[test]
    fn timestamps_use_the_route_layout() {
        let parsed = parse_timestamp("2025-12-24 10:15:00").unwrap();
        assert_eq!(format_timestamp(&parsed), "2025-12-24 10:15:00");
        assert!(parse_timestamp("2025-12-24T10:15:00Z").is_err());
    }

    #[test]
    fn weather_update_reads_flat_json() {
        let update: WeatherUpdate = serde_json::from_str(
            r#"{"stop_number": 3, "temperature_c": -4.5, "condition": "light snow", "wind_speed_mps": 5.1}"#,
        )
        .unwrap();
        assert_eq!(update.stop_number, 3);
        assert_eq!(update.weather.temperature_c, Some(-4.5));
        assert_eq!(update.weather.condition.as_deref(), Some("light snow"));
        assert_eq!(update.weather.wind_gust_mps, None);
    }
}
