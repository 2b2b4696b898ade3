// Clients for the third-party services behind the gateways.
//
// Weather: OpenWeatherMap-compatible "current weather" endpoint, metric units.
// Speech:  OpenAI-compatible "audio/speech" endpoint returning MP3 audio.
//
// Each call is a single request. There is no retry; the only timeout is the
// one configured on the HTTP client.

use bytes::Bytes;
use reqwest::blocking;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::models::{Result, TrackerError, WeatherReport};

// ============================================================================
// Provider Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    name: String,
    main: OwmMain,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    wind: Option<OwmWind>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    #[serde(default)]
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: Option<f64>,
    deg: Option<f64>,
    gust: Option<f64>,
}

impl From<OwmResponse> for WeatherReport {
    fn from(response: OwmResponse) -> Self {
        let condition = response
            .weather
            .first()
            .map(|c| {
                if c.description.is_empty() {
                    c.main.clone()
                } else {
                    c.description.clone()
                }
            })
            .unwrap_or_default();
        let wind = response.wind.unwrap_or(OwmWind {
            speed: None,
            deg: None,
            gust: None,
        });

        WeatherReport {
            location: response.name,
            temperature_c: response.main.temp,
            condition,
            wind_speed_mps: wind.speed,
            wind_direction_deg: wind.deg,
            wind_gust_mps: wind.gust,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

fn weather_query(latitude: f64, longitude: f64, api_key: &str) -> [(&'static str, String); 4] {
    [
        ("lat", latitude.to_string()),
        ("lon", longitude.to_string()),
        ("units", "metric".to_string()),
        ("appid", api_key.to_string()),
    ]
}

fn parse_weather(body: &str) -> Result<WeatherReport> {
    let response: OwmResponse = serde_json::from_str(body)
        .map_err(|e| TrackerError::ProviderError(format!("Invalid weather response: {}", e)))?;
    Ok(response.into())
}

fn missing_key(name: &str) -> TrackerError {
    TrackerError::ProviderError(format!("{} is not configured", name))
}

// ============================================================================
// Weather
// ============================================================================

#[derive(Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl WeatherClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TrackerError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(WeatherClient {
            http,
            url: config.weather_api_url.clone(),
            api_key: config.openweather_api_key.clone(),
        })
    }

    pub async fn current(&self, latitude: f64, longitude: f64) -> Result<WeatherReport> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key("OPENWEATHER_API_KEY"))?;

        debug!("Fetching weather for ({}, {})", latitude, longitude);
        let response = self
            .http
            .get(&self.url)
            .query(&weather_query(latitude, longitude, api_key))
            .send()
            .await
            .map_err(|e| TrackerError::ProviderError(format!("Failed to fetch weather: {}", e)))?;

        if !response.status().is_success() {
            return Err(TrackerError::ProviderError(format!(
                "Weather API returned error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TrackerError::ProviderError(format!("Failed to read weather response: {}", e)))?;

        parse_weather(&body)
    }
}

/// Blocking variant used by the batch `fill-weather` command.
pub struct BlockingWeatherClient {
    http: blocking::Client,
    url: String,
    api_key: Option<String>,
}

impl BlockingWeatherClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TrackerError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(BlockingWeatherClient {
            http,
            url: config.weather_api_url.clone(),
            api_key: config.openweather_api_key.clone(),
        })
    }

    pub fn current(&self, latitude: f64, longitude: f64) -> Result<WeatherReport> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key("OPENWEATHER_API_KEY"))?;

        let response = self
            .http
            .get(&self.url)
            .query(&weather_query(latitude, longitude, api_key))
            .send()
            .map_err(|e| TrackerError::ProviderError(format!("Failed to fetch weather: {}", e)))?;

        if !response.status().is_success() {
            return Err(TrackerError::ProviderError(format!(
                "Weather API returned error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .map_err(|e| TrackerError::ProviderError(format!("Failed to read weather response: {}", e)))?;

        parse_weather(&body)
    }
}

// ============================================================================
// Speech
// ============================================================================

#[derive(Clone)]
pub struct SpeechClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    default_voice: String,
}

impl SpeechClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TrackerError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(SpeechClient {
            http,
            url: config.speech_api_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.speech_model.clone(),
            default_voice: config.speech_voice.clone(),
        })
    }

    /// Returns MP3 audio for `text`.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key("OPENAI_API_KEY"))?;

        let request = SpeechRequest {
            model: &self.model,
            voice: voice.unwrap_or(&self.default_voice),
            input: text,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TrackerError::ProviderError(format!("Failed to request speech: {}", e)))?;

        if !response.status().is_success() {
            return Err(TrackerError::ProviderError(format!(
                "Speech API returned error: {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| TrackerError::ProviderError(format!("Failed to read speech audio: {}", e)))?;

        info!("Synthesized {} bytes of speech for {} characters", audio.len(), text.chars().count());
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_current_weather_payload() {
        let body = r#"{
            "coord": {"lon": 25.72, "lat": 66.5},
            "weather": [{"id": 600, "main": "Snow", "description": "light snow", "icon": "13n"}],
            "main": {"temp": -12.4, "feels_like": -19.0, "pressure": 1012, "humidity": 88},
            "wind": {"speed": 4.6, "deg": 190, "gust": 9.3},
            "name": "Rovaniemi"
        }"#;

        let report = parse_weather(body).unwrap();
        assert_eq!(report.location, "Rovaniemi");
        assert_eq!(report.temperature_c, -12.4);
        assert_eq!(report.condition, "light snow");
        assert_eq!(report.wind_speed_mps, Some(4.6));
        assert_eq!(report.wind_direction_deg, Some(190.0));
        assert_eq!(report.wind_gust_mps, Some(9.3));
    }

    #[test]
    fn tolerates_missing_wind_and_description() {
        let body = r#"{"weather": [{"main": "Clear"}], "main": {"temp": 31.0}}"#;
        let report = parse_weather(body).unwrap();
        assert_eq!(report.condition, "Clear");
        assert_eq!(report.location, "");
        assert_eq!(report.wind_speed_mps, None);
        assert_eq!(report.wind_gust_mps, None);
    }

    #[test]
    fn rejects_payload_without_temperature() {
        let err = parse_weather(r#"{"cod": 401, "message": "Invalid API key"}"#).unwrap_err();
        assert!(matches!(err, TrackerError::ProviderError(_)));
    }

    #[test]
    fn speech_request_uses_provider_field_names() {
        let request = SpeechRequest {
            model: "tts-1",
            voice: "onyx",
            input: "Ho ho ho",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "tts-1");
        assert_eq!(json["voice"], "onyx");
        assert_eq!(json["input"], "Ho ho ho");
    }
}
