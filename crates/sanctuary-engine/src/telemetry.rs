use std::f64::consts::PI;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{Local, Timelike, Utc};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;

use crate::config::SanctuaryConfig;

pub const SEAVIEW_LOCATION: &str = "Seaview, Isle of Wight (PO34)";
pub const UPLINK_EVENT_LINE: &str = "[SYSTEM EVENT: SENSOR UPLINK ESTABLISHED]";
pub const OPEN_METEO_FORECAST: &str = "https://api.open-meteo.com/v1/forecast";

const SEAVIEW_LATITUDE: &str = "50.7206";
const SEAVIEW_LONGITUDE: &str = "-1.1142";
const NETWORK_PROVIDER: &str = "WightFibre";
const NETWORK_LINK: &str = "Gigabit Symmetric";
/// Round trips slower than this report a latency spike.
const LATENCY_THRESHOLD: Duration = Duration::from_millis(250);

/// Environmental readings for the island, injected into the chat at
/// session open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IslandTelemetry {
    pub location: String,
    pub timestamp: String,
    pub weather: WeatherReading,
    pub tide: TideReading,
    pub network: NetworkStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReading {
    pub temp: String,
    pub condition: String,
    pub is_raining: bool,
    pub wind_speed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TideReading {
    pub level: TideLevel,
    pub height: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TideLevel {
    High,
    Mid,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStatus {
    pub provider: String,
    pub link: String,
    pub status: LinkStatus,
    pub ping: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Optimal,
    LatencyDetected,
}

impl NetworkStatus {
    fn measured(round_trip: Duration) -> Self {
        let status = if round_trip > LATENCY_THRESHOLD {
            LinkStatus::LatencyDetected
        } else {
            LinkStatus::Optimal
        };
        Self {
            provider: NETWORK_PROVIDER.to_string(),
            link: NETWORK_LINK.to_string(),
            status,
            ping: format!("{}ms", round_trip.as_millis()),
        }
    }
}

pub trait TelemetrySource: Send + Sync {
    fn name(&self) -> &str;
    fn read(&self) -> Result<IslandTelemetry>;
}

/// Fixed readings for offline sessions and tests.
#[derive(Debug, Default, Clone)]
pub struct DryrunTelemetry;

impl TelemetrySource for DryrunTelemetry {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn read(&self) -> Result<IslandTelemetry> {
        Ok(IslandTelemetry {
            location: SEAVIEW_LOCATION.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            weather: WeatherReading {
                temp: "12.5°C".to_string(),
                condition: decode_weather_code(3).to_string(),
                is_raining: false,
                wind_speed: "18.4 km/h".to_string(),
            },
            tide: tide_at(3),
            network: NetworkStatus::measured(Duration::from_millis(4)),
        })
    }
}

/// Current Seaview weather from Open-Meteo. The tide is a semi-diurnal
/// estimate from the local hour, and the network ping is the forecast
/// request's round trip.
pub struct OpenMeteoTelemetry {
    endpoint: String,
    timeout: Duration,
    http: HttpClient,
}

impl OpenMeteoTelemetry {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            http: HttpClient::new(),
        }
    }

    fn fetch_current(&self) -> Result<(Value, Duration)> {
        let started = Instant::now();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("latitude", SEAVIEW_LATITUDE),
                ("longitude", SEAVIEW_LONGITUDE),
                (
                    "current",
                    "temperature_2m,precipitation,weather_code,wind_speed_10m",
                ),
                ("timezone", "Europe/London"),
            ])
            .timeout(self.timeout)
            .send()
            .with_context(|| format!("telemetry request failed ({})", self.endpoint))?
            .error_for_status()
            .context("telemetry request rejected")?;
        let body: Value = response.json().context("telemetry reply was not JSON")?;
        Ok((body, started.elapsed()))
    }
}

impl TelemetrySource for OpenMeteoTelemetry {
    fn name(&self) -> &str {
        "open-meteo"
    }

    fn read(&self) -> Result<IslandTelemetry> {
        let (body, round_trip) = self.fetch_current()?;
        let current = body
            .get("current")
            .context("telemetry reply has no 'current' block")?;
        let number = |key: &str| {
            current
                .get(key)
                .and_then(Value::as_f64)
                .with_context(|| format!("telemetry reply has no '{key}'"))
        };
        let code = number("weather_code")?;
        Ok(IslandTelemetry {
            location: SEAVIEW_LOCATION.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            weather: WeatherReading {
                temp: format!("{}°C", number("temperature_2m")?),
                condition: decode_weather_code(code as i64).to_string(),
                is_raining: code >= 51.0,
                wind_speed: format!("{} km/h", number("wind_speed_10m")?),
            },
            tide: tide_at(Local::now().hour()),
            network: NetworkStatus::measured(round_trip),
        })
    }
}

/// Offline sessions get fixed readings; everything else reads Open-Meteo.
pub fn source_for(config: &SanctuaryConfig) -> Box<dyn TelemetrySource> {
    if config.effective_provider() == "dryrun" {
        return Box::new(DryrunTelemetry);
    }
    Box::new(OpenMeteoTelemetry::new(
        OPEN_METEO_FORECAST,
        config.request_timeout,
    ))
}

pub fn decode_weather_code(code: i64) -> &'static str {
    match code {
        0 => "Clear Sky",
        1..=3 => "Overcast",
        45..=48 => "Fog",
        51..=55 => "Drizzle",
        61..=65 => "Rain",
        80..=82 => "Showers",
        _ => "Variable",
    }
}

/// High water near 03:00 and 15:00.
pub fn tide_at(hour: u32) -> TideReading {
    let height = 2.5 + 2.0 * ((f64::from(hour) - 3.0) / 6.0 * PI).cos();
    let level = if height > 3.0 {
        TideLevel::High
    } else if height < 1.5 {
        TideLevel::Low
    } else {
        TideLevel::Mid
    };
    TideReading {
        level,
        height: format!("{height:.2}m"),
    }
}

/// The system event that opens a chat session.
pub fn handshake_message(telemetry: &IslandTelemetry) -> String {
    let readings = serde_json::to_string_pretty(telemetry).unwrap_or_default();
    format!(
        "{UPLINK_EVENT_LINE}\nTELEMETRY DATA (SEAVIEW PO34):\n{readings}\n\n\
MANDATE:\n\
1. Analyse the weather.\n\
2. If raining, set glitchLevel > 0 via update_room_ui (BunkerTerminal).\n\
3. If network is OPTIMAL, manifest a BunkerTerminal with 'UPLINK: GIGABIT SYMMETRIC'.\n\
4. Speak to the OPR: \"Welcome back. It is currently [weather] in Seaview...\""
    )
}
