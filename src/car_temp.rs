//! Cabin temperature from the external DHT sensor reader.
//!
//! The sensor is read by a short-lived helper process that prints a single
//! JSON object to stdout, either a reading or `{"error": ...}`. Driving the
//! GPIO from a dedicated process keeps flaky one-wire timing out of the
//! server's address space.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::CarTempSettings;
use crate::{OurError, OurResult};

const READER_TIMEOUT_SECS: u64 = 10;

/// One sensor reading plus the wiring it came from
#[derive(Debug, Clone, Serialize)]
pub struct CarTempReading {
    #[serde(rename = "tempC")]
    pub temp_c: f64,
    #[serde(rename = "tempF")]
    pub temp_f: f64,
    pub humidity: f64,
    pub pin: u8,
    #[serde(rename = "type")]
    pub dht_type: u8,
}

/// What the reader process prints: a reading or an error, never both
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReaderOutput {
    #[serde(rename = "tempC")]
    temp_c: Option<f64>,
    #[serde(rename = "tempF")]
    temp_f: Option<f64>,
    humidity: Option<f64>,
    error: Option<String>,
}

/// Run the reader once and parse its reading
pub async fn read(settings: &CarTempSettings) -> OurResult<CarTempReading> {
    let program = settings
        .reader_command
        .first()
        .ok_or_else(|| OurError::Config("car temp reader command is empty".to_string()))?;

    let output = Command::new(program)
        .args(&settings.reader_command[1..])
        .arg(settings.dht_type.to_string())
        .arg(settings.gpio_pin.to_string())
        .kill_on_drop(true)
        .output();

    let output = match timeout(Duration::from_secs(READER_TIMEOUT_SECS), output).await {
        Err(_) => return Err(OurError::Timeout(READER_TIMEOUT_SECS)),
        Ok(result) => result.map_err(|e| {
            OurError::Unavailable(format!("sensor reader '{program}' failed to run: {e}"))
        })?,
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!(reading = %stdout.trim(), "Sensor reader output");
    parse_reading(&stdout, settings)
}

/// Parse the reader's JSON line into a reading, surfacing its error field
fn parse_reading(stdout: &str, settings: &CarTempSettings) -> OurResult<CarTempReading> {
    let line = stdout.trim();
    if line.is_empty() {
        return Err(OurError::Unavailable(
            "sensor reader produced no output".to_string(),
        ));
    }

    let parsed: ReaderOutput = serde_json::from_str(line)
        .map_err(|e| OurError::Unavailable(format!("unreadable sensor output: {e}")))?;

    if let Some(error) = parsed.error {
        return Err(OurError::Unavailable(error));
    }

    match (parsed.temp_c, parsed.humidity) {
        (Some(temp_c), Some(humidity)) => Ok(CarTempReading {
            temp_c,
            temp_f: parsed.temp_f.unwrap_or(temp_c * 1.8 + 32.0),
            humidity,
            pin: settings.gpio_pin,
            dht_type: settings.dht_type,
        }),
        _ => Err(OurError::Unavailable(
            "sensor reader returned no data".to_string(),
        )),
    }
}
