//! Configuration management for the pi-control server.
//!
//! Settings are built from defaults, optionally overlaid with a JSON config
//! file, then overridden by `PI_CONTROL_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// A width/height pair for still capture bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StillDimensions {
    pub width: u32,
    pub height: u32,
}

/// Camera subsystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Candidate streaming commands, tried in order until one spawns
    pub stream_commands: Vec<String>,
    /// Candidate one-shot still commands, tried in order
    pub still_commands: Vec<String>,
    /// Directory scanned for video device nodes
    pub device_directory: PathBuf,
    /// Live stream width
    pub stream_width: u32,
    /// Live stream height
    pub stream_height: u32,
    /// Live stream framerate
    pub framerate: u32,
    /// Minimum accepted still dimensions
    pub min_still: StillDimensions,
    /// Maximum accepted still dimensions
    pub max_still: StillDimensions,
    /// Still dimensions used when a request omits them
    pub default_still: StillDimensions,
    /// Wall-clock budget for a one-shot capture before the process is killed
    pub still_timeout_secs: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            stream_commands: vec!["rpicam-vid".to_string(), "libcamera-vid".to_string()],
            still_commands: vec!["rpicam-still".to_string(), "libcamera-still".to_string()],
            device_directory: PathBuf::from("/dev"),
            stream_width: 1280,
            stream_height: 720,
            framerate: 15,
            min_still: StillDimensions {
                width: 320,
                height: 240,
            },
            max_still: StillDimensions {
                width: 2592,
                height: 1944,
            },
            default_still: StillDimensions {
                width: 1600,
                height: 900,
            },
            still_timeout_secs: 8,
        }
    }
}

/// Settings for the external DHT temperature sensor reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarTempSettings {
    /// Command that prints one JSON reading to stdout; sensor type and BCM
    /// pin are appended as arguments
    pub reader_command: Vec<String>,
    /// DHT sensor model, 11 or 22
    pub dht_type: u8,
    /// BCM pin the sensor data line is wired to
    pub gpio_pin: u8,
}

impl Default for CarTempSettings {
    fn default() -> Self {
        Self {
            reader_command: vec!["python3".to_string(), "./scripts/read_dht.py".to_string()],
            dht_type: 22,
            gpio_pin: 4,
        }
    }
}

/// Map tile configuration exposed to the frontend via /config.js.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSettings {
    pub url: String,
    pub attribution: String,
    pub max_zoom: u8,
    pub max_native_zoom: u8,
    pub fallback_url: String,
    pub fallback_attribution: String,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            // prefer a local tileserver, fall back to OSM
            url: "http://127.0.0.1:8090/styles/bright/{z}/{x}/{y}.png".to_string(),
            attribution: "(local tiles - set tile attribution)".to_string(),
            max_zoom: 17,
            max_native_zoom: 17,
            fallback_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            fallback_attribution: "(c) OpenStreetMap contributors".to_string(),
        }
    }
}

/// Configuration settings for the pi-control server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable debug mode
    pub debug: bool,
    /// Directory of static frontend files
    pub public_directory: PathBuf,
    /// Directory where captured stills and their metadata are persisted
    pub stills_directory: PathBuf,
    /// Default forecast latitude
    pub weather_latitude: f64,
    /// Default forecast longitude
    pub weather_longitude: f64,
    /// Forecast cache lifetime in minutes
    pub weather_cache_minutes: u64,
    /// Map tile configuration
    pub tiles: TileSettings,
    /// Camera subsystem configuration
    pub camera: CameraSettings,
    /// DHT temperature sensor configuration
    pub car_temp: CarTempSettings,
    /// Command run by the reboot endpoint
    pub reboot_command: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            debug: false,
            public_directory: PathBuf::from("./public"),
            stills_directory: PathBuf::from("./data/stills"),
            weather_latitude: 39.7392,
            weather_longitude: -104.9903,
            weather_cache_minutes: 15,
            tiles: TileSettings::default(),
            camera: CameraSettings::default(),
            car_temp: CarTempSettings::default(),
            reboot_command: vec!["sudo".to_string(), "/sbin/reboot".to_string()],
        }
    }
}

impl Settings {
    /// Build settings from the config file and environment variable overrides
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::load_config_file()?;

        if let Ok(host) = env::var("PI_CONTROL_HOST") {
            settings.host = host;
        }
        if let Ok(port) = env::var("PI_CONTROL_PORT") {
            settings.port = port.parse()?;
        }
        if let Ok(debug) = env::var("PI_CONTROL_DEBUG") {
            settings.debug = debug.parse()?;
        }
        if let Ok(public_dir) = env::var("PI_CONTROL_PUBLIC_DIR") {
            settings.public_directory = PathBuf::from(public_dir);
        }
        if let Ok(stills_dir) = env::var("PI_CONTROL_STILLS_DIR") {
            settings.stills_directory = PathBuf::from(stills_dir);
        }
        if let Ok(lat) = env::var("PI_CONTROL_WEATHER_LAT") {
            settings.weather_latitude = lat.parse()?;
        }
        if let Ok(lon) = env::var("PI_CONTROL_WEATHER_LON") {
            settings.weather_longitude = lon.parse()?;
        }
        if let Ok(url) = env::var("PI_CONTROL_MAP_TILE_URL") {
            settings.tiles.url = url;
        }
        if let Ok(attrib) = env::var("PI_CONTROL_MAP_TILE_ATTRIB") {
            settings.tiles.attribution = attrib;
        }
        if let Ok(device_dir) = env::var("PI_CONTROL_CAMERA_DEVICE_DIR") {
            settings.camera.device_directory = PathBuf::from(device_dir);
        }
        if let Ok(width) = env::var("PI_CONTROL_STREAM_WIDTH") {
            settings.camera.stream_width = width.parse()?;
        }
        if let Ok(height) = env::var("PI_CONTROL_STREAM_HEIGHT") {
            settings.camera.stream_height = height.parse()?;
        }
        if let Ok(framerate) = env::var("PI_CONTROL_STREAM_FRAMERATE") {
            settings.camera.framerate = framerate.parse()?;
        }
        if let Ok(timeout) = env::var("PI_CONTROL_STILL_TIMEOUT_SECS") {
            settings.camera.still_timeout_secs = timeout.parse()?;
        }
        if let Ok(dht_type) = env::var("PI_CONTROL_DHT_TYPE") {
            settings.car_temp.dht_type = dht_type.parse()?;
        }
        if let Ok(pin) = env::var("PI_CONTROL_DHT_PIN") {
            settings.car_temp.gpio_pin = pin.parse()?;
        }

        settings.create_directories()?;

        Ok(settings)
    }

    /// Create all necessary directories
    fn create_directories(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.stills_directory.exists() {
            fs::create_dir_all(&self.stills_directory)?;
        }
        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path() -> PathBuf {
        // Allow override via environment variable for testing
        if let Ok(config_path_override) = env::var("PI_CONTROL_CONFIG_PATH") {
            return PathBuf::from(config_path_override);
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("pi-control.json")
    }

    /// Load settings from the config file, or defaults when it is absent
    fn load_config_file() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        if !config_path.exists() {
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }
}
