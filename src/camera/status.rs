//! Camera status reporting.
//!
//! A pure read over device nodes and installed capture tools. A missing
//! camera is a normal, reportable state, never an error.

use serde::Serialize;
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::{CameraSettings, StillDimensions};

/// Composite camera status payload for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub online: bool,
    pub devices: Vec<String>,
    #[serde(rename = "libcameraInstalled")]
    pub libcamera_installed: bool,
    #[serde(rename = "maxStill")]
    pub max_still: StillDimensions,
    #[serde(rename = "defaultStill")]
    pub default_still: StillDimensions,
    #[serde(rename = "streamUrl")]
    pub stream_url: String,
    pub notes: String,
}

/// Build the status payload from device nodes and tool availability
pub fn report(settings: &CameraSettings) -> CameraStatus {
    let devices = list_video_devices(&settings.device_directory);
    let online = !devices.is_empty();
    let libcamera_installed = first_available_tool(&settings.still_commands).is_some()
        || first_available_tool(&settings.stream_commands).is_some();

    let notes = match (online, libcamera_installed) {
        (false, _) => "No camera device nodes detected. Check the ribbon cable and enable the camera interface.".to_string(),
        (true, false) => {
            "Camera device present, but no capture tool is installed. Install rpicam-apps or libcamera-apps.".to_string()
        }
        (true, true) => {
            "Camera device present. Stream and still capture depend on the external capture tool.".to_string()
        }
    };

    CameraStatus {
        online,
        devices,
        libcamera_installed,
        max_still: settings.max_still,
        default_still: settings.default_still,
        stream_url: "/camera/stream".to_string(),
        notes,
    }
}

/// Enumerate video device nodes (video*) under the configured directory
fn list_video_devices(device_directory: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(device_directory) else {
        return Vec::new();
    };

    let mut devices: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("video"))
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .collect();
    devices.sort();
    devices
}

/// Whether a command names an installed executable, either as an absolute
/// path or somewhere on PATH
pub fn tool_available(command: &str) -> bool {
    let path = Path::new(command);
    if path.is_absolute() {
        return is_executable(path);
    }

    let Some(search_path) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&search_path).any(|dir| is_executable(&dir.join(command)))
}

/// First command from an ordered candidate list that is installed
pub fn first_available_tool(commands: &[String]) -> Option<&str> {
    commands
        .iter()
        .map(String::as_str)
        .find(|command| tool_available(command))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_settings(device_dir: &Path) -> CameraSettings {
        CameraSettings {
            device_directory: device_dir.to_path_buf(),
            still_commands: vec!["definitely-not-a-real-capture-tool".to_string()],
            stream_commands: vec!["also-not-a-real-capture-tool".to_string()],
            ..CameraSettings::default()
        }
    }

    #[test]
    fn test_missing_device_reports_offline_without_error() {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        let status = report(&test_settings(temp_dir.path()));

        assert!(!status.online);
        assert!(status.devices.is_empty());
        assert!(!status.libcamera_installed);
        assert!(status.notes.contains("No camera device nodes"));
    }

    #[test]
    fn test_device_nodes_detected() {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        std::fs::write(temp_dir.path().join("video0"), b"").expect("Test operation should succeed");
        std::fs::write(temp_dir.path().join("video1"), b"").expect("Test operation should succeed");
        std::fs::write(temp_dir.path().join("null"), b"").expect("Test operation should succeed");

        let status = report(&test_settings(temp_dir.path()));
        assert!(status.online);
        assert_eq!(status.devices.len(), 2);
        assert!(status.devices[0].ends_with("video0"));
    }

    #[test]
    fn test_nonexistent_device_directory_is_offline() {
        let status = report(&test_settings(Path::new("/nonexistent/device/dir")));
        assert!(!status.online);
        assert!(status.devices.is_empty());
    }

    #[test]
    fn test_tool_available() {
        assert!(tool_available("/bin/sh"));
        assert!(tool_available("sh"));
        assert!(!tool_available("definitely-not-a-real-capture-tool"));
        assert!(!tool_available("/nonexistent/path/to/tool"));
    }

    #[test]
    fn test_first_available_tool_order() {
        let commands = vec![
            "definitely-not-a-real-capture-tool".to_string(),
            "sh".to_string(),
        ];
        assert_eq!(first_available_tool(&commands), Some("sh"));
        assert_eq!(
            first_available_tool(&["nope-1".to_string(), "nope-2".to_string()]),
            None
        );
    }
}
