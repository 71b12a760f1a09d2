//! One-shot still capture via the external capture tool.
//!
//! Each capture spawns a dedicated short-lived process (distinct from the
//! streaming command) asking for a single immediate JPEG on stdout. The
//! capture holds the sensor reservation for its duration, enforces a hard
//! wall-clock timeout with forced kill, and surfaces tool-missing, busy,
//! timeout and zero-byte outcomes as distinct errors.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::camera::status::first_available_tool;
use crate::camera::supervisor::StreamSupervisor;
use crate::config::CameraSettings;
use crate::{OurError, OurResult};

/// A captured still plus the dimensions that were actually requested
#[derive(Debug)]
pub struct StillImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct StillCapture {
    settings: CameraSettings,
    supervisor: Arc<StreamSupervisor>,
}

impl StillCapture {
    pub fn new(settings: CameraSettings, supervisor: Arc<StreamSupervisor>) -> Self {
        Self {
            settings,
            supervisor,
        }
    }

    /// Capture a single JPEG at the requested dimensions.
    ///
    /// Dimensions are clamped into the configured bounds rather than
    /// rejected; missing values fall back to the configured defaults.
    pub async fn capture(&self, width: Option<u32>, height: Option<u32>) -> OurResult<StillImage> {
        let width = clamp_dimension(
            width,
            self.settings.min_still.width,
            self.settings.max_still.width,
            self.settings.default_still.width,
        );
        let height = clamp_dimension(
            height,
            self.settings.min_still.height,
            self.settings.max_still.height,
            self.settings.default_still.height,
        );

        // Tool availability is checked before anything is spawned
        let tool = first_available_tool(&self.settings.still_commands).ok_or_else(|| {
            OurError::Unavailable(format!(
                "no still capture tool installed (tried {})",
                self.settings.still_commands.join(", ")
            ))
        })?;

        // Reserve the sensor; released when the guard drops
        let _guard = self.supervisor.begin_still()?;

        debug!(tool = %tool, width, height, "Starting still capture");
        let mut child = Command::new(tool)
            .args([
                "-n",
                "-t",
                "1",
                "--width",
                &width.to_string(),
                "--height",
                &height.to_string(),
                "-o",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| OurError::App("still capture stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| OurError::App("still capture stderr unavailable".to_string()))?;

        let stdout_task = tokio::spawn(async move {
            let mut data = Vec::new();
            let _ = stdout.read_to_end(&mut data).await;
            data
        });
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let budget = Duration::from_secs(self.settings.still_timeout_secs);
        let exit = match timeout(budget, child.wait()).await {
            Err(_) => {
                warn!(tool = %tool, "Still capture exceeded its time budget, killing it");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill still capture process: {e}");
                }
                return Err(OurError::Timeout(self.settings.still_timeout_secs));
            }
            Ok(result) => result?,
        };

        if !exit.success() {
            let stderr_text = stderr_task.await.unwrap_or_default();
            let reason = match stderr_text.trim() {
                "" => format!("capture tool exited with {exit}"),
                text => text.to_string(),
            };
            return Err(OurError::Capture(reason));
        }

        let data = stdout_task.await.unwrap_or_default();
        if data.is_empty() {
            return Err(OurError::Capture(
                "capture tool returned zero bytes".to_string(),
            ));
        }

        info!(tool = %tool, width, height, bytes = data.len(), "Captured still");
        Ok(StillImage {
            data,
            width,
            height,
        })
    }
}

/// Clamp a requested dimension into [min, max], defaulting when absent.
/// Inverted bounds from a bad config file are normalized rather than
/// panicking.
pub(crate) fn clamp_dimension(requested: Option<u32>, min: u32, max: u32, default: u32) -> u32 {
    let (lower, upper) = if min <= max { (min, max) } else { (max, min) };
    requested.unwrap_or(default).clamp(lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::hub::BroadcastHub;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))
            .expect("Test operation should succeed");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Test operation should succeed");
        path
    }

    fn still_capture_for(still_commands: Vec<String>, timeout_secs: u64) -> StillCapture {
        let settings = CameraSettings {
            still_commands,
            still_timeout_secs: timeout_secs,
            stream_commands: vec!["definitely-not-a-real-capture-tool".to_string()],
            ..CameraSettings::default()
        };
        let supervisor = Arc::new(StreamSupervisor::new(
            settings.clone(),
            Arc::new(BroadcastHub::new()),
        ));
        StillCapture::new(settings, supervisor)
    }

    #[test]
    fn test_clamp_dimension() {
        // Below the minimum is clamped up, not rejected
        assert_eq!(clamp_dimension(Some(100), 320, 2592, 1600), 320);
        assert_eq!(clamp_dimension(Some(9999), 320, 2592, 1600), 2592);
        assert_eq!(clamp_dimension(Some(800), 320, 2592, 1600), 800);
        assert_eq!(clamp_dimension(None, 320, 2592, 1600), 1600);
    }

    #[test]
    fn test_clamp_dimension_inverted_bounds_do_not_panic() {
        assert_eq!(clamp_dimension(Some(500), 2592, 320, 1600), 500);
        assert_eq!(clamp_dimension(Some(10), 2592, 320, 1600), 320);
        assert_eq!(clamp_dimension(None, 2592, 320, 1600), 1600);
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable_without_spawning() {
        let still = still_capture_for(vec!["definitely-not-a-real-capture-tool".to_string()], 8);
        let err = still.capture(None, None).await;
        assert!(matches!(err, Err(OurError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_successful_capture_returns_bytes_and_clamped_dimensions() {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        let script = write_script(&temp_dir, "fake-still", r"printf '\377\330JPEG\377\331'");
        let still = still_capture_for(vec![script.to_string_lossy().into_owned()], 8);

        let image = still
            .capture(Some(100), Some(5000))
            .await
            .expect("Test operation should succeed");
        assert_eq!(image.data[..2], [0xFF, 0xD8]);
        assert_eq!(image.width, 320);
        assert_eq!(image.height, 1944);
    }

    #[tokio::test]
    async fn test_timeout_kills_the_process() {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        let script = write_script(&temp_dir, "fake-still", "sleep 30");
        let still = still_capture_for(vec![script.to_string_lossy().into_owned()], 1);

        let err = still.capture(None, None).await;
        assert!(matches!(err, Err(OurError::Timeout(1))));
    }

    #[tokio::test]
    async fn test_zero_byte_capture_is_a_failure() {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        let script = write_script(&temp_dir, "fake-still", "exit 0");
        let still = still_capture_for(vec![script.to_string_lossy().into_owned()], 8);

        let err = still.capture(None, None).await;
        assert!(matches!(err, Err(OurError::Capture(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_surfaces_stderr_text() {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        let script = write_script(
            &temp_dir,
            "fake-still",
            "echo 'device or resource busy' >&2; exit 1",
        );
        let still = still_capture_for(vec![script.to_string_lossy().into_owned()], 8);

        match still.capture(None, None).await {
            Err(OurError::Capture(reason)) => {
                assert!(reason.contains("device or resource busy"));
            }
            other => panic!("expected capture failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_capture_succeeds_after_guard_release() {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        let script = write_script(&temp_dir, "fake-still", r"printf '\377\330X\377\331'");
        let still = still_capture_for(vec![script.to_string_lossy().into_owned()], 8);

        still
            .capture(None, None)
            .await
            .expect("Test operation should succeed");
        still
            .capture(None, None)
            .await
            .expect("Test operation should succeed");
    }
}
