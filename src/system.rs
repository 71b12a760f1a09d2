//! System statistics for the dashboard.
//!
//! Thin readers over /sys and /proc. Every reader returns an Option; a
//! sensor that is absent on this board is a normal state, not an error.

use serde::Serialize;
use std::fs;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{OurError, OurResult};

/// System stats payload
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    #[serde(rename = "cpuTempC")]
    pub cpu_temp_c: Option<f64>,
    pub load: Option<f64>,
    #[serde(rename = "totalMem")]
    pub total_mem: Option<u64>,
    #[serde(rename = "usedMem")]
    pub used_mem: Option<u64>,
    pub uptime: Option<u64>,
    #[serde(rename = "fanRpm")]
    pub fan_rpm: Option<u32>,
    pub cores: Option<usize>,
}

/// Gather every stat; individual read failures leave their field null
pub fn read() -> SystemStats {
    let (total_mem, used_mem) = read_memory().unzip();
    SystemStats {
        cpu_temp_c: read_cpu_temp(),
        load: read_load_average(),
        total_mem,
        used_mem,
        uptime: read_uptime(),
        fan_rpm: read_fan_rpm(),
        cores: Some(num_cores()),
    }
}

/// Run the configured reboot command, failing when it exits non-zero
pub async fn reboot(command: &[String]) -> OurResult<()> {
    let program = command
        .first()
        .ok_or_else(|| OurError::Config("reboot command is empty".to_string()))?;

    info!(command = %command.join(" "), "Reboot requested");
    let output = Command::new(program).args(&command[1..]).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OurError::App(format!(
            "reboot command failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

/// CPU temperature in Celsius from the thermal zone's millidegree reading
fn read_cpu_temp() -> Option<f64> {
    let raw = fs::read_to_string("/sys/class/thermal/thermal_zone0/temp").ok()?;
    let milli: i64 = raw.trim().parse().ok()?;
    Some(milli as f64 / 1000.0)
}

/// Fan RPM from the first hwmon fan input, with common platform fallbacks
fn read_fan_rpm() -> Option<u32> {
    if let Ok(entries) = fs::read_dir("/sys/class/hwmon") {
        for entry in entries.flatten() {
            if let Some(rpm) = read_rpm_file(&entry.path().join("fan1_input")) {
                return Some(rpm);
            }
        }
    }

    let fallbacks = [
        "/sys/devices/platform/cooling_fan/hwmon/hwmon0/fan1_input",
        "/sys/devices/platform/rpi_fan/hwmon/hwmon0/fan1_input",
    ];
    fallbacks
        .iter()
        .find_map(|path| read_rpm_file(Path::new(path)))
}

fn read_rpm_file(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    raw.trim().parse().ok()
}

/// One-minute load average from /proc/loadavg
fn read_load_average() -> Option<f64> {
    let raw = fs::read_to_string("/proc/loadavg").ok()?;
    parse_load_average(&raw)
}

/// (total, used) memory in bytes from /proc/meminfo
fn read_memory() -> Option<(u64, u64)> {
    let raw = fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&raw)
}

/// Uptime in whole seconds from /proc/uptime
fn read_uptime() -> Option<u64> {
    let raw = fs::read_to_string("/proc/uptime").ok()?;
    let seconds: f64 = raw.split_whitespace().next()?.parse().ok()?;
    Some(seconds as u64)
}

fn num_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|e| {
            debug!("Could not determine core count: {e}");
            1
        })
}

fn parse_load_average(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

fn parse_meminfo(text: &str) -> Option<(u64, u64)> {
    let mut total_kb = None;
    let mut available_kb = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = rest.split_whitespace().next()?.parse::<u64>().ok();
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = rest.split_whitespace().next()?.parse::<u64>().ok();
        }
    }

    let total = total_kb? * 1024;
    let available = available_kb? * 1024;
    Some((total, total.saturating_sub(available)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_average() {
        assert_eq!(parse_load_average("0.52 0.58 0.59 1/617 98765\n"), Some(0.52));
        assert_eq!(parse_load_average(""), None);
        assert_eq!(parse_load_average("garbage"), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:        3885016 kB\nMemFree:          123456 kB\nMemAvailable:    2000000 kB\n";
        let (total, used) = parse_meminfo(text).expect("Test operation should succeed");
        assert_eq!(total, 3885016 * 1024);
        assert_eq!(used, (3885016 - 2000000) * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_fields() {
        assert_eq!(parse_meminfo("MemTotal: 100 kB\n"), None);
        assert_eq!(parse_meminfo(""), None);
    }

    #[tokio::test]
    async fn test_reboot_runs_the_configured_command() {
        reboot(&["/bin/sh".to_string(), "-c".to_string(), "exit 0".to_string()])
            .await
            .expect("Test operation should succeed");
    }

    #[tokio::test]
    async fn test_reboot_failure_surfaces_stderr() {
        let err = reboot(&[
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo permission denied >&2; exit 1".to_string(),
        ])
        .await;
        match err {
            Err(OurError::App(reason)) => assert!(reason.contains("permission denied")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reboot_empty_command_is_config_error() {
        assert!(matches!(reboot(&[]).await, Err(OurError::Config(_))));
    }

    #[test]
    fn test_read_never_panics() {
        // Stats are best-effort on any host; absent sensors are simply null
        let stats = read();
        assert!(stats.cores.is_some());
    }
}
