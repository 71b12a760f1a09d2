//! Capture process supervision for the live MJPEG stream.
//!
//! Exactly one capture process exists per device at a time. The supervisor
//! spawns it on the first viewer request, trying an ordered list of candidate
//! commands until one starts, pipes its stdout through the frame
//! demultiplexer into the broadcast hub, and tears the broadcast state down
//! when the process exits. There is deliberately no auto-restart loop: a new
//! viewer connecting after an exit triggers a fresh spawn, so nothing runs
//! while nobody is watching.

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::camera::demux::FrameDemuxer;
use crate::camera::hub::BroadcastHub;
use crate::config::CameraSettings;
use crate::{OurError, OurResult};

/// The single live upstream capture process
struct CaptureProcess {
    command: String,
    child: Child,
}

#[derive(Default)]
struct SupervisorInner {
    process: Option<CaptureProcess>,
    /// Incremented per spawn so a stale reader task never tears down a
    /// successor process's state
    generation: u64,
    last_error: Option<String>,
    /// Set while a one-shot still capture holds the sensor
    still_active: bool,
}

/// Owns the capture process singleton and arbitrates exclusive access to the
/// physical sensor between streaming and still capture.
pub struct StreamSupervisor {
    settings: CameraSettings,
    hub: Arc<BroadcastHub>,
    inner: Arc<Mutex<SupervisorInner>>,
}

/// Held for the duration of a one-shot still capture; releases the sensor
/// reservation on drop.
pub struct StillGuard {
    inner: Arc<Mutex<SupervisorInner>>,
}

impl Drop for StillGuard {
    fn drop(&mut self) {
        lock_inner(&self.inner).still_active = false;
    }
}

fn lock_inner(inner: &Arc<Mutex<SupervisorInner>>) -> MutexGuard<'_, SupervisorInner> {
    inner.lock().unwrap_or_else(|e| {
        error!("Stream supervisor mutex poisoned: {e}");
        e.into_inner()
    })
}

impl StreamSupervisor {
    pub fn new(settings: CameraSettings, hub: Arc<BroadcastHub>) -> Self {
        Self {
            settings,
            hub,
            inner: Arc::new(Mutex::new(SupervisorInner::default())),
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Whether a capture process is currently live
    pub fn is_streaming(&self) -> bool {
        let mut inner = lock_inner(&self.inner);
        process_is_live(&mut inner)
    }

    /// The last diagnostic line the capture process wrote to stderr
    pub fn last_error(&self) -> Option<String> {
        lock_inner(&self.inner).last_error.clone()
    }

    /// Reserve the sensor for a one-shot still capture.
    ///
    /// Fails fast with Busy when the live stream owns the sensor or another
    /// still capture is already in flight; the two capture modes never run
    /// their processes concurrently against the same hardware.
    pub fn begin_still(&self) -> OurResult<StillGuard> {
        let mut inner = lock_inner(&self.inner);
        if process_is_live(&mut inner) {
            return Err(OurError::Busy(
                "live stream is using the camera; stop it before capturing a still".to_string(),
            ));
        }
        if inner.still_active {
            return Err(OurError::Busy(
                "another still capture is in progress".to_string(),
            ));
        }
        inner.still_active = true;
        Ok(StillGuard {
            inner: self.inner.clone(),
        })
    }

    /// Return once a capture process is live, spawning one if needed.
    ///
    /// Must be called from within a tokio runtime; the stdout and stderr
    /// reader tasks are spawned onto it.
    pub fn ensure_started(&self) -> OurResult<()> {
        let mut inner = lock_inner(&self.inner);

        if inner.still_active {
            return Err(OurError::Busy(
                "still capture is using the camera; retry once it finishes".to_string(),
            ));
        }

        if process_is_live(&mut inner) {
            return Ok(());
        }

        let mut attempts = Vec::new();
        for command in &self.settings.stream_commands {
            match self.spawn_stream_process(command) {
                Ok(child) => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let mut child = child;
                    self.attach_readers(&mut child, generation)?;
                    info!(command = %command, generation, "Capture process started");
                    inner.process = Some(CaptureProcess {
                        command: command.clone(),
                        child,
                    });
                    inner.last_error = None;
                    return Ok(());
                }
                Err(e) => {
                    debug!(command = %command, "Capture command failed to spawn: {e}");
                    attempts.push(format!("{command}: {e}"));
                }
            }
        }

        let reason = format!(
            "no capture command could be started ({})",
            attempts.join("; ")
        );
        warn!("{reason}");
        inner.last_error = Some(reason.clone());
        Err(OurError::Unavailable(reason))
    }

    fn spawn_stream_process(&self, command: &str) -> std::io::Result<Child> {
        Command::new(command)
            .args([
                "-n",
                "--codec",
                "mjpeg",
                "--width",
                &self.settings.stream_width.to_string(),
                "--height",
                &self.settings.stream_height.to_string(),
                "--framerate",
                &self.settings.framerate.to_string(),
                "-t",
                "0",
                "-o",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    fn attach_readers(&self, child: &mut Child, generation: u64) -> OurResult<()> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OurError::App("capture process stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| OurError::App("capture process stderr unavailable".to_string()))?;

        let hub = self.hub.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut demux = FrameDemuxer::new();
            let mut buf = vec![0u8; 16 * 1024];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        for frame in demux.push(&buf[..n]) {
                            hub.broadcast(&frame);
                        }
                    }
                    Err(e) => {
                        warn!("Capture stdout read error: {e}");
                        break;
                    }
                }
            }
            finish_stream(&inner, &hub, generation);
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    // Diagnostic only; streams log progress here continuously
                    debug!("Capture stderr: {line}");
                    lock_inner(&inner).last_error = Some(line);
                }
            }
        });

        Ok(())
    }
}

/// Tear down the singleton and drain the subscriber set once the capture
/// process's output ends. A stale generation means a newer process already
/// replaced this one, in which case its state is left alone.
fn finish_stream(inner: &Arc<Mutex<SupervisorInner>>, hub: &Arc<BroadcastHub>, generation: u64) {
    let mut inner = lock_inner(inner);
    if inner.generation != generation {
        return;
    }

    if let Some(mut process) = inner.process.take() {
        match process.child.try_wait() {
            Ok(Some(exit)) => {
                info!(command = %process.command, %exit, "Capture process exited")
            }
            Ok(None) => {
                // Output ended but the process lingers; make sure it dies
                warn!(
                    command = %process.command,
                    "Capture output ended with process still running, killing it"
                );
                if let Err(e) = process.child.start_kill() {
                    warn!("Failed to kill capture process: {e}");
                }
            }
            Err(e) => warn!("Failed to reap capture process: {e}"),
        }
    }

    hub.close_all();
}

/// Liveness check for the current capture process, reaping it if it has
/// already exited
fn process_is_live(inner: &mut SupervisorInner) -> bool {
    match &mut inner.process {
        Some(process) => match process.child.try_wait() {
            Ok(None) => true,
            Ok(Some(exit)) => {
                debug!(command = %process.command, %exit, "Reaped exited capture process");
                inner.process = None;
                false
            }
            Err(e) => {
                warn!("Capture process wait failed: {e}");
                inner.process = None;
                false
            }
        },
        None => false,
    }
}
