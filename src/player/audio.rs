use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use tracing::debug;

use crate::common::errors::PlayerError;

/// Fires exactly once per accepted `play`, with `None` for a natural end or
/// the error message otherwise. Delivered from the audio subsystem's own
/// execution context; callers must treat it as an external event.
pub type CompletionCallback = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// External audio pipeline, one handle per session. Starting a new stream
/// always supersedes the previous one; a superseded stream's completion is
/// suppressed.
pub trait AudioOutput: Send + Sync {
    fn play(&self, stream_url: &str, on_complete: CompletionCallback) -> Result<(), PlayerError>;
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    fn is_playing(&self) -> bool;
}

/// Creates one audio output per session.
pub trait AudioOutputFactory: Send + Sync {
    fn open(&self) -> Arc<dyn AudioOutput>;
}

struct ActiveStream {
    id: u64,
    pid: Option<u32>,
    superseded: Arc<AtomicBool>,
    paused: bool,
}

/// Audio pipeline backed by an ffplay subprocess.
pub struct FfplayOutput {
    inner: Arc<Mutex<Option<ActiveStream>>>,
    next_id: AtomicU64,
}

impl FfplayOutput {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    fn supersede_locked(current: &mut Option<ActiveStream>) {
        if let Some(stream) = current.take() {
            stream.superseded.store(true, Ordering::SeqCst);
            if let Some(pid) = stream.pid {
                // A stopped process leaves SIGTERM pending forever; it must
                // be continued before it can act on the termination.
                if stream.paused {
                    signal(pid, "-CONT");
                }
                signal(pid, "-TERM");
            }
        }
    }
}

impl Default for FfplayOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// ffplay has no control channel; pause and resume use process signals.
fn signal(pid: u32, sig: &str) {
    let _ = std::process::Command::new("kill")
        .arg(sig)
        .arg(pid.to_string())
        .status();
}

impl AudioOutput for FfplayOutput {
    fn play(&self, stream_url: &str, on_complete: CompletionCallback) -> Result<(), PlayerError> {
        let mut child = Command::new("ffplay")
            .args(["-nodisp", "-autoexit", "-loglevel", "error"])
            .arg(stream_url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlayerError::Playback(format!("failed to start ffplay: {e}")))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let superseded = Arc::new(AtomicBool::new(false));
        let stream = ActiveStream {
            id,
            pid: child.id(),
            superseded: superseded.clone(),
            paused: false,
        };

        {
            let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            Self::supersede_locked(&mut current);
            *current = Some(stream);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let status = child.wait().await;

            {
                let mut current = inner.lock().unwrap_or_else(|e| e.into_inner());
                if current.as_ref().is_some_and(|s| s.id == id) {
                    *current = None;
                }
            }

            if superseded.load(Ordering::SeqCst) {
                debug!("suppressing completion of superseded stream {id}");
                return;
            }

            let error = match status {
                Ok(status) if status.success() => None,
                Ok(status) => Some(format!("ffplay exited with {status}")),
                Err(e) => Some(format!("ffplay wait failed: {e}")),
            };
            on_complete(error);
        });

        Ok(())
    }

    fn pause(&self) {
        let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stream) = current.as_mut() {
            if let Some(pid) = stream.pid {
                signal(pid, "-STOP");
            }
            stream.paused = true;
        }
    }

    fn resume(&self) {
        let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stream) = current.as_mut() {
            if let Some(pid) = stream.pid {
                signal(pid, "-CONT");
            }
            stream.paused = false;
        }
    }

    fn stop(&self) {
        let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if current.is_some() {
            debug!("stopping active audio stream");
        }
        Self::supersede_locked(&mut current);
    }

    fn is_playing(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|s| !s.paused)
    }
}

pub struct FfplayOutputFactory;

impl AudioOutputFactory for FfplayOutputFactory {
    fn open(&self) -> Arc<dyn AudioOutput> {
        Arc::new(FfplayOutput::new())
    }
}
