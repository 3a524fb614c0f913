//! Audio bridge: plays one narration file at a time and reports how it ended.
//!
//! The output device is opened for each `play` and released when the file ends,
//! fails, is stopped, or when the bridge is dropped. Workers hold a device lock
//! while they play, so a `play` issued right after `stop` starts only once the
//! stopped worker has released the device. Outcomes are delivered on a channel
//! so the session loop can feed them to the controller.

use rodio::{Decoder, OutputStream, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::controller::{PlaybackOutcome, Ticket};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("playback {0} is still in progress")]
    Busy(Ticket),
}

/// Something that can play an audio file to the end, blocking the caller
pub trait Player: Send + Sync + 'static {
    /// Play `path`, returning early when `stop` is raised
    fn play_blocking(&self, path: &Path, stop: &AtomicBool) -> PlaybackOutcome;
}

/// Default output device through rodio
#[derive(Debug, Default)]
pub struct RodioPlayer;

impl Player for RodioPlayer {
    fn play_blocking(&self, path: &Path, stop: &AtomicBool) -> PlaybackOutcome {
        // No device counts as blocked: the user can fix it and retry
        let (_stream, handle) = match OutputStream::try_default() {
            Ok(output) => output,
            Err(e) => return PlaybackOutcome::Blocked(format!("no audio output: {}", e)),
        };
        let sink = match Sink::try_new(&handle) {
            Ok(sink) => sink,
            Err(e) => return PlaybackOutcome::Blocked(format!("audio output busy: {}", e)),
        };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                return PlaybackOutcome::Failed(format!("cannot open {}: {}", path.display(), e));
            }
        };
        let source = match Decoder::new(BufReader::new(file)) {
            Ok(source) => source,
            Err(e) => {
                return PlaybackOutcome::Failed(format!("cannot decode {}: {}", path.display(), e));
            }
        };

        sink.append(source);
        while !sink.empty() {
            if stop.load(Ordering::SeqCst) {
                sink.stop();
                log::debug!("Playback of {} stopped", path.display());
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        PlaybackOutcome::Completed
    }
}

struct ActivePlayback {
    ticket: Ticket,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

/// Message sent when a playback ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub ticket: Ticket,
    pub outcome: PlaybackOutcome,
}

pub struct AudioBridge {
    player: Arc<dyn Player>,
    reports: UnboundedSender<PlaybackReport>,
    active: Option<ActivePlayback>,
    /// Held by the worker for the whole playback
    device: Arc<Mutex<()>>,
}

impl AudioBridge {
    pub fn new(player: Arc<dyn Player>, reports: UnboundedSender<PlaybackReport>) -> Self {
        Self {
            player,
            reports,
            active: None,
            device: Arc::new(Mutex::new(())),
        }
    }

    /// Start playing `audio` on a worker thread. Must be called from a tokio runtime.
    pub fn play(&mut self, ticket: Ticket, audio: PathBuf) -> Result<(), BridgeError> {
        if let Some(active) = &self.active {
            if !active.done.load(Ordering::SeqCst) {
                return Err(BridgeError::Busy(active.ticket));
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        self.active = Some(ActivePlayback {
            ticket,
            stop: Arc::clone(&stop),
            done: Arc::clone(&done),
        });

        log::debug!("Playing {} (ticket {})", audio.display(), ticket);
        let player = Arc::clone(&self.player);
        let reports = self.reports.clone();
        let device = Arc::clone(&self.device);
        tokio::task::spawn_blocking(move || {
            // A poisoned lock only means an earlier worker panicked
            let guard = device.lock().unwrap_or_else(|e| e.into_inner());
            let outcome = if stop.load(Ordering::SeqCst) {
                log::debug!("Playback {} stopped before it started", ticket);
                PlaybackOutcome::Completed
            } else {
                player.play_blocking(&audio, &stop)
            };
            drop(guard);
            done.store(true, Ordering::SeqCst);
            // The session may already be gone
            let _ = reports.send(PlaybackReport { ticket, outcome });
        });

        Ok(())
    }

    /// Stop the current playback, if any
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.done.load(Ordering::SeqCst))
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
