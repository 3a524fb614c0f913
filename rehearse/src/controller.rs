//! Turn-taking playback controller.
//!
//! The controller owns the rehearsal session (position in the scene, whose turn
//! it is, which of the user's lines have been revealed) and decides every
//! transition. It performs no I/O: each operation returns the [`Effect`]s the
//! caller must carry out (start audio, arm or cancel a timer, redraw), and the
//! outcome of those effects comes back in as further calls.
//!
//! Timers and playbacks are identified by ids handed out here. A timer firing or
//! a playback outcome that does not carry the currently pending id is stale and
//! ignored, so nothing scheduled for an earlier line or session can act on the
//! current one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::render::{self, RenderedLine};
use crate::scene::{Line, Scene};

pub type TimerId = u64;
pub type Ticket = u64;

/// Where the session stands on its current line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Session created, current line not evaluated yet
    Idle,
    /// The user's line: text hidden until they confirm it
    AwaitingVerify,
    /// The user's line has been revealed, waiting to move on
    AwaitingContinue,
    /// Narration audio is playing
    NarratingAudio,
    /// Narration failed, moving on after a grace delay
    PlaybackFailed,
    /// Narration could not start, waiting for a retry
    PlaybackBlocked,
    /// Narrated line without audio, moving on after a short delay
    NarratingSilent,
    /// Past the last line
    Finished,
}

impl Phase {
    /// Whether nothing happens until the user acts
    pub fn awaits_user(&self) -> bool {
        matches!(
            self,
            Phase::AwaitingVerify | Phase::AwaitingContinue | Phase::PlaybackBlocked
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::AwaitingVerify => "awaiting-verify",
            Phase::AwaitingContinue => "awaiting-continue",
            Phase::NarratingAudio => "narrating-audio",
            Phase::PlaybackFailed => "playback-failed",
            Phase::PlaybackBlocked => "playback-blocked",
            Phase::NarratingSilent => "narrating-silent",
            Phase::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

/// How a `play` request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed(String),
    /// Playback could not start (no usable output device)
    Blocked(String),
}

/// Inputs the controller reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Confirm,
    Continue,
    Retry,
    Skip,
    Playback { ticket: Ticket, outcome: PlaybackOutcome },
    TimerFired(TimerId),
}

/// Work the caller must perform, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Play { ticket: Ticket, audio: PathBuf },
    StopPlayback,
    StartTimer { id: TimerId, delay: Duration },
    CancelTimer { id: TimerId },
    Render,
    Fault(String),
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("scene {0} has no lines")]
    EmptyScene(String),

    #[error("role {role} does not appear in scene {scene}")]
    UnknownRole { role: String, scene: String },
}

/// Delays for the timer-driven transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub silent_delay: Duration,
    pub failure_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            silent_delay: Duration::from_millis(1500),
            failure_grace: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug)]
struct Session {
    scene: Arc<Scene>,
    role: String,
    index: usize,
    phase: Phase,
    revealed: Vec<bool>,
    pending_timer: Option<TimerId>,
    playing: Option<Ticket>,
}

impl Session {
    fn line(&self) -> &Line {
        &self.scene.lines()[self.index]
    }

    /// Invalidate whatever the current turn has in flight
    fn cancel_pending(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(id) = self.pending_timer.take() {
            effects.push(Effect::CancelTimer { id });
        }
        if self.playing.take().is_some() {
            effects.push(Effect::StopPlayback);
        }
        effects
    }
}

pub struct Controller {
    timing: Timing,
    session: Option<Session>,
    next_id: u64,
}

impl Controller {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            session: None,
            next_id: 1,
        }
    }

    /// Begin a new session, discarding any previous one
    pub fn start(&mut self, scene: Arc<Scene>, role: &str) -> Result<Vec<Effect>, StartError> {
        if scene.is_empty() {
            return Err(StartError::EmptyScene(scene.name().to_string()));
        }
        if !scene.has_speaker(role) {
            return Err(StartError::UnknownRole {
                role: role.to_string(),
                scene: scene.name().to_string(),
            });
        }

        let mut effects = match self.session.as_mut() {
            Some(previous) => previous.cancel_pending(),
            None => Vec::new(),
        };

        log::debug!("Starting scene {} as {}", scene.name(), role);
        self.session = Some(Session {
            revealed: vec![false; scene.len()],
            scene,
            role: role.to_string(),
            index: 0,
            phase: Phase::Idle,
            pending_timer: None,
            playing: None,
        });

        effects.extend(self.evaluate());
        Ok(effects)
    }

    /// Move to the next line, or finish after the last one
    pub fn advance(&mut self) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.phase == Phase::Finished {
            return Vec::new();
        }

        let mut effects = session.cancel_pending();

        if session.index + 1 >= session.scene.len() {
            log::debug!("Scene {} finished", session.scene.name());
            session.phase = Phase::Finished;
            effects.push(Effect::Render);
            effects.push(Effect::Finished);
            return effects;
        }

        session.index += 1;
        effects.extend(self.evaluate());
        effects
    }

    /// Reveal the user's current line
    pub fn confirm_user_line(&mut self) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.phase != Phase::AwaitingVerify || session.line().speaker != session.role {
            log::debug!("Ignoring confirm in phase {}", session.phase);
            return Vec::new();
        }

        let index = session.index;
        session.revealed[index] = true;
        session.phase = Phase::AwaitingContinue;
        vec![Effect::Render]
    }

    /// Move on once the user's line has been revealed
    pub fn continue_from_user_line(&mut self) -> Vec<Effect> {
        match self.phase() {
            Some(Phase::AwaitingContinue) => self.advance(),
            phase => {
                log::debug!("Ignoring continue in phase {:?}", phase);
                Vec::new()
            }
        }
    }

    /// Try the current line's narration again after it was blocked
    pub fn retry_playback(&mut self) -> Vec<Effect> {
        if self.phase() != Some(Phase::PlaybackBlocked) {
            log::debug!("Ignoring retry in phase {:?}", self.phase());
            return Vec::new();
        }

        let ticket = self.next_id();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let Some(audio) = session.line().audio.clone() else {
            return Vec::new();
        };

        session.playing = Some(ticket);
        session.phase = Phase::NarratingAudio;
        vec![Effect::Render, Effect::Play { ticket, audio }]
    }

    /// Outcome of the `play` identified by `ticket`
    pub fn playback_finished(&mut self, ticket: Ticket, outcome: PlaybackOutcome) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.phase != Phase::NarratingAudio || session.playing != Some(ticket) {
            log::debug!("Ignoring stale playback outcome for ticket {}", ticket);
            return Vec::new();
        }
        session.playing = None;

        match outcome {
            PlaybackOutcome::Completed => self.advance(),
            PlaybackOutcome::Failed(reason) => {
                let id = self.next_id();
                let grace = self.timing.failure_grace;
                let Some(session) = self.session.as_mut() else {
                    return Vec::new();
                };
                log::warn!("Narration of line {} failed: {}", session.index, reason);
                session.phase = Phase::PlaybackFailed;
                session.pending_timer = Some(id);
                vec![
                    Effect::Render,
                    Effect::Fault(format!("Audio error: {}", reason)),
                    Effect::StartTimer { id, delay: grace },
                ]
            }
            PlaybackOutcome::Blocked(reason) => {
                log::warn!("Narration of line {} blocked: {}", session.index, reason);
                session.phase = Phase::PlaybackBlocked;
                vec![
                    Effect::Render,
                    Effect::Fault(format!("Playback blocked: {}", reason)),
                ]
            }
        }
    }

    /// A timer armed by this controller went off
    pub fn timer_fired(&mut self, id: TimerId) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let timed_phase = matches!(session.phase, Phase::PlaybackFailed | Phase::NarratingSilent);
        if !timed_phase || session.pending_timer != Some(id) {
            log::debug!("Ignoring stale timer {}", id);
            return Vec::new();
        }

        session.pending_timer = None;
        self.advance()
    }

    /// Apply one event
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Confirm => self.confirm_user_line(),
            Event::Continue => self.continue_from_user_line(),
            Event::Retry => self.retry_playback(),
            Event::Skip => self.advance(),
            Event::Playback { ticket, outcome } => self.playback_finished(ticket, outcome),
            Event::TimerFired(id) => self.timer_fired(id),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        self.session.as_ref().map(|s| s.phase)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.index)
    }

    pub fn current_line(&self) -> Option<&Line> {
        self.session
            .as_ref()
            .filter(|s| s.phase != Phase::Finished)
            .map(|s| s.line())
    }

    #[cfg(test)]
    pub fn is_revealed(&self, index: usize) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.revealed.get(index).copied())
            .unwrap_or(false)
    }

    /// Display projection of the whole scene
    pub fn view(&self) -> Vec<RenderedLine> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let active = (session.phase != Phase::Finished).then_some(session.index);
        render::project(
            session.scene.lines(),
            active,
            &session.role,
            &session.revealed,
        )
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Decide the turn for the current line
    fn evaluate(&mut self) -> Vec<Effect> {
        let id = self.next_id();
        let silent_delay = self.timing.silent_delay;
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let line = session.line();
        if line.speaker == session.role {
            session.phase = Phase::AwaitingVerify;
            return vec![Effect::Render];
        }

        match line.audio.clone() {
            Some(audio) => {
                session.phase = Phase::NarratingAudio;
                session.playing = Some(id);
                vec![Effect::Render, Effect::Play { ticket: id, audio }]
            }
            None => {
                session.phase = Phase::NarratingSilent;
                session.pending_timer = Some(id);
                vec![
                    Effect::Render,
                    Effect::StartTimer {
                        id,
                        delay: silent_delay,
                    },
                ]
            }
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(Timing::default())
    }
}
