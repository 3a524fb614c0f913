// Terminal rehearsal loop: feeds input, timers and playback reports to the controller

use anyhow::Result;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::audio::{AudioBridge, PlaybackReport, Player};
use crate::controller::{Controller, Effect, Event, Phase, PlaybackOutcome, TimerId, Timing};
use crate::render;
use crate::scene::Scene;

/// A command typed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Enter: verify, continue or retry depending on the turn
    Primary,
    Skip,
    Restart,
    Quit,
}

/// Map a typed line to a command
pub fn parse_input(line: &str) -> Option<Input> {
    match line.trim().to_lowercase().as_str() {
        "" => Some(Input::Primary),
        "s" | "skip" | "n" | "next" => Some(Input::Skip),
        "r" | "restart" => Some(Input::Restart),
        "q" | "quit" | "exit" => Some(Input::Quit),
        _ => None,
    }
}

/// Forward lines from `reader` as commands until it closes.
///
/// Runs on its own thread: a pending terminal read cannot be cancelled.
pub fn spawn_input_reader<R>(reader: R, inputs: UnboundedSender<Input>) -> std::thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Failed to read input: {}", e);
                    break;
                }
            };
            match parse_input(&line) {
                Some(input) => {
                    if inputs.send(input).is_err() {
                        break;
                    }
                }
                None => log::info!("Unknown command {:?} (Enter, s, r or q)", line.trim()),
            }
        }
    })
}

/// How a rehearsal ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Quit,
    InputClosed,
}

/// Display settings for the rehearsal view
#[derive(Debug, Clone, Copy)]
pub struct ViewOptions {
    pub before: usize,
    pub after: usize,
}

enum SessionEvent {
    Timer(TimerId),
    Playback(PlaybackReport),
}

pub struct Rehearsal<W: Write> {
    controller: Controller,
    bridge: AudioBridge,
    view: ViewOptions,
    out: W,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    timer: Option<(TimerId, JoinHandle<()>)>,
    fault: Option<(usize, String)>,
}

impl<W: Write> Rehearsal<W> {
    /// Must be called from a tokio runtime
    pub fn new(timing: Timing, view: ViewOptions, player: Arc<dyn Player>, out: W) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (reports_tx, mut reports_rx) = mpsc::unbounded_channel::<PlaybackReport>();

        let forward = events_tx.clone();
        tokio::spawn(async move {
            while let Some(report) = reports_rx.recv().await {
                if forward.send(SessionEvent::Playback(report)).is_err() {
                    break;
                }
            }
        });

        Self {
            controller: Controller::new(timing),
            bridge: AudioBridge::new(player, reports_tx),
            view,
            out,
            events_tx,
            events_rx,
            timer: None,
            fault: None,
        }
    }

    /// Rehearse `scene` as `role` until it ends, the user quits, or input closes
    /// while the scene waits on the user
    pub async fn run(
        mut self,
        scene: Arc<Scene>,
        role: &str,
        mut inputs: UnboundedReceiver<Input>,
    ) -> Result<Outcome> {
        let effects = self.controller.start(Arc::clone(&scene), role)?;
        self.apply(effects)?;

        let mut input_closed = false;

        loop {
            if input_closed {
                match self.controller.phase() {
                    Some(Phase::Finished) => return Ok(Outcome::Finished),
                    Some(phase) if phase.awaits_user() => {
                        writeln!(self.out, "Input closed, leaving the rehearsal.")?;
                        return Ok(Outcome::InputClosed);
                    }
                    _ => {}
                }
            }

            let effects = tokio::select! {
                input = inputs.recv(), if !input_closed => match input {
                    Some(Input::Quit) => {
                        self.shutdown();
                        return Ok(Outcome::Quit);
                    }
                    Some(Input::Restart) => {
                        self.fault = None;
                        self.controller.start(Arc::clone(&scene), role)?
                    }
                    Some(Input::Skip) => self.controller.handle(Event::Skip),
                    Some(Input::Primary) => self.primary_action(),
                    None => {
                        input_closed = true;
                        Vec::new()
                    }
                },
                Some(event) = self.events_rx.recv() => match event {
                    SessionEvent::Timer(id) => {
                        if self.timer.as_ref().is_some_and(|(pending, _)| *pending == id) {
                            self.timer = None;
                        }
                        self.controller.handle(Event::TimerFired(id))
                    }
                    SessionEvent::Playback(report) => self.controller.handle(Event::Playback {
                        ticket: report.ticket,
                        outcome: report.outcome,
                    }),
                },
            };

            self.apply(effects)?;
        }
    }

    /// Enter does whatever the current turn is waiting for
    fn primary_action(&mut self) -> Vec<Effect> {
        match self.controller.phase() {
            Some(Phase::AwaitingVerify) => self.controller.handle(Event::Confirm),
            Some(Phase::AwaitingContinue) => self.controller.handle(Event::Continue),
            Some(Phase::PlaybackBlocked) => self.controller.handle(Event::Retry),
            _ => Vec::new(),
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Result<()> {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Play { ticket, audio } => {
                    if let Err(e) = self.bridge.play(ticket, audio) {
                        log::error!("{}", e);
                        queue.extend(self.controller.handle(Event::Playback {
                            ticket,
                            outcome: PlaybackOutcome::Failed(e.to_string()),
                        }));
                    }
                }
                Effect::StopPlayback => self.bridge.stop(),
                Effect::StartTimer { id, delay } => {
                    self.cancel_timer();
                    let events = self.events_tx.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = events.send(SessionEvent::Timer(id));
                    });
                    self.timer = Some((id, handle));
                }
                Effect::CancelTimer { id } => {
                    if self.timer.as_ref().is_some_and(|(pending, _)| *pending == id) {
                        self.cancel_timer();
                    }
                }
                Effect::Render => self.render()?,
                Effect::Fault(message) => {
                    let index = self.controller.current_index().unwrap_or(0);
                    writeln!(self.out, "  ! {}", message)?;
                    self.fault = Some((index, message));
                }
                Effect::Finished => {
                    writeln!(self.out, "Scene complete.")?;
                }
            }
        }

        self.out.flush()?;
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let view = self.controller.view();
        write!(
            self.out,
            "\n{}",
            render::format_view(&view, self.view.before, self.view.after)
        )?;

        if let Some(phase) = self.controller.phase() {
            let speaker = self.controller.current_line().map(|l| l.speaker.as_str());
            writeln!(self.out, "{}", render::status_line(phase, speaker))?;
        }

        // A fault stays visible until the session moves to another line
        let index = self.controller.current_index();
        if self.fault.as_ref().is_some_and(|(at, _)| Some(*at) != index) {
            self.fault = None;
        }
        if let Some((_, message)) = &self.fault {
            writeln!(self.out, "  ! {}", message)?;
        }
        Ok(())
    }

    fn cancel_timer(&mut self) {
        if let Some((_, handle)) = self.timer.take() {
            handle.abort();
        }
    }

    fn shutdown(&mut self) {
        self.cancel_timer();
        if self.bridge.is_playing() {
            log::debug!("Stopping narration");
        }
        self.bridge.stop();
    }
}
