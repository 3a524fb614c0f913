// Terminal view of a rehearsal

use std::fmt::Write;

use crate::controller::Phase;
use crate::scene::Line;

const MASK: char = '·';
const RULE_WIDTH: usize = 60;

/// Text of a line as it may be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineText {
    Visible(String),
    /// The user's line before it is revealed, masked but keeping its shape
    Obscured(String),
}

impl LineText {
    pub fn as_str(&self) -> &str {
        match self {
            LineText::Visible(text) | LineText::Obscured(text) => text,
        }
    }
}

/// One line of the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub index: usize,
    pub speaker: String,
    pub action: Option<String>,
    pub text: LineText,
    pub active: bool,
    /// Spoken by the user's role
    pub user_line: bool,
}

/// Project the scene into display lines
pub fn project(
    lines: &[Line],
    active: Option<usize>,
    role: &str,
    revealed: &[bool],
) -> Vec<RenderedLine> {
    lines
        .iter()
        .map(|line| {
            let user_line = line.speaker == role;
            let shown = !user_line || revealed.get(line.index).copied().unwrap_or(false);
            let text = if shown {
                LineText::Visible(line.text.clone())
            } else {
                LineText::Obscured(mask(&line.text))
            };

            RenderedLine {
                index: line.index,
                speaker: line.speaker.clone(),
                action: line.action.clone(),
                text,
                active: active == Some(line.index),
                user_line,
            }
        })
        .collect()
}

/// Replace letters and digits, keep spacing and punctuation
pub fn mask(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { MASK } else { c })
        .collect()
}

/// What the user should do or expect in this phase
pub fn status_line(phase: Phase, speaker: Option<&str>) -> String {
    let speaker = speaker.unwrap_or("");
    match phase {
        Phase::Idle => "Waiting...".to_string(),
        Phase::AwaitingVerify => "YOUR LINE. Say it, then press Enter to check.".to_string(),
        Phase::AwaitingContinue => "Press Enter to continue.".to_string(),
        Phase::NarratingAudio => format!("{} is speaking...", speaker),
        Phase::PlaybackFailed => "Audio error, moving on shortly...".to_string(),
        Phase::PlaybackBlocked => "PLAYBACK BLOCKED. Press Enter to retry, s to skip.".to_string(),
        Phase::NarratingSilent => format!("{} is speaking...", speaker),
        Phase::Finished => "END OF SCENE. Press r to start over, q to quit.".to_string(),
    }
}

/// Format the lines around the active one.
///
/// With no active line (finished scene) the window ends on the last line.
pub fn format_view(view: &[RenderedLine], before: usize, after: usize) -> String {
    let mut out = String::new();
    if view.is_empty() {
        return out;
    }

    let anchor = view
        .iter()
        .position(|line| line.active)
        .unwrap_or(view.len() - 1);
    let start = anchor.saturating_sub(before);
    let end = (anchor + after + 1).min(view.len());

    let _ = writeln!(out, "{:-<width$}", "", width = RULE_WIDTH);
    if start > 0 {
        let _ = writeln!(out, "   ...");
    }

    for line in &view[start..end] {
        let marker = match (line.active, line.user_line) {
            (true, true) => "=>",
            (true, false) => "> ",
            _ => "  ",
        };
        let _ = writeln!(out, "{} {:>3}  {}", marker, line.index + 1, line.speaker);
        if let Some(action) = &line.action {
            let _ = writeln!(out, "         [{}]", action);
        }
        if !line.text.as_str().is_empty() {
            let _ = writeln!(out, "         {}", line.text.as_str());
        }
    }

    if end < view.len() {
        let _ = writeln!(out, "   ...");
    }
    let _ = writeln!(out, "{:-<width$}", "", width = RULE_WIDTH);
    out
}
