//! Terminal rendering for calgrid-core types.
//!
//! Extension traits that add colored output using owo_colors. Sources are
//! colored by their color slot so every command paints a source the same way.

use calgrid_core::ics::ParseWarning;
use calgrid_core::{AcceptedShift, Event};
use chrono::Duration;
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

/// Paint `text` with the palette entry for a source's color slot.
pub fn paint(text: &str, slot: Option<usize>) -> String {
    match slot.map(|s| s % 6) {
        Some(0) => text.blue().to_string(),
        Some(1) => text.green().to_string(),
        Some(2) => text.magenta().to_string(),
        Some(3) => text.cyan().to_string(),
        Some(4) => text.yellow().to_string(),
        Some(5) => text.red().to_string(),
        _ => text.dimmed().to_string(),
    }
}

/// An event with the color slot of its source, ready to print in a day column.
pub struct Placed<'a> {
    pub event: &'a Event,
    pub slot: Option<usize>,
}

impl Render for Placed<'_> {
    fn render(&self) -> String {
        let event = self.event;
        let time = format!(
            "{}-{}",
            event.start().format("%H:%M"),
            event.end().format("%H:%M")
        );

        // One column per lane, the event's own marked.
        let lanes = match event.lane() {
            Some(lane) if lane.count > 1 => (0..lane.count)
                .map(|i| if i == lane.index { "█" } else { "·" })
                .collect::<String>(),
            _ => "█".to_string(),
        };

        let dirty = if event.is_dirty() {
            format!(" {}", "(unsaved)".yellow())
        } else {
            String::new()
        };

        format!(
            "  {} {} {} {}{}",
            time.dimmed(),
            paint(&lanes, self.slot),
            paint(event.title(), self.slot),
            format!("[{}]", event.id()).dimmed(),
            dirty
        )
    }
}

impl Render for ParseWarning {
    fn render(&self) -> String {
        let at = match &self.id {
            Some(id) => format!("line {} ({})", self.line, id),
            None => format!("line {}", self.line),
        };
        format!("   {} {} {}", "⚠".yellow(), at.dimmed(), self.reason)
    }
}

impl Render for AcceptedShift {
    fn render(&self) -> String {
        let mut line = format!(
            "{} {}",
            format_delta(self.accepted).bold(),
            format!(
                "→ {} - {}",
                self.start.format("%a %Y-%m-%d %H:%M"),
                self.end.format("%H:%M")
            )
            .dimmed()
        );
        if self.quantized != self.requested {
            line.push_str(&format!(
                " {}",
                format!("(asked {}, snapped to grid)", format_delta(self.requested)).dimmed()
            ));
        }
        if self.clamped() {
            line.push_str(&format!(" {}", "(clamped to week bounds)".yellow()));
        }
        line
    }
}

/// Signed, human readable duration: "+1h 15m", "-30m", "0s".
pub fn format_delta(delta: Duration) -> String {
    let sign = if delta < Duration::zero() { "-" } else { "+" };
    let abs = delta.abs().to_std().unwrap_or_default();
    if abs.is_zero() {
        return "0s".to_string();
    }
    format!("{sign}{}", humantime::format_duration(abs))
}

/// Simple pluralization helper
pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}
