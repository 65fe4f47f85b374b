//! A loaded source and the events it produced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::event::{Event, OriginKey};
use crate::ics::{EditSet, EntrySpan, ParseWarning, ParsedSource};

#[derive(Debug, Clone)]
pub struct Origin {
    key: OriginKey,
    raw_text: String,
    enabled: bool,
    events: Vec<Event>,
    spans: Vec<EntrySpan>,
    warnings: Vec<ParseWarning>,
    /// Times as they stand in `raw_text`, by event id.
    on_disk: BTreeMap<String, (DateTime<Utc>, DateTime<Utc>)>,
}

impl Origin {
    pub(super) fn new(key: OriginKey, raw_text: String, parsed: ParsedSource, enabled: bool) -> Self {
        let mut origin = Origin {
            key,
            raw_text,
            enabled,
            events: Vec::new(),
            spans: Vec::new(),
            warnings: Vec::new(),
            on_disk: BTreeMap::new(),
        };
        origin.take_parsed(parsed);
        origin
    }

    fn take_parsed(&mut self, parsed: ParsedSource) {
        self.on_disk = parsed
            .events
            .iter()
            .map(|e| (e.id().to_string(), (e.start(), e.end())))
            .collect();
        self.events = parsed.events;
        self.spans = parsed.spans;
        self.warnings = parsed.warnings;
        self.set_enabled(self.enabled);
    }

    pub fn key(&self) -> &OriginKey {
        &self.key
    }

    /// The source text as last loaded or saved.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Events in source order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Byte positions of each event in [`Origin::raw_text`], parallel to [`Origin::events`].
    pub fn spans(&self) -> &[EntrySpan] {
        &self.spans
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn is_dirty(&self) -> bool {
        self.events.iter().any(Event::is_dirty)
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        for event in &mut self.events {
            event.set_enabled(enabled);
        }
    }

    pub(super) fn event_mut(&mut self, id: &str) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.id() == id)
    }

    pub(super) fn event(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id() == id)
    }

    /// Switch to freshly written text. Events moved since `saved` was taken
    /// keep their newer times and stay dirty.
    pub(super) fn replace_saved(&mut self, raw_text: String, parsed: ParsedSource, saved: &EditSet) {
        let previous = std::mem::take(&mut self.events);
        self.raw_text = raw_text;
        self.take_parsed(parsed);

        for earlier in previous.iter().filter(|e| e.is_dirty()) {
            if saved.get(earlier.id()) == Some(&(earlier.start(), earlier.end())) {
                continue;
            }
            if let Some(event) = self.event_mut(earlier.id()) {
                event.keep_unsaved(earlier);
            }
        }
    }

    /// Put every event back at its times in [`Origin::raw_text`].
    pub(super) fn revert(&mut self) {
        for event in &mut self.events {
            if let Some(&(start, end)) = self.on_disk.get(event.id()) {
                event.reset_times(start, end);
            }
        }
    }
}
