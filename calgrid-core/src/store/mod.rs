//! In-memory event store.
//!
//! Holds every loaded origin and its events. Origins are kept in lexical key
//! order, which is also the order color slots are handed out in.

mod origin;

pub use origin::Origin;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{CalGridError, CalGridResult};
use crate::event::{Event, EventKey, OriginKey};
use crate::ics::{EditSet, IcsCodec, ParseWarning};

#[derive(Debug, Default)]
pub struct EventStore {
    codec: IcsCodec,
    origins: BTreeMap<OriginKey, Origin>,
}

impl EventStore {
    pub fn new(codec: IcsCodec) -> Self {
        EventStore {
            codec,
            origins: BTreeMap::new(),
        }
    }

    pub fn codec(&self) -> &IcsCodec {
        &self.codec
    }

    /// Parse `raw_text` and replace everything held for `key`.
    ///
    /// A reloaded origin keeps its enabled state; a new one starts enabled.
    /// If the text cannot be parsed at all the previous state is left in place.
    pub fn load(&mut self, key: &OriginKey, raw_text: String) -> CalGridResult<Vec<ParseWarning>> {
        let parsed = self.codec.parse(key, &raw_text)?;
        let warnings = parsed.warnings.clone();
        let enabled = self.origins.get(key).is_none_or(Origin::is_enabled);

        self.origins
            .insert(key.clone(), Origin::new(key.clone(), raw_text, parsed, enabled));

        Ok(warnings)
    }

    pub fn contains(&self, key: &OriginKey) -> bool {
        self.origins.contains_key(key)
    }

    pub fn origin(&self, key: &OriginKey) -> CalGridResult<&Origin> {
        self.origins
            .get(key)
            .ok_or_else(|| CalGridError::NotFound(format!("origin '{key}'")))
    }

    /// All origins in key order.
    pub fn origins(&self) -> impl Iterator<Item = &Origin> {
        self.origins.values()
    }

    pub fn set_enabled(&mut self, key: &OriginKey, enabled: bool) -> CalGridResult<()> {
        let origin = self
            .origins
            .get_mut(key)
            .ok_or_else(|| CalGridError::NotFound(format!("origin '{key}'")))?;
        origin.set_enabled(enabled);
        Ok(())
    }

    /// Keys of enabled origins in lexical order.
    pub fn enabled_origins(&self) -> Vec<&OriginKey> {
        self.origins
            .values()
            .filter(|o| o.is_enabled())
            .map(Origin::key)
            .collect()
    }

    /// Position of `key` among the enabled origins, for deterministic coloring.
    pub fn color_slot(&self, key: &OriginKey) -> Option<usize> {
        self.enabled_origins().iter().position(|k| *k == key)
    }

    /// Events of all enabled origins, ordered by start, then origin key, then id.
    pub fn enabled_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .origins
            .values()
            .filter(|o| o.is_enabled())
            .flat_map(|o| o.events().iter().cloned())
            .collect();
        events.sort_by(|a, b| {
            a.start()
                .cmp(&b.start())
                .then_with(|| a.origin().cmp(b.origin()))
                .then_with(|| a.id().cmp(b.id()))
        });
        events
    }

    /// Enabled events intersecting `[from, to)`, in [`EventStore::enabled_events`] order.
    pub fn enabled_events_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Event> {
        self.enabled_events()
            .into_iter()
            .filter(|e| e.start() < to && e.end() > from)
            .collect()
    }

    pub fn event(&self, key: &EventKey) -> CalGridResult<&Event> {
        self.origins
            .get(&key.origin)
            .and_then(|o| o.event(&key.id))
            .ok_or_else(|| CalGridError::NotFound(format!("event '{key}'")))
    }

    /// Set new times on an event and flag it dirty.
    pub fn mark_dirty(
        &mut self,
        key: &EventKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CalGridResult<()> {
        let event = self
            .origins
            .get_mut(&key.origin)
            .and_then(|o| o.event_mut(&key.id))
            .ok_or_else(|| CalGridError::NotFound(format!("event '{key}'")))?;
        event.set_times(start, end)
    }

    /// Put an event back at times it already had on disk, clearing its dirty flag.
    pub(crate) fn restore_times(
        &mut self,
        key: &EventKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CalGridResult<()> {
        self.mark_dirty(key, start, end)?;
        if let Some(event) = self.origins.get_mut(&key.origin).and_then(|o| o.event_mut(&key.id)) {
            event.clear_dirty();
        }
        Ok(())
    }

    /// Current times of every dirty event, grouped by origin.
    pub fn dirty_events_by_origin(&self) -> BTreeMap<OriginKey, EditSet> {
        self.origins
            .values()
            .filter(|o| o.is_dirty())
            .map(|o| {
                let edits = o
                    .events()
                    .iter()
                    .filter(|e| e.is_dirty())
                    .map(|e| (e.id().to_string(), (e.start(), e.end())))
                    .collect();
                (o.key().clone(), edits)
            })
            .collect()
    }

    /// Record a successful write of `raw_text` for `key`.
    ///
    /// Events and spans are re-read from the written text. Only events whose
    /// times still equal what was written lose their dirty flag; anything
    /// moved again in the meantime keeps its newer times. If the text does not
    /// parse, the error is returned and the origin is left as it was.
    pub fn mark_saved(
        &mut self,
        key: &OriginKey,
        raw_text: String,
        saved: &EditSet,
    ) -> CalGridResult<()> {
        let origin = self
            .origins
            .get_mut(key)
            .ok_or_else(|| CalGridError::NotFound(format!("origin '{key}'")))?;
        let parsed = self.codec.parse(key, &raw_text)?;

        origin.replace_saved(raw_text, parsed, saved);
        Ok(())
    }

    /// Put every event of `key` back at the times in its current text.
    pub(crate) fn revert(&mut self, key: &OriginKey) {
        if let Some(origin) = self.origins.get_mut(key) {
            origin.revert();
        }
    }

    /// Drop every origin and event. Callers must reload before further use.
    pub fn discard_all(&mut self) {
        self.origins.clear();
    }
}
