//! Load, save and discard coordination.
//!
//! [`Engine`] owns the event store and a [`SourceIo`] adapter. It is the
//! single entry point for a UI or CLI: every method takes `&self`, the store
//! sits behind a read/write lock, and save, discard and load serialize on a
//! separate persist lock so they never interleave.

mod io;

pub use io::{FsSourceIo, MemorySourceIo, SourceIo};

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::error::{CalGridError, CalGridResult};
use crate::event::{Event, EventKey, OriginKey};
use crate::ics::{EditSet, IcsCodec, ParseWarning};
use crate::layout;
use crate::reschedule::{AcceptedShift, Bounds, DEFAULT_GRID_MINUTES, DragSession, Rescheduler};
use crate::store::EventStore;

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub grid: Duration,
    /// Zone for times that carry neither `Z` nor `TZID`.
    pub floating_tz: Tz,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            grid: Duration::minutes(DEFAULT_GRID_MINUTES),
            floating_tz: Tz::UTC,
        }
    }
}

/// Per-origin outcome of a bulk operation, in origin key order.
#[derive(Debug)]
pub struct OriginReport<T> {
    results: BTreeMap<OriginKey, CalGridResult<T>>,
}

impl<T> Default for OriginReport<T> {
    fn default() -> Self {
        OriginReport {
            results: BTreeMap::new(),
        }
    }
}

impl<T> OriginReport<T> {
    fn insert(&mut self, key: OriginKey, result: CalGridResult<T>) {
        self.results.insert(key, result);
    }

    pub fn get(&self, key: &OriginKey) -> Option<&CalGridResult<T>> {
        self.results.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OriginKey, &CalGridResult<T>)> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&OriginKey, &CalGridError)> {
        self.results
            .iter()
            .filter_map(|(key, result)| result.as_ref().err().map(|e| (key, e)))
    }
}

impl<T> IntoIterator for OriginReport<T> {
    type Item = (OriginKey, CalGridResult<T>);
    type IntoIter = std::collections::btree_map::IntoIter<OriginKey, CalGridResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// What one successful save wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedOrigin {
    /// Ids of the events whose times were written.
    pub events: Vec<String>,
    pub bytes: usize,
}

pub type SaveReport = OriginReport<SavedOrigin>;
pub type LoadReport = OriginReport<Vec<ParseWarning>>;

/// Where [`Engine::discard_all`] takes the text it reloads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardSource {
    /// The text each origin was last loaded or saved with.
    LastKnownGood,
    /// Whatever the adapter returns now.
    Disk,
}

pub struct Engine<S: SourceIo> {
    io: S,
    store: RwLock<EventStore>,
    rescheduler: Rescheduler,
    persist: Mutex<()>,
}

impl<S: SourceIo> Engine<S> {
    pub fn new(io: S) -> Self {
        Engine::with_options(io, EngineOptions::default())
    }

    pub fn with_options(io: S, options: EngineOptions) -> Self {
        Engine {
            io,
            store: RwLock::new(EventStore::new(IcsCodec::new(options.floating_tz))),
            rescheduler: Rescheduler::new(options.grid),
            persist: Mutex::new(()),
        }
    }

    pub fn io(&self) -> &S {
        &self.io
    }

    pub fn rescheduler(&self) -> &Rescheduler {
        &self.rescheduler
    }

    /// Read access to the store. Do not hold it across other engine calls.
    pub fn store(&self) -> RwLockReadGuard<'_, EventStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_mut(&self) -> RwLockWriteGuard<'_, EventStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_guard(&self) -> MutexGuard<'_, ()> {
        self.persist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read `key` through the adapter and (re)load it into the store.
    pub fn load(&self, key: &OriginKey) -> CalGridResult<Vec<ParseWarning>> {
        let _guard = self.persist_guard();
        let raw = self.io.read(key)?;
        self.store_mut().load(key, raw)
    }

    /// Load several origins. One failing never stops the rest.
    pub fn load_all<'a>(&self, keys: impl IntoIterator<Item = &'a OriginKey>) -> LoadReport {
        let mut report = LoadReport::default();
        for key in keys {
            report.insert(key.clone(), self.load(key));
        }
        report
    }

    /// Patch and write back every origin holding a dirty event.
    ///
    /// The source is re-read through the adapter and patched as it is now, so
    /// changes other programs made to untouched entries are kept. An event
    /// that has disappeared from the source fails that origin with
    /// `UnknownId`.
    ///
    /// Patched text that would not load again is never written.
    ///
    /// Each origin is handled on its own: a read, patch or write failure is
    /// recorded for that origin, leaves its source and dirty flags untouched,
    /// and does not stop the others.
    pub fn save_all(&self) -> SaveReport {
        let _guard = self.persist_guard();

        let (codec, pending) = {
            let store = self.store();
            (*store.codec(), store.dirty_events_by_origin())
        };

        let mut report = SaveReport::default();
        for (key, edits) in pending {
            let result = self.save_origin(&codec, &key, &edits);
            report.insert(key, result);
        }
        report
    }

    fn save_origin(
        &self,
        codec: &IcsCodec,
        key: &OriginKey,
        edits: &EditSet,
    ) -> CalGridResult<SavedOrigin> {
        let current = self.io.read(key)?;
        let patched = codec.patch(key, &current, edits)?;
        // Never write text that would not load again.
        codec.parse(key, &patched)?;
        self.io.write_atomic(key, &patched)?;

        let saved = SavedOrigin {
            events: edits.keys().cloned().collect(),
            bytes: patched.len(),
        };
        self.store_mut().mark_saved(key, patched, edits)?;
        Ok(saved)
    }

    /// Throw away every unsaved change by reloading all origins.
    ///
    /// Enabled toggles survive. An origin whose fresh text cannot be read or
    /// parsed is restored from its last known good text and the error is
    /// reported for it. If that text no longer parses either, the origin is
    /// kept as it was with every unsaved move reverted, so nothing is dropped.
    pub fn discard_all(&self, from: DiscardSource) -> LoadReport {
        let _guard = self.persist_guard();

        let snapshot: Vec<(OriginKey, String)> = self
            .store()
            .origins()
            .map(|o| (o.key().clone(), o.raw_text().to_string()))
            .collect();

        let fresh: Vec<CalGridResult<String>> = snapshot
            .iter()
            .map(|(key, last_good)| match from {
                DiscardSource::LastKnownGood => Ok(last_good.clone()),
                DiscardSource::Disk => self.io.read(key),
            })
            .collect();

        // A failed load leaves the previous origin, toggle included, in place.
        let mut store = self.store_mut();
        let mut report = LoadReport::default();
        for ((key, last_good), text) in snapshot.into_iter().zip(fresh) {
            let result = text.and_then(|text| store.load(&key, text));
            if result.is_err() && store.load(&key, last_good).is_err() {
                store.revert(&key);
            }
            report.insert(key, result);
        }
        report
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.store().origins().any(|o| o.is_dirty())
    }

    pub fn set_enabled(&self, key: &OriginKey, enabled: bool) -> CalGridResult<()> {
        self.store_mut().set_enabled(key, enabled)
    }

    pub fn enabled_events(&self) -> Vec<Event> {
        self.store().enabled_events()
    }

    pub fn event(&self, key: &EventKey) -> CalGridResult<Event> {
        self.store().event(key).cloned()
    }

    /// Enabled events intersecting `[from, to)` with lanes assigned.
    ///
    /// Pass one day column at a time; lanes are computed across the whole window.
    pub fn laid_out_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Event> {
        layout::layout(self.store().enabled_events_between(from, to))
    }

    pub fn color_slot(&self, key: &OriginKey) -> Option<usize> {
        self.store().color_slot(key)
    }

    pub fn propose_shift(
        &self,
        key: &EventKey,
        delta: Duration,
        bounds: &Bounds,
    ) -> CalGridResult<AcceptedShift> {
        self.rescheduler
            .propose_shift(&mut self.store_mut(), key, delta, bounds)
    }

    pub fn begin_drag(&self, key: &EventKey) -> CalGridResult<DragSession> {
        DragSession::begin(&self.store(), key)
    }

    /// Feed the next raw delta of a drag started with [`Engine::begin_drag`].
    pub fn drag(
        &self,
        session: &mut DragSession,
        delta: Duration,
        bounds: &Bounds,
    ) -> CalGridResult<AcceptedShift> {
        session.update(&self.rescheduler, &mut self.store_mut(), delta, bounds)
    }
}
