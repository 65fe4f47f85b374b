//! Event and origin identity types.
//!
//! Every event lives in exactly one origin (a loaded source). Identifiers are
//! only unique within their origin, so cross-origin operations address events
//! through an [`EventKey`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{CalGridError, CalGridResult};

/// Opaque locator of a loaded source (usually a file path).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct OriginKey(String);

impl OriginKey {
    pub fn new(key: impl Into<String>) -> Self {
        OriginKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OriginKey {
    fn from(key: &str) -> Self {
        OriginKey::new(key)
    }
}

impl From<String> for OriginKey {
    fn from(key: String) -> Self {
        OriginKey(key)
    }
}

/// Globally unique address of an event: its origin plus its UID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventKey {
    pub origin: OriginKey,
    pub id: String,
}

impl EventKey {
    pub fn new(origin: impl Into<OriginKey>, id: impl Into<String>) -> Self {
        EventKey {
            origin: origin.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.id)
    }
}

/// Layout output: which column an event occupies within its overlap cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lane {
    pub index: usize,
    pub count: usize,
}

/// A timed calendar entry loaded from an origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    id: String,
    origin: OriginKey,
    title: String,
    description: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    enabled: bool,
    dirty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    lane: Option<Lane>,
}

impl Event {
    /// Create an event, rejecting ranges where `end <= start`.
    pub fn new(
        origin: impl Into<OriginKey>,
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CalGridResult<Self> {
        let id = id.into();
        if end <= start {
            return Err(CalGridError::InvalidRange { id });
        }

        Ok(Event {
            id,
            origin: origin.into(),
            title: title.into(),
            description: None,
            start,
            end,
            enabled: true,
            dirty: false,
            lane: None,
        })
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> &OriginKey {
        &self.origin
    }

    pub fn key(&self) -> EventKey {
        EventKey::new(self.origin.clone(), self.id.clone())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lane(&self) -> Option<Lane> {
        self.lane
    }

    pub fn lane_index(&self) -> Option<usize> {
        self.lane.map(|l| l.index)
    }

    pub fn lane_count(&self) -> Option<usize> {
        self.lane.map(|l| l.count)
    }

    /// Half-open overlap test on `[start, end)`.
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub(crate) fn set_times(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> CalGridResult<()> {
        if end <= start {
            return Err(CalGridError::InvalidRange {
                id: self.id.clone(),
            });
        }
        self.start = start;
        self.end = end;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Take the unsaved times of an earlier copy of this event.
    pub(crate) fn keep_unsaved(&mut self, earlier: &Event) {
        self.start = earlier.start;
        self.end = earlier.end;
        self.dirty = earlier.dirty;
    }

    /// Go back to times read from the source. Those already passed the range check.
    pub(crate) fn reset_times(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.start = start;
        self.end = end;
        self.dirty = false;
    }

    pub(crate) fn set_lane(&mut self, lane: Lane) {
        self.lane = Some(lane);
    }

    /// Layout-only constructor: zero-length ranges are allowed here so lane
    /// assignment can be exercised on instants.
    #[cfg(test)]
    pub(crate) fn instant(origin: &str, id: &str, at: DateTime<Utc>) -> Self {
        Event {
            id: id.to_string(),
            origin: OriginKey::new(origin),
            title: id.to_string(),
            description: None,
            start: at,
            end: at,
            enabled: true,
            dirty: false,
            lane: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_rejects_non_positive_duration() {
        let at = Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap();
        assert!(matches!(
            Event::new("a.ics", "x", "X", at, at),
            Err(CalGridError::InvalidRange { .. })
        ));
        assert!(Event::new("a.ics", "x", "X", at, at + Duration::minutes(1)).is_ok());
    }

    #[test]
    fn test_overlap_is_half_open() {
        let nine = Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap();
        let ten = nine + Duration::hours(1);
        let a = Event::new("a.ics", "a", "A", nine, ten).unwrap();
        let b = Event::new("a.ics", "b", "B", ten, ten + Duration::hours(1)).unwrap();
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn test_set_times_marks_dirty_and_keeps_invariant() {
        let nine = Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap();
        let mut e = Event::new("a.ics", "a", "A", nine, nine + Duration::hours(1)).unwrap();
        assert!(e.set_times(nine, nine).is_err());
        assert!(!e.is_dirty());
        e.set_times(nine + Duration::minutes(15), nine + Duration::minutes(75))
            .unwrap();
        assert!(e.is_dirty());
        assert_eq!(e.key().to_string(), "a.ics#a");
    }
}
