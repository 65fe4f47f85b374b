//! Snap-to-grid rescheduling.
//!
//! A proposed shift is quantized to the grid, then kept inside caller
//! supplied bounds by sliding the whole event back to the nearest boundary.
//! Start and end always move together, so duration never changes.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};

use crate::error::{CalGridError, CalGridResult};
use crate::event::EventKey;
use crate::store::EventStore;

/// Grid unit used when none is configured.
pub const DEFAULT_GRID_MINUTES: i64 = 15;

/// The window an event has to stay inside while being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub lower: DateTime<Utc>,
    pub upper: DateTime<Utc>,
}

impl Bounds {
    pub fn new(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Self {
        Bounds { lower, upper }
    }

    /// The UTC week containing `at`, starting at midnight on `week_start`.
    pub fn week_of(at: DateTime<Utc>, week_start: Weekday) -> Self {
        let date = at.date_naive();
        let back = (7 + date.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
        let lower = (date - Duration::days(i64::from(back)))
            .and_time(NaiveTime::MIN)
            .and_utc();
        Bounds {
            lower,
            upper: lower + Duration::days(7),
        }
    }

    pub fn span(&self) -> Duration {
        self.upper - self.lower
    }
}

/// Outcome of a shift request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedShift {
    /// What the caller asked for.
    pub requested: Duration,
    /// `requested` snapped to the grid.
    pub quantized: Duration,
    /// What was actually applied after clamping to the bounds.
    pub accepted: Duration,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AcceptedShift {
    pub fn clamped(&self) -> bool {
        self.accepted != self.quantized
    }

    pub fn is_noop(&self) -> bool {
        self.accepted.is_zero()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rescheduler {
    grid: Duration,
}

impl Default for Rescheduler {
    fn default() -> Self {
        Rescheduler {
            grid: Duration::minutes(DEFAULT_GRID_MINUTES),
        }
    }
}

impl Rescheduler {
    /// A rescheduler snapping to `grid`. Non-positive grids fall back to the default.
    pub fn new(grid: Duration) -> Self {
        if grid <= Duration::zero() {
            return Rescheduler::default();
        }
        Rescheduler { grid }
    }

    pub fn grid(&self) -> Duration {
        self.grid
    }

    /// Snap `delta` to a multiple of the grid.
    ///
    /// Forward moves go to the nearest multiple, an exact half-step staying
    /// put. Backward moves only count whole grid units. With a 15 minute
    /// grid: 7m → 0, 8m → 15m, 7m30s → 0, -23m → -15m, -14m → 0.
    pub fn quantize(&self, delta: Duration) -> Duration {
        let grid = self.grid.num_milliseconds();
        let delta_ms = delta.num_milliseconds();

        let whole = delta_ms / grid;
        let steps = if delta_ms > 0 && 2 * (delta_ms % grid) > grid {
            whole + 1
        } else {
            whole
        };
        // Rounding up past the largest representable delta rounds down instead.
        Duration::milliseconds(steps.checked_mul(grid).unwrap_or(whole * grid))
    }

    /// Compute where `[start, end)` would land for `delta`, without touching anything.
    ///
    /// `key` only labels the error.
    pub fn validate_shift(
        &self,
        key: &EventKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        delta: Duration,
        bounds: &Bounds,
    ) -> CalGridResult<AcceptedShift> {
        let duration = end - start;
        if bounds.upper < bounds.lower {
            return Err(CalGridError::OutOfBounds {
                key: key.clone(),
                reason: "bounds end before they start".to_string(),
            });
        }
        if duration > bounds.span() {
            return Err(CalGridError::OutOfBounds {
                key: key.clone(),
                reason: format!(
                    "event lasts {}m but bounds only span {}m",
                    duration.num_minutes(),
                    bounds.span().num_minutes()
                ),
            });
        }

        let quantized = self.quantize(delta);
        let latest = bounds.upper - duration;
        // A shift too large for the calendar lands on the boundary it points at.
        let new_start = match start.checked_add_signed(quantized) {
            Some(shifted) => shifted.clamp(bounds.lower, latest),
            None if quantized > Duration::zero() => latest,
            None => bounds.lower,
        };

        Ok(AcceptedShift {
            requested: delta,
            quantized,
            accepted: new_start - start,
            start: new_start,
            end: new_start + duration,
        })
    }

    /// Validate a shift and apply it to the store.
    ///
    /// The event is only marked dirty when it actually moves.
    pub fn propose_shift(
        &self,
        store: &mut EventStore,
        key: &EventKey,
        delta: Duration,
        bounds: &Bounds,
    ) -> CalGridResult<AcceptedShift> {
        let event = store.event(key)?;
        let shift = self.validate_shift(key, event.start(), event.end(), delta, bounds)?;
        if !shift.is_noop() {
            store.mark_dirty(key, shift.start, shift.end)?;
        }
        Ok(shift)
    }
}

/// One drag gesture on one event.
///
/// Raw deltas are accumulated and the quantized total is applied relative to
/// where the event was when the drag began, so many small moves add up the
/// same way one large move would.
#[derive(Debug, Clone)]
pub struct DragSession {
    key: EventKey,
    origin_start: DateTime<Utc>,
    origin_end: DateTime<Utc>,
    raw_total: Duration,
    applied: Duration,
    was_dirty: bool,
}

impl DragSession {
    pub fn begin(store: &EventStore, key: &EventKey) -> CalGridResult<Self> {
        let event = store.event(key)?;
        Ok(DragSession {
            key: key.clone(),
            origin_start: event.start(),
            origin_end: event.end(),
            raw_total: Duration::zero(),
            applied: Duration::zero(),
            was_dirty: event.is_dirty(),
        })
    }

    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// Total shift currently applied relative to the drag's starting point.
    pub fn applied(&self) -> Duration {
        self.applied
    }

    /// Feed the next raw delta of the gesture.
    ///
    /// The returned shift describes the whole drag so far. A rejected update
    /// leaves both the session and the store as they were. Dragging back to
    /// the starting point leaves the event as clean as it was before the drag.
    pub fn update(
        &mut self,
        rescheduler: &Rescheduler,
        store: &mut EventStore,
        delta: Duration,
        bounds: &Bounds,
    ) -> CalGridResult<AcceptedShift> {
        let saturated = if delta > Duration::zero() {
            Duration::MAX
        } else {
            Duration::MIN
        };
        let raw_total = self.raw_total.checked_add(&delta).unwrap_or(saturated);
        let shift = rescheduler.validate_shift(
            &self.key,
            self.origin_start,
            self.origin_end,
            raw_total,
            bounds,
        )?;

        if shift.accepted != self.applied {
            if shift.is_noop() && !self.was_dirty {
                store.restore_times(&self.key, self.origin_start, self.origin_end)?;
            } else {
                store.mark_dirty(&self.key, shift.start, shift.end)?;
            }
        }
        self.raw_total = raw_total;
        self.applied = shift.accepted;
        Ok(shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
    }

    fn store() -> EventStore {
        let ics = "BEGIN:VCALENDAR
BEGIN:VEVENT
UID:standup
SUMMARY:Standup
DTSTART:20250320T090000Z
DTEND:20250320T100000Z
END:VEVENT
END:VCALENDAR
";
        let mut store = EventStore::default();
        store.load(&"work.ics".into(), ics.to_string()).unwrap();
        store
    }

    fn key() -> EventKey {
        EventKey::new("work.ics", "standup")
    }

    fn day() -> Bounds {
        Bounds::new(at(20, 0, 0), at(21, 0, 0))
    }

    #[test]
    fn test_quantize() {
        let r = Rescheduler::default();
        let q = |minutes: i64| r.quantize(Duration::minutes(minutes)).num_minutes();

        assert_eq!(q(7), 0);
        assert_eq!(q(8), 15);
        assert_eq!(q(-23), -15);
        assert_eq!(q(0), 0);
        assert_eq!(q(15), 15);
        assert_eq!(q(-15), -15);
        assert_eq!(q(22), 15);
        assert_eq!(q(23), 30);
        assert_eq!(q(-14), 0);
        assert_eq!(q(-29), -15);
        assert_eq!(q(-30), -30);
        assert_eq!(r.quantize(Duration::seconds(450)), Duration::zero());
        assert_eq!(r.quantize(Duration::seconds(-450)), Duration::zero());
    }

    #[test]
    fn test_shift_moves_both_ends_and_marks_dirty() {
        let mut store = store();
        let r = Rescheduler::default();

        let shift = r
            .propose_shift(&mut store, &key(), Duration::minutes(38), &day())
            .unwrap();

        assert_eq!(shift.accepted, Duration::minutes(45));
        assert!(!shift.clamped());
        let event = store.event(&key()).unwrap();
        assert_eq!(event.start(), at(20, 9, 45));
        assert_eq!(event.end(), at(20, 10, 45));
        assert!(event.is_dirty());
    }

    #[test]
    fn test_sub_grid_shift_is_a_noop() {
        let mut store = store();
        let shift = Rescheduler::default()
            .propose_shift(&mut store, &key(), Duration::minutes(5), &day())
            .unwrap();

        assert!(shift.is_noop());
        assert!(!store.event(&key()).unwrap().is_dirty());
    }

    #[test]
    fn test_clamps_to_bounds_preserving_duration() {
        let mut store = store();
        let r = Rescheduler::default();

        let shift = r
            .propose_shift(&mut store, &key(), Duration::hours(20), &day())
            .unwrap();
        assert!(shift.clamped());
        assert_eq!(shift.start, at(20, 23, 0));
        assert_eq!(shift.end, at(21, 0, 0));

        let shift = r
            .propose_shift(&mut store, &key(), Duration::hours(-30), &day())
            .unwrap();
        assert_eq!(shift.start, at(20, 0, 0));
        assert_eq!(shift.end, at(20, 1, 0));
    }

    #[test]
    fn test_bounds_narrower_than_event_are_rejected() {
        let mut store = store();
        let narrow = Bounds::new(at(20, 9, 0), at(20, 9, 30));

        let err = Rescheduler::default()
            .propose_shift(&mut store, &key(), Duration::minutes(15), &narrow)
            .unwrap_err();

        assert!(matches!(err, CalGridError::OutOfBounds { .. }));
        let event = store.event(&key()).unwrap();
        assert_eq!(event.start(), at(20, 9, 0));
        assert!(!event.is_dirty());
    }

    #[test]
    fn test_validate_shift_without_store() {
        let r = Rescheduler::new(Duration::minutes(30));
        let shift = r
            .validate_shift(&key(), at(20, 9, 0), at(20, 9, 20), Duration::minutes(44), &day())
            .unwrap();
        assert_eq!(shift.quantized, Duration::minutes(30));
        assert_eq!(shift.start, at(20, 9, 30));
        assert_eq!(shift.end, at(20, 9, 50));

        let inverted = Bounds::new(at(21, 0, 0), at(20, 0, 0));
        assert!(r
            .validate_shift(&key(), at(20, 9, 0), at(20, 9, 20), Duration::zero(), &inverted)
            .is_err());
    }

    #[test]
    fn test_unknown_event() {
        let mut store = store();
        let missing = EventKey::new("work.ics", "nope");
        let err = Rescheduler::default()
            .propose_shift(&mut store, &missing, Duration::minutes(15), &day())
            .unwrap_err();
        assert!(matches!(err, CalGridError::NotFound(_)));
    }

    #[test]
    fn test_drag_session_totals_quantized_sum() {
        let mut store = store();
        let r = Rescheduler::default();
        let mut drag = DragSession::begin(&store, &key()).unwrap();

        // 8m + 8m snaps as 16m, not as 15m + 15m.
        drag.update(&r, &mut store, Duration::minutes(8), &day()).unwrap();
        assert_eq!(store.event(&key()).unwrap().start(), at(20, 9, 15));
        let shift = drag.update(&r, &mut store, Duration::minutes(8), &day()).unwrap();

        assert_eq!(shift.requested, Duration::minutes(16));
        assert_eq!(shift.accepted, Duration::minutes(15));
        assert_eq!(store.event(&key()).unwrap().start(), at(20, 9, 15));
    }

    #[test]
    fn test_drag_session_clamps_once_at_final_boundary() {
        let mut store = store();
        let r = Rescheduler::default();
        let bounds = Bounds::new(at(20, 8, 0), at(20, 12, 0));
        let mut drag = DragSession::begin(&store, &key()).unwrap();

        drag.update(&r, &mut store, Duration::hours(2), &bounds).unwrap();
        let shift = drag.update(&r, &mut store, Duration::hours(2), &bounds).unwrap();
        assert_eq!(shift.accepted, Duration::hours(2));
        assert_eq!(drag.applied(), Duration::hours(2));

        // Dragging back undoes the overshoot from the raw total, not the clamp.
        let shift = drag.update(&r, &mut store, Duration::hours(-3), &bounds).unwrap();
        assert_eq!(shift.accepted, Duration::hours(1));
        assert_eq!(store.event(&key()).unwrap().start(), at(20, 10, 0));
    }

    #[test]
    fn test_drag_back_to_start_is_not_dirty() {
        let mut store = store();
        let r = Rescheduler::default();
        let mut drag = DragSession::begin(&store, &key()).unwrap();

        drag.update(&r, &mut store, Duration::minutes(30), &day()).unwrap();
        assert!(store.event(&key()).unwrap().is_dirty());

        let shift = drag.update(&r, &mut store, Duration::minutes(-30), &day()).unwrap();
        assert!(shift.is_noop());
        let event = store.event(&key()).unwrap();
        assert_eq!(event.start(), at(20, 9, 0));
        assert!(!event.is_dirty());
        assert!(store.dirty_events_by_origin().is_empty());
    }

    #[test]
    fn test_drag_back_keeps_earlier_unsaved_move() {
        let mut store = store();
        let r = Rescheduler::default();
        r.propose_shift(&mut store, &key(), Duration::minutes(15), &day())
            .unwrap();
        let mut drag = DragSession::begin(&store, &key()).unwrap();

        drag.update(&r, &mut store, Duration::minutes(30), &day()).unwrap();
        drag.update(&r, &mut store, Duration::minutes(-30), &day()).unwrap();

        let event = store.event(&key()).unwrap();
        assert_eq!(event.start(), at(20, 9, 15));
        assert!(event.is_dirty());
    }

    #[test]
    fn test_huge_shift_clamps_instead_of_overflowing() {
        let mut store = store();
        let r = Rescheduler::default();
        let week = Bounds::week_of(at(20, 9, 0), Weekday::Mon);

        let shift = r
            .propose_shift(&mut store, &key(), Duration::days(100_000_000), &week)
            .unwrap();
        assert!(shift.clamped());
        assert_eq!(shift.end, week.upper);
        assert_eq!(shift.start, week.upper - Duration::hours(1));

        let shift = r
            .propose_shift(&mut store, &key(), Duration::days(-100_000_000), &week)
            .unwrap();
        assert_eq!(shift.start, week.lower);
        assert_eq!(store.event(&key()).unwrap().end(), week.lower + Duration::hours(1));
    }

    #[test]
    fn test_quantize_at_duration_limits() {
        let r = Rescheduler::default();
        let grid = r.grid().num_milliseconds();

        let max = r.quantize(Duration::MAX);
        assert!(max > Duration::zero());
        assert_eq!(max.num_milliseconds() % grid, 0);

        let min = r.quantize(Duration::MIN);
        assert!(min < Duration::zero());
        assert_eq!(min.num_milliseconds() % grid, 0);
    }

    #[test]
    fn test_drag_total_saturates() {
        let mut store = store();
        let r = Rescheduler::default();
        let week = Bounds::week_of(at(20, 9, 0), Weekday::Mon);
        let mut drag = DragSession::begin(&store, &key()).unwrap();

        drag.update(&r, &mut store, Duration::MAX, &week).unwrap();
        let shift = drag.update(&r, &mut store, Duration::MAX, &week).unwrap();

        assert_eq!(shift.end, week.upper);
        assert_eq!(store.event(&key()).unwrap().end(), week.upper);
    }

    #[test]
    fn test_week_of() {
        // 2025-03-20 is a Thursday.
        let week = Bounds::week_of(at(20, 15, 30), Weekday::Mon);
        assert_eq!(week.lower, at(17, 0, 0));
        assert_eq!(week.upper, at(24, 0, 0));

        let week = Bounds::week_of(at(20, 15, 30), Weekday::Sun);
        assert_eq!(week.lower, at(16, 0, 0));

        let week = Bounds::week_of(at(17, 0, 0), Weekday::Mon);
        assert_eq!(week.lower, at(17, 0, 0));
    }
}
