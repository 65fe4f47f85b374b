//! Overlap layout: lane assignment for concurrent events.
//!
//! Callers hand in the events of one day column. Events are swept in start
//! order; a cluster closes as soon as every member has ended, and inside a
//! cluster each event takes the lowest lane not held by a still-running
//! event. Every member of a cluster reports the cluster's lane count so a
//! renderer can split the column evenly.

use std::cmp::Reverse;
use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::event::{Event, Lane};

/// A maximal run of transitively overlapping events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Indexes into the (sorted) slice passed to [`assign_lanes`].
    pub members: Range<usize>,
    pub lane_count: usize,
}

/// Sort `events` into layout order and assign every event its lane.
///
/// Layout order is start ascending, longer events first on equal starts, then
/// origin key and id, so any permutation of the same input yields the same
/// assignment. Overlap is tested on half-open `[start, end)` ranges.
pub fn assign_lanes(events: &mut [Event]) -> Vec<Cluster> {
    events.sort_by(|a, b| {
        a.start()
            .cmp(&b.start())
            .then_with(|| Reverse(a.duration()).cmp(&Reverse(b.duration())))
            .then_with(|| a.origin().cmp(b.origin()))
            .then_with(|| a.id().cmp(b.id()))
    });

    let mut clusters = Vec::new();
    let mut lanes = Vec::with_capacity(events.len());
    let mut active: Vec<(DateTime<Utc>, usize)> = Vec::new();
    let mut cluster_start = 0;
    let mut max_lane = 0;

    for (i, event) in events.iter().enumerate() {
        active.retain(|(end, _)| *end > event.start());

        if active.is_empty() && i > cluster_start {
            clusters.push(Cluster {
                members: cluster_start..i,
                lane_count: max_lane + 1,
            });
            cluster_start = i;
            max_lane = 0;
        }

        let lane = (0..)
            .find(|lane| active.iter().all(|(_, held)| held != lane))
            .unwrap_or_default();
        active.push((event.end(), lane));
        lanes.push(lane);
        max_lane = max_lane.max(lane);
    }

    if cluster_start < events.len() {
        clusters.push(Cluster {
            members: cluster_start..events.len(),
            lane_count: max_lane + 1,
        });
    }

    for cluster in &clusters {
        for i in cluster.members.clone() {
            events[i].set_lane(Lane {
                index: lanes[i],
                count: cluster.lane_count,
            });
        }
    }

    clusters
}

/// Convenience wrapper: lay out an owned list and return it in layout order.
pub fn layout(mut events: Vec<Event>) -> Vec<Event> {
    assign_lanes(&mut events);
    events
}
