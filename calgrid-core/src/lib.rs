//! Calendar event engine for calgrid.
//!
//! Loads iCalendar sources into one store, lays out overlapping events in
//! lanes, moves events on a snap grid within bounds, and writes moves back
//! by patching only the changed time properties of each source.

pub mod config;
pub mod error;
pub mod event;
pub mod ics;
pub mod layout;
pub mod persistence;
pub mod reschedule;
pub mod store;

pub use error::{CalGridError, CalGridResult};
pub use event::{Event, EventKey, Lane, OriginKey};
pub use persistence::{
    DiscardSource, Engine, EngineOptions, FsSourceIo, LoadReport, MemorySourceIo, SaveReport,
    SavedOrigin, SourceIo,
};
pub use reschedule::{AcceptedShift, Bounds, DragSession, Rescheduler};
