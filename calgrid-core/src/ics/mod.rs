//! iCalendar codec.
//!
//! Parsing turns a source into events plus their byte positions; patching
//! rewrites the start/end values of selected events, located by UID, and
//! leaves every other byte of the source as it was.

mod parse;
mod patch;
mod scan;
mod time;

pub use parse::{EndField, EntrySpan, ParseWarning, ParsedSource, SkipReason};
pub use patch::EditSet;

use chrono_tz::Tz;

use crate::error::CalGridResult;
use crate::event::OriginKey;

/// Reads and patches iCalendar sources.
///
/// Values without a UTC marker or `TZID` ("floating" times) are read and
/// written in `floating_tz`, which defaults to UTC.
#[derive(Debug, Clone, Copy)]
pub struct IcsCodec {
    floating_tz: Tz,
}

impl Default for IcsCodec {
    fn default() -> Self {
        IcsCodec { floating_tz: Tz::UTC }
    }
}

impl IcsCodec {
    pub fn new(floating_tz: Tz) -> Self {
        IcsCodec { floating_tz }
    }

    pub fn floating_tz(&self) -> Tz {
        self.floating_tz
    }

    pub fn parse(&self, origin: &OriginKey, raw_text: &str) -> CalGridResult<ParsedSource> {
        parse::parse_source(origin, raw_text, self.floating_tz)
    }

    /// Apply `edits` to `raw_text`. An empty edit set returns the text unchanged.
    pub fn patch(
        &self,
        origin: &OriginKey,
        raw_text: &str,
        edits: &EditSet,
    ) -> CalGridResult<String> {
        patch::patch_source(origin, raw_text, edits, self.floating_tz)
    }
}
