//! Source parsing: raw text to events plus the positions needed for patching.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use chrono_tz::Tz;
use icalendar::DatePerhapsTime;
use icalendar::parser::read_calendar;
use serde::Serialize;
use thiserror::Error;

use super::scan::{EventBlock, Scan, scan};
use super::time::{parse_duration, to_utc};
use crate::error::{CalGridError, CalGridResult};
use crate::event::{Event, OriginKey};

/// Why an individual entry was left out of a load.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    #[error("event block is never closed")]
    Unterminated,
    #[error("missing UID")]
    MissingUid,
    #[error("missing DTSTART")]
    MissingStart,
    #[error("missing DTEND or DURATION")]
    MissingEnd,
    #[error("all-day events are not supported")]
    AllDay,
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("invalid time: {0}")]
    InvalidTime(String),
    #[error("end is not after start")]
    EmptyRange,
    #[error("duplicate UID")]
    DuplicateId,
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// A skipped entry inside an otherwise readable source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseWarning {
    pub origin: OriginKey,
    pub id: Option<String>,
    /// 1-based line of the entry's `BEGIN:VEVENT`.
    pub line: usize,
    pub reason: SkipReason,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{} ({}): {}", self.origin, self.line, id, self.reason),
            None => write!(f, "{}:{}: {}", self.origin, self.line, self.reason),
        }
    }
}

/// Which property carries an entry's end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndField {
    DtEnd,
    Duration,
}

/// Where a parsed entry sits in its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySpan {
    pub id: String,
    /// The whole `BEGIN:VEVENT` … `END:VEVENT` block.
    pub block: Range<usize>,
    /// 1-based line of `BEGIN:VEVENT`.
    pub line: usize,
    pub start_field: Range<usize>,
    pub end_field: Range<usize>,
    pub end_kind: EndField,
}

/// Result of parsing one source. `events[i]` is located by `spans[i]`.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub events: Vec<Event>,
    pub spans: Vec<EntrySpan>,
    pub warnings: Vec<ParseWarning>,
}

pub(super) fn parse_source(
    origin: &OriginKey,
    raw: &str,
    floating: Tz,
) -> CalGridResult<ParsedSource> {
    let scan = scan(raw);

    if !scan.has_envelope {
        return Err(CalGridError::MalformedSource {
            origin: origin.clone(),
            reason: "missing BEGIN:VCALENDAR/END:VCALENDAR".to_string(),
        });
    }

    let mut parsed = ParsedSource {
        events: Vec::new(),
        spans: Vec::new(),
        warnings: Vec::new(),
    };
    let mut seen = HashSet::new();

    for block in &scan.blocks {
        let uid = block.uid(&scan);
        let warn = |reason| ParseWarning {
            origin: origin.clone(),
            id: uid.clone(),
            line: block.line_no(&scan),
            reason,
        };

        // First occurrence of a UID wins, whether or not it could be read,
        // so that patching by UID always targets the same block.
        if let Some(id) = &uid {
            if !seen.insert(id.clone()) {
                parsed.warnings.push(warn(SkipReason::DuplicateId));
                continue;
            }
        }

        match parse_entry(origin, &scan, block, floating) {
            Ok((event, span)) => {
                parsed.events.push(event);
                parsed.spans.push(span);
            }
            Err(reason) => parsed.warnings.push(warn(reason)),
        }
    }

    if parsed.events.is_empty() && !scan.blocks.is_empty() {
        let first = parsed
            .warnings
            .first()
            .map(|w| w.to_string())
            .unwrap_or_default();
        return Err(CalGridError::MalformedSource {
            origin: origin.clone(),
            reason: format!(
                "none of {} entries could be read (first: {})",
                scan.blocks.len(),
                first
            ),
        });
    }

    Ok(parsed)
}

fn parse_entry(
    origin: &OriginKey,
    scan: &Scan,
    block: &EventBlock,
    floating: Tz,
) -> Result<(Event, EntrySpan), SkipReason> {
    if !block.terminated {
        return Err(SkipReason::Unterminated);
    }
    let uid = block.uid(scan).ok_or(SkipReason::MissingUid)?;

    // Let the icalendar parser validate the entry and decode its date values.
    let mut text = String::from("BEGIN:VCALENDAR\r\n");
    for line in &scan.lines[block.first..=block.last] {
        text.push_str(&line.text);
        text.push_str("\r\n");
    }
    text.push_str("END:VCALENDAR\r\n");

    let calendar = read_calendar(&text).map_err(|e| SkipReason::Syntax(e.to_string()))?;
    let vevent = calendar
        .components
        .iter()
        .find(|c| c.name == "VEVENT")
        .ok_or_else(|| SkipReason::Syntax("no VEVENT component".to_string()))?;

    let start_line = block.prop(scan, "DTSTART").ok_or(SkipReason::MissingStart)?;
    let start_prop = vevent.find_prop("DTSTART").ok_or(SkipReason::MissingStart)?;
    let start = DatePerhapsTime::try_from(start_prop)
        .map_err(|_| SkipReason::InvalidTime(start_line.value().to_string()))?;
    let start = to_utc(start, floating)?;

    let (end, end_line, end_kind) = if let Some(end_line) = block.prop(scan, "DTEND") {
        let end_prop = vevent.find_prop("DTEND").ok_or(SkipReason::MissingEnd)?;
        let end = DatePerhapsTime::try_from(end_prop)
            .map_err(|_| SkipReason::InvalidTime(end_line.value().to_string()))?;
        (to_utc(end, floating)?, end_line, EndField::DtEnd)
    } else if let Some(duration_line) = block.prop(scan, "DURATION") {
        let duration = parse_duration(duration_line.value())?;
        (start + duration, duration_line, EndField::Duration)
    } else {
        return Err(SkipReason::MissingEnd);
    };

    let title = block
        .prop(scan, "SUMMARY")
        .map(|line| unescape_text(line.value()))
        .unwrap_or_else(|| "(No title)".to_string());
    let description = block
        .prop(scan, "DESCRIPTION")
        .map(|line| unescape_text(line.value()));

    let event = Event::new(origin.clone(), uid.clone(), title, start, end)
        .map_err(|_| SkipReason::EmptyRange)?
        .with_description(description);

    let span = EntrySpan {
        id: uid,
        block: block.range(scan),
        line: block.line_no(scan),
        start_field: start_line.range.clone(),
        end_field: end_line.range.clone(),
        end_kind,
    };

    Ok((event, span))
}

/// Decode RFC 5545 TEXT escapes (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
