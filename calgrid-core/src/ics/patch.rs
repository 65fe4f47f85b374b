//! Surgical rewrite of start/end values by UID.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::scan::{ContentLine, scan};
use super::time::{TimeForm, format_duration, parse_duration};
use crate::error::{CalGridError, CalGridResult};
use crate::event::OriginKey;

/// New `(start, end)` per event id.
pub type EditSet = BTreeMap<String, (DateTime<Utc>, DateTime<Utc>)>;

pub(super) fn patch_source(
    origin: &OriginKey,
    raw: &str,
    edits: &EditSet,
    floating: Tz,
) -> CalGridResult<String> {
    if edits.is_empty() {
        return Ok(raw.to_string());
    }

    let scan = scan(raw);

    // First block per UID, mirroring the parser's "first occurrence wins".
    let mut by_uid = HashMap::new();
    for block in &scan.blocks {
        if let Some(uid) = block.uid(&scan) {
            by_uid.entry(uid).or_insert(block);
        }
    }

    let mut replacements: Vec<(Range<usize>, String)> = Vec::new();

    for (id, &(start, end)) in edits {
        if end <= start {
            return Err(CalGridError::InvalidRange { id: id.clone() });
        }

        let unknown = || CalGridError::UnknownId {
            origin: origin.clone(),
            id: id.clone(),
        };
        let block = by_uid.get(id).filter(|b| b.terminated).ok_or_else(unknown)?;
        let start_line = block.prop(&scan, "DTSTART").ok_or_else(unknown)?;

        replacements.extend(replace_time(origin, start_line, start, floating)?);

        if let Some(end_line) = block.prop(&scan, "DTEND") {
            replacements.extend(replace_time(origin, end_line, end, floating)?);
        } else if let Some(duration_line) = block.prop(&scan, "DURATION") {
            let duration = end - start;
            let unchanged = parse_duration(duration_line.value()).is_ok_and(|d| d == duration);
            if !unchanged {
                replacements.push(rewrite(duration_line, &format_duration(duration)));
            }
        } else {
            return Err(unknown());
        }
    }

    replacements.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;
    for (range, text) in replacements {
        out.push_str(&raw[cursor..range.start]);
        out.push_str(&text);
        cursor = range.end;
    }
    out.push_str(&raw[cursor..]);

    Ok(out)
}

fn replace_time(
    origin: &OriginKey,
    line: &ContentLine,
    at: DateTime<Utc>,
    floating: Tz,
) -> CalGridResult<Option<(Range<usize>, String)>> {
    let form = TimeForm::of_line(line, floating).map_err(|reason| CalGridError::MalformedSource {
        origin: origin.clone(),
        reason: format!("line {}: {}", line.line_no, reason),
    })?;
    let written = form.for_instant(at);
    let value = written.format(at);

    if written != form {
        let prefix = line.prefix_without("TZID");
        return Ok(Some(rewrite_with(line, &prefix, &value)));
    }
    if value == line.value().trim() {
        return Ok(None);
    }
    Ok(Some(rewrite(line, &value)))
}

/// Same name and parameters, new value, original line terminator.
fn rewrite(line: &ContentLine, value: &str) -> (Range<usize>, String) {
    rewrite_with(line, line.prefix(), value)
}

fn rewrite_with(line: &ContentLine, prefix: &str, value: &str) -> (Range<usize>, String) {
    (
        line.range.clone(),
        format!("{}:{}{}", prefix, value, line.terminator),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SOURCE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example//EN\r\n\
BEGIN:VEVENT\r\n\
UID:one\r\n\
SUMMARY:First\r\n\
DTSTART:20250320T090000Z\r\n\
DTEND:20250320T100000Z\r\n\
X-APPLE-TRAVEL-ADVISORY-BEHAVIOR:AUTOMATIC\r\n\
DESCRIPTION:A long description that was folded by the producer at seventy\r\n \
five octets\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:two\r\n\
SUMMARY:Second\r\n\
DTSTART;TZID=Europe/Paris:20250320T140000\r\n\
DURATION:PT30M\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, h, m, 0).unwrap()
    }

    fn patch(edits: &EditSet) -> CalGridResult<String> {
        patch_source(&OriginKey::new("test.ics"), SOURCE, edits, Tz::UTC)
    }

    #[test]
    fn test_empty_edit_set_is_byte_identical() {
        assert_eq!(patch(&EditSet::new()).unwrap(), SOURCE);
    }

    #[test]
    fn test_only_time_lines_change() {
        let mut edits = EditSet::new();
        edits.insert("one".to_string(), (utc(9, 30), utc(10, 30)));

        let patched = patch(&edits).unwrap();

        let expected = SOURCE
            .replace("DTSTART:20250320T090000Z", "DTSTART:20250320T093000Z")
            .replace("DTEND:20250320T100000Z", "DTEND:20250320T103000Z");
        assert_eq!(patched, expected);
    }

    #[test]
    fn test_zoned_start_keeps_tzid_and_duration_is_left_alone() {
        let mut edits = EditSet::new();
        // 14:00 Paris is 13:00 UTC in March (before DST); move by +15 minutes.
        edits.insert("two".to_string(), (utc(13, 15), utc(13, 45)));

        let patched = patch(&edits).unwrap();

        assert!(patched.contains("DTSTART;TZID=Europe/Paris:20250320T141500\r\n"));
        assert!(patched.contains("DURATION:PT30M\r\n"));
        assert_eq!(patched.len(), SOURCE.len());
    }

    #[test]
    fn test_duration_rewritten_when_length_changes() {
        let mut edits = EditSet::new();
        edits.insert("two".to_string(), (utc(13, 0), utc(14, 0)));

        let patched = patch(&edits).unwrap();

        assert!(patched.contains("DTSTART;TZID=Europe/Paris:20250320T140000\r\n"));
        assert!(patched.contains("DURATION:PT1H\r\n"));
    }

    #[test]
    fn test_unknown_id_is_reported() {
        let mut edits = EditSet::new();
        edits.insert("one".to_string(), (utc(9, 30), utc(10, 30)));
        edits.insert("gone".to_string(), (utc(9, 30), utc(10, 30)));

        match patch(&edits) {
            Err(CalGridError::UnknownId { origin, id }) => {
                assert_eq!(origin.as_str(), "test.ics");
                assert_eq!(id, "gone");
            }
            other => panic!("Expected UnknownId, got {:?}", other),
        }
    }

    #[test]
    fn test_inverted_edit_is_rejected() {
        let mut edits = EditSet::new();
        edits.insert("one".to_string(), (utc(10, 0), utc(9, 0)));
        assert!(matches!(patch(&edits), Err(CalGridError::InvalidRange { .. })));
    }

    const FALL_BACK: &str = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:late\r\n\
SUMMARY:Late show\r\n\
DTSTART;TZID=America/New_York:20251102T003000\r\n\
DTEND;TZID=America/New_York:20251102T013000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_ambiguous_wall_time_is_written_as_utc() {
        let nov = |h: u32, m: u32| Utc.with_ymd_and_hms(2025, 11, 2, h, m, 0).unwrap();
        let codec = crate::ics::IcsCodec::new(Tz::UTC);
        let key = OriginKey::new("ny.ics");

        let loaded = codec.parse(&key, FALL_BACK).unwrap();
        assert_eq!(loaded.events[0].start(), nov(4, 30));
        assert_eq!(loaded.events[0].end(), nov(5, 30));

        // One hour later the end lands on the repeated 01:30, this time in EST.
        let mut edits = EditSet::new();
        edits.insert("late".to_string(), (nov(5, 30), nov(6, 30)));
        let patched = codec.patch(&key, FALL_BACK, &edits).unwrap();

        assert!(patched.contains("DTSTART;TZID=America/New_York:20251102T013000\r\n"));
        assert!(patched.contains("DTEND:20251102T063000Z\r\n"));

        let reread = codec.parse(&key, &patched).unwrap();
        assert!(reread.warnings.is_empty());
        assert_eq!(reread.events[0].start(), nov(5, 30));
        assert_eq!(reread.events[0].end(), nov(6, 30));
    }

    #[test]
    fn test_ambiguous_floating_time_is_written_as_utc() {
        let nov = |h: u32, m: u32| Utc.with_ymd_and_hms(2025, 11, 2, h, m, 0).unwrap();
        let ny: Tz = "America/New_York".parse().unwrap();
        let source = FALL_BACK.replace(";TZID=America/New_York", "");

        let mut edits = EditSet::new();
        edits.insert("late".to_string(), (nov(6, 0), nov(6, 45)));
        let patched = patch_source(&OriginKey::new("ny.ics"), &source, &edits, ny).unwrap();

        assert!(patched.contains("DTSTART:20251102T060000Z\r\n"));
        assert!(patched.contains("DTEND:20251102T064500Z\r\n"));
    }

    #[test]
    fn test_unambiguous_wall_time_across_dst_keeps_tzid() {
        let nov = |h: u32, m: u32| Utc.with_ymd_and_hms(2025, 11, 2, h, m, 0).unwrap();
        let mut edits = EditSet::new();
        // 07:00Z and 08:00Z are 02:00 and 03:00 EST, after the repeated hour.
        edits.insert("late".to_string(), (nov(7, 0), nov(8, 0)));

        let patched = patch_source(&OriginKey::new("ny.ics"), FALL_BACK, &edits, Tz::UTC).unwrap();

        assert!(patched.contains("DTSTART;TZID=America/New_York:20251102T020000\r\n"));
        assert!(patched.contains("DTEND;TZID=America/New_York:20251102T030000\r\n"));
    }

    #[test]
    fn test_folded_time_line_is_replaced_whole() {
        let source = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:f\nDTSTART:2025032\n 0T090000Z\nDTEND:20250320T100000Z\nEND:VEVENT\nEND:VCALENDAR\n";
        let mut edits = EditSet::new();
        edits.insert("f".to_string(), (utc(8, 0), utc(9, 0)));

        let patched = patch_source(&OriginKey::new("f.ics"), source, &edits, Tz::UTC).unwrap();

        assert_eq!(
            patched,
            "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:f\nDTSTART:20250320T080000Z\nDTEND:20250320T090000Z\nEND:VEVENT\nEND:VCALENDAR\n"
        );
    }
}
