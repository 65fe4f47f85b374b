//! DATE-TIME and DURATION values.
//!
//! Everything in memory is UTC. On the way back out a value is written in the
//! same form it was read in: `…Z` stays UTC, `TZID=` values become wall time
//! in that zone again, floating values use the codec's floating timezone.
//! When the wall time would be ambiguous the value falls back to UTC.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{CalendarDateTime, DatePerhapsTime};

use super::parse::SkipReason;
use super::scan::ContentLine;

const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// How a DATE-TIME value was written in the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TimeForm {
    Utc,
    Zoned(Tz),
    Floating(Tz),
}

impl TimeForm {
    /// Work out the form of an existing DTSTART/DTEND line.
    pub fn of_line(line: &ContentLine, floating: Tz) -> Result<Self, SkipReason> {
        if let Some(tzid) = line.param("TZID") {
            return parse_tzid(tzid).map(TimeForm::Zoned);
        }
        if line.value().trim().ends_with(['Z', 'z']) {
            Ok(TimeForm::Utc)
        } else {
            Ok(TimeForm::Floating(floating))
        }
    }

    /// The form `at` can be written in without changing its meaning.
    ///
    /// A wall time that reads back as a different instant, such as the second
    /// pass through a DST fall-back hour, is written as UTC instead.
    pub fn for_instant(self, at: DateTime<Utc>) -> TimeForm {
        match self {
            TimeForm::Utc => self,
            TimeForm::Zoned(tz) | TimeForm::Floating(tz) => {
                let wall = at.with_timezone(&tz).naive_local();
                if local_to_utc(wall, tz).is_ok_and(|back| back == at) {
                    self
                } else {
                    TimeForm::Utc
                }
            }
        }
    }

    pub fn format(&self, at: DateTime<Utc>) -> String {
        match self {
            TimeForm::Utc => at.format(UTC_FORMAT).to_string(),
            TimeForm::Zoned(tz) | TimeForm::Floating(tz) => {
                at.with_timezone(tz).format(LOCAL_FORMAT).to_string()
            }
        }
    }
}

fn parse_tzid(tzid: &str) -> Result<Tz, SkipReason> {
    // Some producers prefix globally unique TZIDs with a slash.
    let name = tzid.trim_start_matches('/');
    name.parse::<Tz>()
        .map_err(|_| SkipReason::UnknownTimezone(tzid.to_string()))
}

/// Convert a parsed DTSTART/DTEND value into a UTC instant.
pub(crate) fn to_utc(value: DatePerhapsTime, floating: Tz) -> Result<DateTime<Utc>, SkipReason> {
    match value {
        DatePerhapsTime::Date(_) => Err(SkipReason::AllDay),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => Ok(dt),
            CalendarDateTime::Floating(naive) => local_to_utc(naive, floating),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                local_to_utc(date_time, parse_tzid(&tzid)?)
            }
        },
    }
}

fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, SkipReason> {
    // Ambiguous wall times (DST fall-back) resolve to the earlier instant;
    // wall times inside a DST gap do not exist and are rejected.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SkipReason::InvalidTime(format!("{naive} does not exist in {tz}")))
}

/// Parse a DURATION value such as `PT1H30M` or `-P1D`.
pub(crate) fn parse_duration(value: &str) -> Result<Duration, SkipReason> {
    let value = value.trim();
    let negative = value.starts_with('-');
    let unsigned = value.trim_start_matches(['-', '+']);

    let duration = iso8601::duration(unsigned)
        .map_err(|_| SkipReason::InvalidTime(format!("bad DURATION '{value}'")))?;
    let std_duration: std::time::Duration = duration.into();
    let duration = Duration::from_std(std_duration)
        .map_err(|_| SkipReason::InvalidTime(format!("DURATION '{value}' out of range")))?;

    Ok(if negative { -duration } else { duration })
}

/// Format a non-negative duration in the RFC 5545 `dur-value` grammar.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = total % 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}
