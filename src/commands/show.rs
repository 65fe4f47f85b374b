use anyhow::Result;
use calgrid_core::Event;
use chrono::{Duration, NaiveDate, NaiveTime};
use owo_colors::OwoColorize;
use serde_json::json;

use crate::commands::Session;
use crate::render::{Placed, Render, paint, pluralize};

pub fn run(session: &Session, from: NaiveDate, days: u32, hide: &[String], json: bool) -> Result<()> {
    let engine = &session.engine;

    for name in hide {
        let key = session.find_origin(name)?;
        engine.set_enabled(&key, false)?;
        tracing::debug!(%key, "Source hidden");
    }

    let columns: Vec<(NaiveDate, Vec<Event>)> = (0..days)
        .map(|offset| {
            let date = from + Duration::days(i64::from(offset));
            let start = date.and_time(NaiveTime::MIN).and_utc();
            (date, engine.laid_out_events(start, start + Duration::days(1)))
        })
        .collect();

    if json {
        let out: Vec<_> = columns
            .iter()
            .map(|(date, events)| {
                let events: Vec<_> = events
                    .iter()
                    .map(|e| json!({ "event": e, "color_slot": engine.color_slot(e.origin()) }))
                    .collect();
                json!({ "date": date.to_string(), "events": events })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_legend(session);

    let total: usize = columns.iter().map(|(_, events)| events.len()).sum();
    if total == 0 {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    for (date, events) in &columns {
        if events.is_empty() {
            continue;
        }
        println!();
        println!("{}", date.format("%a %b %-d").bold());
        for event in events {
            let placed = Placed {
                event,
                slot: engine.color_slot(event.origin()),
            };
            println!("{}", placed.render());
        }
    }

    Ok(())
}

fn print_legend(session: &Session) {
    let store = session.engine.store();
    for origin in store.origins() {
        let count = origin.events().len();
        let label = format!("{} {}", count, pluralize("event", count));
        if origin.is_enabled() {
            let slot = store.color_slot(origin.key());
            println!("📅 {} {}", paint(origin.key().as_str(), slot), label.dimmed());
        } else {
            println!("📅 {} {}", origin.key().as_str().dimmed(), "(hidden)".dimmed());
        }
    }
}
