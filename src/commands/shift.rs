use anyhow::Result;
use calgrid_core::Bounds;
use chrono::{Duration, NaiveDate, NaiveTime};
use owo_colors::OwoColorize;

use crate::commands::Session;
use crate::render::Render;

pub fn run(
    session: &Session,
    uid: &str,
    delta: Duration,
    origin: Option<&str>,
    week_of: Option<NaiveDate>,
    dry_run: bool,
) -> Result<()> {
    let engine = &session.engine;
    let key = session.find_event(uid, origin)?;
    let event = engine.event(&key)?;

    let anchor = match week_of {
        Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
        None => event.start(),
    };
    let bounds = Bounds::week_of(anchor, session.config.week_starts_on.into());

    let shift = engine.propose_shift(&key, delta, &bounds)?;
    tracing::debug!(
        %key,
        requested = %shift.requested,
        accepted = %shift.accepted,
        clamped = shift.clamped(),
        "Shift proposed"
    );

    println!("{} {}", event.title().bold(), format!("[{}]", key.origin).dimmed());
    println!("   {}", shift.render());

    if shift.is_noop() {
        println!("{}", "   Nothing to save".dimmed());
        return Ok(());
    }
    if dry_run {
        println!("{}", "   Dry run, not saved".dimmed());
        return Ok(());
    }

    let report = engine.save_all();
    for (origin, result) in report {
        match result {
            Ok(saved) => {
                tracing::info!(%origin, events = saved.events.len(), bytes = saved.bytes, "Source saved");
                println!("   {} {}", "✓".green(), origin.to_string().dimmed());
            }
            Err(e) => {
                tracing::error!(%origin, error = %e, "Save failed");
                anyhow::bail!("Could not save {}: {}", origin, e);
            }
        }
    }

    Ok(())
}
