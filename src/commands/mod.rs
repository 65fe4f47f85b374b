pub mod check;
pub mod show;
pub mod shift;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calgrid_core::config::CalgridConfig;
use calgrid_core::{Engine, EventKey, FsSourceIo, LoadReport, OriginKey};
use chrono::{Duration, NaiveDate, Utc};
use owo_colors::OwoColorize;

/// Loaded sources plus the engine holding them, shared by every command.
pub struct Session {
    pub engine: Engine<FsSourceIo>,
    pub keys: Vec<OriginKey>,
    pub config: CalgridConfig,
}

impl Session {
    /// Load every source. Sources that fail are reported and left out.
    pub fn open(config: &CalgridConfig, sources: &[PathBuf]) -> Result<Self> {
        let (session, report) = Session::load(config, sources)?;

        for (key, err) in report.failures() {
            tracing::warn!(%key, error = %err, "Could not load source");
            eprintln!("{} {}", "⚠".yellow(), err.to_string().yellow());
        }
        if report.is_success() || session.engine.store().origins().next().is_some() {
            return Ok(session);
        }
        anyhow::bail!("None of the given sources could be loaded")
    }

    pub fn load(config: &CalgridConfig, sources: &[PathBuf]) -> Result<(Self, LoadReport)> {
        let paths = resolve_sources(config, sources)?;
        let keys: Vec<OriginKey> = paths
            .iter()
            .map(|p| OriginKey::new(p.to_string_lossy()))
            .collect();

        let engine = Engine::with_options(FsSourceIo::new(), config.engine_options()?);
        let report = engine.load_all(&keys);
        tracing::debug!(sources = keys.len(), failed = report.failures().count(), "Sources loaded");

        let session = Session {
            engine,
            keys,
            config: config.clone(),
        };
        Ok((session, report))
    }

    /// Find a loaded origin by its full key or by file name.
    pub fn find_origin(&self, name: &str) -> Result<OriginKey> {
        let store = self.engine.store();
        let found = store.origins().map(|o| o.key()).find(|key| {
            key.as_str() == name
                || Path::new(key.as_str()).file_name().and_then(|n| n.to_str()) == Some(name)
        });

        match found {
            Some(key) => Ok(key.clone()),
            None => {
                let available: Vec<_> = store.origins().map(|o| o.key().to_string()).collect();
                anyhow::bail!(
                    "Source '{}' not loaded. Available: {}",
                    name,
                    available.join(", ")
                );
            }
        }
    }

    /// Resolve a UID to an event key, asking for `--origin` when it is ambiguous.
    pub fn find_event(&self, uid: &str, origin: Option<&str>) -> Result<EventKey> {
        if let Some(origin) = origin {
            let key = EventKey::new(self.find_origin(origin)?, uid);
            self.engine.event(&key)?;
            return Ok(key);
        }

        let store = self.engine.store();
        let matches: Vec<EventKey> = store
            .origins()
            .filter(|o| o.events().iter().any(|e| e.id() == uid))
            .map(|o| EventKey::new(o.key().clone(), uid))
            .collect();

        match matches.as_slice() {
            [] => anyhow::bail!("No event with UID '{uid}' in the loaded sources"),
            [key] => Ok(key.clone()),
            _ => {
                let origins: Vec<_> = matches.iter().map(|k| k.origin.to_string()).collect();
                anyhow::bail!(
                    "UID '{}' exists in several sources: {}\nPick one with --origin",
                    uid,
                    origins.join(", ")
                );
            }
        }
    }
}

/// Sources from the command line, falling back to config.toml.
fn resolve_sources(config: &CalgridConfig, sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !sources.is_empty() {
        return Ok(sources.to_vec());
    }

    let configured = config.source_paths();
    if configured.is_empty() {
        let config_path = CalgridConfig::config_path()?;
        anyhow::bail!(
            "No sources given.\n\n\
            Pass .ics files on the command line:\n  \
            calgrid show ~/calendar/work.ics\n\n\
            or list them under `sources` in {}",
            config_path.display()
        );
    }
    Ok(configured)
}

/// Parse a YYYY-MM-DD date, defaulting to today (UTC).
pub fn parse_date(input: Option<&str>) -> Result<NaiveDate> {
    match input {
        None => Ok(Utc::now().date_naive()),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD")),
    }
}

/// Parse a signed human duration like "+30m", "-1h 15m" or "45m".
pub fn parse_delta(input: &str) -> Result<Duration> {
    let input = input.trim();
    let (negative, rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };

    let std_dur = humantime::parse_duration(rest.trim())
        .map_err(|e| anyhow::anyhow!("Invalid delta '{}': {}", input, e))?;
    let delta = Duration::from_std(std_dur).context("Delta is too large")?;

    Ok(if negative { -delta } else { delta })
}
