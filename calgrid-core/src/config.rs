//! User configuration at ~/.config/calgrid/config.toml

use std::path::{Path, PathBuf};

use chrono::{Duration, Weekday};
use chrono_tz::Tz;
use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{CalGridError, CalGridResult};
use crate::persistence::EngineOptions;
use crate::reschedule::DEFAULT_GRID_MINUTES;

fn default_grid_minutes() -> i64 {
    DEFAULT_GRID_MINUTES
}

fn is_default_grid_minutes(minutes: &i64) -> bool {
    *minutes == DEFAULT_GRID_MINUTES
}

fn default_floating_timezone() -> String {
    "UTC".to_string()
}

fn is_default_floating_timezone(tz: &String) -> bool {
    *tz == default_floating_timezone()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl From<WeekStart> for Weekday {
    fn from(start: WeekStart) -> Self {
        match start {
            WeekStart::Monday => Weekday::Mon,
            WeekStart::Sunday => Weekday::Sun,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalgridConfig {
    /// Sources loaded when none are given on the command line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PathBuf>,

    #[serde(default = "default_grid_minutes", skip_serializing_if = "is_default_grid_minutes")]
    pub grid_minutes: i64,

    /// IANA zone used for times without `Z` or `TZID`.
    #[serde(
        default = "default_floating_timezone",
        skip_serializing_if = "is_default_floating_timezone"
    )]
    pub floating_timezone: String,

    #[serde(default)]
    pub week_starts_on: WeekStart,
}

impl Default for CalgridConfig {
    fn default() -> Self {
        CalgridConfig {
            sources: Vec::new(),
            grid_minutes: DEFAULT_GRID_MINUTES,
            floating_timezone: default_floating_timezone(),
            week_starts_on: WeekStart::default(),
        }
    }
}

impl CalgridConfig {
    pub fn config_path() -> CalGridResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalGridError::Config("Could not determine config directory".into()))?
            .join("calgrid");

        Ok(config_dir.join("config.toml"))
    }

    /// Load ~/.config/calgrid/config.toml, creating a commented default first if missing.
    pub fn load() -> CalGridResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::create_default_config(&path)?;
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> CalGridResult<Self> {
        let config: CalgridConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .build()
            .map_err(|e| CalGridError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalGridError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CalGridResult<()> {
        if self.grid_minutes <= 0 {
            return Err(CalGridError::Config(format!(
                "grid_minutes must be positive, got {}",
                self.grid_minutes
            )));
        }
        self.floating_tz()?;
        Ok(())
    }

    pub fn floating_tz(&self) -> CalGridResult<Tz> {
        self.floating_timezone.parse().map_err(|_| {
            CalGridError::Config(format!("Unknown timezone '{}'", self.floating_timezone))
        })
    }

    /// Configured sources with `~` expanded.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.sources
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).into_owned()))
            .collect()
    }

    pub fn engine_options(&self) -> CalGridResult<EngineOptions> {
        self.validate()?;
        Ok(EngineOptions {
            grid: Duration::minutes(self.grid_minutes),
            floating_tz: self.floating_tz()?,
        })
    }

    /// Make `sources` the default set if none is configured yet.
    /// Returns true if the config file at `path` was written.
    pub fn set_sources_if_unset(&mut self, path: &Path, sources: &[PathBuf]) -> CalGridResult<bool> {
        if !self.sources.is_empty() || sources.is_empty() {
            return Ok(false);
        }
        self.sources = sources.to_vec();
        self.save_to(path)?;
        Ok(true)
    }

    fn save_to(&self, path: &Path) -> CalGridResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CalGridError::Config(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| CalGridError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalGridResult<()> {
        let contents = format!(
            "\
# calgrid configuration

# Calendars to load when none are given on the command line:
# sources = [\"~/calendar/work.ics\", \"~/calendar/home.ics\"]

# Snap moves to this many minutes:
# grid_minutes = {DEFAULT_GRID_MINUTES}

# Timezone for times written without one:
# floating_timezone = \"UTC\"

# First day of the week (monday or sunday):
# week_starts_on = \"monday\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalGridError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalGridError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
