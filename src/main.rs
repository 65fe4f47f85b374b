mod commands;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use calgrid_core::config::CalgridConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use commands::Session;

#[derive(Parser)]
#[command(name = "calgrid")]
#[command(about = "Lay out, reschedule and patch events in local .ics files")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show events day by day with their overlap lanes
    Show {
        /// .ics files to load (defaults to `sources` from config.toml)
        sources: Vec<PathBuf>,

        /// First day to show (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        from: Option<String>,

        /// Number of days to show
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Hide a source by path or file name (repeatable)
        #[arg(long)]
        hide: Vec<String>,

        /// Print laid-out events as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move an event by a delta snapped to the grid, then save
    Shift {
        /// UID of the event to move
        uid: String,

        /// How far to move it (e.g. "+30m", "-1h 15m")
        #[arg(allow_hyphen_values = true)]
        delta: String,

        /// Source holding the event, when the UID is not unique
        #[arg(long)]
        origin: Option<String>,

        /// Keep the event inside the week of this date (YYYY-MM-DD) instead of its own week
        #[arg(long)]
        week_of: Option<String>,

        /// Show the result without writing anything
        #[arg(long)]
        dry_run: bool,

        /// .ics files to load (defaults to `sources` from config.toml)
        sources: Vec<PathBuf>,
    },
    /// Load sources and report anything that could not be read.
    /// Sources given here become the defaults if config.toml lists none.
    Check {
        /// .ics files to load (defaults to `sources` from config.toml)
        sources: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = CalgridConfig::load()?;
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Show {
            sources,
            from,
            days,
            hide,
            json,
        } => {
            let session = Session::open(&config, &sources)?;
            let from = commands::parse_date(from.as_deref())?;
            commands::show::run(&session, from, days, &hide, json)
        }
        Commands::Shift {
            uid,
            delta,
            origin,
            week_of,
            dry_run,
            sources,
        } => {
            let session = Session::open(&config, &sources)?;
            let delta = commands::parse_delta(&delta)?;
            let week_of = week_of
                .as_deref()
                .map(|d| commands::parse_date(Some(d)))
                .transpose()?;
            commands::shift::run(&session, &uid, delta, origin.as_deref(), week_of, dry_run)
        }
        Commands::Check { sources } => commands::check::run(&config, &sources),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
