use std::path::PathBuf;

use anyhow::Result;
use calgrid_core::config::CalgridConfig;
use owo_colors::OwoColorize;

use crate::commands::Session;
use crate::render::{Render, pluralize};

pub fn run(config: &CalgridConfig, sources: &[PathBuf]) -> Result<()> {
    let (session, report) = Session::load(config, sources)?;
    let store = session.engine.store();

    let mut failed = 0;
    for key in &session.keys {
        match report.get(key) {
            Some(Ok(warnings)) => {
                let count = store.origin(key).map(|o| o.events().len()).unwrap_or_default();
                println!(
                    "{} {} {}",
                    "✓".green(),
                    key,
                    format!("({} {})", count, pluralize("event", count)).dimmed()
                );
                for warning in warnings {
                    println!("{}", warning.render());
                }
            }
            Some(Err(e)) => {
                failed += 1;
                println!("{} {} {}", "✗".red(), key, e.to_string().red());
            }
            None => {}
        }
    }

    if failed > 0 {
        anyhow::bail!("{} {} could not be loaded", failed, pluralize("source", failed));
    }

    remember_sources(config, sources)
}

/// Save sources given on the command line as the default set, once.
fn remember_sources(config: &CalgridConfig, sources: &[PathBuf]) -> Result<()> {
    let absolute = sources
        .iter()
        .map(std::fs::canonicalize)
        .collect::<std::io::Result<Vec<_>>>()?;

    let path = CalgridConfig::config_path()?;
    let mut config = config.clone();
    if config.set_sources_if_unset(&path, &absolute)? {
        tracing::info!(path = %path.display(), sources = absolute.len(), "Default sources saved");
        println!("{}", format!("Saved as default sources in {}", path.display()).dimmed());
    }
    Ok(())
}
