mod app;
mod catalog;
mod cli;
mod config;
mod error;
mod fsutil;
mod launch;
mod package;
mod patch;
mod platform;
mod profile;
mod readiness;
mod sync;
mod vcdiff;
mod verify;

use anyhow::Result;
use std::{fs, path::Path, sync::Mutex};
use tracing_subscriber::EnvFilter;

pub(crate) fn init_logging(path: &Path) {
    let filter = EnvFilter::try_from_env("AM2RFORGE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let file = match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Logging disabled: cannot open {}: {err}", path.display());
            return;
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn main() -> Result<()> {
    cli::run()
}
