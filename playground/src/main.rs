mod config;
mod context;
mod error;
mod scenarios;

use config::Config;
use context::Context;
use error::Error;
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;

fn init_logging(level: &str) -> Result<(), Error> {
    let level = level
        .parse::<LevelFilter>()
        .map_err(|_| Error::LogLevel(level.to_string()))?;
    TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("playground.yaml"));

    let config = Config::load(&path)?;
    init_logging(config.log_level())?;
    log::info!("Loaded configuration from {}", path.display());

    let context = Context::new(config)?;
    let report = scenarios::run(&context).await;
    context.shutdown();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
