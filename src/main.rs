//! quarry - simulation core of a persistent multiplayer mining game
//!
//! Headless driver: loads a world's regions and mines, plays a timed command
//! script against the core and records every emitted event.

mod command_script;
mod commands;
mod config;
mod headless;

use anyhow::Result;
use config::QuarryConfig;
use std::{env, path::PathBuf};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // INFO by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting quarry v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse(env::args().skip(1));
    if cli.help {
        println!("{}", CliOptions::usage());
        return Ok(());
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let config = QuarryConfig::load_from_path(&config_path);

    if cli.reset_data && cli.data_dir.is_none() {
        tracing::warn!("--reset-data has no effect without --data-dir");
    }

    headless::run(headless::HeadlessConfig {
        config,
        data_dir: cli.data_dir,
        command_script: cli.script,
        event_log: cli.event_log,
        reset_data: cli.reset_data,
    })
    .await
}

#[derive(Debug, Default)]
struct CliOptions {
    help: bool,
    config: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    script: Option<PathBuf>,
    event_log: Option<PathBuf>,
    reset_data: bool,
}

impl CliOptions {
    fn usage() -> &'static str {
        "Usage: quarry [--config <toml>] [--data-dir <dir>] [--reset-data] \
         [--script <json>] [--event-log <jsonl>]"
    }

    fn parse<I: Iterator<Item = String>>(mut args: I) -> Self {
        let mut opts = CliOptions::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => opts.help = true,
                "--reset-data" => opts.reset_data = true,
                "--config" => match args.next() {
                    Some(path) => opts.config = Some(PathBuf::from(path)),
                    None => tracing::error!("--config requires a file path"),
                },
                "--data-dir" => match args.next() {
                    Some(path) => opts.data_dir = Some(PathBuf::from(path)),
                    None => tracing::error!("--data-dir requires a directory path"),
                },
                "--script" | "--command-script" => match args.next() {
                    Some(path) => opts.script = Some(PathBuf::from(path)),
                    None => tracing::error!("--script requires a file path"),
                },
                "--event-log" => match args.next() {
                    Some(path) => opts.event_log = Some(PathBuf::from(path)),
                    None => tracing::error!("--event-log requires a file path"),
                },
                other => tracing::warn!(arg = %other, "Ignoring unknown argument"),
            }
        }

        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliOptions {
        CliOptions::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_paths_and_flags() {
        let opts = parse(&[
            "--config",
            "q.toml",
            "--data-dir",
            "data",
            "--script",
            "run.json",
            "--event-log",
            "events.jsonl",
            "--reset-data",
        ]);
        assert_eq!(opts.config, Some(PathBuf::from("q.toml")));
        assert_eq!(opts.data_dir, Some(PathBuf::from("data")));
        assert_eq!(opts.script, Some(PathBuf::from("run.json")));
        assert_eq!(opts.event_log, Some(PathBuf::from("events.jsonl")));
        assert!(opts.reset_data);
        assert!(!opts.help);
    }

    #[test]
    fn missing_values_and_unknown_flags_are_ignored() {
        let opts = parse(&["--bogus", "--data-dir"]);
        assert!(opts.data_dir.is_none());
        assert!(parse(&["-h"]).help);
    }
}
