//! Command-line surface.
//!
//! Exactly one mode subcommand per run, plus the observation window length
//! in seconds. Missing mode or a zero/invalid duration is a usage error
//! rejected by clap before anything else runs.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::watch::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "mqttwatch",
    version,
    about = "Check MQTT message reception from monitored devices and send Telegram alerts"
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'f', long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for device traffic and alert only when everything is silent.
    Check(WindowArgs),
    /// Listen for the full window and always send a per-topic summary.
    Debug(WindowArgs),
}

#[derive(Args, Debug)]
pub struct WindowArgs {
    /// Observation window in seconds.
    #[arg(
        short = 't',
        long = "time",
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub time: u64,
}

impl Command {
    pub fn mode(&self) -> Mode {
        match self {
            Command::Check(_) => Mode::Check,
            Command::Debug(_) => Mode::Debug,
        }
    }

    pub fn window(&self) -> Duration {
        let (Command::Check(args) | Command::Debug(args)) = self;
        Duration::from_secs(args.time)
    }
}
