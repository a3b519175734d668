//! Line-driven harness for the banter engine.
//!
//! Reads stdin and feeds each line in as a main-channel message, which
//! exercises the full selection and dispatch pipeline against whatever
//! module libraries the config points at. `/status` dumps engine state,
//! `/quit` or `/exit` leaves.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use banter_core::Engine;

#[derive(Parser)]
#[command(name = "banter", about = "Plugin-driven IRC bot engine, driven from a terminal")]
#[command(version)]
struct Cli {
    /// Config file (defaults to banter.toml in the working directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Nick to attribute input lines to
    #[arg(long, default_value = "tester")]
    nick: String,

    /// Channel to attribute input lines to
    #[arg(long, default_value = "#testing")]
    channel: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine =
        Engine::init(cli.config.as_deref()).context("engine initialisation failed")?;
    tracing::info!("engine ready, feed me lines");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("stdin read failed")?;
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/status" => engine.status(),
            _ => {
                engine.on_main_message(&cli.nick, "localhost", "user", &cli.channel, line);
            }
        }
    }

    Ok(())
}
