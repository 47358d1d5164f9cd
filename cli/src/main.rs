use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::process::exit;
use std::sync::Mutex;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{ArgAction, ArgGroup, Parser};
use tracing::error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;
mod interactive;

use crate::commands::Subcommand;

/// Filter of the log file, independent of the verbosity
const LOG_FILE_FILTER: &str = "decima_emulator=debug,decima_cli=debug,info";

#[derive(Parser)]
#[command(version, author, about, group = ArgGroup::new("format"))]
struct Opt {
    /// Increase the level of verbosity. Can be used multiple times.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Force colored output. Default is to check if the output is a tty
    #[arg(short = 'c', long, global = true, group = "format")]
    color: bool,

    /// Force non-colored output. Default is to check if the output is a tty
    #[arg(short = 'C', long, global = true, group = "format")]
    no_color: bool,

    /// Use JSON output for log messages
    #[arg(short, long, global = true, group = "format")]
    json: bool,

    /// File where every instruction and interrupt is logged
    #[arg(long, global = true, default_value = "decima.log")]
    log_file: Utf8PathBuf,

    #[command(subcommand)]
    command: Subcommand,
}

impl Opt {
    const fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "decima_emulator=debug,decima_cli=debug,info",
            2 => "decima_emulator=trace,decima_cli=trace,info",
            3 => "decima_emulator=trace,decima_cli=trace,debug",
            4..=u8::MAX => "trace",
        }
    }

    fn should_use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            std::io::stdout().is_terminal()
        }
    }

    fn filter_layer(&self) -> anyhow::Result<EnvFilter> {
        // Parse log level from env
        let filter = EnvFilter::try_from_default_env()
            // or infer from args
            .or_else(|_| EnvFilter::try_new(self.log_filter()))?;
        Ok(filter)
    }

    /// Log to the console, and append everything to the log file
    fn init_logging(&self) -> anyhow::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .with_context(|| format!("could not open the log file {}", self.log_file))?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(EnvFilter::try_new(LOG_FILE_FILTER)?);

        let (json_layer, fmt_layer) = if self.json {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_filter(self.filter_layer()?);
            (Some(layer), None)
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .without_time()
                .with_ansi(self.should_use_colors())
                .with_target(false)
                .with_filter(self.filter_layer()?);
            (None, Some(layer))
        };

        tracing_subscriber::registry()
            .with(json_layer)
            .with(fmt_layer)
            .with(file_layer)
            .init();

        Ok(())
    }
}

fn main() {
    // First, parse the arguments
    let opt = Opt::parse();

    // Then, setup the console and file logging
    if let Err(e) = opt.init_logging() {
        eprintln!("error: {e:#}");
        exit(1);
    }

    // And run the command
    let res = opt.command.exec();
    if let Err(e) = res {
        error!("{:#}", e);
        exit(1);
    }
}
