mod app;
mod commands;
mod logging;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.global);

    match &cli.command {
        Command::Analyze { path } => commands::analyze::run(path),
        Command::Link { inputs, output } => commands::link::run(inputs, output),
    }
}
