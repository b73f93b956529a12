use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use antenna_pattern_rig::app::{self, Session};
use antenna_pattern_rig::config::PARAMS_FILE;
use antenna_pattern_rig::menu;
use antenna_pattern_rig::pattern::Scale;

/// Antenna pattern measurement rig
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Measurement parameter file (JSON)
    #[arg(long, default_value = PARAMS_FILE)]
    params: PathBuf,

    /// Directory for new data files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive menu (default)
    Menu,
    /// Scan the antenna under test and record its pattern
    Measure,
    /// Capture one block with the transmitter on
    Single,
    /// Capture one block with the transmitter off
    Background,
    /// Show a recorded pattern
    Plot {
        file: PathBuf,
        /// Normalise to the peak in dB
        #[arg(long)]
        db: bool,
    },
    /// Show two recorded patterns side by side
    Compare {
        first: PathBuf,
        second: PathBuf,
        #[arg(long)]
        db: bool,
    },
}

fn scale(db: bool) -> Scale {
    if db { Scale::Decibel } else { Scale::Linear }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut session = Session::new(&cli.params, &cli.data_dir);

    match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => menu::run(&mut session)?,
        Command::Measure => {
            let samples = session.measure()?;
            println!("Recorded {} positions", samples.len());
        }
        Command::Single => println!("RMS = {:.3e}", session.single(true)?),
        Command::Background => println!("RMS = {:.3e}", session.single(false)?),
        Command::Plot { file, db } => println!("{}", app::plot_file(&file, scale(db))?),
        Command::Compare { first, second, db } => {
            println!("{}", app::plot_files(&first, &second, scale(db))?)
        }
    }

    Ok(())
}
