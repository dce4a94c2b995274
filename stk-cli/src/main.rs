//! `stk`: calibrate a stereo rig and turn fingertip tracks into key events.

mod calibrate;
mod prompt;
mod run;
mod synthetic;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use stk_calib::CalibrationSettings;
use stk_core::BoardGeometry;
use stk_core::logger;

#[derive(Debug, Parser)]
#[command(name = "stk", version, about = "Stereo touch keyboard")]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Structured JSON logs through tracing, filtered by RUST_LOG.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Phase 1: solve each camera's intrinsics from checkerboard images.
    Intrinsics(calibrate::IntrinsicsArgs),
    /// Phase 2: solve the relative pose and rectification.
    Stereo(calibrate::StereoArgs),
    /// Print the digest of a calibration file.
    Summary {
        #[arg(long, default_value = "calibration.json")]
        calibration: PathBuf,
    },
    /// Replay recorded frames and fingertip tracks through the touch pipeline.
    Run(run::RunArgs),
    /// Write a noise-free calibration (and optionally rendered board views)
    /// for a simulated rig.
    Synthetic(synthetic::SyntheticArgs),
}

/// Board and solver options shared by both calibration phases.
#[derive(Debug, Args)]
struct CalibrationOptions {
    /// Internal corners per row.
    #[arg(long, default_value_t = BoardGeometry::default().cols)]
    board_cols: usize,

    /// Internal corners per column.
    #[arg(long, default_value_t = BoardGeometry::default().rows)]
    board_rows: usize,

    #[arg(long, default_value_t = BoardGeometry::default().square_size_mm)]
    square_mm: f64,

    /// JSON file overriding the calibration tunables.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Keep every accepted frame in this directory.
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Ask on stdin before keeping each detected board.
    #[arg(long)]
    interactive: bool,
}

impl CalibrationOptions {
    fn board(&self) -> anyhow::Result<BoardGeometry> {
        Ok(BoardGeometry::new(
            self.board_cols,
            self.board_rows,
            self.square_mm,
        )?)
    }

    fn settings(&self) -> anyhow::Result<CalibrationSettings> {
        match &self.settings {
            Some(path) => run::read_json(path),
            None => Ok(CalibrationSettings::default()),
        }
    }
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    if cli.log_json {
        logger::init_tracing(true);
        return;
    }
    let level = logger::level_from_verbosity(cli.verbose, cli.quiet);
    if let Err(e) = logger::init_with_level(level) {
        eprintln!("warning: logger already installed: {e}");
    }
}

fn try_main(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Intrinsics(args) => calibrate::intrinsics(&args),
        Command::Stereo(args) => calibrate::stereo(&args),
        Command::Summary { calibration } => {
            let record = stk_io::CalibrationStore::new(&calibration).load()?;
            println!("{}", serde_json::to_string_pretty(&record.summary())?);
            Ok(())
        }
        Command::Run(args) => run::run(&args),
        Command::Synthetic(args) => synthetic::generate(&args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    match try_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_method_names() {
        let cli = Cli::try_parse_from([
            "stk", "-vv", "run", "--left", "l", "--right", "r", "--landmarks", "t.jsonl",
            "--method", "q",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.method, stk_depth::TriangulationMethod::QMatrix);
    }

    #[test]
    fn board_options_are_validated() {
        let cli = Cli::try_parse_from([
            "stk", "intrinsics", "--left", "l", "--right", "r", "--board-cols", "1",
        ])
        .unwrap();
        let Command::Intrinsics(args) = cli.command else {
            panic!("expected intrinsics");
        };
        assert!(args.options.board().is_err());
    }
}
