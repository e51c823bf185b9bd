use std::{path::PathBuf, process::ExitCode};

use bounded_queue::{trace::init_tracing, Coordinator, Result, RunConfig};
use tracing::{error, info};

fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => RunConfig::load(&path)?,
        None => RunConfig::default(),
    };
    let report = Coordinator::new(config).run()?;
    info!(
        consumed = report.consumed.len(),
        leftover = report.leftover.len(),
        "all actors finished, resources released"
    );
    Ok(())
}

/// 0 when both actors finished, 1 on any setup or config failure. The error
/// goes to stderr even when the log filter hides it.
fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            1
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let result = run(std::env::args_os().nth(1).map(PathBuf::from));
    ExitCode::from(exit_status(&result))
}
