//! `hoc run`: execute an image as one top-level statement.

use std::path::Path;

use hoc_vm::{ExecMode, FaultPolicy, Interpreter, VmConfig};

use crate::image::{load, read_image, CliError};

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Print the execution profile to stderr afterwards.
    pub profile: bool,
    /// Abort the process on a fault instead of recovering.
    pub abort_on_fault: bool,
}

/// Run the image at `path` and return the process exit status. A fault has
/// already been reported by the interpreter when this returns 1.
pub fn run_image(path: &Path, options: &RunOptions) -> Result<i32, CliError> {
    let mut config = VmConfig::for_mode(ExecMode::Batch);
    if options.abort_on_fault {
        config = config.with_fault_policy(FaultPolicy::Abort);
    }
    let mut interp = Interpreter::with_config(config);
    if options.profile {
        interp.enable_counters();
    }

    let image = read_image(path)?;
    let code = load(&mut interp, &image)?;
    let status = interp.run_status(code);

    if let Some(counters) = interp.counters() {
        eprintln!("{}", counters.report());
    }
    Ok(status)
}
