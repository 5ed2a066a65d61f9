//! Minimal argv parsing for the single supported invocation form.

use crate::error::{Result, ShmchanError};

const USAGE: &str = "Usage: shmchan -f <shm_name>";

/// Outcome of parsing the command line.
pub enum Invocation {
    /// Run the channel against the given shared memory name.
    Run {
        /// Name of the shared memory object to create or attach to.
        name: String,
    },
    /// `-h`/`--help` was given: print usage and exit 0.
    Help,
}

/// Parses `argv` (excluding the program name).
pub fn parse(args: &[String]) -> Result<Invocation> {
    match args {
        [flag] if flag == "-h" || flag == "--help" => Ok(Invocation::Help),
        [flag, name] if flag == "-f" => Ok(Invocation::Run {
            name: name.clone(),
        }),
        _ => Err(ShmchanError::Usage(USAGE.to_string())),
    }
}

/// The usage banner, printed on a parse error or `-h`/`--help`.
pub fn usage() -> &'static str {
    USAGE
}
