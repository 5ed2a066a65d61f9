use std::process::ExitCode;

use shmchan::ShmchanError;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match shmchan::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ ShmchanError::Usage(_)) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("shmchan: {err}");
            ExitCode::FAILURE
        }
    }
}
