//! Bidirectional stdin/stdout byte channel between two processes, carried
//! over a named POSIX shared memory region.
//!
//! Library entry point: [`run`] parses argv, rendezvouses with the peer
//! process, and pumps bytes between the standard streams and the shared
//! ring buffers until both directions are drained.

pub mod cli;
pub mod error;
mod lifecycle;
mod pumps;

use shmchan_transport::{Channel, Role};

pub use error::{Result, ShmchanError};

#[cfg(feature = "debug-logging")]
fn init_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(not(feature = "debug-logging"))]
fn init_logging() {}

/// Runs the channel end to end: parses `args` (excluding the program
/// name), rendezvouses on the named shared region, and blocks until both
/// I/O pumps have finished.
///
/// Returns `Ok(())` after a help invocation or a clean shutdown. Any other
/// outcome is an `Err` the caller should report and translate to a
/// nonzero exit code.
pub fn run(args: &[String]) -> Result<()> {
    let invocation = cli::parse(args)?;
    let name = match invocation {
        cli::Invocation::Help => {
            println!("{}", cli::usage());
            return Ok(());
        }
        cli::Invocation::Run { name } => name,
    };

    init_logging();
    lifecycle::install_signal_handlers()?;

    let (channel, role) =
        Channel::open_or_create_with(&name, lifecycle::register_pending)?;
    let channel: &'static Channel = lifecycle::register(channel);
    tracing::info!(%name, ?role, "rendezvous complete");

    let (outbound, inbound) = match role {
        Role::Creator => (channel.ring_a(), channel.ring_b()),
        Role::Opener => (channel.ring_b(), channel.ring_a()),
    };

    let outbound_thread = std::thread::spawn(move || pumps::outbound_pump(outbound));
    let inbound_thread = std::thread::spawn(move || pumps::inbound_pump(inbound));

    let outbound_result = outbound_thread
        .join()
        .expect("outbound pump thread panicked");
    let inbound_result = inbound_thread.join().expect("inbound pump thread panicked");

    lifecycle::cleanup();

    outbound_result?;
    inbound_result?;
    Ok(())
}
