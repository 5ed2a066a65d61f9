//! Worker threads moving bytes between standard streams and a ring.

use std::io::{self, Read, Write};

use shmchan_core::Ring;

use crate::error::Result;

const MAX_IO_BUFSIZE: usize = 512;

fn io_bufsize(ring: &Ring<'_>) -> Result<usize> {
    Ok((ring.capacity()? as usize).min(MAX_IO_BUFSIZE))
}

/// Reads from standard input and pushes each chunk to `ring`, the process's
/// outbound direction. Closes the ring on end-of-input; a read error is
/// returned to the caller so `run()`'s cleanup still executes before the
/// process exits.
pub fn outbound_pump(ring: Ring<'_>) -> Result<()> {
    let span = tracing::info_span!("outbound_pump");
    let _enter = span.enter();

    let buf_size = io_bufsize(&ring)?;
    let mut buf = vec![0u8; buf_size];
    let stdin = io::stdin();
    let mut handle = stdin.lock();
    let mut total = 0u64;

    loop {
        match handle.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                ring.push(&buf[..n])?;
                total += n as u64;
            }
            Err(err) => return Err(err.into()),
        }
    }

    ring.close()?;
    tracing::debug!(bytes = total, "outbound pump closed ring at end of input");
    Ok(())
}

/// Pops from `ring`, the process's inbound direction, and writes each chunk
/// to standard output. Destroys the ring's control block once a pop
/// returns zero (closed and drained) -- this side is guaranteed to be the
/// last user of the ring.
pub fn inbound_pump(ring: Ring<'_>) -> Result<()> {
    let span = tracing::info_span!("inbound_pump");
    let _enter = span.enter();

    let buf_size = io_bufsize(&ring)?;
    let mut buf = vec![0u8; buf_size];
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let mut total = 0u64;

    loop {
        let n = ring.pop(&mut buf)?;
        if n == 0 {
            break;
        }
        handle.write_all(&buf[..n])?;
        total += n as u64;
    }
    handle.flush()?;

    unsafe { ring.destroy()? };
    tracing::debug!(bytes = total, "inbound pump destroyed ring after drain");
    Ok(())
}
