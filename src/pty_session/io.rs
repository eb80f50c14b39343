use crate::log_debug;
use anyhow::{anyhow, Result};
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

use super::pty::close_fd;

/// What the reader thread observed on the PTY master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Chunk(Vec<u8>),
    /// The slave side closed (shell exited) or the read failed for good.
    Closed,
}

pub(super) fn should_retry_read_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock
}

/// Read raw chunks from `reader_fd` until the PTY closes and hand them to `sink`.
///
/// The thread owns `reader_fd` and closes it on exit. `sink` returning `false`
/// means nobody is listening anymore; the thread stops without reporting `Closed`.
pub fn spawn_reader_thread<F>(reader_fd: RawFd, mut sink: F) -> thread::JoinHandle<()>
where
    F: FnMut(ReadEvent) -> bool + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        let mut report_close = true;
        loop {
            // SAFETY: reader_fd stays open until this thread closes it below.
            let n = unsafe {
                libc::read(
                    reader_fd,
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };
            if n > 0 {
                let data = buffer.get(..n as usize).unwrap_or(&[]).to_vec();
                if !sink(ReadEvent::Chunk(data)) {
                    report_close = false;
                    break;
                }
                continue;
            }
            if n == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if should_retry_read_error(&err) {
                thread::sleep(Duration::from_millis(10));
                continue;
            }
            // EIO is how Linux reports a hung-up slave; anything else is worth a log line.
            if err.raw_os_error() != Some(libc::EIO) {
                log_debug(&format!("PTY read error: {err}"));
            }
            break;
        }
        // SAFETY: this thread owns reader_fd.
        unsafe { close_fd(reader_fd) };
        if report_close {
            let _ = sink(ReadEvent::Closed);
        }
    })
}

/// Write the entire buffer to the PTY master, retrying short writes.
pub(super) fn write_all(fd: RawFd, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        // SAFETY: fd is the session's open master; data is a valid slice.
        let written = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if written < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            return Err(anyhow!("write to PTY failed: {err}"));
        }
        if written == 0 {
            return Err(anyhow!("write to PTY returned 0"));
        }
        let written = written as usize;
        data = if written <= data.len() {
            &data[written..]
        } else {
            &[]
        };
    }
    Ok(())
}
