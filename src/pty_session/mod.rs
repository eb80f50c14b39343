//! Minimal PTY wrapper that hosts one interactive shell per remote terminal session.

mod io;
mod pty;


pub use io::{spawn_reader_thread, ReadEvent};
pub use pty::{
    exit_code_of, resolve_executable, PtyShellSession, ShellCommand, SpawnOptions,
};
