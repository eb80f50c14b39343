//! Per-connection terminal session registry.
//!
//! Owns every shell spawned for one client connection. PTY reader threads and
//! terminator threads report back through [`TerminalEvent`]s; the connection loop
//! feeds them to [`TerminalRegistry::handle_event`], which decides what (if anything)
//! the client should hear about.

mod registry;

#[cfg(test)]
mod tests;

use crate::config::AppConfig;
use crate::pty_session::ShellCommand;
use anyhow::{Context, Result};
use std::path::PathBuf;

pub use registry::TerminalRegistry;

pub type TermId = u32;

/// Raw events produced by PTY reader and terminator threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Output { id: TermId, data: Vec<u8> },
    /// The PTY stream ended; the shell is exiting on its own.
    Eof { id: TermId },
    /// The child was reaped after a close or natural exit.
    Reaped {
        id: TermId,
        exit_code: i32,
        signal: Option<i32>,
    },
}

/// Client-facing outcome of a registry transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalNotice {
    Output {
        id: TermId,
        data: String,
    },
    Exit {
        id: TermId,
        exit_code: i32,
        signal: Option<i32>,
    },
}

/// Parameters of a `terminalCreate` request; omitted fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub cols: Option<u16>,
    pub rows: Option<u16>,
    pub cwd: Option<String>,
}

/// Connection-independent settings for spawning shells.
#[derive(Debug, Clone)]
pub struct TerminalDefaults {
    pub shell: ShellCommand,
    pub term: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub max_terminals: usize,
}

impl TerminalDefaults {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            shell: ShellCommand::parse(&config.shell).context("invalid --shell")?,
            term: config.term_value.clone(),
            cwd: config.session_cwd(),
            cols: config.default_cols,
            rows: config.default_rows,
            max_terminals: config.max_terminals,
        })
    }
}
