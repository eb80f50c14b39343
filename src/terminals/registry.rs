use super::{CreateRequest, TermId, TerminalDefaults, TerminalEvent, TerminalNotice};
use crate::config::MAX_TERMINAL_DIMENSION;
use crate::pty_session::{exit_code_of, spawn_reader_thread, PtyShellSession, ReadEvent, SpawnOptions};
use crate::utf8_safe::Utf8ChunkDecoder;
use crate::{log_content, log_debug, ContentKind};
use anyhow::{bail, Result};
use crossbeam_channel::Sender;
use std::collections::{HashMap, HashSet};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Grace period between SIGHUP and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

struct ActiveTerminal {
    session: PtyShellSession,
    decoder: Utf8ChunkDecoder,
}

/// Sessions owned by one connection.
///
/// Ids start at 1 and are never reused. A session is either active (in `sessions`),
/// exiting (waiting for its reaper to report), or gone. Only the reaper report for an
/// exiting id produces an exit notice, so each id exits at most once.
pub struct TerminalRegistry {
    defaults: TerminalDefaults,
    events_tx: Sender<TerminalEvent>,
    sessions: HashMap<TermId, ActiveTerminal>,
    exiting: HashSet<TermId>,
    next_id: TermId,
    closed: bool,
}

impl TerminalRegistry {
    pub fn new(defaults: TerminalDefaults, events_tx: Sender<TerminalEvent>) -> Self {
        Self {
            defaults,
            events_tx,
            sessions: HashMap::new(),
            exiting: HashSet::new(),
            next_id: 1,
            closed: false,
        }
    }

    /// Spawn a shell and register it. Nothing is registered when the spawn fails.
    pub fn create(&mut self, request: &CreateRequest) -> Result<TermId> {
        if self.closed {
            bail!("connection is closing");
        }
        if self.sessions.len() >= self.defaults.max_terminals {
            bail!(
                "terminal limit reached ({} open)",
                self.defaults.max_terminals
            );
        }

        let cols = clamp_dimension(request.cols.unwrap_or(self.defaults.cols));
        let rows = clamp_dimension(request.rows.unwrap_or(self.defaults.rows));
        let cwd = match request.cwd.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.defaults.cwd.clone(),
        };
        if !cwd.is_dir() {
            bail!("working directory '{}' does not exist", cwd.display());
        }

        let options = SpawnOptions {
            shell: self.defaults.shell.clone(),
            cwd,
            term: self.defaults.term.clone(),
            cols,
            rows,
        };
        let session = PtyShellSession::spawn(&options)?;
        let reader_fd = session.clone_reader_fd()?;

        let id = self.next_id;
        self.next_id += 1;

        let tx = self.events_tx.clone();
        spawn_reader_thread(reader_fd, move |event| {
            let event = match event {
                ReadEvent::Chunk(data) => TerminalEvent::Output { id, data },
                ReadEvent::Closed => TerminalEvent::Eof { id },
            };
            tx.send(event).is_ok()
        });

        log_debug(&format!(
            "terminal {id} started (pid {}, {cols}x{rows}, cwd {})",
            session.pid(),
            options.cwd.display()
        ));
        tracing::info!(term_id = id, cols, rows, "terminal created");
        self.sessions.insert(
            id,
            ActiveTerminal {
                session,
                decoder: Utf8ChunkDecoder::new(),
            },
        );
        Ok(id)
    }

    /// Forward input to the shell. Unknown or exited ids are ignored.
    pub fn write(&mut self, id: TermId, data: &str) {
        let Some(terminal) = self.sessions.get(&id) else {
            return;
        };
        log_content(ContentKind::TerminalInput, &format!("terminal {id}: {data:?}"));
        if let Err(err) = terminal.session.send_bytes(data.as_bytes()) {
            log_debug(&format!("terminal {id} write failed: {err:#}"));
        }
    }

    /// Apply new geometry. Unknown or exited ids are ignored.
    pub fn resize(&mut self, id: TermId, cols: u16, rows: u16) {
        let Some(terminal) = self.sessions.get_mut(&id) else {
            return;
        };
        let cols = clamp_dimension(cols);
        let rows = clamp_dimension(rows);
        if let Err(err) = terminal.session.set_winsize(cols, rows) {
            log_debug(&format!("terminal {id} resize failed: {err:#}"));
        }
    }

    /// Terminate a session on request. Exactly one exit notice follows once the
    /// child is reaped.
    pub fn close(&mut self, id: TermId) {
        let Some(terminal) = self.sessions.remove(&id) else {
            return;
        };
        log_debug(&format!("terminal {id} close requested"));
        self.begin_exit(id, terminal.session);
    }

    /// Terminate everything without notifying anyone and refuse further creates.
    pub fn close_all(&mut self) {
        self.closed = true;
        self.exiting.clear();
        let count = self.sessions.len();
        for (id, terminal) in self.sessions.drain() {
            let mut session = terminal.session;
            thread::spawn(move || {
                let status = session.shutdown(TERMINATE_GRACE);
                log_debug(&format!(
                    "terminal {id} terminated on disconnect (exit {})",
                    exit_code_of(&status)
                ));
            });
        }
        if count > 0 {
            tracing::info!(terminals = count, "terminals closed on disconnect");
        }
    }

    /// Fold a reader/reaper event into registry state and return what the client
    /// should be told.
    pub fn handle_event(&mut self, event: TerminalEvent) -> Vec<TerminalNotice> {
        match event {
            TerminalEvent::Output { id, data } => {
                let Some(terminal) = self.sessions.get_mut(&id) else {
                    return Vec::new();
                };
                let text = terminal.decoder.decode(&data);
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![TerminalNotice::Output { id, data: text }]
                }
            }
            TerminalEvent::Eof { id } => {
                let Some(mut terminal) = self.sessions.remove(&id) else {
                    return Vec::new();
                };
                log_debug(&format!("terminal {id} output ended"));
                let tail = terminal.decoder.finish();
                self.begin_exit(id, terminal.session);
                if tail.is_empty() {
                    Vec::new()
                } else {
                    vec![TerminalNotice::Output { id, data: tail }]
                }
            }
            TerminalEvent::Reaped {
                id,
                exit_code,
                signal,
            } => {
                if !self.exiting.remove(&id) {
                    return Vec::new();
                }
                tracing::info!(term_id = id, exit_code, "terminal exited");
                vec![TerminalNotice::Exit {
                    id,
                    exit_code,
                    signal,
                }]
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self, id: TermId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Ids of active sessions in creation order.
    #[cfg(test)]
    pub(crate) fn active_ids(&self) -> Vec<TermId> {
        let mut ids: Vec<TermId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    pub(crate) fn dimensions(&self, id: TermId) -> Option<(u16, u16)> {
        self.sessions
            .get(&id)
            .map(|terminal| terminal.session.dimensions())
    }

    fn begin_exit(&mut self, id: TermId, mut session: PtyShellSession) {
        self.exiting.insert(id);
        let tx = self.events_tx.clone();
        thread::spawn(move || {
            let status = session.shutdown(TERMINATE_GRACE);
            let _ = tx.send(TerminalEvent::Reaped {
                id,
                exit_code: exit_code_of(&status),
                signal: status.signal(),
            });
        });
    }
}

impl Drop for TerminalRegistry {
    fn drop(&mut self) {
        if !self.closed {
            self.close_all();
        }
    }
}

fn clamp_dimension(value: u16) -> u16 {
    value.clamp(1, MAX_TERMINAL_DIMENSION)
}
