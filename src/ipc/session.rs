use crate::assistant::{Assistant, ChatAssistant};
use crate::config::AppConfig;
use crate::stt::{RemoteTranscriber, Transcriber};
use crate::terminals::{TerminalDefaults, TerminalEvent, TerminalNotice, TerminalRegistry};
use crate::windows::{icon_cache, CatalogFilter, IconCache, ScreenshotTiming, WindowControl};
use crate::{log_debug, ConnectionTag};
use anyhow::Result;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::audio::AudioCorrelator;
use super::protocol::{InboundFrame, ServerMessage};
use super::router::{dispatch_frame, handle_get_windows};

// ============================================================================
// Shared services
// ============================================================================

/// Collaborators shared by every connection on one server.
pub struct Services {
    pub windows: Arc<dyn WindowControl>,
    pub transcriber: Arc<dyn Transcriber>,
    pub assistant: Arc<dyn Assistant>,
    pub filter: CatalogFilter,
    pub icons: &'static IconCache,
    pub terminal_defaults: TerminalDefaults,
    pub projects_dir: PathBuf,
    pub close_refresh_delay: Duration,
    pub screenshot_timing: ScreenshotTiming,
}

impl Services {
    /// Production services for `config`, driving the given desktop backend.
    pub fn from_config(config: &AppConfig, windows: Arc<dyn WindowControl>) -> Result<Self> {
        Ok(Self {
            windows,
            transcriber: Arc::new(RemoteTranscriber::from_config(config)?),
            assistant: Arc::new(ChatAssistant::from_config(config)?),
            filter: CatalogFilter::from_config(config),
            icons: icon_cache(),
            terminal_defaults: TerminalDefaults::from_config(config)?,
            projects_dir: config.projects_dir(),
            close_refresh_delay: Duration::from_millis(config.close_refresh_delay_ms),
            screenshot_timing: ScreenshotTiming::default(),
        })
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Everything one client connection owns. Never shared with another connection.
pub(super) struct ConnectionState {
    pub(super) services: Arc<Services>,
    pub(super) outbound: Sender<ServerMessage>,
    pub(super) terminals: TerminalRegistry,
    pub(super) audio: AudioCorrelator,
}

impl ConnectionState {
    pub(super) fn new(
        services: Arc<Services>,
        outbound: Sender<ServerMessage>,
        terminal_events: Sender<TerminalEvent>,
    ) -> Self {
        let terminals = TerminalRegistry::new(services.terminal_defaults.clone(), terminal_events);
        Self {
            services,
            outbound,
            terminals,
            audio: AudioCorrelator::new(),
        }
    }

    pub(super) fn send(&self, message: ServerMessage) {
        send_reply(&self.outbound, message);
    }

    /// Run `job` off the connection loop. Its replies go straight to the outbound queue.
    pub(super) fn spawn_worker<F>(&self, label: &str, job: F)
    where
        F: FnOnce(&Services, &Sender<ServerMessage>) + Send + 'static,
    {
        let services = Arc::clone(&self.services);
        let outbound = self.outbound.clone();
        let connection = ConnectionTag::current();
        let spawned = thread::Builder::new()
            .name(format!("deskremote-{label}"))
            .spawn(move || {
                let _tag = connection.map(ConnectionTag::enter);
                job(&services, &outbound)
            });
        if let Err(err) = spawned {
            log_debug(&format!("failed to spawn {label} worker: {err}"));
        }
    }

    pub(super) fn handle_terminal_event(&mut self, event: TerminalEvent) {
        for notice in self.terminals.handle_event(event) {
            let message = match notice {
                TerminalNotice::Output { id, data } => {
                    ServerMessage::TerminalOutput { term_id: id, data }
                }
                TerminalNotice::Exit {
                    id,
                    exit_code,
                    signal,
                } => ServerMessage::TerminalExit {
                    term_id: id,
                    exit_code,
                    signal,
                },
            };
            self.send(message);
        }
    }
}

/// Queue a reply. A closed queue means the client is gone; the reply is dropped.
pub(super) fn send_reply(outbound: &Sender<ServerMessage>, message: ServerMessage) {
    let kind = message.kind();
    if outbound.send(message).is_err() {
        log_debug(&format!("dropping {kind} reply: connection closed"));
    }
}

// ============================================================================
// Connection Loop
// ============================================================================

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Undelivered PTY reads per connection. While the queue is full the reader threads
/// block and a chatty shell stalls on its own PTY buffer.
const TERMINAL_EVENT_CAPACITY: usize = 64;

/// Serve one client until its inbound frame channel disconnects.
///
/// Frames are handled one at a time in arrival order. Terminal output and exit
/// events are interleaved with them through the same loop, so a `terminalCreated`
/// reply always precedes that terminal's first output. Every terminal this
/// connection opened is terminated before returning.
pub fn run_connection(
    services: Arc<Services>,
    inbound: Receiver<InboundFrame>,
    outbound: Sender<ServerMessage>,
) {
    let connection = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
    let _tag = ConnectionTag::enter(connection);
    let _span = tracing::info_span!("connection", conn = connection).entered();

    let (terminal_tx, terminal_rx) = bounded(TERMINAL_EVENT_CAPACITY);
    let mut state = ConnectionState::new(services, outbound, terminal_tx);
    log_debug("connection opened");
    tracing::info!("connection opened");

    handle_get_windows(&state);

    loop {
        select! {
            recv(inbound) -> frame => match frame {
                Ok(frame) => dispatch_frame(&mut state, frame),
                Err(_) => break,
            },
            recv(terminal_rx) -> event => {
                if let Ok(event) = event {
                    state.handle_terminal_event(event);
                }
            }
        }
    }

    let open = state.terminals.len();
    state.terminals.close_all();
    log_debug(&format!("connection closed ({open} terminals terminated)"));
    tracing::info!(terminals = open, "connection closed");
}
