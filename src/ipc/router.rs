use crate::context_folders::scan_context_folders;
use crate::terminals::{CreateRequest, TermId};
use crate::windows::{capture_window, list_targets, WindowId};
use crate::{log_content, log_debug, ContentKind};
use std::thread;

use super::audio::{route_transcription, AudioTarget};
use super::protocol::{malformed_request_reply, ClientMessage, InboundFrame, ServerMessage};
use super::session::{send_reply, ConnectionState, Services};

// ============================================================================
// Frame Dispatch
// ============================================================================

/// Route one inbound frame. Never fails: problems become typed error replies or
/// log lines.
pub(super) fn dispatch_frame(state: &mut ConnectionState, frame: InboundFrame) {
    match frame {
        InboundFrame::Binary(audio) => handle_audio_frame(state, audio),
        InboundFrame::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => dispatch_message(state, message),
            Err(err) => {
                log_debug(&format!("malformed frame: {err}"));
                if let Some(reply) = malformed_request_reply(&text, &err) {
                    state.send(reply);
                }
            }
        },
    }
}

pub(super) fn dispatch_message(state: &mut ConnectionState, message: ClientMessage) {
    match message {
        ClientMessage::GetWindows => handle_get_windows(state),
        ClientMessage::FocusWindow { window_id } => {
            handle_window_action(state, WindowAction::Focus, window_id)
        }
        ClientMessage::CloseWindow { window_id } => {
            handle_window_action(state, WindowAction::Close, window_id)
        }
        ClientMessage::MaximizeWindow { window_id } => {
            handle_window_action(state, WindowAction::Maximize, window_id)
        }
        ClientMessage::MinimizeWindow { window_id } => {
            handle_window_action(state, WindowAction::Minimize, window_id)
        }
        ClientMessage::GetScreenshot {
            window_id,
            screen_width,
            screen_height,
        } => handle_screenshot(state, window_id, phone_screen(screen_width, screen_height)),
        ClientMessage::Command { window_id, text } => handle_command(state, window_id, text),
        ClientMessage::AudioStart { window_id, term_id } => {
            handle_audio_start(state, window_id, term_id)
        }
        ClientMessage::AiQuery { text } => handle_ai_query(state, text),
        ClientMessage::TerminalCreate {
            cols,
            rows,
            cwd,
            terminal_type,
        } => {
            if let Some(kind) = terminal_type.as_deref() {
                log_debug(&format!("terminalCreate for {kind} session"));
            }
            handle_terminal_create(state, CreateRequest { cols, rows, cwd });
        }
        ClientMessage::TerminalInput { term_id, data } => state.terminals.write(term_id, &data),
        ClientMessage::TerminalResize {
            term_id,
            cols,
            rows,
        } => state.terminals.resize(term_id, cols, rows),
        ClientMessage::TerminalClose { term_id } => state.terminals.close(term_id),
        ClientMessage::ScanContextFolders { root_path } => {
            handle_scan_context_folders(state, root_path)
        }
        ClientMessage::Unknown => log_debug("ignoring frame with unknown type"),
    }
}

// ============================================================================
// Window Handlers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WindowAction {
    Focus,
    Close,
    Maximize,
    Minimize,
}

impl WindowAction {
    fn as_str(self) -> &'static str {
        match self {
            WindowAction::Focus => "focus",
            WindowAction::Close => "close",
            WindowAction::Maximize => "maximize",
            WindowAction::Minimize => "minimize",
        }
    }

    fn reply(self, success: bool, window_id: WindowId) -> ServerMessage {
        match self {
            WindowAction::Focus => ServerMessage::FocusResult { success, window_id },
            WindowAction::Close => ServerMessage::CloseResult { success, window_id },
            WindowAction::Maximize => ServerMessage::MaximizeResult { success, window_id },
            WindowAction::Minimize => ServerMessage::MinimizeResult { success, window_id },
        }
    }
}

pub(super) fn handle_get_windows(state: &ConnectionState) {
    state.spawn_worker("windows", |services, outbound| {
        send_reply(outbound, catalog_snapshot(services));
    });
}

/// Current catalog as a `windows` frame. A failed enumeration is an empty catalog.
fn catalog_snapshot(services: &Services) -> ServerMessage {
    let data = match list_targets(services.windows.as_ref(), &services.filter, services.icons) {
        Ok(targets) => targets,
        Err(err) => {
            log_debug(&format!("window enumeration failed: {err:#}"));
            Vec::new()
        }
    };
    ServerMessage::Windows { data }
}

fn handle_window_action(state: &ConnectionState, action: WindowAction, window_id: WindowId) {
    state.spawn_worker(action.as_str(), move |services, outbound| {
        let control = services.windows.as_ref();
        let result = match action {
            WindowAction::Focus => control.focus(&window_id),
            WindowAction::Close => control.close(&window_id),
            WindowAction::Maximize => control.maximize(&window_id),
            WindowAction::Minimize => control.minimize(&window_id),
        };
        let success = result.unwrap_or_else(|err| {
            log_debug(&format!(
                "{} window {window_id} failed: {err:#}",
                action.as_str()
            ));
            false
        });
        log_debug(&format!(
            "{} window {window_id}: {}",
            action.as_str(),
            if success { "ok" } else { "not done" }
        ));
        send_reply(outbound, action.reply(success, window_id));

        if action == WindowAction::Close {
            thread::sleep(services.close_refresh_delay);
            send_reply(outbound, catalog_snapshot(services));
        }
    });
}

/// Phone screen size in whole pixels, when both dimensions are usable.
pub(super) fn phone_screen(width: Option<f64>, height: Option<f64>) -> Option<(u32, u32)> {
    let to_px = |value: f64| (value.is_finite() && value >= 1.0).then(|| value.round() as u32);
    Some((to_px(width?)?, to_px(height?)?))
}

fn handle_screenshot(state: &ConnectionState, window_id: WindowId, screen: Option<(u32, u32)>) {
    state.spawn_worker("screenshot", move |services, outbound| {
        let reply = match capture_window(
            services.windows.as_ref(),
            &window_id,
            screen,
            services.screenshot_timing,
        ) {
            Ok(shot) => ServerMessage::Screenshot {
                window_id,
                screenshot: shot.data_url,
                bounds: shot.bounds,
                width: shot.width,
                height: shot.height,
            },
            Err(err) => {
                log_debug(&format!("screenshot of {window_id} failed: {err:#}"));
                ServerMessage::ScreenshotError {
                    window_id,
                    error: format!("{err:#}"),
                }
            }
        };
        send_reply(outbound, reply);
    });
}

fn handle_command(state: &ConnectionState, window_id: WindowId, text: String) {
    log_content(ContentKind::Command, &format!("window {window_id}: {text:?}"));
    state.spawn_worker("command", move |services, outbound| {
        let reply = match services.windows.inject_text(&window_id, &text) {
            Ok(()) => ServerMessage::CommandSuccess { window_id, text },
            Err(err) => {
                log_debug(&format!("command for window {window_id} failed: {err:#}"));
                ServerMessage::CommandError {
                    window_id,
                    error: format!("{err:#}"),
                }
            }
        };
        send_reply(outbound, reply);
    });
}

// ============================================================================
// Audio Handlers
// ============================================================================

fn handle_audio_start(
    state: &mut ConnectionState,
    window_id: Option<WindowId>,
    term_id: Option<TermId>,
) {
    let target = AudioTarget::from_request(window_id, term_id);
    log_debug(&format!("expecting audio for {target:?}"));
    state.audio.arm(target);
}

fn handle_audio_frame(state: &mut ConnectionState, audio: Vec<u8>) {
    let target = state.audio.take();
    log_debug(&format!(
        "received {} bytes of audio for {target:?}",
        audio.len()
    ));
    state.spawn_worker("transcribe", move |services, outbound| {
        let result = services
            .transcriber
            .transcribe(&audio)
            .map_err(|err| format!("{err:#}"));
        match &result {
            Ok(text) => log_content(ContentKind::Transcript, &format!("{text:?}")),
            Err(err) => log_debug(&format!("transcription failed: {err}")),
        }
        let reply = route_transcription(target.as_ref(), result);
        tracing::info!(kind = reply.kind(), bytes = audio.len(), "transcription routed");
        send_reply(outbound, reply);
    });
}

fn handle_ai_query(state: &ConnectionState, text: String) {
    log_content(ContentKind::Assistant, &format!("query {text:?}"));
    state.spawn_worker("assistant", move |services, outbound| {
        let reply = match services.assistant.answer(&text) {
            Ok(answer) => {
                log_content(ContentKind::Assistant, &format!("answer {answer:?}"));
                ServerMessage::AiResponse { text: answer }
            }
            Err(err) => {
                log_debug(&format!("assistant query failed: {err:#}"));
                ServerMessage::AiError {
                    error: format!("{err:#}"),
                }
            }
        };
        send_reply(outbound, reply);
    });
}

// ============================================================================
// Terminal Handlers
// ============================================================================

fn handle_terminal_create(state: &mut ConnectionState, request: CreateRequest) {
    let reply = match state.terminals.create(&request) {
        Ok(term_id) => ServerMessage::TerminalCreated { term_id },
        Err(err) => {
            log_debug(&format!("terminal create failed: {err:#}"));
            ServerMessage::TerminalError {
                error: format!("{err:#}"),
            }
        }
    };
    state.send(reply);
}

// ============================================================================
// Context Folders
// ============================================================================

fn handle_scan_context_folders(state: &ConnectionState, root_path: Option<String>) {
    state.spawn_worker("context-scan", move |services, outbound| {
        let root = root_path.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let reply = match scan_context_folders(&services.projects_dir, root) {
            Ok(data) => {
                log_debug(&format!("found {} context folders", data.len()));
                ServerMessage::ContextFolders { data }
            }
            Err(err) => {
                log_debug(&format!("context folder scan failed: {err:#}"));
                ServerMessage::ContextFoldersError {
                    error: format!("{err:#}"),
                }
            }
        };
        send_reply(outbound, reply);
    });
}
