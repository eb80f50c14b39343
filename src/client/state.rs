use crate::context_folders::ContextFolder;
use crate::ipc::{ClientMessage, ServerMessage, ASSISTANT_QUERY_TARGET, TERMINAL_VOICE_TARGET};
use crate::terminals::TermId;
use crate::windows::{merge_targets, Bounds, TargetDescriptor, WindowId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Output kept per terminal view; older output is discarded.
const SCROLLBACK_BYTES: usize = 256 * 1024;

/// What kind of program a terminal was opened for. Decides the dictation line ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminalKind {
    #[default]
    Regular,
    Claude,
    Gemini,
}

impl TerminalKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "claude" => TerminalKind::Claude,
            "gemini" => TerminalKind::Gemini,
            _ => TerminalKind::Regular,
        }
    }

    /// Guess the kind from the command a new terminal will run.
    pub fn from_command(command: &str) -> Self {
        if command.contains("claude") {
            TerminalKind::Claude
        } else if command.contains("gemini") {
            TerminalKind::Gemini
        } else {
            TerminalKind::Regular
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TerminalKind::Regular => "regular",
            TerminalKind::Claude => "claude",
            TerminalKind::Gemini => "gemini",
        }
    }

    /// Claude's prompt submits on LF; line-based shells on CR.
    pub fn line_ending(self) -> &'static str {
        match self {
            TerminalKind::Claude => "\n",
            _ => "\r",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalView {
    pub kind: TerminalKind,
    pub output: String,
    /// Dictated text not yet sent to the shell.
    pub dictation: String,
    pub transcribing: bool,
    pub exit_code: Option<i32>,
}

impl TerminalView {
    pub fn is_exited(&self) -> bool {
        self.exit_code.is_some()
    }

    fn push_output(&mut self, data: &str) {
        self.output.push_str(data);
        if self.output.len() > SCROLLBACK_BYTES {
            let mut cut = self.output.len() - SCROLLBACK_BYTES;
            while !self.output.is_char_boundary(cut) {
                cut += 1;
            }
            self.output.drain(..cut);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotView {
    pub data_url: String,
    pub bounds: Bounds,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantView {
    pub query: String,
    pub processing: bool,
    pub response: Option<Result<String, String>>,
}

/// Everything the client remembers between frames.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub windows: Vec<TargetDescriptor>,
    /// Dictated text per window card, waiting for a `command`.
    pub card_texts: HashMap<WindowId, String>,
    pub transcribing: HashSet<WindowId>,
    /// Last untargeted transcription or error line.
    pub status: Option<String>,
    pub detail_window: Option<WindowId>,
    pub screenshot: Option<Result<ScreenshotView, String>>,
    pub assistant: AssistantView,
    pub terminals: BTreeMap<TermId, TerminalView>,
    pub voice_terminal: Option<TermId>,
    pub context_folders: Option<Result<Vec<ContextFolder>, String>>,
    pending_terminal_kind: Option<TerminalKind>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server frame into the store. Returns frames the client sends in
    /// response.
    pub fn apply(&mut self, message: ServerMessage) -> Vec<ClientMessage> {
        match message {
            ServerMessage::Windows { data } => {
                self.windows = merge_targets(&self.windows, &data);
            }
            ServerMessage::FocusResult { .. }
            | ServerMessage::MaximizeResult { .. }
            | ServerMessage::MinimizeResult { .. }
            | ServerMessage::CommandSuccess { .. } => {}
            ServerMessage::CloseResult { success, window_id } => {
                if success {
                    self.card_texts.remove(&window_id);
                    self.transcribing.remove(&window_id);
                }
            }
            ServerMessage::Transcription { text, window_id } => match window_id {
                Some(id) => {
                    self.transcribing.remove(&id);
                    self.append_card_text(id, &text);
                }
                None => self.status = Some(text),
            },
            ServerMessage::TranscriptionError { error, window_id } => {
                if let Some(id) = window_id {
                    self.transcribing.remove(&id);
                }
                self.status = Some(format!("Error: {error}"));
            }
            ServerMessage::Screenshot {
                window_id,
                screenshot,
                bounds,
                width,
                height,
            } => {
                if self.detail_window.as_ref() == Some(&window_id) {
                    self.screenshot = Some(Ok(ScreenshotView {
                        data_url: screenshot,
                        bounds,
                        width,
                        height,
                    }));
                }
            }
            ServerMessage::ScreenshotError { window_id, error } => {
                if self.detail_window.as_ref() == Some(&window_id) {
                    self.screenshot = Some(Err(error));
                }
            }
            ServerMessage::CommandError { error, .. } | ServerMessage::TerminalError { error } => {
                self.status = Some(format!("Error: {error}"));
            }
            ServerMessage::AiTranscription { text } => {
                self.assistant.query = text.clone();
                self.assistant.processing = true;
                return vec![ClientMessage::AiQuery { text }];
            }
            ServerMessage::AiResponse { text } => {
                self.assistant.processing = false;
                self.assistant.response = Some(Ok(text));
            }
            ServerMessage::AiError { error } => {
                self.assistant.processing = false;
                self.assistant.response = Some(Err(error));
            }
            ServerMessage::TerminalCreated { term_id } => {
                let kind = self.pending_terminal_kind.take().unwrap_or_default();
                self.terminals.insert(
                    term_id,
                    TerminalView {
                        kind,
                        ..TerminalView::default()
                    },
                );
            }
            ServerMessage::TerminalOutput { term_id, data } => {
                if let Some(view) = self.terminals.get_mut(&term_id) {
                    view.push_output(&data);
                }
            }
            ServerMessage::TerminalExit {
                term_id, exit_code, ..
            } => {
                if let Some(view) = self.terminals.get_mut(&term_id) {
                    view.exit_code = Some(exit_code);
                    view.transcribing = false;
                }
                if self.voice_terminal == Some(term_id) {
                    self.voice_terminal = None;
                }
            }
            ServerMessage::TerminalTranscription { text, term_id } => {
                if let Some(view) = self.take_voice_terminal(term_id) {
                    view.transcribing = false;
                    append_spaced(&mut view.dictation, &text);
                }
            }
            ServerMessage::TerminalTranscriptionError { error, term_id } => {
                if let Some(view) = self.take_voice_terminal(term_id) {
                    view.transcribing = false;
                }
                self.status = Some(format!("Error: {error}"));
            }
            ServerMessage::ContextFolders { data } => self.context_folders = Some(Ok(data)),
            ServerMessage::ContextFoldersError { error } => {
                self.context_folders = Some(Err(error));
            }
        }
        Vec::new()
    }

    /// Ask for a new terminal. The kind is remembered until `terminalCreated` arrives.
    pub fn request_terminal(
        &mut self,
        cols: u16,
        rows: u16,
        cwd: Option<String>,
        kind: TerminalKind,
    ) -> ClientMessage {
        self.pending_terminal_kind = Some(kind);
        ClientMessage::TerminalCreate {
            cols: Some(cols),
            rows: Some(rows),
            cwd,
            terminal_type: Some(kind.as_str().to_string()),
        }
    }

    pub fn start_window_dictation(&mut self, window_id: WindowId) -> ClientMessage {
        self.transcribing.insert(window_id.clone());
        ClientMessage::AudioStart {
            window_id: Some(window_id),
            term_id: None,
        }
    }

    pub fn start_terminal_dictation(&mut self, term_id: TermId) -> ClientMessage {
        self.voice_terminal = Some(term_id);
        if let Some(view) = self.terminals.get_mut(&term_id) {
            view.transcribing = true;
        }
        ClientMessage::AudioStart {
            window_id: Some(WindowId::from(TERMINAL_VOICE_TARGET)),
            term_id: Some(term_id),
        }
    }

    pub fn start_assistant_dictation(&mut self) -> ClientMessage {
        self.assistant.processing = true;
        self.assistant.response = None;
        ClientMessage::AudioStart {
            window_id: Some(WindowId::from(ASSISTANT_QUERY_TARGET)),
            term_id: None,
        }
    }

    /// Send the window's accumulated dictation as a command and clear it.
    pub fn submit_card_text(&mut self, window_id: &WindowId) -> Option<ClientMessage> {
        let text = self.card_texts.remove(window_id).filter(|t| !t.is_empty())?;
        Some(ClientMessage::Command {
            window_id: window_id.clone(),
            text,
        })
    }

    /// Type the terminal's accumulated dictation followed by `line_ending`, then
    /// clear it. Nothing is sent for unknown terminals or empty dictation.
    pub fn submit_terminal_dictation(
        &mut self,
        term_id: TermId,
        line_ending: &str,
    ) -> Vec<ClientMessage> {
        let Some(view) = self.terminals.get_mut(&term_id) else {
            return Vec::new();
        };
        if view.dictation.is_empty() {
            return Vec::new();
        }
        let text = std::mem::take(&mut view.dictation);
        vec![
            ClientMessage::TerminalInput {
                term_id,
                data: text,
            },
            ClientMessage::TerminalInput {
                term_id,
                data: line_ending.to_string(),
            },
        ]
    }

    /// Open the detail page for a window and request its screenshot.
    pub fn open_detail(&mut self, window_id: WindowId, screen: Option<(f64, f64)>) -> ClientMessage {
        self.detail_window = Some(window_id.clone());
        self.screenshot = None;
        ClientMessage::GetScreenshot {
            window_id,
            screen_width: screen.map(|(w, _)| w),
            screen_height: screen.map(|(_, h)| h),
        }
    }

    fn append_card_text(&mut self, window_id: WindowId, text: &str) {
        append_spaced(self.card_texts.entry(window_id).or_default(), text);
    }

    /// Resolve which terminal a voice reply belongs to and disarm the local marker.
    fn take_voice_terminal(&mut self, term_id: Option<TermId>) -> Option<&mut TerminalView> {
        let armed = self.voice_terminal.take();
        let id = term_id.or(armed)?;
        self.terminals.get_mut(&id)
    }
}

fn append_spaced(buffer: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(text);
}
