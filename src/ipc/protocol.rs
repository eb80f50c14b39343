//! JSON wire protocol carried in WebSocket text frames.
//!
//! Every frame is an object with a `"type"` tag; field names are camelCase. Binary
//! frames carry raw audio and have no schema of their own.

use crate::context_folders::ContextFolder;
use crate::terminals::TermId;
use crate::windows::{Bounds, TargetDescriptor, WindowId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Client → server
// ============================================================================

/// Control frames sent by the phone client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    GetWindows,
    FocusWindow {
        window_id: WindowId,
    },
    CloseWindow {
        window_id: WindowId,
    },
    MaximizeWindow {
        window_id: WindowId,
    },
    MinimizeWindow {
        window_id: WindowId,
    },
    /// Phone dimensions may be fractional CSS pixels.
    GetScreenshot {
        window_id: WindowId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_height: Option<f64>,
    },
    Command {
        window_id: WindowId,
        text: String,
    },
    /// Arms the next binary frame. `windowId` may be a window or one of the
    /// `ai-query` / `terminal-voice[:<id>]` sentinels.
    AudioStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_id: Option<WindowId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        term_id: Option<TermId>,
    },
    AiQuery {
        text: String,
    },
    TerminalCreate {
        #[serde(
            default,
            deserialize_with = "lenient_dimension",
            skip_serializing_if = "Option::is_none"
        )]
        cols: Option<u16>,
        #[serde(
            default,
            deserialize_with = "lenient_dimension",
            skip_serializing_if = "Option::is_none"
        )]
        rows: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        terminal_type: Option<String>,
    },
    TerminalInput {
        term_id: TermId,
        data: String,
    },
    TerminalResize {
        term_id: TermId,
        cols: u16,
        rows: u16,
    },
    TerminalClose {
        term_id: TermId,
    },
    ScanContextFolders {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root_path: Option<String>,
    },
    /// Any other `type`; logged and dropped.
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Server → client
// ============================================================================

/// Replies and pushed events. Each carries the id it relates to, since replies to
/// different requests interleave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Windows {
        data: Vec<TargetDescriptor>,
    },
    FocusResult {
        success: bool,
        window_id: WindowId,
    },
    CloseResult {
        success: bool,
        window_id: WindowId,
    },
    MaximizeResult {
        success: bool,
        window_id: WindowId,
    },
    MinimizeResult {
        success: bool,
        window_id: WindowId,
    },
    Screenshot {
        window_id: WindowId,
        screenshot: String,
        bounds: Bounds,
        width: u32,
        height: u32,
    },
    ScreenshotError {
        window_id: WindowId,
        error: String,
    },
    CommandSuccess {
        window_id: WindowId,
        text: String,
    },
    CommandError {
        window_id: WindowId,
        error: String,
    },
    Transcription {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_id: Option<WindowId>,
    },
    TranscriptionError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_id: Option<WindowId>,
    },
    AiTranscription {
        text: String,
    },
    AiResponse {
        text: String,
    },
    AiError {
        error: String,
    },
    TerminalTranscription {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        term_id: Option<TermId>,
    },
    TerminalTranscriptionError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        term_id: Option<TermId>,
    },
    TerminalCreated {
        term_id: TermId,
    },
    TerminalError {
        error: String,
    },
    TerminalOutput {
        term_id: TermId,
        data: String,
    },
    TerminalExit {
        term_id: TermId,
        exit_code: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<i32>,
    },
    ContextFolders {
        data: Vec<ContextFolder>,
    },
    ContextFoldersError {
        error: String,
    },
}

impl ServerMessage {
    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Windows { .. } => "windows",
            ServerMessage::FocusResult { .. } => "focusResult",
            ServerMessage::CloseResult { .. } => "closeResult",
            ServerMessage::MaximizeResult { .. } => "maximizeResult",
            ServerMessage::MinimizeResult { .. } => "minimizeResult",
            ServerMessage::Screenshot { .. } => "screenshot",
            ServerMessage::ScreenshotError { .. } => "screenshotError",
            ServerMessage::CommandSuccess { .. } => "commandSuccess",
            ServerMessage::CommandError { .. } => "commandError",
            ServerMessage::Transcription { .. } => "transcription",
            ServerMessage::TranscriptionError { .. } => "transcriptionError",
            ServerMessage::AiTranscription { .. } => "aiTranscription",
            ServerMessage::AiResponse { .. } => "aiResponse",
            ServerMessage::AiError { .. } => "aiError",
            ServerMessage::TerminalTranscription { .. } => "terminalTranscription",
            ServerMessage::TerminalTranscriptionError { .. } => "terminalTranscriptionError",
            ServerMessage::TerminalCreated { .. } => "terminalCreated",
            ServerMessage::TerminalError { .. } => "terminalError",
            ServerMessage::TerminalOutput { .. } => "terminalOutput",
            ServerMessage::TerminalExit { .. } => "terminalExit",
            ServerMessage::ContextFolders { .. } => "contextFolders",
            ServerMessage::ContextFoldersError { .. } => "contextFoldersError",
        }
    }
}

/// Terminal geometry as sent by browsers: fractional values are rounded, and zero,
/// negative or non-numeric values fall back to the server default.
fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| n.round().min(f64::from(u16::MAX)) as u16))
}

/// Reply owed to a client whose `type` was recognised but whose fields were not, for
/// requests the client is waiting on with no id to correlate.
pub(super) fn malformed_request_reply(
    text: &str,
    err: &serde_json::Error,
) -> Option<ServerMessage> {
    let frame = serde_json::from_str::<Value>(text).ok()?;
    let error = format!("invalid request: {err}");
    match frame.get("type").and_then(Value::as_str)? {
        "terminalCreate" => Some(ServerMessage::TerminalError { error }),
        "aiQuery" => Some(ServerMessage::AiError { error }),
        "scanContextFolders" => Some(ServerMessage::ContextFoldersError { error }),
        _ => None,
    }
}

// ============================================================================
// Frames as they come off the transport
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}
