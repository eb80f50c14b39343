//! Pairs an `audioStart` control frame with the binary frame that follows it.

use super::protocol::ServerMessage;
use crate::log_debug;
use crate::terminals::TermId;
use crate::windows::WindowId;

/// Reserved `windowId` that routes dictation to the assistant.
pub const ASSISTANT_QUERY_TARGET: &str = "ai-query";
/// Reserved `windowId` that routes dictation to a terminal; may carry `:<termId>`.
pub const TERMINAL_VOICE_TARGET: &str = "terminal-voice";

/// Where a transcription result is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioTarget {
    Window(WindowId),
    AssistantQuery,
    TerminalVoice(Option<TermId>),
}

impl AudioTarget {
    /// Interpret the fields of an `audioStart` frame. `None` means untargeted.
    pub fn from_request(window_id: Option<WindowId>, term_id: Option<TermId>) -> Option<Self> {
        let Some(window_id) = window_id else {
            return term_id.map(|id| AudioTarget::TerminalVoice(Some(id)));
        };
        let WindowId::Text(text) = &window_id else {
            return Some(AudioTarget::Window(window_id));
        };
        if text == ASSISTANT_QUERY_TARGET {
            return Some(AudioTarget::AssistantQuery);
        }
        if text == TERMINAL_VOICE_TARGET {
            return Some(AudioTarget::TerminalVoice(term_id));
        }
        if let Some(suffix) = text
            .strip_prefix(TERMINAL_VOICE_TARGET)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return Some(AudioTarget::TerminalVoice(suffix.parse().ok().or(term_id)));
        }
        Some(AudioTarget::Window(window_id))
    }
}

/// Idle / armed state for one connection.
#[derive(Debug, Default)]
pub struct AudioCorrelator {
    armed: Option<AudioTarget>,
}

impl AudioCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for the next binary frame. A previous unconsumed arming is discarded.
    pub fn arm(&mut self, target: Option<AudioTarget>) {
        if let Some(previous) = self.armed.take() {
            log_debug(&format!(
                "audio: re-armed before audio arrived; dropping {previous:?}"
            ));
        }
        self.armed = target;
    }

    /// Consume the arming for a binary frame that just arrived.
    pub fn take(&mut self) -> Option<AudioTarget> {
        self.armed.take()
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    #[cfg(test)]
    pub(crate) fn armed(&self) -> Option<&AudioTarget> {
        self.armed.as_ref()
    }
}

/// Reply frame for a finished transcription.
pub fn route_transcription(
    target: Option<&AudioTarget>,
    result: Result<String, String>,
) -> ServerMessage {
    match (target, result) {
        (Some(AudioTarget::AssistantQuery), Ok(text)) => ServerMessage::AiTranscription { text },
        (Some(AudioTarget::AssistantQuery), Err(error)) => ServerMessage::AiError { error },
        (Some(AudioTarget::TerminalVoice(term_id)), Ok(text)) => {
            ServerMessage::TerminalTranscription {
                text,
                term_id: *term_id,
            }
        }
        (Some(AudioTarget::TerminalVoice(term_id)), Err(error)) => {
            ServerMessage::TerminalTranscriptionError {
                error,
                term_id: *term_id,
            }
        }
        (Some(AudioTarget::Window(id)), Ok(text)) => ServerMessage::Transcription {
            text,
            window_id: Some(id.clone()),
        },
        (Some(AudioTarget::Window(id)), Err(error)) => ServerMessage::TranscriptionError {
            error,
            window_id: Some(id.clone()),
        },
        (None, Ok(text)) => ServerMessage::Transcription {
            text,
            window_id: None,
        },
        (None, Err(error)) => ServerMessage::TranscriptionError {
            error,
            window_id: None,
        },
    }
}
