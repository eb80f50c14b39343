use std::env;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_TERM: &str = "xterm-256color";
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;
pub const DEFAULT_MAX_TERMINALS: usize = 16;
pub const MAX_TERMINAL_DIMENSION: u16 = 1000;

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_STT_MODEL: &str = "whisper-1";
pub const DEFAULT_STT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AI_MAX_TOKENS: u32 = 500;
pub const DEFAULT_AI_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_AI_SYSTEM_PROMPT: &str = "You are Eddie, a helpful voice assistant. Keep your responses concise and conversational since they will be read aloud or displayed on a small screen. Be friendly but efficient.";
pub(super) const MIN_REQUEST_TIMEOUT_MS: u64 = 1_000;
pub(super) const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;
pub(super) const MAX_AI_TOKENS: u32 = 8_192;

pub const DEFAULT_MIN_WINDOW_WIDTH: u32 = 100;
pub const DEFAULT_MIN_WINDOW_HEIGHT: u32 = 50;
pub const DEFAULT_CLOSE_REFRESH_DELAY_MS: u64 = 500;
pub(super) const MAX_CLOSE_REFRESH_DELAY_MS: u64 = 10_000;

/// System and background windows that never make sense to drive remotely.
pub const IGNORED_TITLES: &[&str] = &[
    "Program Manager",
    "Windows Input Experience",
    "Microsoft Text Input Application",
    "Settings",
    "MSCTFIME UI",
    "Default IME",
];

/// Background host processes whose windows are hidden from the catalog.
pub const IGNORED_EXECUTABLES: &[&str] = &[
    "ApplicationFrameHost.exe",
    "TextInputHost.exe",
    "ShellExperienceHost.exe",
    "SearchHost.exe",
    "StartMenuExperienceHost.exe",
];

pub fn default_shell() -> String {
    env::var("SHELL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "bash".to_string())
}

pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}
