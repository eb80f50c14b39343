//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser};
use std::path::PathBuf;

pub use defaults::{
    default_shell, home_dir, DEFAULT_AI_MAX_TOKENS, DEFAULT_AI_MODEL, DEFAULT_AI_SYSTEM_PROMPT,
    DEFAULT_AI_TIMEOUT_MS, DEFAULT_API_BASE_URL, DEFAULT_CLOSE_REFRESH_DELAY_MS, DEFAULT_COLS,
    DEFAULT_MAX_TERMINALS, DEFAULT_MIN_WINDOW_HEIGHT, DEFAULT_MIN_WINDOW_WIDTH, DEFAULT_PORT,
    DEFAULT_ROWS, DEFAULT_STT_MODEL, DEFAULT_STT_TIMEOUT_MS, DEFAULT_TERM, IGNORED_EXECUTABLES,
    IGNORED_TITLES, MAX_TERMINAL_DIMENSION,
};

/// CLI options for the deskremote server. Validated values keep spawned shells and
/// outbound service calls within sane bounds.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "DeskRemote: drive desktop windows and shell sessions from a phone over one WebSocket",
    author,
    version
)]
pub struct AppConfig {
    /// Interface to bind the WebSocket listener on
    #[arg(long, env = "DESKREMOTE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the WebSocket listener on
    #[arg(long, env = "DESKREMOTE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Shell command line started for each terminal session (split shell-style)
    #[arg(long, env = "DESKREMOTE_SHELL", default_value_t = default_shell())]
    pub shell: String,

    /// TERM value exported to terminal sessions
    #[arg(long = "term", default_value = DEFAULT_TERM)]
    pub term_value: String,

    /// Working directory for sessions created without an explicit cwd (defaults to $HOME)
    #[arg(long = "default-cwd")]
    pub default_cwd: Option<PathBuf>,

    /// Columns used when a terminalCreate omits them
    #[arg(long = "default-cols", default_value_t = DEFAULT_COLS)]
    pub default_cols: u16,

    /// Rows used when a terminalCreate omits them
    #[arg(long = "default-rows", default_value_t = DEFAULT_ROWS)]
    pub default_rows: u16,

    /// Maximum concurrently open terminal sessions per connection
    #[arg(long = "max-terminals", default_value_t = DEFAULT_MAX_TERMINALS)]
    pub max_terminals: usize,

    /// Base URL of the OpenAI-compatible API used for transcription and the assistant
    #[arg(long = "api-base-url", env = "DESKREMOTE_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// API key for transcription and assistant calls
    #[arg(long = "api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Transcription model name
    #[arg(long = "stt-model", default_value = DEFAULT_STT_MODEL)]
    pub stt_model: String,

    /// Transcription language (ISO-639-1 code or "auto")
    #[arg(long = "stt-lang", default_value = "en")]
    pub stt_lang: String,

    /// Transcription request timeout (milliseconds)
    #[arg(long = "stt-timeout-ms", default_value_t = DEFAULT_STT_TIMEOUT_MS)]
    pub stt_timeout_ms: u64,

    /// Assistant completion model name
    #[arg(long = "ai-model", default_value = DEFAULT_AI_MODEL)]
    pub ai_model: String,

    /// Token cap for assistant replies
    #[arg(long = "ai-max-tokens", default_value_t = DEFAULT_AI_MAX_TOKENS)]
    pub ai_max_tokens: u32,

    /// System prompt for the assistant
    #[arg(long = "ai-system-prompt", default_value = DEFAULT_AI_SYSTEM_PROMPT)]
    pub ai_system_prompt: String,

    /// Assistant request timeout (milliseconds)
    #[arg(long = "ai-timeout-ms", default_value_t = DEFAULT_AI_TIMEOUT_MS)]
    pub ai_timeout_ms: u64,

    /// Window title to hide from the catalog (repeatable, added to the built-in list)
    #[arg(long = "ignore-title", action = ArgAction::Append, value_name = "TITLE")]
    pub ignore_titles: Vec<String>,

    /// Executable basename to hide from the catalog (repeatable, added to the built-in list)
    #[arg(long = "ignore-exe", action = ArgAction::Append, value_name = "NAME")]
    pub ignore_executables: Vec<String>,

    /// Minimum window width to appear in the catalog
    #[arg(long = "min-window-width", default_value_t = DEFAULT_MIN_WINDOW_WIDTH)]
    pub min_window_width: u32,

    /// Minimum window height to appear in the catalog
    #[arg(long = "min-window-height", default_value_t = DEFAULT_MIN_WINDOW_HEIGHT)]
    pub min_window_height: u32,

    /// Delay before re-sending the catalog after a window close (milliseconds)
    #[arg(long = "close-refresh-delay-ms", default_value_t = DEFAULT_CLOSE_REFRESH_DELAY_MS)]
    pub close_refresh_delay_ms: u64,

    /// Run without a desktop backend (empty catalog, window actions fail)
    #[arg(long = "headless", env = "DESKREMOTE_HEADLESS", default_value_t = false)]
    pub headless: bool,

    /// Directory holding Claude project conversation logs (defaults to ~/.claude/projects)
    #[arg(long = "claude-projects-dir")]
    pub claude_projects_dir: Option<PathBuf>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "DESKREMOTE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "DESKREMOTE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging dictated text, commands and terminal input (debug log only)
    #[arg(
        long = "log-content",
        env = "DESKREMOTE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

impl AppConfig {
    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Working directory for new sessions when the client does not pick one.
    pub fn session_cwd(&self) -> PathBuf {
        self.default_cwd.clone().unwrap_or_else(home_dir)
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.claude_projects_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude").join("projects"))
    }

    /// Built-in title denylist plus any `--ignore-title` additions.
    pub fn title_denylist(&self) -> Vec<String> {
        IGNORED_TITLES
            .iter()
            .map(|s| s.to_string())
            .chain(self.ignore_titles.iter().cloned())
            .collect()
    }

    /// Built-in executable denylist plus any `--ignore-exe` additions.
    pub fn executable_denylist(&self) -> Vec<String> {
        IGNORED_EXECUTABLES
            .iter()
            .map(|s| s.to_string())
            .chain(self.ignore_executables.iter().cloned())
            .collect()
    }
}
