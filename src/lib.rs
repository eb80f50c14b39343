mod app;
pub mod assistant;
pub mod client;
pub mod config;
pub mod context_folders;
pub mod ipc;
mod lock;
pub mod pty_session;
pub mod server;
pub mod stt;
mod telemetry;
pub mod terminals;
pub mod utf8_safe;
pub mod windows;

pub use app::{
    init_logging, install_panic_hook, log_content, log_debug, log_file_path, ConnectionTag,
    ContentKind,
};
pub(crate) use lock::lock_or_recover;
pub use telemetry::{init_tracing, tracing_log_path};
