//! DeskRemote server entrypoint.
//!
//! Binds the WebSocket listener and serves each phone client on its own thread.
//! Window control goes through X11 tools when a display is reachable and falls back
//! to a headless backend otherwise; terminals work either way.

use anyhow::Result;
use deskremote::config::AppConfig;
use deskremote::ipc::Services;
use deskremote::windows::{HeadlessDesktop, WindowControl, X11Desktop};
use deskremote::{
    init_logging, init_tracing, install_panic_hook, log_debug, log_file_path, server,
    tracing_log_path,
};
use std::sync::Arc;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();

    log_debug("=== DeskRemote Server Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));
    log_debug(&format!("Trace log: {:?}", tracing_log_path()));

    let windows = select_desktop(&config);
    let services = Arc::new(Services::from_config(&config, windows)?);

    println!("DeskRemote listening on ws://{}", config.bind_addr());
    if config.api_key.is_none() {
        println!("OPENAI_API_KEY is not set; dictation and the assistant will report errors");
    }

    let result = server::serve(&config, services);
    log_debug("=== DeskRemote Server Exiting ===");
    result
}

fn select_desktop(config: &AppConfig) -> Arc<dyn WindowControl> {
    if config.headless {
        log_debug("window backend: headless (requested)");
        return Arc::new(HeadlessDesktop::new());
    }
    match X11Desktop::probe() {
        Ok(desktop) => {
            log_debug("window backend: x11");
            Arc::new(desktop)
        }
        Err(err) => {
            log_debug(&format!("window backend: headless ({err:#})"));
            eprintln!("window control unavailable, continuing headless: {err:#}");
            Arc::new(HeadlessDesktop::new())
        }
    }
}
