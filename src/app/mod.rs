//! Process-wide application plumbing shared by the server binary and the library.

mod logging;

use std::panic;
use std::sync::OnceLock;

pub use logging::{init_logging, log_content, log_debug, log_file_path, ConnectionTag, ContentKind};

static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Record panics in the crash log before the default hook runs.
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            logging::log_panic(info);
            log_debug(&format!("panic logged to {}", logging::crash_log_path().display()));
            previous(info);
        }));
    });
}
