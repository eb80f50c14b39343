use crate::config::AppConfig;
use std::{
    cell::Cell,
    env, fs,
    io::{self, Write},
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU8, Ordering},
        Mutex, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;

static LOG_MODE: AtomicU8 = AtomicU8::new(LogMode::Off as u8);
static DEBUG_LOG: OnceLock<Mutex<Option<RotatingFile>>> = OnceLock::new();

thread_local! {
    static CONNECTION: Cell<Option<u64>> = const { Cell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum LogMode {
    Off = 0,
    /// Lifecycle lines only: ids, sizes, errors.
    Metadata = 1,
    /// Metadata plus what the user typed, said or was answered.
    Content = 2,
}

impl LogMode {
    fn from_flags(logs: bool, no_logs: bool, log_content: bool) -> Self {
        match (logs && !no_logs, log_content) {
            (false, _) => LogMode::Off,
            (true, false) => LogMode::Metadata,
            (true, true) => LogMode::Content,
        }
    }

    fn current() -> Self {
        match LOG_MODE.load(Ordering::Relaxed) {
            2 => LogMode::Content,
            1 => LogMode::Metadata,
            _ => LogMode::Off,
        }
    }
}

/// User content that only reaches the log with `--log-content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Text injected into a desktop window.
    Command,
    /// Speech-to-text results.
    Transcript,
    /// Bytes typed into a terminal.
    TerminalInput,
    /// Assistant prompts and answers.
    Assistant,
}

impl ContentKind {
    fn label(self) -> &'static str {
        match self {
            ContentKind::Command => "command",
            ContentKind::Transcript => "transcript",
            ContentKind::TerminalInput => "terminal input",
            ContentKind::Assistant => "assistant",
        }
    }
}

/// Tags every log line written on this thread with a connection number until dropped.
pub struct ConnectionTag {
    previous: Option<u64>,
}

impl ConnectionTag {
    pub fn enter(connection: u64) -> Self {
        let previous = CONNECTION.with(|slot| slot.replace(Some(connection)));
        Self { previous }
    }

    /// Connection tagged on the calling thread, for handing to helper threads.
    pub fn current() -> Option<u64> {
        CONNECTION.with(Cell::get)
    }
}

impl Drop for ConnectionTag {
    fn drop(&mut self) {
        CONNECTION.with(|slot| slot.set(self.previous));
    }
}

/// Path to the debug log. The previous generation is kept next to it with a `.1` suffix.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("deskremote.log")
}

pub(super) fn crash_log_path() -> PathBuf {
    env::temp_dir().join("deskremote_crash.log")
}

/// Append-only file that moves itself aside to `<name>.1` when it outgrows its budget.
struct RotatingFile {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    len: u64,
}

impl RotatingFile {
    fn open(path: PathBuf, max_bytes: u64) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            file,
            max_bytes,
            len,
        })
    }

    fn append(&mut self, line: &str) {
        let next = self.len.saturating_add(line.len() as u64);
        if self.len > 0 && next > self.max_bytes {
            if let Err(err) = self.rotate() {
                eprintln!("deskremote: cannot rotate {}: {err}", self.path.display());
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.len = self.len.saturating_add(line.len() as u64);
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        fs::rename(&self.path, previous_generation(&self.path))?;
        *self = Self::open(self.path.clone(), self.max_bytes)?;
        Ok(())
    }
}

fn previous_generation(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".1");
    path.with_file_name(name)
}

fn debug_log() -> &'static Mutex<Option<RotatingFile>> {
    DEBUG_LOG.get_or_init(|| Mutex::new(None))
}

fn install(mode: LogMode, path: PathBuf) {
    LOG_MODE.store(mode as u8, Ordering::Relaxed);
    let file = if mode == LogMode::Off {
        None
    } else {
        RotatingFile::open(path, LOG_MAX_BYTES).ok()
    };
    *debug_log()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = file;
}

/// Configure logging from `--logs`, `--no-logs` and `--log-content`.
pub fn init_logging(config: &AppConfig) {
    install(
        LogMode::from_flags(config.logs, config.no_logs, config.log_content),
        log_file_path(),
    );
}

fn stamped(msg: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let stamp = format!("{}.{:03}", now.as_secs(), now.subsec_millis());
    match ConnectionTag::current() {
        Some(conn) => format!("[{stamp}] [conn {conn}] {msg}\n"),
        None => format!("[{stamp}] {msg}\n"),
    }
}

fn write_line(msg: &str) {
    let line = stamped(msg);
    let mut log = debug_log()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(file) = log.as_mut() {
        file.append(&line);
    }
}

/// Append a metadata line to the debug log and mirror it into the trace log.
pub fn log_debug(msg: &str) {
    if LogMode::current() < LogMode::Metadata {
        return;
    }
    tracing::debug!(target: "deskremote", "{msg}");
    write_line(msg);
}

/// Log user content. Dropped unless `--log-content` is set.
pub fn log_content(kind: ContentKind, msg: &str) {
    if LogMode::current() < LogMode::Content {
        return;
    }
    write_line(&format!("{}: {msg}", kind.label()));
}

/// Record a panic in the crash log. The payload is only kept in content mode.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    let mode = LogMode::current();
    if mode == LogMode::Off {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = match mode {
        LogMode::Content => info
            .payload()
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        _ => "payload omitted".to_string(),
    };
    let thread = std::thread::current();
    let line = stamped(&format!(
        "panic on {} at {location}: {payload} (v{})",
        thread.name().unwrap_or("unnamed"),
        env!("CARGO_PKG_VERSION")
    ));
    if let Ok(mut crash) = RotatingFile::open(crash_log_path(), CRASH_LOG_MAX_BYTES) {
        crash.append(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_keeps_one_previous_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rotate.log");
        let mut file = RotatingFile::open(path.clone(), 16).expect("open");
        file.append("0123456789\n");
        file.append("abcdefghij\n");
        file.append("klmnopqrst\n");
        assert_eq!(fs::read_to_string(&path).expect("current"), "klmnopqrst\n");
        assert_eq!(
            fs::read_to_string(previous_generation(&path)).expect("previous"),
            "abcdefghij\n"
        );
    }

    #[test]
    fn oversized_line_still_lands_in_a_fresh_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.log");
        let mut file = RotatingFile::open(path.clone(), 4).expect("open");
        file.append("a line longer than the budget\n");
        assert_eq!(
            fs::read_to_string(&path).expect("current"),
            "a line longer than the budget\n"
        );
        assert!(!previous_generation(&path).exists());
    }

    #[test]
    fn mode_follows_flags() {
        assert_eq!(LogMode::from_flags(false, false, true), LogMode::Off);
        assert_eq!(LogMode::from_flags(true, true, true), LogMode::Off);
        assert_eq!(LogMode::from_flags(true, false, false), LogMode::Metadata);
        assert_eq!(LogMode::from_flags(true, false, true), LogMode::Content);
    }

    #[test]
    fn content_lines_are_gated_labelled_and_tagged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("debug.log");

        install(LogMode::Metadata, path.clone());
        log_content(ContentKind::TerminalInput, "secret-4242");
        {
            let _tag = ConnectionTag::enter(7);
            log_debug("terminal 1 started");
        }
        assert_eq!(ConnectionTag::current(), None);

        install(LogMode::Content, path.clone());
        log_content(ContentKind::Command, "git status");
        install(LogMode::Off, path.clone());

        let contents = fs::read_to_string(&path).expect("read log");
        assert!(!contents.contains("secret-4242"));
        assert!(contents.contains("] [conn 7] terminal 1 started\n"));
        assert!(contents.contains("] command: git status\n"));
    }
}
