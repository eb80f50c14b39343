//! Pseudo-terminal (PTY) session management.
//!
//! Spawns an interactive shell under a PTY with a given geometry and working
//! directory. Exec failures in the child are reported back through a close-on-exec
//! pipe so a missing shell or bad cwd surfaces as an error instead of a dead session.

use crate::{lock_or_recover, log_debug};
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::ffi::{CString, OsStr};
use std::io;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::ptr;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::io::write_all;

/// Serializes openpty/fork so our own spawns never inherit each other's PTY fds.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

const CHILD_STAGE_SETSID: i32 = 1;
const CHILD_STAGE_CTTY: i32 = 2;
const CHILD_STAGE_DUP: i32 = 3;
const CHILD_STAGE_CHDIR: i32 = 4;
const CHILD_STAGE_EXEC: i32 = 5;

/// Shell program plus arguments, parsed from a shell-style command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut words =
            shell_words::split(command_line).context("shell command line is not valid")?;
        if words.is_empty() {
            bail!("shell command line is empty");
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }
}

/// Everything needed to start one shell session.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub shell: ShellCommand,
    pub cwd: PathBuf,
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

/// Find `program` on `PATH` (or validate it directly when it contains a separator).
pub fn resolve_executable(program: &str) -> Result<PathBuf> {
    let trimmed = program.trim();
    if trimmed.is_empty() {
        bail!("program name is empty");
    }
    if trimmed.contains('/') {
        let path = PathBuf::from(trimmed);
        return if is_executable_file(&path) {
            Ok(path)
        } else {
            Err(anyhow!("'{trimmed}' is not an executable file"))
        };
    }
    let search = env::var_os("PATH").unwrap_or_default();
    env::split_paths(&search)
        .map(|dir| dir.join(trimmed))
        .find(|candidate| is_executable_file(candidate))
        .ok_or_else(|| anyhow!("'{trimmed}' was not found on PATH"))
}

fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// A shell running under a pseudo-terminal. The session exclusively owns the child.
pub struct PtyShellSession {
    pub(super) master_fd: RawFd,
    pub(super) child_pid: i32,
    cols: u16,
    rows: u16,
    exit_status: Option<ExitStatus>,
}

impl PtyShellSession {
    /// Start the shell. Returns once the child has exec'd (or failed to).
    pub fn spawn(options: &SpawnOptions) -> Result<Self> {
        let program = resolve_executable(&options.shell.program)?;
        let program_c = path_cstring(&program, "shell path")?;

        let mut argv: Vec<CString> = Vec::with_capacity(options.shell.args.len() + 1);
        argv.push(
            CString::new(options.shell.program.as_str())
                .context("shell program contains NUL byte")?,
        );
        for arg in &options.shell.args {
            argv.push(
                CString::new(arg.as_str())
                    .with_context(|| format!("shell arg contains NUL byte: {arg}"))?,
            );
        }
        let cwd = path_cstring(&options.cwd, "working directory")?;
        let envp = build_child_env(&options.term)?;

        let cols = options.cols.max(1);
        let rows = options.rows.max(1);
        // SAFETY: all C strings are prepared before fork; spawn_pty_child returns a valid
        // master fd and a child pid owned by this session.
        let (master_fd, child_pid) = unsafe {
            let _guard = lock_or_recover(&SPAWN_LOCK, "pty spawn");
            let spawned = spawn_pty_child(&program_c, &argv, &envp, &cwd, cols, rows)?;
            if let Err(err) = set_nonblocking(spawned.0) {
                close_fd(spawned.0);
                let _ = libc::kill(spawned.1, libc::SIGKILL);
                let mut status = 0;
                let _ = libc::waitpid(spawned.1, &mut status, 0);
                return Err(err);
            }
            spawned
        };

        Ok(Self {
            master_fd,
            child_pid,
            cols,
            rows,
            exit_status: None,
        })
    }

    pub fn pid(&self) -> i32 {
        self.child_pid
    }

    /// Current `(cols, rows)` as last applied to the PTY.
    pub fn dimensions(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    /// Duplicate the master fd for a reader thread that owns (and closes) its copy.
    pub fn clone_reader_fd(&self) -> Result<RawFd> {
        // SAFETY: master_fd is open for the lifetime of the session.
        let fd = unsafe { libc::dup(self.master_fd) };
        if fd < 0 {
            return Err(errno_error("dup(master) failed"));
        }
        // SAFETY: fd was just returned by dup.
        unsafe { set_cloexec(fd) };
        Ok(fd)
    }

    /// Write raw bytes to the PTY master.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        if self.master_fd < 0 {
            bail!("PTY is already closed");
        }
        write_all(self.master_fd, bytes)
    }

    /// Update the PTY window size and notify the child.
    pub fn set_winsize(&mut self, cols: u16, rows: u16) -> Result<()> {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let ws = winsize(cols, rows);
        // SAFETY: ioctl reads ws and touches only master_fd.
        let result = unsafe { libc::ioctl(self.master_fd, libc::TIOCSWINSZ, &ws) };
        if result != 0 {
            return Err(errno_error("ioctl(TIOCSWINSZ) failed"));
        }
        self.cols = cols;
        self.rows = rows;
        // SAFETY: SIGWINCH goes to the child pid owned by this session.
        let _ = unsafe { libc::kill(self.child_pid, libc::SIGWINCH) };
        Ok(())
    }

    /// Non-blocking check for child exit; reaps the child on completion.
    pub fn try_wait(&mut self) -> Option<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Some(status);
        }
        let mut status = 0;
        // SAFETY: child_pid is owned by this session; WNOHANG only inspects state.
        let ret = unsafe { libc::waitpid(self.child_pid, &mut status, libc::WNOHANG) };
        if ret == self.child_pid {
            let exit = ExitStatus::from_raw(status);
            self.exit_status = Some(exit);
            return Some(exit);
        }
        None
    }

    /// Hang up the shell's process group, escalate to SIGKILL after `grace`, reap the
    /// child and close the master. Safe to call more than once.
    pub fn shutdown(&mut self, grace: Duration) -> ExitStatus {
        if self.try_wait().is_none() {
            // SAFETY: the child called setsid, so -pid addresses its process group.
            unsafe {
                if libc::kill(-self.child_pid, libc::SIGHUP) != 0 {
                    let _ = libc::kill(self.child_pid, libc::SIGHUP);
                }
            }
            if !self.wait_for_exit(grace) {
                // SAFETY: as above; SIGKILL cannot be ignored.
                unsafe {
                    if libc::kill(-self.child_pid, libc::SIGKILL) != 0
                        && libc::kill(self.child_pid, libc::SIGKILL) != 0
                    {
                        log_debug(&format!(
                            "SIGKILL to PTY child {} failed: {}",
                            self.child_pid,
                            io::Error::last_os_error()
                        ));
                    }
                }
                self.reap_blocking();
            }
        }
        self.close_master();
        self.exit_status
            .unwrap_or_else(|| ExitStatus::from_raw(libc::SIGKILL))
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.try_wait().is_some() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn reap_blocking(&mut self) {
        let mut status = 0;
        loop {
            // SAFETY: blocking waitpid on the child this session owns.
            let ret = unsafe { libc::waitpid(self.child_pid, &mut status, 0) };
            if ret == self.child_pid {
                self.exit_status = Some(ExitStatus::from_raw(status));
                return;
            }
            let err = io::Error::last_os_error();
            if ret < 0 && err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log_debug(&format!("waitpid({}) failed: {err}", self.child_pid));
            return;
        }
    }

    fn close_master(&mut self) {
        if self.master_fd >= 0 {
            // SAFETY: master_fd is owned by this session and closed exactly once.
            unsafe { close_fd(self.master_fd) };
            self.master_fd = -1;
        }
    }
}

impl Drop for PtyShellSession {
    fn drop(&mut self) {
        if self.exit_status.is_none() || self.master_fd >= 0 {
            let _ = self.shutdown(Duration::from_millis(200));
        }
    }
}

/// Exit code reported to clients: the process's own code, or `128 + signal`.
pub fn exit_code_of(status: &ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

fn path_cstring(path: &Path, label: &str) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("{label} contains NUL byte: {}", path.display()))
}

fn build_child_env(term: &str) -> Result<Vec<CString>> {
    let mut envp = Vec::new();
    for (key, value) in env::vars_os() {
        if key == OsStr::new("TERM") || key == OsStr::new("COLUMNS") || key == OsStr::new("LINES")
        {
            continue;
        }
        let mut entry = key.as_bytes().to_vec();
        entry.push(b'=');
        entry.extend_from_slice(value.as_bytes());
        // Skip anything that cannot be represented as a C string.
        if let Ok(entry) = CString::new(entry) {
            envp.push(entry);
        }
    }
    envp.push(CString::new(format!("TERM={term}")).context("TERM contains NUL byte")?);
    Ok(envp)
}

fn winsize(cols: u16, rows: u16) -> libc::winsize {
    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut ws: libc::winsize = unsafe { mem::zeroed() };
    ws.ws_row = rows;
    ws.ws_col = cols;
    ws
}

/// Forks and execs a child process under a new PTY.
///
/// # Safety
///
/// All pointers come from the provided C strings. The caller owns the returned
/// master fd and child pid. The child only performs async-signal-safe calls
/// between `fork()` and `execve()`.
pub(super) unsafe fn spawn_pty_child(
    program: &CString,
    argv: &[CString],
    envp: &[CString],
    working_dir: &CString,
    cols: u16,
    rows: u16,
) -> Result<(RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;
    let mut ws = winsize(cols, rows);

    #[allow(clippy::unnecessary_mut_passed)]
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut ws,
    ) != 0
    {
        return Err(errno_error("openpty failed"));
    }
    set_cloexec(master_fd);
    set_cloexec(slave_fd);

    let (err_read, err_write) = match cloexec_pipe() {
        Ok(pair) => pair,
        Err(err) => {
            close_fd(master_fd);
            close_fd(slave_fd);
            return Err(err);
        }
    };

    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());
    let mut envp_ptrs: Vec<*const libc::c_char> = envp.iter().map(|s| s.as_ptr()).collect();
    envp_ptrs.push(ptr::null());

    let pid = libc::fork();
    if pid < 0 {
        let err = errno_error("fork failed");
        close_fd(master_fd);
        close_fd(slave_fd);
        close_fd(err_read);
        close_fd(err_write);
        return Err(err);
    }

    if pid == 0 {
        close_fd(err_read);
        child_exec(
            slave_fd,
            err_write,
            program,
            &argv_ptrs,
            &envp_ptrs,
            working_dir,
        );
    }

    close_fd(slave_fd);
    close_fd(err_write);
    let report = read_child_report(err_read);
    close_fd(err_read);

    if let Some((stage, errno)) = report {
        let mut status = 0;
        let _ = libc::waitpid(pid, &mut status, 0);
        close_fd(master_fd);
        let os_err = io::Error::from_raw_os_error(errno);
        let what = match stage {
            CHILD_STAGE_SETSID => "setsid",
            CHILD_STAGE_CTTY => "ioctl(TIOCSCTTY)",
            CHILD_STAGE_DUP => "dup2",
            CHILD_STAGE_CHDIR => "chdir",
            _ => "execve",
        };
        return Err(anyhow!("failed to start shell ({what}): {os_err}"));
    }

    Ok((master_fd, pid))
}

/// Child process setup after fork: attaches the PTY as the controlling terminal and
/// execs the shell. Never returns.
///
/// # Safety
///
/// Must only be called in the child after `fork()`. Uses only async-signal-safe calls.
unsafe fn child_exec(
    slave_fd: RawFd,
    err_write: RawFd,
    program: &CString,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
    working_dir: &CString,
) -> ! {
    let fail = |stage: i32| -> ! {
        let errno = *errno_location();
        let report = [stage.to_ne_bytes(), errno.to_ne_bytes()].concat();
        let _ = libc::write(
            err_write,
            report.as_ptr() as *const libc::c_void,
            report.len(),
        );
        libc::_exit(127);
    };

    if libc::setsid() == -1 {
        fail(CHILD_STAGE_SETSID);
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0) == -1 {
        fail(CHILD_STAGE_CTTY);
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail(CHILD_STAGE_DUP);
    }
    if slave_fd > libc::STDERR_FILENO {
        close_fd(slave_fd);
    }
    if libc::chdir(working_dir.as_ptr()) != 0 {
        fail(CHILD_STAGE_CHDIR);
    }

    libc::execve(program.as_ptr(), argv.as_ptr(), envp.as_ptr());
    fail(CHILD_STAGE_EXEC);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

/// Block until the child either execs (EOF) or reports `(stage, errno)`.
unsafe fn read_child_report(fd: RawFd) -> Option<(i32, i32)> {
    let mut buf = [0u8; 8];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = libc::read(
            fd,
            buf[filled..].as_mut_ptr() as *mut libc::c_void,
            buf.len() - filled,
        );
        if n > 0 {
            filled += n as usize;
            continue;
        }
        if n < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
            continue;
        }
        break;
    }
    if filled < buf.len() {
        return None;
    }
    let stage = i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let errno = i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
    Some((stage, errno))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn cloexec_pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [-1; 2];
    if libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) != 0 {
        return Err(errno_error("pipe2 failed"));
    }
    Ok((fds[0], fds[1]))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn cloexec_pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [-1; 2];
    if libc::pipe(fds.as_mut_ptr()) != 0 {
        return Err(errno_error("pipe failed"));
    }
    set_cloexec(fds[0]);
    set_cloexec(fds[1]);
    Ok((fds[0], fds[1]))
}

/// Configure an fd for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
pub(super) unsafe fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(errno_error("fcntl(F_GETFL) failed"));
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(errno_error("fcntl(F_SETFL) failed"));
    }
    Ok(())
}

/// # Safety
///
/// `fd` must be a valid, open file descriptor.
unsafe fn set_cloexec(fd: RawFd) {
    let flags = libc::fcntl(fd, libc::F_GETFD, 0);
    if flags >= 0 {
        let _ = libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
    }
}

/// Helper that formats OS errors with additional context.
pub(super) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or negative to ignore).
pub(super) unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}
