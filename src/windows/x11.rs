//! X11 backend built on the usual command-line tools: `wmctrl` for listing and window
//! management, `xdotool` for keystrokes and display geometry, `xclip` for the
//! clipboard and ImageMagick `import` for pixel capture.

use super::{Bounds, Pixels, RawWindow, WindowControl, WindowId};
use crate::log_debug;
use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

const FOCUS_SETTLE: Duration = Duration::from_millis(200);
const PASTE_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone)]
pub struct X11Desktop;

impl X11Desktop {
    pub fn new() -> Self {
        Self
    }

    /// Confirm the tools this backend shells out to can run at all.
    pub fn probe() -> Result<Self> {
        run_capture("wmctrl", &["-m"]).context("wmctrl is not usable (is DISPLAY set?)")?;
        Ok(Self)
    }

    fn find(&self, id: &WindowId) -> Result<Option<RawWindow>> {
        Ok(self.list_windows()?.into_iter().find(|w| &w.id == id))
    }
}

impl WindowControl for X11Desktop {
    fn list_windows(&self) -> Result<Vec<RawWindow>> {
        let listing = run_capture("wmctrl", &["-l", "-p", "-G"])?;
        let mut windows = parse_wmctrl_listing(&String::from_utf8_lossy(&listing));
        for window in &mut windows {
            window.path = window.process_id.and_then(executable_for_pid);
        }
        Ok(windows)
    }

    fn focus(&self, id: &WindowId) -> Result<bool> {
        run_status("wmctrl", &["-i", "-a", &wmctrl_id(id)])
    }

    fn close(&self, id: &WindowId) -> Result<bool> {
        run_status("wmctrl", &["-i", "-c", &wmctrl_id(id)])
    }

    fn maximize(&self, id: &WindowId) -> Result<bool> {
        let wid = wmctrl_id(id);
        if !run_status("wmctrl", &["-i", "-a", &wid])? {
            return Ok(false);
        }
        run_status(
            "wmctrl",
            &["-i", "-r", &wid, "-b", "add,maximized_vert,maximized_horz"],
        )
    }

    fn minimize(&self, id: &WindowId) -> Result<bool> {
        run_status("xdotool", &["windowminimize", &xdotool_id(id)])
    }

    fn bounds(&self, id: &WindowId) -> Result<Option<Bounds>> {
        Ok(self.find(id)?.map(|w| w.bounds))
    }

    fn set_bounds(&self, id: &WindowId, bounds: Bounds) -> Result<bool> {
        let wid = wmctrl_id(id);
        // A maximized window ignores move/resize requests.
        let _ = run_status(
            "wmctrl",
            &["-i", "-r", &wid, "-b", "remove,maximized_vert,maximized_horz"],
        )?;
        let geometry = format!(
            "0,{},{},{},{}",
            bounds.x, bounds.y, bounds.width, bounds.height
        );
        run_status("wmctrl", &["-i", "-r", &wid, "-e", &geometry])
    }

    fn screen_size(&self) -> Result<(u32, u32)> {
        let out = run_capture("xdotool", &["getdisplaygeometry"])?;
        parse_display_geometry(&String::from_utf8_lossy(&out))
    }

    fn capture_pixels(&self, region: Bounds) -> Result<Pixels> {
        let crop = format!(
            "{}x{}+{}+{}",
            region.width, region.height, region.x, region.y
        );
        let rgba = run_capture(
            "import",
            &["-window", "root", "-crop", &crop, "-depth", "8", "rgba:-"],
        )?;
        let expected = region.width as usize * region.height as usize * 4;
        if rgba.len() != expected {
            bail!(
                "capture returned {} bytes, expected {expected} for {crop}",
                rgba.len()
            );
        }
        Ok(Pixels {
            width: region.width,
            height: region.height,
            rgba,
        })
    }

    fn inject_text(&self, id: &WindowId, text: &str) -> Result<()> {
        if !self.focus(id)? {
            bail!("Could not focus window");
        }
        thread::sleep(FOCUS_SETTLE);
        set_clipboard(text)?;
        thread::sleep(PASTE_SETTLE);
        if !run_status("xdotool", &["key", "--clearmodifiers", "ctrl+v"])? {
            bail!("paste keystroke failed");
        }
        thread::sleep(PASTE_SETTLE);
        if !run_status("xdotool", &["key", "--clearmodifiers", "Return"])? {
            bail!("enter keystroke failed");
        }
        Ok(())
    }
}

fn wmctrl_listing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(0x[0-9a-fA-F]+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(\d+)\s+(\d+)\s+\S+\s?(.*)$",
        )
        .expect("wmctrl listing regex should compile")
    })
}

/// Parse `wmctrl -l -p -G` output. Sticky windows (desktop -1: panels, docks) are
/// reported as not visible.
pub fn parse_wmctrl_listing(listing: &str) -> Vec<RawWindow> {
    let re = wmctrl_listing_re();
    listing
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim_end())?;
            let id = u64::from_str_radix(caps[1].trim_start_matches("0x"), 16).ok()?;
            let desktop: i64 = caps[2].parse().ok()?;
            let pid: i64 = caps[3].parse().ok()?;
            let bounds = Bounds {
                x: caps[4].parse().ok()?,
                y: caps[5].parse().ok()?,
                width: caps[6].parse().ok()?,
                height: caps[7].parse().ok()?,
            };
            Some(RawWindow {
                id: WindowId::Num(id),
                title: caps[8].trim().to_string(),
                path: None,
                process_id: u32::try_from(pid).ok().filter(|pid| *pid > 0),
                bounds,
                visible: desktop >= 0,
            })
        })
        .collect()
}

fn parse_display_geometry(output: &str) -> Result<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let width = parts.next().and_then(|w| w.parse().ok());
    let height = parts.next().and_then(|h| h.parse().ok());
    match (width, height) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(anyhow!("unexpected display geometry output: {output:?}")),
    }
}

fn wmctrl_id(id: &WindowId) -> String {
    match id {
        WindowId::Num(n) => format!("0x{n:08x}"),
        WindowId::Text(s) => s.clone(),
    }
}

fn xdotool_id(id: &WindowId) -> String {
    match id {
        WindowId::Num(n) => n.to_string(),
        WindowId::Text(s) => s.clone(),
    }
}

fn executable_for_pid(pid: u32) -> Option<String> {
    std::fs::read_link(format!("/proc/{pid}/exe"))
        .ok()
        .map(|path| path.display().to_string())
}

fn set_clipboard(text: &str) -> Result<()> {
    let mut child = Command::new("xclip")
        .args(["-selection", "clipboard"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start xclip")?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .context("failed to write clipboard text")?;
    }
    let status = child.wait().context("xclip did not finish")?;
    if !status.success() {
        bail!("xclip exited with {status}");
    }
    Ok(())
}

fn run_status(program: &str, args: &[&str]) -> Result<bool> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to run {program}"))?;
    if !status.success() {
        log_debug(&format!("{program} {args:?} exited with {status}"));
    }
    Ok(status.success())
}

fn run_capture(program: &str, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to run {program}"))?;
    if !output.status.success() {
        bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output.stdout)
}
