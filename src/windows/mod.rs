//! Remote-controlled desktop windows.
//!
//! Everything platform-specific sits behind [`WindowControl`]; the catalog,
//! screenshot and dispatch code only ever talk to that trait.

mod catalog;
mod headless;
mod screenshot;
mod x11;


use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use catalog::{
    executable_basename, icon_cache, list_targets, merge_targets, CatalogFilter, IconCache,
};
pub use headless::HeadlessDesktop;
pub use screenshot::{
    capture_window, encode_raw_data_url, fit_to_aspect, Screenshot, ScreenshotTiming,
};
pub use x11::{parse_wmctrl_listing, X11Desktop};

/// Host-assigned window identifier. X11 ids are numeric; other hosts may use strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WindowId {
    Num(u64),
    Text(String),
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowId::Num(n) => write!(f, "{n}"),
            WindowId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for WindowId {
    fn from(value: u64) -> Self {
        WindowId::Num(value)
    }
}

impl From<&str> for WindowId {
    fn from(value: &str) -> Self {
        WindowId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A window as the host reports it, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWindow {
    pub id: WindowId,
    pub title: String,
    pub path: Option<String>,
    pub process_id: Option<u32>,
    pub bounds: Bounds,
    pub visible: bool,
}

/// A window as the client sees it in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub id: WindowId,
    pub title: String,
    pub path: Option<String>,
    pub process_id: Option<u32>,
    pub bounds: Bounds,
    pub icon: Option<String>,
}

/// Captured RGBA pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// What the server needs from the desktop it controls.
///
/// Boolean results mean "the window was found and the action was issued".
pub trait WindowControl: Send + Sync {
    fn list_windows(&self) -> Result<Vec<RawWindow>>;
    fn focus(&self, id: &WindowId) -> Result<bool>;
    fn close(&self, id: &WindowId) -> Result<bool>;
    fn maximize(&self, id: &WindowId) -> Result<bool>;
    fn minimize(&self, id: &WindowId) -> Result<bool>;
    fn bounds(&self, id: &WindowId) -> Result<Option<Bounds>>;
    fn set_bounds(&self, id: &WindowId, bounds: Bounds) -> Result<bool>;
    /// Size of the display the windows live on.
    fn screen_size(&self) -> Result<(u32, u32)>;
    /// Grab the screen region covered by `region`.
    fn capture_pixels(&self, region: Bounds) -> Result<Pixels>;
    /// Focus the window and type `text` into it followed by Enter.
    fn inject_text(&self, id: &WindowId, text: &str) -> Result<()>;
    /// Encoded icon (data URL) for an executable, if the host can provide one.
    fn icon_for(&self, _exe_path: &str) -> Option<String> {
        None
    }
}
