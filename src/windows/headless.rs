use super::{Bounds, Pixels, RawWindow, WindowControl, WindowId};
use anyhow::{bail, Result};

/// Backend for hosts without a desktop session: the catalog is empty and every
/// window action reports "not found".
#[derive(Debug, Default, Clone)]
pub struct HeadlessDesktop;

impl HeadlessDesktop {
    pub fn new() -> Self {
        Self
    }
}

impl WindowControl for HeadlessDesktop {
    fn list_windows(&self) -> Result<Vec<RawWindow>> {
        Ok(Vec::new())
    }

    fn focus(&self, _id: &WindowId) -> Result<bool> {
        Ok(false)
    }

    fn close(&self, _id: &WindowId) -> Result<bool> {
        Ok(false)
    }

    fn maximize(&self, _id: &WindowId) -> Result<bool> {
        Ok(false)
    }

    fn minimize(&self, _id: &WindowId) -> Result<bool> {
        Ok(false)
    }

    fn bounds(&self, _id: &WindowId) -> Result<Option<Bounds>> {
        Ok(None)
    }

    fn set_bounds(&self, _id: &WindowId, _bounds: Bounds) -> Result<bool> {
        Ok(false)
    }

    fn screen_size(&self) -> Result<(u32, u32)> {
        bail!("no display available")
    }

    fn capture_pixels(&self, _region: Bounds) -> Result<Pixels> {
        bail!("no display available")
    }

    fn inject_text(&self, _id: &WindowId, _text: &str) -> Result<()> {
        bail!("Could not focus window")
    }
}
