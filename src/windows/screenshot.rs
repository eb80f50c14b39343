use super::{Bounds, Pixels, WindowControl, WindowId};
use crate::log_debug;
use anyhow::{anyhow, Result};
use base64::Engine;
use std::thread;
use std::time::Duration;

/// Gap kept between a fitted window and the display edges.
const DISPLAY_MARGIN: u32 = 100;

/// Settle delays while the window manager raises or resizes the target.
#[derive(Debug, Clone, Copy)]
pub struct ScreenshotTiming {
    pub after_resize: Duration,
    pub after_focus: Duration,
}

impl Default for ScreenshotTiming {
    fn default() -> Self {
        Self {
            after_resize: Duration::from_millis(400),
            after_focus: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// `data:image/raw;width=W;height=H;base64,...` of RGBA bytes.
    pub data_url: String,
    pub bounds: Bounds,
    pub width: u32,
    pub height: u32,
}

/// Window bounds matching the phone's aspect ratio, as large as the phone asks for
/// but inside the display minus a margin, centred on the display.
///
/// Portrait phones are fitted height-first, landscape phones width-first.
pub fn fit_to_aspect(phone_width: u32, phone_height: u32, display: (u32, u32)) -> Bounds {
    let (display_width, display_height) = display;
    let max_width = display_width.saturating_sub(DISPLAY_MARGIN).max(1) as f64;
    let max_height = display_height.saturating_sub(DISPLAY_MARGIN).max(1) as f64;
    let aspect = phone_width.max(1) as f64 / phone_height.max(1) as f64;

    let (width, height) = if aspect < 1.0 {
        let mut height = max_height.min(phone_height as f64);
        let mut width = (height * aspect).round();
        if width > max_width {
            width = max_width;
            height = (width / aspect).round();
        }
        (width, height)
    } else {
        let mut width = max_width.min(phone_width as f64);
        let mut height = (width / aspect).round();
        if height > max_height {
            height = max_height;
            width = (height * aspect).round();
        }
        (width, height)
    };

    let width = width.max(1.0) as u32;
    let height = height.max(1.0) as u32;
    let x = (display_width.saturating_sub(width) / 2) as i32;
    let y = (display_height.saturating_sub(height) / 2) as i32;
    Bounds {
        x,
        y,
        width,
        height,
    }
}

/// Encode pixels as a raw RGBA data URL with alpha forced opaque.
pub fn encode_raw_data_url(pixels: &Pixels) -> String {
    let mut rgba = pixels.rgba.clone();
    for px in rgba.chunks_exact_mut(4) {
        px[3] = 255;
    }
    format!(
        "data:image/raw;width={};height={};base64,{}",
        pixels.width,
        pixels.height,
        base64::engine::general_purpose::STANDARD.encode(&rgba)
    )
}

/// Raise the window, optionally fit it to the phone's aspect ratio, grab its pixels
/// and put it back where it was.
pub fn capture_window(
    control: &dyn WindowControl,
    id: &WindowId,
    phone_screen: Option<(u32, u32)>,
    timing: ScreenshotTiming,
) -> Result<Screenshot> {
    let original = control
        .bounds(id)?
        .ok_or_else(|| anyhow!("Window not found"))?;

    if !control.focus(id)? {
        log_debug(&format!("screenshot: could not raise window {id}"));
    }

    let mut resized = false;
    match phone_screen {
        Some((phone_width, phone_height)) if phone_width > 0 && phone_height > 0 => {
            let display = control.screen_size()?;
            let target = fit_to_aspect(phone_width, phone_height, display);
            log_debug(&format!(
                "screenshot: resizing window {id} to {}x{}",
                target.width, target.height
            ));
            resized = control.set_bounds(id, target)?;
            thread::sleep(timing.after_resize);
        }
        _ => thread::sleep(timing.after_focus),
    }

    let captured = capture_at_current_bounds(control, id);

    if resized {
        if let Err(err) = control.set_bounds(id, original) {
            log_debug(&format!("screenshot: restoring bounds of {id} failed: {err:#}"));
        }
    }

    let (bounds, pixels) = captured?;
    Ok(Screenshot {
        data_url: encode_raw_data_url(&pixels),
        bounds,
        width: pixels.width,
        height: pixels.height,
    })
}

fn capture_at_current_bounds(control: &dyn WindowControl, id: &WindowId) -> Result<(Bounds, Pixels)> {
    let bounds = control
        .bounds(id)?
        .ok_or_else(|| anyhow!("Window not found"))?;
    let pixels = control.capture_pixels(bounds)?;
    Ok((bounds, pixels))
}
