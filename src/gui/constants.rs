//! Layout and timing constants shared by the GUI components

use std::time::Duration;

pub const APP_TITLE: &str = "Simple HTTP File Server";

pub const WINDOW_WIDTH: f32 = 850.0;
pub const WINDOW_HEIGHT: f32 = 640.0;
pub const MIN_WINDOW_WIDTH: f32 = 600.0;
pub const MIN_WINDOW_HEIGHT: f32 = 480.0;

pub const ITEM_SPACING: f32 = 6.0;
pub const SECTION_SPACING: f32 = 10.0;

/// Edge length of the rendered QR code in points
pub const QR_SIDE: f32 = 220.0;

/// How often the UI re-polls the log channel and the server process
pub const REPAINT_INTERVAL: Duration = Duration::from_millis(100);
