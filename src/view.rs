//! Overlay surface.
//!
//! Poses describe feedback as `Overlay` values; the renderer behind `View`
//! decides how to draw them. Drawing never fails and never feeds back into
//! pose state.

use serde::Serialize;

use crate::holds::Direction;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "overlay", rename_all = "snake_case")]
pub enum Overlay {
    /// Axis-aligned box in view pixels.
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        active: bool,
    },
    Marker {
        x: f32,
        y: f32,
    },
    /// Dwell target; `progress` in `[0, 1]`.
    Target {
        x: f32,
        y: f32,
        radius: f32,
        progress: f32,
    },
    Arrow {
        direction: Direction,
        held: bool,
    },
    SteeringWheel {
        angle: f64,
    },
    Level {
        level: usize,
        of: usize,
    },
    Text {
        text: String,
    },
}

pub trait View {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn draw(&mut self, overlay: Overlay);
}

/// Fixed-size view that discards overlays.
#[derive(Clone, Copy, Debug)]
pub struct NullView {
    pub width: u32,
    pub height: u32,
}

impl Default for NullView {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl View for NullView {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn draw(&mut self, _overlay: Overlay) {}
}

/// View that keeps every overlay, for replays and tests.
#[derive(Clone, Debug, Default)]
pub struct RecordingView {
    pub width: u32,
    pub height: u32,
    pub overlays: Vec<Overlay>,
}

impl RecordingView {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            overlays: Vec::new(),
        }
    }

    pub fn take(&mut self) -> Vec<Overlay> {
        std::mem::take(&mut self.overlays)
    }
}

impl View for RecordingView {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn draw(&mut self, overlay: Overlay) {
        self.overlays.push(overlay);
    }
}
