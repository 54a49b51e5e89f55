//! Input-device sinks.
//!
//! The drivers themselves live outside this crate; poses talk to them
//! through the traits in `sink`. `Devices` bundles one shared handle per
//! sink and is handed to every pose at construction, so all poses in a mode
//! drive the same keyboard, mouse and gamepad.

mod recorder;
mod sink;

pub use recorder::{DeviceEvent, DeviceLog, Recorder};
pub use sink::{Gamepad, Keyboard, Mouse, MouseButton, Speaker, Transcriber};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Screen size used to map camera coordinates onto the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl Default for DisplaySize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Clone)]
pub struct Devices {
    keyboard: Arc<Mutex<dyn Keyboard>>,
    mouse: Arc<Mutex<dyn Mouse>>,
    gamepad: Arc<Mutex<dyn Gamepad>>,
    speaker: Arc<Mutex<dyn Speaker>>,
    transcriber: Arc<Mutex<dyn Transcriber>>,
    pub display: DisplaySize,
}

impl Devices {
    pub fn new(
        keyboard: Arc<Mutex<dyn Keyboard>>,
        mouse: Arc<Mutex<dyn Mouse>>,
        gamepad: Arc<Mutex<dyn Gamepad>>,
        speaker: Arc<Mutex<dyn Speaker>>,
        transcriber: Arc<Mutex<dyn Transcriber>>,
        display: DisplaySize,
    ) -> Self {
        Self {
            keyboard,
            mouse,
            gamepad,
            speaker,
            transcriber,
            display,
        }
    }

    /// Every sink writes to one shared `DeviceLog`.
    pub fn recording(display: DisplaySize) -> (Self, DeviceLog) {
        let log = DeviceLog::new();
        let recorder = || Arc::new(Mutex::new(Recorder::new(log.clone())));
        let devices = Self::new(
            recorder(),
            recorder(),
            recorder(),
            recorder(),
            recorder(),
            display,
        );
        (devices, log)
    }

    pub fn keyboard(&self) -> MutexGuard<'_, dyn Keyboard + 'static> {
        self.keyboard.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mouse(&self) -> MutexGuard<'_, dyn Mouse + 'static> {
        self.mouse.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn gamepad(&self) -> MutexGuard<'_, dyn Gamepad + 'static> {
        self.gamepad.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn speaker(&self) -> MutexGuard<'_, dyn Speaker + 'static> {
        self.speaker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn transcriber(&self) -> MutexGuard<'_, dyn Transcriber + 'static> {
        self.transcriber.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Devices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devices")
            .field("display", &self.display)
            .finish_non_exhaustive()
    }
}
