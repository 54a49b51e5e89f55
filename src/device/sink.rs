use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl FromStr for MouseButton {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            _ => Err(anyhow!(
                "invalid mouse button `{}` (expected left, right or middle)",
                s
            )),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyboard sink. Keys are driver key names (`"w"`, `"shift"`, `"left"`).
///
/// Implementations are shared by every pose in a mode; none of them tracks
/// which pose holds which key.
pub trait Keyboard: Send {
    fn hold(&mut self, key: &str);
    fn press(&mut self, key: &str);
    fn release(&mut self, key: &str);

    /// Press a key combination: hold the modifiers, tap the last key,
    /// release the modifiers in reverse order.
    fn press_chord(&mut self, keys: &[String]) {
        let Some((last, modifiers)) = keys.split_last() else {
            return;
        };
        for key in modifiers {
            self.hold(key);
        }
        self.press(last);
        for key in modifiers.iter().rev() {
            self.release(key);
        }
    }
}

/// Pointer sink. Coordinates are screen pixels.
pub trait Mouse: Send {
    fn move_by(&mut self, dx: f64, dy: f64);
    fn move_to(&mut self, x: f64, y: f64);
    fn click(&mut self, button: MouseButton);
    fn double_click(&mut self, button: MouseButton);
    fn hold(&mut self, button: MouseButton);
    fn release(&mut self, button: MouseButton);
    fn scroll(&mut self, dx: f64, dy: f64);
}

/// Virtual gamepad sink. Sticks take `[-32767, 32767]`, triggers
/// `[0, 255]`; the `_float` variants take normalised values.
pub trait Gamepad: Send {
    fn left_joystick(&mut self, x: i32, y: i32);
    fn right_joystick(&mut self, x: i32, y: i32);
    fn left_trigger(&mut self, value: i32);
    fn right_trigger(&mut self, value: i32);
    fn left_joystick_float(&mut self, x: f32, y: f32);
    fn right_trigger_float(&mut self, value: f32);
    fn press_button(&mut self, button: &str);
    fn release_button(&mut self, button: &str);
    /// Centre both sticks, zero both triggers, release every button.
    fn reset(&mut self);
}

pub trait Speaker: Send {
    fn play(&mut self, sound: &str);
}

/// Speech-to-text service toggled by gestures.
pub trait Transcriber: Send {
    fn start(&mut self);
    fn stop(&mut self);
}
