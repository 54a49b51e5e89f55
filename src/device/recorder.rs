use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use super::sink::{Gamepad, Keyboard, Mouse, MouseButton, Speaker, Transcriber};

/// One call made on a device sink.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    KeyHold { key: String },
    KeyPress { key: String },
    KeyRelease { key: String },
    MouseMoveBy { dx: f64, dy: f64 },
    MouseMoveTo { x: f64, y: f64 },
    MouseClick { button: MouseButton },
    MouseDoubleClick { button: MouseButton },
    MouseHold { button: MouseButton },
    MouseRelease { button: MouseButton },
    MouseScroll { dx: f64, dy: f64 },
    LeftJoystick { x: i32, y: i32 },
    RightJoystick { x: i32, y: i32 },
    LeftTrigger { value: i32 },
    RightTrigger { value: i32 },
    LeftJoystickFloat { x: f32, y: f32 },
    RightTriggerFloat { value: f32 },
    GamepadPress { button: String },
    GamepadRelease { button: String },
    GamepadReset,
    PlaySound { sound: String },
    TranscriptionStart,
    TranscriptionStop,
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

/// Shared tape of device events written by the recording sinks.
#[derive(Clone, Debug, Default)]
pub struct DeviceLog {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl DeviceLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: DeviceEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event);
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Take every event recorded so far.
    pub fn drain(&self) -> Vec<DeviceEvent> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *events)
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, predicate: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| predicate(e))
            .count()
    }

    /// Keys held and not yet released, replaying the tape from the start.
    pub fn held_keys(&self) -> BTreeSet<String> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut held = BTreeSet::new();
        for event in events.iter() {
            match event {
                DeviceEvent::KeyHold { key } => {
                    held.insert(key.clone());
                }
                DeviceEvent::KeyRelease { key } => {
                    held.remove(key);
                }
                _ => {}
            }
        }
        held
    }

    pub fn held_buttons(&self) -> BTreeSet<MouseButton> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut held = BTreeSet::new();
        for event in events.iter() {
            match event {
                DeviceEvent::MouseHold { button } => {
                    held.insert(*button);
                }
                DeviceEvent::MouseRelease { button } => {
                    held.remove(button);
                }
                _ => {}
            }
        }
        held
    }
}

/// Sink that implements every device trait by appending to a `DeviceLog`.
#[derive(Clone, Debug)]
pub struct Recorder {
    log: DeviceLog,
}

impl Recorder {
    pub fn new(log: DeviceLog) -> Self {
        Self { log }
    }
}

impl Keyboard for Recorder {
    fn hold(&mut self, key: &str) {
        self.log.push(DeviceEvent::KeyHold { key: key.to_string() });
    }

    fn press(&mut self, key: &str) {
        self.log.push(DeviceEvent::KeyPress { key: key.to_string() });
    }

    fn release(&mut self, key: &str) {
        self.log.push(DeviceEvent::KeyRelease { key: key.to_string() });
    }
}

impl Mouse for Recorder {
    fn move_by(&mut self, dx: f64, dy: f64) {
        self.log.push(DeviceEvent::MouseMoveBy { dx, dy });
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.log.push(DeviceEvent::MouseMoveTo { x, y });
    }

    fn click(&mut self, button: MouseButton) {
        self.log.push(DeviceEvent::MouseClick { button });
    }

    fn double_click(&mut self, button: MouseButton) {
        self.log.push(DeviceEvent::MouseDoubleClick { button });
    }

    fn hold(&mut self, button: MouseButton) {
        self.log.push(DeviceEvent::MouseHold { button });
    }

    fn release(&mut self, button: MouseButton) {
        self.log.push(DeviceEvent::MouseRelease { button });
    }

    fn scroll(&mut self, dx: f64, dy: f64) {
        self.log.push(DeviceEvent::MouseScroll { dx, dy });
    }
}

impl Gamepad for Recorder {
    fn left_joystick(&mut self, x: i32, y: i32) {
        self.log.push(DeviceEvent::LeftJoystick { x, y });
    }

    fn right_joystick(&mut self, x: i32, y: i32) {
        self.log.push(DeviceEvent::RightJoystick { x, y });
    }

    fn left_trigger(&mut self, value: i32) {
        self.log.push(DeviceEvent::LeftTrigger { value });
    }

    fn right_trigger(&mut self, value: i32) {
        self.log.push(DeviceEvent::RightTrigger { value });
    }

    fn left_joystick_float(&mut self, x: f32, y: f32) {
        self.log.push(DeviceEvent::LeftJoystickFloat { x, y });
    }

    fn right_trigger_float(&mut self, value: f32) {
        self.log.push(DeviceEvent::RightTriggerFloat { value });
    }

    fn press_button(&mut self, button: &str) {
        self.log.push(DeviceEvent::GamepadPress {
            button: button.to_string(),
        });
    }

    fn release_button(&mut self, button: &str) {
        self.log.push(DeviceEvent::GamepadRelease {
            button: button.to_string(),
        });
    }

    fn reset(&mut self) {
        self.log.push(DeviceEvent::GamepadReset);
    }
}

impl Speaker for Recorder {
    fn play(&mut self, sound: &str) {
        self.log.push(DeviceEvent::PlaySound {
            sound: sound.to_string(),
        });
    }
}

impl Transcriber for Recorder {
    fn start(&mut self) {
        self.log.push(DeviceEvent::TranscriptionStart);
    }

    fn stop(&mut self) {
        self.log.push(DeviceEvent::TranscriptionStop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_replays_the_tape() {
        let log = DeviceLog::new();
        let mut rec = Recorder::new(log.clone());
        Keyboard::hold(&mut rec, "w");
        Keyboard::hold(&mut rec, "a");
        Keyboard::release(&mut rec, "w");
        Mouse::hold(&mut rec, MouseButton::Left);
        assert_eq!(log.held_keys().into_iter().collect::<Vec<_>>(), vec!["a"]);
        assert!(log.held_buttons().contains(&MouseButton::Left));
        assert_eq!(log.drain().len(), 4);
        assert!(log.is_empty());
    }

    #[test]
    fn events_render_as_tagged_json() {
        let event = DeviceEvent::KeyPress { key: "w".into() };
        assert_eq!(event.to_string(), r#"{"event":"key_press","key":"w"}"#);
    }
}
