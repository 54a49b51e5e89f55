//! Steering poses.

use anyhow::{bail, Result};
use serde::Deserialize;

use super::{Pose, PoseKind};
use crate::frame::{HandGesture, Person, Point, Side};
use crate::holds::HoldTable;
use crate::runtime::Runtime;
use crate::signal::{steering_angle, steering_slope};
use crate::view::{Overlay, View};

// ----------------------------------------------------------------------------
// pinch_drive
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PinchDriveOptions {}

/// Accelerate while either hand pinches; a single pinching hand steers.
pub struct PinchDrive {
    left: bool,
    right: bool,
    runtime: Runtime,
}

impl PoseKind for PinchDrive {
    const KIND: &'static str = "pinch_drive";
    type Options = PinchDriveOptions;

    fn make(_options: PinchDriveOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            left: false,
            right: false,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for PinchDrive {
    fn check(&mut self, person: &Person) -> bool {
        let (Some(left), Some(right)) = (person.hand(Side::Left), person.hand(Side::Right)) else {
            return false;
        };
        self.left = left.is(HandGesture::IndexPinched);
        self.right = right.is(HandGesture::IndexPinched);
        self.left || self.right
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        let mut keyboard = self.runtime.devices.keyboard();
        keyboard.press("w");
        match (self.left, self.right) {
            (true, false) => keyboard.press("a"),
            (false, true) => keyboard.press("d"),
            _ => {}
        }
    }
}

// ----------------------------------------------------------------------------
// hand_drive
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Hands,
    Body,
    Head,
}

/// Where a steering grip point is read from. Hand landmarks are named with
/// their side prefix, e.g. `left_middle_base`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GripSource {
    pub module: Module,
    pub landmark: String,
}

impl GripSource {
    fn hand_default(side: Side) -> Self {
        Self {
            module: Module::Hands,
            landmark: format!("{}_middle_base", side),
        }
    }

    fn validate(&self, side: Side) -> Result<()> {
        if self.module == Module::Hands {
            let Some((prefix, rest)) = self.landmark.split_once('_') else {
                bail!("hand landmark `{}` must be prefixed with a side", self.landmark);
            };
            prefix.parse::<Side>()?;
            if rest.is_empty() {
                bail!("hand landmark `{}` names no point", self.landmark);
            }
        }
        if self.landmark.is_empty() {
            bail!("{} grip landmark must not be empty", side);
        }
        Ok(())
    }

    fn locate(&self, person: &Person) -> Option<Point> {
        match self.module {
            Module::Hands => {
                let (prefix, name) = self.landmark.split_once('_')?;
                person.hand(prefix.parse().ok()?)?.get(name)
            }
            Module::Body => person.body_landmark(&self.landmark),
            Module::Head => person.head.as_ref()?.get(&self.landmark),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    Keyboard,
    Gamepad,
    #[serde(alias = "joystick")]
    Controller,
}

fn default_drive_mode() -> DriveMode {
    DriveMode::Keyboard
}

#[derive(Debug, Deserialize)]
pub struct HandDriveOptions {
    #[serde(default)]
    pub left: Option<GripSource>,
    #[serde(default)]
    pub right: Option<GripSource>,
    #[serde(default = "default_drive_mode")]
    pub mode: DriveMode,
}

/// Turns a steering slope in `[-1, 1]` into inputs.
trait Controller: Send {
    fn steer(&mut self, runtime: &Runtime, slope: f64);
    fn release(&mut self, runtime: &Runtime);
}

/// W to go straight, A/D to turn.
struct KeyboardController {
    sensitivity: f64,
    held: HoldTable<&'static str>,
}

impl KeyboardController {
    fn hold_only(&mut self, runtime: &Runtime, key: &'static str) {
        let mut keyboard = runtime.devices.keyboard();
        let stale: Vec<&'static str> = self.held.held().filter(|k| **k != key).copied().collect();
        for k in stale {
            self.held.disengage(&k);
            keyboard.release(k);
        }
        if self.held.engage(key, ()) {
            keyboard.hold(key);
        }
    }
}

impl Controller for KeyboardController {
    fn steer(&mut self, runtime: &Runtime, slope: f64) {
        let key = if slope.abs() <= self.sensitivity {
            "w"
        } else if slope < 0.0 {
            "a"
        } else {
            "d"
        };
        self.hold_only(runtime, key);
    }

    fn release(&mut self, runtime: &Runtime) {
        let mut keyboard = runtime.devices.keyboard();
        for (key, ()) in self.held.drain() {
            keyboard.release(key);
        }
    }
}

/// Left stick for steering, right trigger for throttle.
struct GamepadController {
    sensitivity: f64,
    engaged: bool,
}

impl Controller for GamepadController {
    fn steer(&mut self, runtime: &Runtime, slope: f64) {
        let throttle = if slope.abs() <= self.sensitivity { 0.45 } else { 0.2 };
        let mut gamepad = runtime.devices.gamepad();
        gamepad.left_joystick_float(slope as f32, 0.0);
        gamepad.right_trigger_float(throttle);
        self.engaged = true;
    }

    fn release(&mut self, runtime: &Runtime) {
        if std::mem::take(&mut self.engaged) {
            runtime.devices.gamepad().reset();
        }
    }
}

/// Two grip points held like a steering wheel.
pub struct HandDrive {
    left: GripSource,
    right: GripSource,
    controller: Box<dyn Controller>,
    runtime: Runtime,
}

impl PoseKind for HandDrive {
    const KIND: &'static str = "hand_drive";
    type Options = HandDriveOptions;

    fn make(options: HandDriveOptions, runtime: &Runtime) -> Result<Self> {
        let left = options.left.unwrap_or_else(|| GripSource::hand_default(Side::Left));
        let right = options.right.unwrap_or_else(|| GripSource::hand_default(Side::Right));
        left.validate(Side::Left)?;
        right.validate(Side::Right)?;
        let controller: Box<dyn Controller> = match options.mode {
            DriveMode::Keyboard => Box::new(KeyboardController {
                sensitivity: 0.2,
                held: HoldTable::new(),
            }),
            DriveMode::Gamepad | DriveMode::Controller => Box::new(GamepadController {
                sensitivity: 0.5,
                engaged: false,
            }),
        };
        Ok(Self {
            left,
            right,
            controller,
            runtime: runtime.clone(),
        })
    }
}

impl HandDrive {
    fn grips(&self, person: &Person) -> Option<(Point, Point)> {
        Some((self.left.locate(person)?, self.right.locate(person)?))
    }
}

impl Pose for HandDrive {
    fn check(&mut self, person: &Person) -> bool {
        if self.grips(person).is_none() {
            self.controller.release(&self.runtime);
            return false;
        }
        true
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        let Some((left, right)) = self.grips(person) else {
            return;
        };
        let angle = steering_angle(left, right);
        view.draw(Overlay::SteeringWheel { angle });
        self.controller.steer(&self.runtime, steering_slope(angle));
    }

    fn release_all(&mut self) {
        self.controller.release(&self.runtime);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};
    use crate::frame::{Hand, Landmarks};
    use crate::view::NullView;

    fn grips(left: Point, right: Point) -> Person {
        Person::default()
            .with_hand(Side::Left, Hand::new(Landmarks::new().with("middle_base", left)))
            .with_hand(Side::Right, Hand::new(Landmarks::new().with("middle_base", right)))
    }

    fn drive(rt: &Runtime, mode: &str) -> HandDrive {
        let options: HandDriveOptions =
            serde_json::from_value(serde_json::json!({ "mode": mode })).unwrap();
        HandDrive::make(options, rt).unwrap()
    }

    fn frame(pose: &mut HandDrive, person: &Person) {
        if pose.check(person) {
            pose.act(person, &mut NullView::default());
        }
    }

    #[test]
    fn keyboard_drive_swaps_w_for_a_turn() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = drive(&rt, "keyboard");
        frame(&mut pose, &grips(Point::xy(0.3, 0.5), Point::xy(0.7, 0.5)));
        assert_eq!(log.held_keys(), ["w".to_string()].into());
        frame(&mut pose, &grips(Point::xy(0.3, 0.5), Point::xy(0.7, 0.5)));
        assert_eq!(log.len(), 1);
        // Left grip low, right grip high: a hard left.
        frame(&mut pose, &grips(Point::xy(0.3, 0.7), Point::xy(0.7, 0.3)));
        assert_eq!(log.held_keys(), ["a".to_string()].into());
        frame(&mut pose, &Person::default());
        assert!(log.held_keys().is_empty());
    }

    #[test]
    fn gamepad_drive_resets_when_grips_vanish() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = drive(&rt, "joystick");
        frame(&mut pose, &grips(Point::xy(0.3, 0.5), Point::xy(0.7, 0.5)));
        assert_eq!(
            log.events(),
            vec![
                DeviceEvent::LeftJoystickFloat { x: 0.0, y: 0.0 },
                DeviceEvent::RightTriggerFloat { value: 0.45 },
            ]
        );
        frame(&mut pose, &Person::default());
        assert_eq!(log.events().last(), Some(&DeviceEvent::GamepadReset));
    }

    #[test]
    fn hand_grips_need_a_side_prefix() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let options: HandDriveOptions = serde_json::from_value(serde_json::json!({
            "left": { "module": "hands", "landmark": "wrist" }
        }))
        .unwrap();
        assert!(HandDrive::make(options, &rt).is_err());
    }

    #[test]
    fn pinch_drive_steers_with_one_pinch() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = PinchDrive::make(PinchDriveOptions {}, &rt).unwrap();
        let person = Person::default()
            .with_hand(Side::Left, Hand::default().with_gestures(&[HandGesture::IndexPinched]))
            .with_hand(Side::Right, Hand::default());
        assert!(pose.check(&person));
        pose.act(&person, &mut NullView::default());
        assert_eq!(
            log.events(),
            vec![
                DeviceEvent::KeyPress { key: "w".into() },
                DeviceEvent::KeyPress { key: "a".into() },
            ]
        );
    }
}
