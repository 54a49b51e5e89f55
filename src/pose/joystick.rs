//! Joystick emulation: palm tilt to gamepad axes, and a keyboard "virtual
//! stick" driven by a body landmark.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::BTreeSet;

use super::{HandTarget, Pose, PoseKind};
use crate::action::validate_key_name;
use crate::debounce::FrameCounter;
use crate::flags::JOYSTICK_FLAG;
use crate::frame::{HandGesture, Person, Side};
use crate::holds::{Direction, HoldTable};
use crate::runtime::Runtime;
use crate::signal::{
    joystick_sector, palm_tilts, scale_asymmetric, stick_from_tilt, StickRatios, TriggerRatios,
    MAX_TRIGGER_RANGE, STICK_DEAD_THRESHOLD, TRIGGER_DEAD_THRESHOLD,
};
use crate::view::{Overlay, View};

// ----------------------------------------------------------------------------
// joystick_wrist
// ----------------------------------------------------------------------------

/// Frames the open hand must be held before the analog input engages.
const OPEN_HAND_FRAMES: u32 = 10;

const ALL_STRETCHED: [HandGesture; 5] = [
    HandGesture::ThumbStretched,
    HandGesture::IndexStretched,
    HandGesture::MiddleStretched,
    HandGesture::RingStretched,
    HandGesture::PinkyStretched,
];

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Analog {
    Sticks,
    Triggers,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Default,
    Swap,
}

fn default_analog() -> Analog {
    Analog::Sticks
}

fn default_switch() -> Switch {
    Switch::On
}

fn default_trigger_mode() -> TriggerMode {
    TriggerMode::Default
}

#[derive(Debug, Deserialize)]
pub struct JoystickWristOptions {
    pub hand: Side,
    #[serde(default = "default_analog")]
    pub analog_name: Analog,
    #[serde(default = "default_switch")]
    pub switch: Switch,
    #[serde(default = "default_trigger_mode")]
    pub mode: TriggerMode,
}

/// Open palm held for a moment turns palm tilt into a stick or trigger.
pub struct JoystickWrist {
    target: HandTarget,
    analog: Analog,
    switch: Switch,
    mode: TriggerMode,
    open_hand: FrameCounter,
    sticks: StickRatios,
    triggers: TriggerRatios,
    touched: bool,
    runtime: Runtime,
}

impl PoseKind for JoystickWrist {
    const KIND: &'static str = "joystick_wrist";
    type Options = JoystickWristOptions;

    fn make(options: JoystickWristOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            target: HandTarget::new(options.hand),
            analog: options.analog_name,
            switch: options.switch,
            mode: options.mode,
            open_hand: FrameCounter::new(OPEN_HAND_FRAMES),
            sticks: StickRatios::default(),
            triggers: TriggerRatios::default(),
            touched: false,
            runtime: runtime.clone(),
        })
    }
}

impl JoystickWrist {
    fn drive_stick(&mut self, front_back: f32, left_right: f32) {
        if front_back.abs() <= STICK_DEAD_THRESHOLD && left_right.abs() <= STICK_DEAD_THRESHOLD {
            return;
        }
        let (x, y) = stick_from_tilt(front_back, left_right, &self.sticks);
        let mut gamepad = self.runtime.devices.gamepad();
        match self.target.side {
            Side::Left => gamepad.left_joystick(x, y),
            Side::Right => gamepad.right_joystick(x, y),
        }
        self.touched = true;
    }

    fn drive_triggers(&mut self, left_right: f32) {
        if left_right.abs() <= TRIGGER_DEAD_THRESHOLD {
            return;
        }
        // Outward tilt (positive) saturates sooner than inward tilt.
        let value = scale_asymmetric(
            left_right,
            self.triggers.outwards,
            self.triggers.inwards,
            MAX_TRIGGER_RANGE,
        )
        .abs();
        let outwards = left_right > 0.0;
        let use_left = match self.mode {
            TriggerMode::Default => outwards,
            TriggerMode::Swap => !outwards,
        };
        let mut gamepad = self.runtime.devices.gamepad();
        if use_left {
            gamepad.left_trigger(value);
            gamepad.right_trigger(0);
        } else {
            gamepad.left_trigger(0);
            gamepad.right_trigger(value);
        }
        self.touched = true;
    }
}

impl Pose for JoystickWrist {
    fn check(&mut self, person: &Person) -> bool {
        if self.switch == Switch::Off {
            return false;
        }
        let open = self
            .target
            .hand(person)
            .map(|hand| hand.all(&ALL_STRETCHED))
            .unwrap_or(false);
        let engaged = self.open_hand.observe(open);
        if !engaged {
            self.release_all();
        }
        engaged
    }

    fn act(&mut self, person: &Person, _view: &mut dyn View) {
        let Some((front_back, left_right)) = self.target.hand(person).and_then(palm_tilts) else {
            return;
        };
        match self.analog {
            Analog::Sticks => self.drive_stick(front_back, left_right),
            Analog::Triggers => self.drive_triggers(left_right),
        }
    }

    fn release_all(&mut self) {
        if std::mem::take(&mut self.touched) {
            self.runtime.devices.gamepad().reset();
        }
    }
}

// ----------------------------------------------------------------------------
// joystick (virtual stick)
// ----------------------------------------------------------------------------

fn default_centre() -> (f32, f32) {
    (100.0, 250.0)
}

fn default_stick_landmark() -> String {
    "left_wrist".to_string()
}

fn default_deadzone() -> f32 {
    50.0
}

#[derive(Debug, Deserialize)]
pub struct VirtualJoystickOptions {
    /// Centre in view pixels.
    #[serde(default = "default_centre")]
    pub pos: (f32, f32),
    #[serde(default = "default_stick_landmark")]
    pub landmark: String,
    /// Half-size of the square deadzone around the centre, in view pixels.
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,
    #[serde(default = "up_key")]
    pub up: String,
    #[serde(default = "down_key")]
    pub down: String,
    #[serde(default = "left_key")]
    pub left: String,
    #[serde(default = "right_key")]
    pub right: String,
}

fn up_key() -> String {
    "w".to_string()
}

fn down_key() -> String {
    "s".to_string()
}

fn left_key() -> String {
    "a".to_string()
}

fn right_key() -> String {
    "d".to_string()
}

/// Keys held for each joystick sector (see `signal::joystick_sector`).
const SECTOR_DIRECTIONS: [&[Direction]; 8] = [
    &[Direction::Up, Direction::Left],
    &[Direction::Up],
    &[Direction::Up, Direction::Right],
    &[Direction::Right],
    &[Direction::Down, Direction::Right],
    &[Direction::Down],
    &[Direction::Down, Direction::Left],
    &[Direction::Left],
];

/// WASD from the position of a body landmark around a fixed centre.
///
/// Active only while the `joystick` flag is set; dial poses clear it while
/// their menu is open.
pub struct VirtualJoystick {
    centre: (f32, f32),
    landmark: String,
    deadzone: f32,
    keys: [String; 4],
    sector: Option<usize>,
    held: HoldTable<Direction>,
    runtime: Runtime,
}

impl PoseKind for VirtualJoystick {
    const KIND: &'static str = "joystick";
    type Options = VirtualJoystickOptions;

    fn make(options: VirtualJoystickOptions, runtime: &Runtime) -> Result<Self> {
        for key in [&options.up, &options.down, &options.left, &options.right] {
            validate_key_name(key)?;
        }
        if options.deadzone.is_nan() || options.deadzone < 0.0 {
            bail!("deadzone must be non-negative, got {}", options.deadzone);
        }
        runtime.flags.set(JOYSTICK_FLAG, true);
        Ok(Self {
            centre: options.pos,
            landmark: options.landmark,
            deadzone: options.deadzone,
            keys: [options.up, options.down, options.left, options.right],
            sector: None,
            held: HoldTable::new(),
            runtime: runtime.clone(),
        })
    }
}

impl VirtualJoystick {
    fn key_for(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.keys[0],
            Direction::Down => &self.keys[1],
            Direction::Left => &self.keys[2],
            Direction::Right => &self.keys[3],
        }
    }

    fn offset(&self, person: &Person) -> Option<(f32, f32)> {
        let point = person.body_landmark(&self.landmark)?;
        Some((point.x - self.centre.0, point.y - self.centre.1))
    }

    fn release_held(&mut self) {
        for (direction, ()) in self.held.drain() {
            let key = self.key_for(direction).to_string();
            self.runtime.devices.keyboard().release(&key);
        }
    }

    pub fn held_directions(&self) -> Vec<Direction> {
        self.held.held().copied().collect()
    }
}

impl Pose for VirtualJoystick {
    fn check(&mut self, person: &Person) -> bool {
        if !self.runtime.flags.get(JOYSTICK_FLAG) {
            self.release_held();
            self.sector = None;
            return false;
        }
        let Some((dx, dy)) = self.offset(person) else {
            self.release_held();
            self.sector = None;
            return false;
        };
        if dx.abs() <= self.deadzone && dy.abs() <= self.deadzone {
            self.release_held();
            self.sector = None;
            return false;
        }
        true
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        let Some((dx, dy)) = self.offset(person) else {
            return;
        };
        let sector = joystick_sector(dx, dy);
        if self.sector == Some(sector) {
            return;
        }
        self.sector = Some(sector);
        let wanted: BTreeSet<Direction> = SECTOR_DIRECTIONS[sector].iter().copied().collect();
        let stale: Vec<Direction> = self.held.held().filter(|d| !wanted.contains(*d)).copied().collect();
        for direction in stale {
            self.held.disengage(&direction);
            let key = self.key_for(direction).to_string();
            self.runtime.devices.keyboard().release(&key);
        }
        for direction in wanted {
            if self.held.engage(direction, ()) {
                let key = self.key_for(direction).to_string();
                self.runtime.devices.keyboard().hold(&key);
            }
            view.draw(Overlay::Arrow { direction, held: true });
        }
    }

    fn release_all(&mut self) {
        self.release_held();
        self.sector = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};
    use crate::frame::{Hand, Landmarks, Point};
    use crate::view::NullView;

    fn wrist_at(x: f32, y: f32) -> Person {
        Person::default().with_body(Landmarks::new().with("left_wrist", Point::xy(x, y)))
    }

    fn stick(rt: &Runtime) -> VirtualJoystick {
        let options: VirtualJoystickOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        VirtualJoystick::make(options, rt).unwrap()
    }

    fn run(pose: &mut impl Pose, person: &Person) -> bool {
        let fired = pose.check(person);
        if fired {
            pose.act(person, &mut NullView::default());
        }
        fired
    }

    #[test]
    fn diagonal_holds_two_keys_and_sector_change_releases_one() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = stick(&rt);
        assert!(run(&mut pose, &wrist_at(0.0, 150.0)));
        assert_eq!(log.held_keys(), ["a".to_string(), "w".to_string()].into());
        assert!(run(&mut pose, &wrist_at(100.0, 100.0)));
        assert_eq!(log.held_keys(), ["w".to_string()].into());
        assert_eq!(log.count(|e| matches!(e, DeviceEvent::KeyRelease { .. })), 1);
    }

    #[test]
    fn deadzone_releases_everything() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = stick(&rt);
        run(&mut pose, &wrist_at(300.0, 250.0));
        assert_eq!(log.held_keys(), ["d".to_string()].into());
        assert!(!run(&mut pose, &wrist_at(110.0, 240.0)));
        assert!(log.held_keys().is_empty());
        assert!(pose.held_directions().is_empty());
    }

    #[test]
    fn clearing_the_joystick_flag_parks_the_stick() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = stick(&rt);
        assert!(rt.flags.get(JOYSTICK_FLAG));
        run(&mut pose, &wrist_at(100.0, 400.0));
        rt.flags.set(JOYSTICK_FLAG, false);
        assert!(!run(&mut pose, &wrist_at(100.0, 400.0)));
        assert!(log.held_keys().is_empty());
    }

    #[test]
    fn wrist_needs_the_open_hand_held() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = JoystickWrist::make(
            JoystickWristOptions {
                hand: Side::Left,
                analog_name: Analog::Sticks,
                switch: Switch::On,
                mode: TriggerMode::Default,
            },
            &rt,
        )
        .unwrap();
        let tilted = Person::default().with_hand(
            Side::Left,
            Hand::new(
                Landmarks::new()
                    .with("wrist", Point::new(0.5, 0.8, 0.0))
                    .with("middle_base", Point::new(0.5, 0.6, -0.1)),
            )
            .with_gestures(&ALL_STRETCHED),
        );
        let fired: Vec<bool> = (0..11).map(|_| run(&mut pose, &tilted)).collect();
        assert_eq!(fired.iter().filter(|f| **f).count(), 1);
        assert!(fired[10]);
        assert!(matches!(log.events()[0], DeviceEvent::LeftJoystick { x: 0, .. }));
        pose.release_all();
        assert_eq!(log.events().last(), Some(&DeviceEvent::GamepadReset));
    }

    #[test]
    fn wrist_stick_recentres_when_the_hand_closes_or_vanishes() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = JoystickWrist::make(
            JoystickWristOptions {
                hand: Side::Left,
                analog_name: Analog::Sticks,
                switch: Switch::On,
                mode: TriggerMode::Default,
            },
            &rt,
        )
        .unwrap();
        let hand = Hand::new(
            Landmarks::new()
                .with("wrist", Point::new(0.5, 0.8, 0.0))
                .with("middle_base", Point::new(0.5, 0.6, -0.1)),
        );
        let open = Person::default().with_hand(Side::Left, hand.clone().with_gestures(&ALL_STRETCHED));
        let fist = Person::default().with_hand(Side::Left, hand);
        for _ in 0..11 {
            run(&mut pose, &open);
        }
        assert!(!run(&mut pose, &fist));
        assert_eq!(log.events().last(), Some(&DeviceEvent::GamepadReset));
        assert_eq!(log.count(|e| matches!(e, DeviceEvent::GamepadReset)), 1);

        for _ in 0..11 {
            run(&mut pose, &open);
        }
        assert!(!run(&mut pose, &Person::default()));
        assert_eq!(log.count(|e| matches!(e, DeviceEvent::GamepadReset)), 2);
    }
}
