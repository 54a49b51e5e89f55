//! Single-hand poses.

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{HandTarget, PinchPolicy, Pose, PoseKind};
use crate::action::{ActionDescriptor, Dispatcher};
use crate::debounce::{EdgeLatch, RepetitionCounter};
use crate::device::MouseButton;
use crate::frame::{HandGesture, Person, Point, Side};
use crate::holds::HoldTable;
use crate::runtime::Runtime;
use crate::view::{Overlay, View};

const OPEN_HAND: [HandGesture; 3] = [
    HandGesture::MiddleStretched,
    HandGesture::RingStretched,
    HandGesture::PinkyStretched,
];

/// Holds the left mouse button while the index finger is pinched.
#[derive(Debug, Default)]
struct PinchButton {
    held: HoldTable<MouseButton>,
}

impl PinchButton {
    fn update(&mut self, runtime: &Runtime, pinched: bool) {
        if pinched {
            if self.held.engage(MouseButton::Left, ()) {
                runtime.devices.mouse().hold(MouseButton::Left);
            }
        } else {
            self.release(runtime);
        }
    }

    fn release(&mut self, runtime: &Runtime) {
        for (button, ()) in self.held.drain() {
            runtime.devices.mouse().release(button);
        }
    }
}

// ----------------------------------------------------------------------------
// hand_pinch
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HandPinchOptions {
    pub hand: Side,
    #[serde(default)]
    pub key_hold: bool,
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
}

/// Index pinch bound to an action.
pub struct HandPinch {
    target: HandTarget,
    policy: PinchPolicy,
    dispatcher: Dispatcher,
    runtime: Runtime,
}

impl PoseKind for HandPinch {
    const KIND: &'static str = "hand_pinch";
    type Options = HandPinchOptions;

    fn make(options: HandPinchOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            target: HandTarget::new(options.hand),
            policy: PinchPolicy::new(options.key_hold),
            dispatcher: Dispatcher::resolve(options.action.as_ref(), runtime)?,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for HandPinch {
    fn check(&mut self, person: &Person) -> bool {
        let pinched = self
            .target
            .hand(person)
            .is_some_and(|hand| hand.is(HandGesture::IndexPinched));
        if !pinched {
            self.dispatcher.settle(&self.runtime);
        }
        self.policy.observe(pinched)
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.dispatcher.fire(&self.runtime);
    }

    fn release_all(&mut self) {
        self.dispatcher.settle(&self.runtime);
    }
}

// ----------------------------------------------------------------------------
// hand_double_pinch
// ----------------------------------------------------------------------------

fn default_double_frames() -> usize {
    15
}

fn default_repetitions() -> usize {
    2
}

#[derive(Debug, Deserialize)]
pub struct HandDoublePinchOptions {
    pub hand: Side,
    #[serde(default)]
    pub key_hold: bool,
    #[serde(default = "default_double_frames")]
    pub num_frames: usize,
    #[serde(default = "default_repetitions")]
    pub num_repetitions: usize,
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
}

/// Fires when `num_repetitions` pinches start within `num_frames` frames.
///
/// With `key_hold` the pose keeps firing while the final pinch is held;
/// otherwise it fires once per completed sequence.
pub struct HandDoublePinch {
    target: HandTarget,
    key_hold: bool,
    onset: EdgeLatch,
    repetitions: RepetitionCounter,
    active: bool,
    dispatcher: Dispatcher,
    runtime: Runtime,
}

impl PoseKind for HandDoublePinch {
    const KIND: &'static str = "hand_double_pinch";
    type Options = HandDoublePinchOptions;

    fn make(options: HandDoublePinchOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            target: HandTarget::new(options.hand),
            key_hold: options.key_hold,
            onset: EdgeLatch::new(),
            repetitions: RepetitionCounter::new(options.num_frames, options.num_repetitions)?,
            active: false,
            dispatcher: Dispatcher::resolve(options.action.as_ref(), runtime)?,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for HandDoublePinch {
    fn check(&mut self, person: &Person) -> bool {
        let Some(hand) = self.target.hand(person) else {
            self.active = false;
            self.onset.reset();
            self.dispatcher.settle(&self.runtime);
            return false;
        };
        let pinched = hand.is(HandGesture::IndexPinched);
        let started = self.onset.rising(pinched);
        if !pinched {
            self.active = false;
            self.dispatcher.settle(&self.runtime);
        }
        if self.repetitions.tick(started) {
            log::debug!("{}: repetition sequence complete", Self::KIND);
            self.active = self.key_hold;
            return true;
        }
        self.active && pinched
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.dispatcher.fire(&self.runtime);
    }

    fn release_all(&mut self) {
        self.active = false;
        self.dispatcher.settle(&self.runtime);
    }
}

// ----------------------------------------------------------------------------
// hand_left_click
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HandOnlyOptions {
    pub hand: Side,
}

/// Visible hand with index pinched clicks the left button each frame.
pub struct HandLeftClick {
    target: HandTarget,
    runtime: Runtime,
}

impl PoseKind for HandLeftClick {
    const KIND: &'static str = "hand_left_click";
    type Options = HandOnlyOptions;

    fn make(options: HandOnlyOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            target: HandTarget::new(options.hand),
            runtime: runtime.clone(),
        })
    }
}

impl Pose for HandLeftClick {
    fn check(&mut self, person: &Person) -> bool {
        self.target
            .hand(person)
            .map(|hand| hand.all(&[HandGesture::Visible, HandGesture::IndexPinched]))
            .unwrap_or(false)
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.runtime.devices.mouse().click(MouseButton::Left);
    }
}

// ----------------------------------------------------------------------------
// hand_mouse
// ----------------------------------------------------------------------------

/// Area of interest in view pixels.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct Area {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Area {
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0.0 || self.height <= 0.0 {
            bail!("area must have a positive width and height");
        }
        Ok(())
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        (self.x..=self.x + self.width).contains(&x) && (self.y..=self.y + self.height).contains(&y)
    }

    /// Central sub-area covering `ratio` of each side.
    pub fn inner(&self, ratio: f32) -> Area {
        Area {
            x: self.x + self.width * (1.0 - ratio) / 2.0,
            y: self.y + self.height * (1.0 - ratio) / 2.0,
            width: self.width * ratio,
            height: self.height * ratio,
        }
    }

    pub fn overlay(&self, active: bool) -> Overlay {
        Overlay::Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            active,
        }
    }
}

fn default_hand_area() -> Area {
    Area {
        x: 320.0,
        y: 240.0,
        width: 320.0,
        height: 240.0,
    }
}

#[derive(Debug, Deserialize)]
pub struct HandMouseOptions {
    pub hand: Side,
    #[serde(default = "default_hand_area")]
    pub area: Area,
}

/// Maps the palm centre inside an area of the camera view onto the screen.
pub struct HandMouse {
    target: HandTarget,
    area: Area,
    runtime: Runtime,
}

impl PoseKind for HandMouse {
    const KIND: &'static str = "hand_mouse";
    type Options = HandMouseOptions;

    fn make(options: HandMouseOptions, runtime: &Runtime) -> Result<Self> {
        options.area.validate()?;
        Ok(Self {
            target: HandTarget::new(options.hand),
            area: options.area,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for HandMouse {
    fn check(&mut self, person: &Person) -> bool {
        self.target
            .hand(person)
            .map(|hand| hand.is(HandGesture::Visible) && hand.palm_center().is_some())
            .unwrap_or(false)
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        let Some(palm) = self.target.hand(person).and_then(|h| h.palm_center()) else {
            return;
        };
        let display = self.runtime.devices.display;
        let scale_x = display.width as f32 / self.area.width;
        let scale_y = display.height as f32 / self.area.height;
        let palm_x = palm.x * view.width() as f32;
        let palm_y = palm.y * view.height() as f32;
        let x = ((palm_x - self.area.x) * scale_x).clamp(0.0, display.width as f32);
        let y = ((palm_y - self.area.y) * scale_y).clamp(0.0, display.height as f32);
        self.runtime.devices.mouse().move_to(x as f64, y as f64);
        view.draw(self.area.overlay(true));
        view.draw(Overlay::Marker { x: palm_x, y: palm_y });
    }
}

// ----------------------------------------------------------------------------
// gun_move
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GunMoveOptions {
    pub hand: Side,
    pub multiplier: f64,
}

/// Gun-shaped hand moves the pointer to the scaled palm centre.
pub struct GunMove {
    target: HandTarget,
    multiplier: f64,
    runtime: Runtime,
}

impl PoseKind for GunMove {
    const KIND: &'static str = "gun_move";
    type Options = GunMoveOptions;

    fn make(options: GunMoveOptions, runtime: &Runtime) -> Result<Self> {
        if !(options.multiplier > 0.0) {
            return Err(anyhow!("multiplier must be greater than 0, got {}", options.multiplier));
        }
        Ok(Self {
            target: HandTarget::new(options.hand),
            multiplier: options.multiplier,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for GunMove {
    fn check(&mut self, person: &Person) -> bool {
        self.target
            .hand(person)
            .map(|hand| {
                hand.all(&[
                    HandGesture::ThumbStretched,
                    HandGesture::IndexStretched,
                    HandGesture::MiddleStretched,
                    HandGesture::RingFolded,
                    HandGesture::PinkyFolded,
                ])
            })
            .unwrap_or(false)
    }

    fn act(&mut self, person: &Person, _view: &mut dyn View) {
        if let Some(palm) = self.target.hand(person).and_then(|h| h.palm_center()) {
            self.runtime.devices.mouse().move_to(
                palm.x as f64 * self.multiplier,
                palm.y as f64 * self.multiplier,
            );
        }
    }
}

// ----------------------------------------------------------------------------
// brick_ball / samurai_swipe
// ----------------------------------------------------------------------------

fn default_pointer_scale() -> f64 {
    1000.0
}

#[derive(Debug, Deserialize)]
pub struct BrickBallOptions {
    pub hand: Side,
    #[serde(default = "default_pointer_scale")]
    pub scale: f64,
}

/// Open hand steers the pointer by the middle fingertip; pinching drags.
pub struct BrickBall {
    target: HandTarget,
    scale: f64,
    button: PinchButton,
    runtime: Runtime,
}

impl PoseKind for BrickBall {
    const KIND: &'static str = "brick_ball";
    type Options = BrickBallOptions;

    fn make(options: BrickBallOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            target: HandTarget::new(options.hand),
            scale: options.scale,
            button: PinchButton::default(),
            runtime: runtime.clone(),
        })
    }
}

fn move_to_scaled(runtime: &Runtime, point: Point, scale: f64) {
    runtime
        .devices
        .mouse()
        .move_to(point.x as f64 * scale, point.y as f64 * scale);
}

impl Pose for BrickBall {
    fn check(&mut self, person: &Person) -> bool {
        let open = self
            .target
            .hand(person)
            .map(|hand| hand.all(&OPEN_HAND))
            .unwrap_or(false);
        if !open {
            self.button.release(&self.runtime);
        }
        open
    }

    fn act(&mut self, person: &Person, _view: &mut dyn View) {
        let Some(hand) = self.target.hand(person) else {
            return;
        };
        if let Some(tip) = hand.get("middle_tip") {
            move_to_scaled(&self.runtime, tip, self.scale);
        }
        self.button
            .update(&self.runtime, hand.is(HandGesture::IndexPinched));
    }

    fn release_all(&mut self) {
        self.button.release(&self.runtime);
    }
}

#[derive(Debug, Deserialize)]
pub struct SamuraiSwipeOptions {
    pub dom_hand: Side,
    pub off_hand: Side,
    #[serde(default = "default_pointer_scale")]
    pub scale: f64,
}

/// Like `brick_ball` but either hand may hold the sword; the dominant hand
/// wins when both are open.
pub struct SamuraiSwipe {
    dom: HandTarget,
    off: HandTarget,
    current: Side,
    scale: f64,
    button: PinchButton,
    runtime: Runtime,
}

impl PoseKind for SamuraiSwipe {
    const KIND: &'static str = "samurai_swipe";
    type Options = SamuraiSwipeOptions;

    fn make(options: SamuraiSwipeOptions, runtime: &Runtime) -> Result<Self> {
        if options.dom_hand == options.off_hand {
            bail!("dom_hand and off_hand must differ");
        }
        Ok(Self {
            dom: HandTarget::new(options.dom_hand),
            off: HandTarget::new(options.off_hand),
            current: options.dom_hand,
            scale: options.scale,
            button: PinchButton::default(),
            runtime: runtime.clone(),
        })
    }
}

impl Pose for SamuraiSwipe {
    fn check(&mut self, person: &Person) -> bool {
        for target in [self.dom, self.off] {
            if target.hand(person).map(|h| h.all(&OPEN_HAND)).unwrap_or(false) {
                if self.current != target.side {
                    self.button.release(&self.runtime);
                }
                self.current = target.side;
                return true;
            }
        }
        self.button.release(&self.runtime);
        false
    }

    fn act(&mut self, person: &Person, _view: &mut dyn View) {
        let Some(hand) = person.hand(self.current) else {
            return;
        };
        if let Some(tip) = hand.get("middle_tip") {
            move_to_scaled(&self.runtime, tip, self.scale);
        }
        self.button
            .update(&self.runtime, hand.is(HandGesture::IndexPinched));
    }

    fn release_all(&mut self) {
        self.button.release(&self.runtime);
    }
}

// ----------------------------------------------------------------------------
// sound
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SoundOptions {
    pub hand: Side,
    pub sound_name: String,
}

/// Plays a sound once per index pinch.
pub struct SoundPose {
    target: HandTarget,
    sound: String,
    latch: EdgeLatch,
    runtime: Runtime,
}

impl PoseKind for SoundPose {
    const KIND: &'static str = "sound";
    type Options = SoundOptions;

    fn make(options: SoundOptions, runtime: &Runtime) -> Result<Self> {
        if options.sound_name.trim().is_empty() {
            bail!("sound_name must not be empty");
        }
        Ok(Self {
            target: HandTarget::new(options.hand),
            sound: options.sound_name,
            latch: EdgeLatch::new(),
            runtime: runtime.clone(),
        })
    }
}

impl Pose for SoundPose {
    fn check(&mut self, person: &Person) -> bool {
        let pinched = self
            .target
            .hand(person)
            .map(|hand| hand.is(HandGesture::IndexPinched))
            .unwrap_or(false);
        self.latch.rising(pinched)
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.runtime.devices.speaker().play(&self.sound);
    }
}

// ----------------------------------------------------------------------------
// joystick_press
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JoystickPressOptions {
    pub hand: Side,
    #[serde(default)]
    pub gesture: BTreeMap<String, bool>,
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
}

/// Fires while every declared hand property has its expected value.
pub struct JoystickPress {
    target: HandTarget,
    gesture: Vec<(HandGesture, bool)>,
    dispatcher: Dispatcher,
    runtime: Runtime,
}

impl PoseKind for JoystickPress {
    const KIND: &'static str = "joystick_press";
    type Options = JoystickPressOptions;

    fn make(options: JoystickPressOptions, runtime: &Runtime) -> Result<Self> {
        let unrecognized: Vec<&str> = options
            .gesture
            .keys()
            .filter(|name| name.parse::<HandGesture>().is_err())
            .map(String::as_str)
            .collect();
        if !unrecognized.is_empty() {
            bail!("gestures not recognized: {}", unrecognized.join(", "));
        }
        let gesture = options
            .gesture
            .iter()
            .map(|(name, expected)| Ok((name.parse::<HandGesture>()?, *expected)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            target: HandTarget::new(options.hand),
            gesture,
            dispatcher: Dispatcher::resolve(options.action.as_ref(), runtime)?,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for JoystickPress {
    fn check(&mut self, person: &Person) -> bool {
        let matched = self
            .target
            .hand(person)
            .map(|hand| self.gesture.iter().all(|(g, expected)| hand.is(*g) == *expected))
            .unwrap_or(false);
        if !matched {
            self.dispatcher.settle(&self.runtime);
        }
        matched
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.dispatcher.fire(&self.runtime);
    }

    fn release_all(&mut self) {
        self.dispatcher.settle(&self.runtime);
    }
}
