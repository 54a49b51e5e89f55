//! Head poses, plus the two-finger edge swipe.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::{HandTarget, Pose, PoseKind};
use crate::action::{ActionDescriptor, Dispatcher};
use crate::debounce::{EdgeLatch, MajorityVote, Vote, DEFAULT_CONFIDENCE, DEFAULT_QUEUE_SIZE};
use crate::device::MouseButton;
use crate::flags::validate_flag_name;
use crate::frame::{Head, HandGesture, HeadGesture, Person, Point, Side};
use crate::holds::HoldTable;
use crate::runtime::Runtime;
use crate::signal::{head_tilt_angle, head_turn_ratio};
use crate::view::{Overlay, View};

// ----------------------------------------------------------------------------
// Majority-vote side switch (head_tilt, head_turn)
// ----------------------------------------------------------------------------

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

#[derive(Debug, Deserialize)]
pub struct HeadSwitchOptions {
    #[serde(default)]
    pub left_flag: Option<String>,
    #[serde(default)]
    pub right_flag: Option<String>,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub left: Option<ActionDescriptor>,
    #[serde(default)]
    pub right: Option<ActionDescriptor>,
}

/// Votes a continuous head signal into left/right and keeps a pair of flags
/// and actions in step with the winner.
struct HeadSwitch {
    vote: MajorityVote,
    decision: Option<Side>,
    left_flag: Option<String>,
    right_flag: Option<String>,
    left: Dispatcher,
    right: Dispatcher,
    runtime: Runtime,
}

impl HeadSwitch {
    fn new(options: HeadSwitchOptions, low: f64, high: f64, runtime: &Runtime) -> Result<Self> {
        for flag in options.left_flag.iter().chain(options.right_flag.iter()) {
            validate_flag_name(flag)?;
        }
        Ok(Self {
            vote: MajorityVote::new(options.queue_size, low, high, options.confidence)?,
            decision: None,
            left_flag: options.left_flag,
            right_flag: options.right_flag,
            left: Dispatcher::resolve(options.left.as_ref(), runtime).context("left action")?,
            right: Dispatcher::resolve(options.right.as_ref(), runtime).context("right action")?,
            runtime: runtime.clone(),
        })
    }

    /// Feed one sample; `below` says which side a low-threshold vote means.
    fn observe(&mut self, sample: Option<f64>, below: Side) -> bool {
        // A gap is not a sample: the window keeps its votes, the outputs go.
        let Some(sample) = sample else {
            self.settle();
            self.decision = None;
            return false;
        };
        self.vote.push(sample);
        let decision = match self.vote.vote() {
            Vote::Below => Some(below),
            Vote::Above => Some(below.opposite()),
            Vote::Undecided => None,
        };
        if decision != self.decision {
            match decision {
                Some(Side::Left) => self.right.settle(&self.runtime),
                Some(Side::Right) => self.left.settle(&self.runtime),
                None => self.settle(),
            }
            self.decision = decision;
        }
        decision.is_some()
    }

    fn act(&mut self) {
        let Some(side) = self.decision else {
            return;
        };
        let (winner, loser) = match side {
            Side::Left => (&self.left_flag, &self.right_flag),
            Side::Right => (&self.right_flag, &self.left_flag),
        };
        if let Some(flag) = winner {
            self.runtime.flags.set(flag, true);
        }
        if let Some(flag) = loser {
            self.runtime.flags.set(flag, false);
        }
        match side {
            Side::Left => self.left.fire(&self.runtime),
            Side::Right => self.right.fire(&self.runtime),
        }
    }

    fn settle(&mut self) {
        self.left.settle(&self.runtime);
        self.right.settle(&self.runtime);
    }
}

/// Head roll voted over a short window.
pub struct HeadTilt {
    switch: HeadSwitch,
}

impl PoseKind for HeadTilt {
    const KIND: &'static str = "head_tilt";
    type Options = HeadSwitchOptions;

    fn make(options: HeadSwitchOptions, runtime: &Runtime) -> Result<Self> {
        let low = runtime.settings.get_f64("head/tilt_left")?;
        let high = runtime.settings.get_f64("head/tilt_right")?;
        Ok(Self {
            switch: HeadSwitch::new(options, low, high, runtime)?,
        })
    }
}

impl Pose for HeadTilt {
    fn check(&mut self, person: &Person) -> bool {
        let sample = person.head.as_ref().and_then(head_tilt_angle);
        self.switch.observe(sample, Side::Left)
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.switch.act();
    }

    fn release_all(&mut self) {
        self.switch.settle();
    }
}

/// Head yaw voted over a short window. The ratio falls as the head turns
/// right, so a low vote means right.
pub struct HeadTurn {
    switch: HeadSwitch,
}

impl PoseKind for HeadTurn {
    const KIND: &'static str = "head_turn";
    type Options = HeadSwitchOptions;

    fn make(options: HeadSwitchOptions, runtime: &Runtime) -> Result<Self> {
        let low = runtime.settings.get_f64("head/turn_left")?;
        let high = runtime.settings.get_f64("head/turn_right")?;
        Ok(Self {
            switch: HeadSwitch::new(options, low, high, runtime)?,
        })
    }
}

impl Pose for HeadTurn {
    fn check(&mut self, person: &Person) -> bool {
        let sample = person.head.as_ref().and_then(head_turn_ratio);
        self.switch.observe(sample, Side::Right)
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.switch.act();
    }

    fn release_all(&mut self) {
        self.switch.settle();
    }
}

// ----------------------------------------------------------------------------
// head_trigger
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HeadTriggerOptions {
    pub gesture: String,
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
}

/// Fires while the face shows one gesture.
pub struct HeadTrigger {
    gesture: HeadGesture,
    dispatcher: Dispatcher,
    runtime: Runtime,
}

impl PoseKind for HeadTrigger {
    const KIND: &'static str = "head_trigger";
    type Options = HeadTriggerOptions;

    fn make(options: HeadTriggerOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            gesture: options.gesture.parse()?,
            dispatcher: Dispatcher::resolve(options.action.as_ref(), runtime)?,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for HeadTrigger {
    fn check(&mut self, person: &Person) -> bool {
        let active = person.head.as_ref().map(|h| h.is(self.gesture)).unwrap_or(false);
        if !active {
            self.dispatcher.settle(&self.runtime);
        }
        active
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.dispatcher.fire(&self.runtime);
    }

    fn release_all(&mut self) {
        self.dispatcher.settle(&self.runtime);
    }
}

// ----------------------------------------------------------------------------
// head_drive / head_suika
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SteerMethod {
    Tilt,
    Turn,
}

impl SteerMethod {
    fn triggers(&self, head: &Head) -> (bool, bool) {
        match self {
            SteerMethod::Tilt => (head.is(HeadGesture::TiltLeft), head.is(HeadGesture::TiltRight)),
            SteerMethod::Turn => (head.is(HeadGesture::TurnLeft), head.is(HeadGesture::TurnRight)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HeadSteerOptions {
    pub method: SteerMethod,
    #[serde(default)]
    pub show_face: bool,
}

/// Drive with the head: W unless pulling a fish face, A/D from tilt or turn.
pub struct HeadDrive {
    method: SteerMethod,
    show_face: bool,
    held: HoldTable<&'static str>,
    runtime: Runtime,
}

impl PoseKind for HeadDrive {
    const KIND: &'static str = "head_drive";
    type Options = HeadSteerOptions;

    fn make(options: HeadSteerOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            method: options.method,
            show_face: options.show_face,
            held: HoldTable::new(),
            runtime: runtime.clone(),
        })
    }
}

impl HeadDrive {
    fn set(&mut self, key: &'static str, down: bool) {
        if down {
            if self.held.engage(key, ()) {
                self.runtime.devices.keyboard().hold(key);
            }
        } else if self.held.disengage(&key).is_some() {
            self.runtime.devices.keyboard().release(key);
        }
    }

    fn release_held(&mut self) {
        for (key, ()) in self.held.drain() {
            self.runtime.devices.keyboard().release(key);
        }
    }
}

impl Pose for HeadDrive {
    fn check(&mut self, person: &Person) -> bool {
        let Some(head) = &person.head else {
            self.release_held();
            return false;
        };
        let (left, right) = self.method.triggers(head);
        if head.is(HeadGesture::FishFace) && !left && !right {
            self.release_held();
            return false;
        }
        true
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        let Some(head) = &person.head else {
            return;
        };
        let (left, right) = self.method.triggers(head);
        let braking = head.is(HeadGesture::FishFace);
        self.set("w", !braking);
        self.set("a", left);
        self.set("d", right);
        if self.show_face {
            if let Some(nose) = head.nose_tip_position() {
                view.draw(Overlay::Marker { x: nose.x, y: nose.y });
            }
        }
    }

    fn release_all(&mut self) {
        self.release_held();
    }
}

const SUIKA_STEP: f64 = 10.0;

/// Suika with the head: fish face drops the fruit, tilt/turn moves it.
pub struct HeadSuika {
    method: SteerMethod,
    show_face: bool,
    click: EdgeLatch,
    runtime: Runtime,
}

impl PoseKind for HeadSuika {
    const KIND: &'static str = "head_suika";
    type Options = HeadSteerOptions;

    fn make(options: HeadSteerOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            method: options.method,
            show_face: options.show_face,
            click: EdgeLatch::new(),
            runtime: runtime.clone(),
        })
    }
}

impl Pose for HeadSuika {
    fn check(&mut self, person: &Person) -> bool {
        // Lost face is a gap: the click latch re-arms only on a seen face without fish face.
        let Some(head) = &person.head else {
            return false;
        };
        let (left, right) = self.method.triggers(head);
        if !head.is(HeadGesture::FishFace) && !left && !right {
            self.click.reset();
            return false;
        }
        true
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        let Some(head) = &person.head else {
            return;
        };
        let (left, right) = self.method.triggers(head);
        let mut mouse = self.runtime.devices.mouse();
        if self.click.rising(head.is(HeadGesture::FishFace)) {
            mouse.click(MouseButton::Left);
        }
        if left {
            mouse.move_by(-SUIKA_STEP, 0.0);
        }
        if right {
            mouse.move_by(SUIKA_STEP, 0.0);
        }
        drop(mouse);
        if self.show_face {
            if let Some(nose) = head.nose_tip_position() {
                view.draw(Overlay::Marker { x: nose.x, y: nose.y });
            }
        }
    }
}

// ----------------------------------------------------------------------------
// nose_scroll
// ----------------------------------------------------------------------------

fn default_one() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct NoseScrollOptions {
    #[serde(default = "default_one")]
    pub sensitivity: f64,
    #[serde(default = "default_one")]
    pub scale_factor: f64,
}

/// Nose travel (normalised units) that counts as a scroll gesture at
/// sensitivity 1.
const NOSE_STEP: f64 = 0.05;

/// Scroll by nodding: each nose movement larger than the step scrolls in
/// the opposite vertical direction, one notch per step travelled.
pub struct NoseScroll {
    sensitivity: f64,
    scale_factor: f64,
    previous: Option<Point>,
    delta_y: f64,
    runtime: Runtime,
}

impl PoseKind for NoseScroll {
    const KIND: &'static str = "nose_scroll";
    type Options = NoseScrollOptions;

    fn make(options: NoseScrollOptions, runtime: &Runtime) -> Result<Self> {
        if !(options.sensitivity > 0.0) {
            bail!("sensitivity must be greater than 0, got {}", options.sensitivity);
        }
        Ok(Self {
            sensitivity: options.sensitivity,
            scale_factor: options.scale_factor,
            previous: None,
            delta_y: 0.0,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for NoseScroll {
    fn check(&mut self, person: &Person) -> bool {
        let Some(nose) = person.head.as_ref().and_then(Head::nose_tip_position) else {
            return false;
        };
        let Some(previous) = self.previous else {
            self.previous = Some(nose);
            return false;
        };
        if (nose.distance(&previous) as f64) > NOSE_STEP * self.sensitivity {
            self.delta_y = (nose.y - previous.y) as f64;
            self.previous = Some(nose);
            return true;
        }
        false
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        let notches = -self.delta_y / NOSE_STEP * self.scale_factor;
        self.runtime.devices.mouse().scroll(0.0, notches);
    }
}

// ----------------------------------------------------------------------------
// mr_swipe
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MrSwipeOptions {
    pub hand: Side,
    pub sensitivity: u32,
    pub threshold_min: f32,
    pub threshold_max: f32,
    #[serde(default)]
    pub horizontal: bool,
}

/// Two raised fingers held past an edge of the frame repeat an arrow key.
pub struct MrSwipe {
    target: HandTarget,
    sensitivity: u32,
    min: f32,
    max: f32,
    horizontal: bool,
    counter: u32,
    previous: Option<&'static str>,
    runtime: Runtime,
}

impl PoseKind for MrSwipe {
    const KIND: &'static str = "mr_swipe";
    type Options = MrSwipeOptions;

    fn make(options: MrSwipeOptions, runtime: &Runtime) -> Result<Self> {
        if options.sensitivity == 0 {
            bail!("sensitivity must be greater than 0");
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&options.threshold_min) || !unit.contains(&options.threshold_max) {
            bail!("thresholds must lie in [0, 1]");
        }
        if options.threshold_min >= options.threshold_max {
            bail!(
                "threshold_min ({}) must be below threshold_max ({})",
                options.threshold_min,
                options.threshold_max
            );
        }
        Ok(Self {
            target: HandTarget::new(options.hand),
            sensitivity: options.sensitivity,
            min: options.threshold_min,
            max: options.threshold_max,
            horizontal: options.horizontal,
            counter: 0,
            previous: None,
            runtime: runtime.clone(),
        })
    }
}

impl MrSwipe {
    fn direction(&self, tip: Point) -> Option<&'static str> {
        let (value, high, low) = if self.horizontal {
            (tip.x, "right", "left")
        } else {
            (tip.y, "down", "up")
        };
        if value > self.max {
            Some(high)
        } else if value <= self.min {
            Some(low)
        } else {
            None
        }
    }

    fn is_centred(&self, tip: Point) -> bool {
        let inside = |v: f32| self.min < v && v <= self.max;
        inside(tip.x) && inside(tip.y)
    }
}

impl Pose for MrSwipe {
    fn check(&mut self, person: &Person) -> bool {
        self.target
            .hand(person)
            .map(|hand| hand.all(&[HandGesture::MiddleStretched, HandGesture::IndexStretched]))
            .unwrap_or(false)
    }

    fn act(&mut self, person: &Person, _view: &mut dyn View) {
        let Some(tip) = self.target.hand(person).and_then(|h| h.get("middle_tip")) else {
            return;
        };
        let Some(direction) = self.direction(tip) else {
            return;
        };
        if Some(direction) == self.previous && !self.is_centred(tip) {
            self.counter += 1;
        } else {
            self.counter = 0;
        }
        if self.previous != Some(direction) {
            self.previous = Some(direction);
        } else if self.counter > self.sensitivity {
            self.runtime.devices.keyboard().press(direction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};
    use crate::frame::{Hand, Landmarks};
    use crate::view::NullView;

    fn tilted(angle: f32) -> Person {
        // Chin at the origin, temple rotated by `angle` from straight up.
        let (s, c) = angle.sin_cos();
        let head = Head::new(
            Landmarks::new()
                .with("chin-centre", Point::xy(0.0, 0.0))
                .with("temple-centre", Point::xy(s, -c)),
        );
        Person::default().with_head(head)
    }

    fn step(pose: &mut impl Pose, person: &Person) -> bool {
        let fired = pose.check(person);
        if fired {
            pose.act(person, &mut NullView::default());
        }
        fired
    }

    #[test]
    fn tilt_switches_flags_once_the_window_agrees() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let options: HeadSwitchOptions = serde_json::from_value(serde_json::json!({
            "left_flag": "panel_left",
            "right_flag": "panel_right",
        }))
        .unwrap();
        let mut pose = HeadTilt::make(options, &rt).unwrap();
        rt.flags.set("panel_right", true);
        let fired: Vec<bool> = (0..5).map(|_| step(&mut pose, &tilted(-0.5))).collect();
        assert_eq!(fired, vec![true, true, true, true, true]);
        assert!(rt.flags.get("panel_left"));
        assert!(!rt.flags.get("panel_right"));
    }

    #[test]
    fn held_tilt_action_is_released_when_the_head_is_lost() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let options: HeadSwitchOptions = serde_json::from_value(serde_json::json!({
            "left": { "class": "keyboard", "method": "hold", "args": ["a"] }
        }))
        .unwrap();
        let mut pose = HeadTilt::make(options, &rt).unwrap();
        for _ in 0..5 {
            assert!(step(&mut pose, &tilted(-0.5)));
        }
        assert_eq!(log.held_keys(), ["a".to_string()].into());
        for _ in 0..20 {
            assert!(!step(&mut pose, &Person::default()));
        }
        assert!(log.held_keys().is_empty());
        assert_eq!(log.count(|e| matches!(e, DeviceEvent::KeyRelease { .. })), 1);
        // The window survived the gap, so the tilt is back on the next frame.
        assert!(step(&mut pose, &tilted(-0.5)));
        assert_eq!(log.held_keys(), ["a".to_string()].into());
    }

    #[test]
    fn tilt_with_mixed_window_is_undecided() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let options: HeadSwitchOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        let mut pose = HeadTilt::make(options, &rt).unwrap();
        for angle in [-0.5, -0.5, 0.5, 0.5] {
            step(&mut pose, &tilted(angle));
        }
        assert!(!step(&mut pose, &tilted(0.0)));
    }

    #[test]
    fn bad_confidence_is_rejected() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let options: HeadSwitchOptions =
            serde_json::from_value(serde_json::json!({ "confidence": 0.4 })).unwrap();
        assert!(HeadTurn::make(options, &rt).is_err());
    }

    #[test]
    fn head_trigger_rejects_unknown_gestures() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let options = HeadTriggerOptions {
            gesture: "wink".into(),
            action: None,
        };
        assert!(HeadTrigger::make(options, &rt).is_err());
    }

    #[test]
    fn head_drive_brakes_on_fish_face() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = HeadDrive::make(
            HeadSteerOptions { method: SteerMethod::Tilt, show_face: false },
            &rt,
        )
        .unwrap();
        let steering = Person::default().with_head(Head::default().with_gestures(&[HeadGesture::TiltLeft]));
        assert!(step(&mut pose, &steering));
        assert_eq!(log.held_keys(), ["a".to_string(), "w".to_string()].into());
        let braking = Person::default().with_head(Head::default().with_gestures(&[HeadGesture::FishFace]));
        assert!(!step(&mut pose, &braking));
        assert!(log.held_keys().is_empty());
    }

    #[test]
    fn suika_click_latch_survives_a_lost_face() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = HeadSuika::make(
            HeadSteerOptions { method: SteerMethod::Tilt, show_face: false },
            &rt,
        )
        .unwrap();
        let fish = Person::default().with_head(Head::default().with_gestures(&[HeadGesture::FishFace]));
        let neutral = Person::default().with_head(Head::default());
        let clicks = |log: &crate::device::DeviceLog| {
            log.count(|e| matches!(e, DeviceEvent::MouseClick { .. }))
        };
        step(&mut pose, &fish);
        assert!(!step(&mut pose, &Person::default()));
        step(&mut pose, &fish);
        assert_eq!(clicks(&log), 1);
        assert!(!step(&mut pose, &neutral));
        step(&mut pose, &fish);
        assert_eq!(clicks(&log), 2);
    }

    #[test]
    fn nose_scroll_needs_a_reference_frame() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = NoseScroll::make(NoseScrollOptions { sensitivity: 1.0, scale_factor: 1.0 }, &rt).unwrap();
        let nose = |y: f32| Person::default().with_head(Head::new(Landmarks::new().with("nose-tip", Point::xy(0.5, y))));
        assert!(!step(&mut pose, &nose(0.5)));
        assert!(!step(&mut pose, &nose(0.52)));
        assert!(step(&mut pose, &nose(0.4)));
        assert_eq!(log.len(), 1);
        assert!(matches!(log.events()[0], DeviceEvent::MouseScroll { dy, .. } if dy > 1.9 && dy < 2.1));
    }

    #[test]
    fn swipe_repeats_after_sensitivity_frames() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = MrSwipe::make(
            MrSwipeOptions {
                hand: Side::Right,
                sensitivity: 2,
                threshold_min: 0.3,
                threshold_max: 0.7,
                horizontal: true,
            },
            &rt,
        )
        .unwrap();
        let person = Person::default().with_hand(
            Side::Right,
            Hand::new(Landmarks::new().with("middle_tip", Point::xy(0.9, 0.9)))
                .with_gestures(&[HandGesture::MiddleStretched, HandGesture::IndexStretched]),
        );
        for _ in 0..5 {
            step(&mut pose, &person);
        }
        // Frame 1 latches the direction; counters 1, 2 wait; 3 and 4 press.
        assert_eq!(log.count(|e| matches!(e, DeviceEvent::KeyPress { key } if key == "right")), 2);
    }
}
