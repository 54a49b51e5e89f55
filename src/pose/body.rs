//! Poses driven by the body skeleton. Body landmarks are in camera pixels.

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::time::Duration;

use super::hand::Area;
use super::{Pose, PoseKind};
use crate::action::{ActionDescriptor, Dispatcher};
use crate::debounce::Cooldown;
use crate::frame::{Hand, Person, Point, Side};
use crate::runtime::Runtime;
use crate::view::{Overlay, View};

// ----------------------------------------------------------------------------
// body_head_turn
// ----------------------------------------------------------------------------

const HEAD_TURN_COOLDOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct BodyHeadTurnOptions {
    #[serde(default)]
    pub left: Option<ActionDescriptor>,
    #[serde(default)]
    pub right: Option<ActionDescriptor>,
}

/// One side of a head-turn toggle.
struct TurnSide {
    open: bool,
    dispatcher: Dispatcher,
}

impl TurnSide {
    fn new(desc: Option<&ActionDescriptor>, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            open: false,
            dispatcher: Dispatcher::resolve(desc, runtime)?,
        })
    }

    fn set_flag(&self, runtime: &Runtime, value: bool) {
        if let Some(flag) = &self.dispatcher.binding().flag {
            runtime.flags.set(flag, value);
        }
    }

    fn close(&mut self, runtime: &Runtime) {
        self.open = false;
        self.set_flag(runtime, false);
        self.dispatcher.settle(runtime);
    }
}

/// Turning the head until the nose passes an ear toggles that side open.
/// Opening or closing a side closes the other one.
pub struct BodyHeadTurn {
    left: TurnSide,
    right: TurnSide,
    side: Option<Side>,
    cooldown: Cooldown,
    runtime: Runtime,
}

impl PoseKind for BodyHeadTurn {
    const KIND: &'static str = "body_head_turn";
    type Options = BodyHeadTurnOptions;

    fn make(options: BodyHeadTurnOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            left: TurnSide::new(options.left.as_ref(), runtime)?,
            right: TurnSide::new(options.right.as_ref(), runtime)?,
            side: None,
            cooldown: Cooldown::new(HEAD_TURN_COOLDOWN),
            runtime: runtime.clone(),
        })
    }
}

impl BodyHeadTurn {
    pub fn is_open(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left.open,
            Side::Right => self.right.open,
        }
    }

    fn sides(&mut self, side: Side) -> (&mut TurnSide, &mut TurnSide) {
        match side {
            Side::Left => (&mut self.left, &mut self.right),
            Side::Right => (&mut self.right, &mut self.left),
        }
    }
}

impl Pose for BodyHeadTurn {
    fn check(&mut self, person: &Person) -> bool {
        self.side = None;
        let (Some(nose), Some(left_ear), Some(right_ear)) = (
            person.body_landmark("nose"),
            person.body_landmark("left_ear"),
            person.body_landmark("right_ear"),
        ) else {
            return false;
        };
        let side = if nose.x < left_ear.x {
            Side::Left
        } else if nose.x > right_ear.x {
            Side::Right
        } else {
            return false;
        };
        if !self.cooldown.try_trigger(self.runtime.now()) {
            return false;
        }
        self.side = Some(side);
        true
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        let Some(side) = self.side else {
            return;
        };
        let runtime = self.runtime.clone();
        let (turned, other) = self.sides(side);
        other.close(&runtime);
        turned.open = !turned.open;
        turned.set_flag(&runtime, turned.open);
        if !turned.open && turned.dispatcher.is_engaged() {
            turned.dispatcher.settle(&runtime);
        } else {
            turned.dispatcher.fire(&runtime);
        }
        log::debug!("head turn {}: {}", side, if turned.open { "open" } else { "closed" });
    }

    fn release_all(&mut self) {
        self.left.dispatcher.settle(&self.runtime);
        self.right.dispatcher.settle(&self.runtime);
    }
}

// ----------------------------------------------------------------------------
// body_mouse
// ----------------------------------------------------------------------------

const BODY_MOUSE_AREA: Area = Area {
    x: 320.0,
    y: 200.0,
    width: 280.0,
    height: 200.0,
};
const BODY_MOUSE_INNER: f32 = 0.9;
const BODY_MOUSE_STEP: f64 = 15.0;

fn default_wrist() -> String {
    "right_wrist".to_string()
}

#[derive(Debug, Deserialize)]
pub struct BodyMouseOptions {
    #[serde(default = "default_wrist")]
    pub landmark: String,
}

/// Inside the central box the landmark maps onto the screen; outside it the
/// pointer drifts at a constant pace towards the landmark.
pub struct BodyMouse {
    landmark: String,
    runtime: Runtime,
}

impl PoseKind for BodyMouse {
    const KIND: &'static str = "body_mouse";
    type Options = BodyMouseOptions;

    fn make(options: BodyMouseOptions, runtime: &Runtime) -> Result<Self> {
        if options.landmark.is_empty() {
            bail!("landmark must not be empty");
        }
        Ok(Self {
            landmark: options.landmark,
            runtime: runtime.clone(),
        })
    }
}

fn drift(value: f32, low: f32, high: f32) -> f64 {
    if value < low {
        -BODY_MOUSE_STEP
    } else if value > high {
        BODY_MOUSE_STEP
    } else {
        0.0
    }
}

impl Pose for BodyMouse {
    fn check(&mut self, person: &Person) -> bool {
        person.body_landmark(&self.landmark).is_some()
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        let Some(p) = person.body_landmark(&self.landmark) else {
            return;
        };
        let area = BODY_MOUSE_AREA;
        let inner = area.inner(BODY_MOUSE_INNER);
        view.draw(area.overlay(true));
        view.draw(inner.overlay(false));
        view.draw(Overlay::Marker { x: p.x, y: p.y });

        let mut mouse = self.runtime.devices.mouse();
        if inner.contains(p.x, p.y) {
            let display = self.runtime.devices.display;
            let x = ((p.x - area.x) * display.width as f32 / inner.width).trunc();
            let y = ((p.y - area.y) * display.height as f32 / inner.height).trunc();
            mouse.move_to(x as f64, y as f64);
        } else {
            let dx = drift(p.x, inner.x, inner.x + inner.width);
            let dy = drift(p.y, inner.y, inner.y + inner.height);
            mouse.move_by(dx, dy);
        }
    }
}

// ----------------------------------------------------------------------------
// body_point
// ----------------------------------------------------------------------------

/// Body part named by a `body_point` option.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Part {
    Body,
    Head,
    Hand(Side),
}

impl Part {
    fn parse(name: &str) -> Result<Self> {
        if name.contains("body") {
            Ok(Part::Body)
        } else if name.contains("head") {
            Ok(Part::Head)
        } else if name.contains("hand") {
            if name.contains("left") {
                Ok(Part::Hand(Side::Left))
            } else if name.contains("right") {
                Ok(Part::Hand(Side::Right))
            } else {
                Err(anyhow!("hand point `{}` must name a side", name))
            }
        } else {
            Err(anyhow!("unknown body point `{}` (expected body, head, left_hand or right_hand)", name))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BodyPointOptions {
    pub point1: String,
    pub point2: String,
    pub threshold_distance: f64,
    /// Accepted angle range in degrees, inclusive.
    pub interval_angle: [f64; 2],
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
}

/// Fires while two body parts are further apart than a threshold, in a
/// given direction.
pub struct BodyPoint {
    parts: (Part, Part),
    threshold: f64,
    interval: (f64, f64),
    camera: (f32, f32),
    dispatcher: Dispatcher,
    runtime: Runtime,
}

impl PoseKind for BodyPoint {
    const KIND: &'static str = "body_point";
    type Options = BodyPointOptions;

    fn make(options: BodyPointOptions, runtime: &Runtime) -> Result<Self> {
        let first = Part::parse(&options.point1)?;
        let second = Part::parse(&options.point2)?;
        match (first, second) {
            (Part::Body, Part::Body) | (Part::Head, Part::Head) => {
                bail!("points `{}` and `{}` name the same part", options.point1, options.point2)
            }
            (Part::Hand(a), Part::Hand(b)) if a == b => {
                bail!("points `{}` and `{}` name the same hand", options.point1, options.point2)
            }
            _ => {}
        }
        if !options.threshold_distance.is_finite() || options.threshold_distance < 0.0 {
            bail!("threshold_distance must be non-negative, got {}", options.threshold_distance);
        }
        let [low, high] = options.interval_angle;
        if !(0.0..=360.0).contains(&low) || !(0.0..=360.0).contains(&high) || low > high {
            bail!("interval_angle must be an ordered pair in [0, 360], got [{}, {}]", low, high);
        }
        Ok(Self {
            parts: (first, second),
            threshold: options.threshold_distance,
            interval: (low.to_radians(), high.to_radians()),
            camera: (
                runtime.settings.get_f64("camera/width")? as f32,
                runtime.settings.get_f64("camera/height")? as f32,
            ),
            dispatcher: Dispatcher::resolve(options.action.as_ref(), runtime)?,
            runtime: runtime.clone(),
        })
    }
}

fn atan2(from: Point, to: Point) -> f64 {
    ((to.y - from.y) as f64).atan2((to.x - from.x) as f64)
}

/// Shoulder midpoint, normalised by the camera size.
fn shoulders(person: &Person, camera: (f32, f32)) -> Option<Point> {
    let mid = person
        .body_landmark("left_shoulder")?
        .midpoint(&person.body_landmark("right_shoulder")?);
    Some(Point::xy(mid.x / camera.0, mid.y / camera.1))
}

fn nose(person: &Person) -> Option<Point> {
    person.head.as_ref()?.nose_tip_position()
}

fn palm_height(hand: &Hand) -> Option<f32> {
    hand.distance("middle_base", "wrist")
}

impl BodyPoint {
    /// Angle in radians and distance between the two parts.
    fn measure(&self, person: &Person) -> Option<(f64, f64)> {
        let (a, b) = self.parts;
        match (a, b) {
            (Part::Hand(s1), Part::Hand(s2)) => {
                let (h1, h2) = (person.hand(s1)?, person.hand(s2)?);
                let (t1, t2) = (h1.get("index_tip")?, h2.get("index_tip")?);
                let palms = palm_height(h1)? + palm_height(h2)?;
                if palms <= 0.0 {
                    return None;
                }
                let distance = t1.distance(&t2) * 2.0 / palms;
                Some((atan2(t1, t2).abs(), distance as f64))
            }
            (Part::Hand(side), Part::Body) | (Part::Body, Part::Hand(side)) => {
                let palm = person.hand(side)?.palm_center()?;
                let body = shoulders(person, self.camera)?;
                // Measured from south, clockwise towards east.
                let angle = ((palm.x - body.x) as f64)
                    .atan2((palm.y - body.y) as f64)
                    .rem_euclid(std::f64::consts::TAU);
                Some((angle, palm.distance_xy(&body) as f64))
            }
            (Part::Hand(side), Part::Head) | (Part::Head, Part::Hand(side)) => {
                let palm = person.hand(side)?.palm_center()?;
                let nose = nose(person)?;
                Some((atan2(nose, palm).abs(), palm.distance_xy(&nose) as f64))
            }
            (Part::Body, Part::Head) | (Part::Head, Part::Body) => {
                let body = shoulders(person, self.camera)?;
                let nose = nose(person)?;
                Some((atan2(body, nose).abs(), nose.distance_xy(&body) as f64))
            }
            _ => None,
        }
    }
}

impl Pose for BodyPoint {
    fn check(&mut self, person: &Person) -> bool {
        let fired = self.measure(person).is_some_and(|(angle, distance)| {
            distance > self.threshold && angle >= self.interval.0 && angle <= self.interval.1
        });
        if !fired {
            self.dispatcher.settle(&self.runtime);
        }
        fired
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.dispatcher.fire(&self.runtime);
    }

    fn release_all(&mut self) {
        self.dispatcher.settle(&self.runtime);
    }
}

// ----------------------------------------------------------------------------
// raise_hand_transcribe
// ----------------------------------------------------------------------------

/// Horizontal wrist-to-elbow tolerance in camera pixels.
const WRIST_ELBOW_X_THRESHOLD: f32 = 70.0;

fn default_right() -> Side {
    Side::Right
}

#[derive(Debug, Deserialize)]
pub struct RaiseHandTranscribeOptions {
    #[serde(default = "default_right")]
    pub hand: Side,
}

pub struct RaiseHandTranscribe {
    wrist: String,
    elbow: String,
    transcribing: bool,
    runtime: Runtime,
}

impl PoseKind for RaiseHandTranscribe {
    const KIND: &'static str = "raise_hand_transcribe";
    type Options = RaiseHandTranscribeOptions;

    fn make(options: RaiseHandTranscribeOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            wrist: format!("{}_wrist", options.hand),
            elbow: format!("{}_elbow", options.hand),
            transcribing: false,
            runtime: runtime.clone(),
        })
    }
}

impl RaiseHandTranscribe {
    fn stop(&mut self) {
        if std::mem::take(&mut self.transcribing) {
            self.runtime.devices.transcriber().stop();
            log::info!("transcription stopped");
        }
    }

    pub fn is_transcribing(&self) -> bool {
        self.transcribing
    }
}

impl Pose for RaiseHandTranscribe {
    fn check(&mut self, person: &Person) -> bool {
        let raised = match (person.body_landmark(&self.wrist), person.body_landmark(&self.elbow)) {
            (Some(wrist), Some(elbow)) => {
                wrist.y < elbow.y && (wrist.x - elbow.x).abs() < WRIST_ELBOW_X_THRESHOLD
            }
            _ => false,
        };
        if !raised {
            self.stop();
        }
        raised
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        if !self.transcribing {
            self.transcribing = true;
            self.runtime.devices.transcriber().start();
            log::info!("transcription started");
        }
    }

    fn release_all(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};
    use crate::frame::Landmarks;
    use crate::view::NullView;

    fn step(pose: &mut impl Pose, person: &Person) -> bool {
        let fired = pose.check(person);
        if fired {
            pose.act(person, &mut NullView::default());
        }
        fired
    }

    fn body(points: &[(&str, f32, f32)]) -> Person {
        Person::default().with_body(points.iter().map(|(n, x, y)| (*n, Point::xy(*x, *y))).collect())
    }

    fn face_turned(nose_x: f32) -> Person {
        body(&[("nose", nose_x, 100.0), ("left_ear", 300.0, 100.0), ("right_ear", 340.0, 100.0)])
    }

    #[test]
    fn head_turn_toggles_with_cooldown() {
        let (rt, _, clock) = Runtime::recording(DisplaySize::default());
        let options: BodyHeadTurnOptions = serde_json::from_value(serde_json::json!({
            "left": { "flag": "menu_left" },
            "right": { "flag": "menu_right" }
        }))
        .unwrap();
        let mut pose = BodyHeadTurn::make(options, &rt).unwrap();
        assert!(step(&mut pose, &face_turned(290.0)));
        assert!(rt.flags.get("menu_left"));
        // Still turned half a second later: cooldown holds.
        clock.advance_secs(0.5);
        assert!(!step(&mut pose, &face_turned(290.0)));
        clock.advance_secs(0.6);
        assert!(step(&mut pose, &face_turned(350.0)));
        assert!(!rt.flags.get("menu_left"));
        assert!(rt.flags.get("menu_right"));
        assert!(!pose.is_open(Side::Left));
        clock.advance_secs(1.0);
        assert!(!step(&mut pose, &face_turned(320.0)));
    }

    #[test]
    fn body_mouse_maps_inside_and_drifts_outside() {
        let (rt, log, _) = Runtime::recording(DisplaySize {
            width: 1260,
            height: 900,
        });
        let mut pose = BodyMouse::make(serde_json::from_value(serde_json::json!({})).unwrap(), &rt).unwrap();
        assert!(!step(&mut pose, &Person::default()));
        assert!(step(&mut pose, &body(&[("right_wrist", 348.0, 228.0)])));
        assert!(step(&mut pose, &body(&[("right_wrist", 700.0, 100.0)])));
        let events = log.events();
        // Inner box is 252 x 180: scale 5 in both axes.
        assert_eq!(events[0], DeviceEvent::MouseMoveTo { x: 140.0, y: 140.0 });
        assert_eq!(events[1], DeviceEvent::MouseMoveBy { dx: 15.0, dy: -15.0 });
    }

    #[test]
    fn body_point_fires_on_distance_and_angle() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let options: BodyPointOptions = serde_json::from_value(serde_json::json!({
            "point1": "left_hand",
            "point2": "right_hand",
            "threshold_distance": 2.0,
            "interval_angle": [0, 30],
            "action": { "class": "keyboard", "method": "press", "args": ["space"] }
        }))
        .unwrap();
        let mut pose = BodyPoint::make(options, &rt).unwrap();
        let hand = |x: f32| {
            Hand::new(
                Landmarks::new()
                    .with("index_tip", Point::xy(x, 0.5))
                    .with("wrist", Point::xy(x, 0.6))
                    .with("middle_base", Point::xy(x, 0.55)),
            )
        };
        let apart = |spread: f32| {
            Person::default()
                .with_hand(Side::Left, hand(0.5 - spread))
                .with_hand(Side::Right, hand(0.5 + spread))
        };
        // Palm heights 0.05 + 0.05: distance = gap * 2 / 0.1.
        assert!(!step(&mut pose, &apart(0.03)));
        assert!(step(&mut pose, &apart(0.1)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn body_point_rejects_bad_pairs() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let bad = |p1: &str, p2: &str, interval: [f64; 2]| {
            let options = BodyPointOptions {
                point1: p1.into(),
                point2: p2.into(),
                threshold_distance: 0.1,
                interval_angle: interval,
                action: None,
            };
            BodyPoint::make(options, &rt).is_err()
        };
        assert!(bad("body", "body", [0.0, 90.0]));
        assert!(bad("left_hand", "left_hand", [0.0, 90.0]));
        assert!(bad("hand", "head", [0.0, 90.0]));
        assert!(bad("head", "body", [90.0, 0.0]));
        assert!(!bad("head", "body", [0.0, 180.0]));
    }

    #[test]
    fn raised_hand_starts_and_stops_transcription_once() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = RaiseHandTranscribe::make(RaiseHandTranscribeOptions { hand: Side::Right }, &rt).unwrap();
        let raised = body(&[("right_wrist", 400.0, 100.0), ("right_elbow", 420.0, 200.0)]);
        let lowered = body(&[("right_wrist", 400.0, 300.0), ("right_elbow", 420.0, 200.0)]);
        step(&mut pose, &raised);
        step(&mut pose, &raised);
        assert!(pose.is_transcribing());
        step(&mut pose, &lowered);
        step(&mut pose, &Person::default());
        assert_eq!(log.events(), vec![DeviceEvent::TranscriptionStart, DeviceEvent::TranscriptionStop]);
    }
}
