//! Poses that read both hands.

use anyhow::Result;
use serde::Deserialize;

use super::{Pose, PoseKind};
use crate::frame::{Hand, HandGesture, Person, Point, Side};
use crate::runtime::Runtime;
use crate::signal::normalized_hands_distance;
use crate::view::View;

// ----------------------------------------------------------------------------
// zoom
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ZoomOptions {
    /// Dominant hand.
    pub hand: Side,
}

fn zoom_pinch(hand: &Hand) -> bool {
    hand.all(&[HandGesture::IndexPinched, HandGesture::PalmFacingCamera])
        && !hand.is(HandGesture::MiddlePinched)
        && !hand.is(HandGesture::RingPinched)
        && !hand.is(HandGesture::PinkyPinched)
}

/// Both hands index-pinched, palms to the camera: changes in their
/// separation scroll (zoom) the view.
pub struct Zoom {
    dom: Side,
    frames_for_switch: u64,
    movement_threshold: f64,
    last_distance: f64,
    frames_held: u64,
    runtime: Runtime,
}

impl PoseKind for Zoom {
    const KIND: &'static str = "zoom";
    type Options = ZoomOptions;

    fn make(options: ZoomOptions, runtime: &Runtime) -> Result<Self> {
        let settings = &runtime.settings;
        Ok(Self {
            dom: options.hand,
            frames_for_switch: settings.get_u64("hands/zoom/frames_for_switch")?.max(2),
            movement_threshold: settings.get_f64("hands/zoom/movement_threshold")?,
            last_distance: settings.get_f64("hands/zoom/starting_distance")?,
            frames_held: settings.get_u64("hands/zoom/frames_held")?,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for Zoom {
    fn check(&mut self, person: &Person) -> bool {
        let (Some(dom), Some(off)) = (person.hand(self.dom), person.hand(self.dom.opposite())) else {
            self.frames_held = 0;
            return false;
        };
        if zoom_pinch(dom) && zoom_pinch(off) {
            self.frames_held += 1;
            return true;
        }
        self.frames_held = 0;
        false
    }

    fn act(&mut self, person: &Person, _view: &mut dyn View) {
        let (Some(dom), Some(off)) = (person.hand(self.dom), person.hand(self.dom.opposite())) else {
            return;
        };
        let Some(distance) = normalized_hands_distance(dom, off) else {
            return;
        };
        let distance = distance as f64;
        if self.frames_held >= self.frames_for_switch {
            let speed = distance - self.last_distance;
            if speed.abs() > self.movement_threshold {
                self.runtime.devices.mouse().scroll(speed, speed);
            }
        }
        self.last_distance = distance;
    }
}

// ----------------------------------------------------------------------------
// rotation
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation2D {
    Up,
    Down,
    Left,
    Right,
    ShiftLeft,
    ShiftRight,
}

impl Rotation2D {
    fn keys(&self) -> &'static [&'static str] {
        match self {
            Rotation2D::Up => &["up"],
            Rotation2D::Down => &["down"],
            Rotation2D::Left => &["left"],
            Rotation2D::Right => &["right"],
            Rotation2D::ShiftLeft => &["shift", "left"],
            Rotation2D::ShiftRight => &["shift", "right"],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RotationOptions {}

const FINGERTIPS: [&str; 5] = ["thumb_tip", "index_tip", "middle_tip", "ring_tip", "pinky_tip"];

/// Hands near the bottom edge of the frame tilt the globe; side-by-side
/// hands spin it; backs of both hands shift it.
pub struct Rotation {
    direction: Option<Rotation2D>,
    runtime: Runtime,
}

impl PoseKind for Rotation {
    const KIND: &'static str = "rotation";
    type Options = RotationOptions;

    fn make(_options: RotationOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            direction: None,
            runtime: runtime.clone(),
        })
    }
}

/// Angle in degrees `[0, 360)` of the right palm seen from the left one.
fn palm_angle(right: Point, left: Point) -> f64 {
    let dy = (right.y - left.y) as f64;
    let dx = (right.x - left.x) as f64;
    dy.atan2(dx).to_degrees().rem_euclid(360.0)
}

/// Steeper hands favour tilting down over spinning.
fn spin_or_tilt(angle: f64, spin: Rotation2D) -> Rotation2D {
    let folded = if angle > 270.0 { 360.0 - angle } else { angle };
    let steepness = folded / 90.0;
    if steepness >= 0.5 {
        Rotation2D::Down
    } else {
        spin
    }
}

fn tilt_direction(other: &Hand, thumb: Point, pinky: Point) -> Rotation2D {
    if !other.is(HandGesture::PalmFacingCamera) || thumb.y < pinky.y {
        Rotation2D::Down
    } else {
        Rotation2D::Up
    }
}

impl Rotation {
    pub fn direction(&self) -> Option<Rotation2D> {
        self.direction
    }

    fn classify(right: &Hand, left: &Hand) -> Option<Rotation2D> {
        let right_palm = right.palm_center()?;
        let left_palm = left.palm_center()?;
        let tip = |hand: &Hand, name: &str| hand.get(name);
        let mean_y = |hand: &Hand| -> Option<f32> {
            let ys = FINGERTIPS
                .iter()
                .map(|name| tip(hand, name).map(|p| p.y))
                .collect::<Option<Vec<f32>>>()?;
            Some(ys.iter().sum::<f32>() / ys.len() as f32)
        };
        let (r_thumb, r_pinky) = (tip(right, "thumb_tip")?, tip(right, "pinky_tip")?);
        let (l_thumb, l_pinky) = (tip(left, "thumb_tip")?, tip(left, "pinky_tip")?);
        let angle = palm_angle(right_palm, left_palm);

        if mean_y(right)? > 0.8 {
            return Some(tilt_direction(left, l_thumb, l_pinky));
        }
        if mean_y(left)? > 0.8 {
            return Some(tilt_direction(right, r_thumb, r_pinky));
        }
        if l_pinky.x > r_thumb.x || (l_pinky.x > l_thumb.x && r_pinky.x > r_thumb.x) {
            return Some(spin_or_tilt(angle, Rotation2D::Right));
        }
        if r_pinky.x < l_thumb.x || (l_pinky.x < l_thumb.x && r_pinky.x < r_thumb.x) {
            return Some(spin_or_tilt(angle, Rotation2D::Left));
        }
        if !right.is(HandGesture::PalmFacingCamera) && !left.is(HandGesture::PalmFacingCamera) {
            return Some(if angle > 270.0 {
                Rotation2D::ShiftLeft
            } else {
                Rotation2D::ShiftRight
            });
        }
        None
    }
}

impl Pose for Rotation {
    fn check(&mut self, person: &Person) -> bool {
        let (Some(right), Some(left)) = (person.hand(Side::Right), person.hand(Side::Left)) else {
            return false;
        };
        self.direction = Self::classify(right, left);
        self.direction.is_some()
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        let Some(direction) = self.direction else {
            return;
        };
        let keys: Vec<String> = direction.keys().iter().map(|k| k.to_string()).collect();
        let mut keyboard = self.runtime.devices.keyboard();
        match keys.as_slice() {
            [single] => keyboard.press(single),
            chord => keyboard.press_chord(chord),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};
    use crate::frame::Landmarks;
    use crate::view::NullView;

    fn pinching_hand(x: f32) -> Hand {
        Hand::new(
            Landmarks::new()
                .with("index_tip", Point::xy(x, 0.5))
                .with("wrist", Point::xy(x, 0.7))
                .with("middle_base", Point::xy(x, 0.6)),
        )
        .with_gestures(&[HandGesture::IndexPinched, HandGesture::PalmFacingCamera])
    }

    fn hands(spread: f32) -> Person {
        Person::default()
            .with_hand(Side::Right, pinching_hand(0.5 + spread))
            .with_hand(Side::Left, pinching_hand(0.5 - spread))
    }

    #[test]
    fn zoom_waits_for_switch_frames_then_scrolls() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = Zoom::make(ZoomOptions { hand: Side::Right }, &rt).unwrap();
        let mut view = NullView::default();
        for spread in [0.1, 0.1, 0.1, 0.2] {
            let person = hands(spread);
            assert!(pose.check(&person));
            pose.act(&person, &mut view);
        }
        // Distances: 2.0, 2.0, 2.0 then 4.0; only the last change scrolls.
        assert_eq!(log.len(), 1);
        assert!(matches!(log.events()[0], DeviceEvent::MouseScroll { dx, .. } if dx > 1.9));
    }

    #[test]
    fn zoom_resets_when_a_pinch_breaks() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let mut pose = Zoom::make(ZoomOptions { hand: Side::Left }, &rt).unwrap();
        assert!(pose.check(&hands(0.1)));
        let broken = hands(0.1).with_hand(Side::Right, Hand::default());
        assert!(!pose.check(&broken));
        assert_eq!(pose.frames_held, 0);
    }

    fn flat_hand(x: f32, y: f32, thumb_dx: f32, palm_facing: bool) -> Hand {
        let mut landmarks = Landmarks::new()
            .with("wrist", Point::xy(x, y + 0.1))
            .with("thumb_tip", Point::xy(x + thumb_dx, y))
            .with("pinky_tip", Point::xy(x - thumb_dx, y));
        for name in ["index_tip", "middle_tip", "ring_tip"] {
            landmarks.insert(name, Point::xy(x, y));
        }
        let hand = Hand::new(landmarks);
        if palm_facing {
            hand.with_gestures(&[HandGesture::PalmFacingCamera])
        } else {
            hand
        }
    }

    #[test]
    fn backs_of_level_hands_shift_the_view() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = Rotation::make(RotationOptions {}, &rt).unwrap();
        // Thumbs point inwards: neither spin rule matches.
        let person = Person::default()
            .with_hand(Side::Left, flat_hand(0.3, 0.5, 0.05, false))
            .with_hand(Side::Right, flat_hand(0.7, 0.5, -0.05, false));
        assert!(pose.check(&person));
        assert_eq!(pose.direction(), Some(Rotation2D::ShiftRight));
        pose.act(&person, &mut NullView::default());
        assert_eq!(log.held_keys().len(), 0);
        assert_eq!(log.count(|e| matches!(e, DeviceEvent::KeyPress { key } if key == "right")), 1);
    }

    #[test]
    fn hand_at_frame_bottom_tilts() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let mut pose = Rotation::make(RotationOptions {}, &rt).unwrap();
        let person = Person::default()
            .with_hand(Side::Left, flat_hand(0.3, 0.5, 0.05, true))
            .with_hand(Side::Right, flat_hand(0.7, 0.9, -0.05, true));
        assert!(pose.check(&person));
        assert_eq!(pose.direction(), Some(Rotation2D::Up));
    }
}
