//! Per-frame landmark snapshot.
//!
//! A `Person` is produced by the pose-estimation backend once per captured
//! frame and is read-only for the poses that inspect it.
//!
//! - `Landmarks`: named keypoints (`"nose"`, `"right_wrist"`, `"index_tip"`).
//! - `Hand` / `Head`: landmarks plus the boolean properties the backend
//!   derives for that part (`index_pinched`, `smiling`, ...).
//! - A missing part or landmark is a detection gap for this frame, never a
//!   zero-valued sample.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

// ----------------------------------------------------------------------------
// Point
// ----------------------------------------------------------------------------

/// 2D/3D coordinate. Normalized `[0, 1]` or pixel space depending on the part;
/// `z` is 0 when the backend reports 2D only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "[f32; 3]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn xy(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn distance_squared(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Point) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Planar distance, ignoring depth.
    pub fn distance_xy(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        (*self + *other) / 2.0
    }
}

impl TryFrom<Vec<f32>> for Point {
    type Error = String;

    fn try_from(coords: Vec<f32>) -> std::result::Result<Self, Self::Error> {
        match coords.as_slice() {
            [x, y] => Ok(Point::xy(*x, *y)),
            [x, y, z] => Ok(Point::new(*x, *y, *z)),
            other => Err(format!(
                "landmark must have 2 or 3 coordinates, got {}",
                other.len()
            )),
        }
    }
}

impl From<Point> for [f32; 3] {
    fn from(p: Point) -> Self {
        [p.x, p.y, p.z]
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point {
    type Output = Point;
    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Point {
    type Output = Point;
    fn div(self, rhs: f32) -> Point {
        Point::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

// ----------------------------------------------------------------------------
// Landmarks
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Landmarks(HashMap<String, Point>);

impl Landmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Point> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, point: Point) {
        self.0.insert(name.into(), point);
    }

    pub fn with(mut self, name: impl Into<String>, point: Point) -> Self {
        self.insert(name, point);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.0.values()
    }
}

impl<S: Into<String>> FromIterator<(S, Point)> for Landmarks {
    fn from_iter<I: IntoIterator<Item = (S, Point)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ----------------------------------------------------------------------------
// Side
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            _ => Err(anyhow!(
                "invalid hand side `{}` (expected `left` or `right`)",
                s
            )),
        }
    }
}

impl TryFrom<String> for Side {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse().map_err(|e: anyhow::Error| e.to_string())
    }
}

impl From<Side> for String {
    fn from(side: Side) -> Self {
        side.as_str().to_string()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Gesture properties
// ----------------------------------------------------------------------------

macro_rules! gesture_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(anyhow!(
                        "unknown {} `{}` (known: {})",
                        $what,
                        s,
                        $name::ALL.iter().map(|g| g.as_str()).collect::<Vec<_>>().join(", ")
                    )),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
                value.parse().map_err(|e: anyhow::Error| e.to_string())
            }
        }

        impl From<$name> for String {
            fn from(g: $name) -> Self {
                g.as_str().to_string()
            }
        }
    };
}

gesture_enum!(
    /// Boolean hand properties reported by the hand tracker.
    HandGesture, "hand gesture" {
        IndexPinched => "index_pinched",
        MiddlePinched => "middle_pinched",
        RingPinched => "ring_pinched",
        PinkyPinched => "pinky_pinched",
        ThumbStretched => "thumb_stretched",
        IndexStretched => "index_stretched",
        MiddleStretched => "middle_stretched",
        RingStretched => "ring_stretched",
        PinkyStretched => "pinky_stretched",
        ThumbFolded => "thumb_folded",
        IndexFolded => "index_folded",
        MiddleFolded => "middle_folded",
        RingFolded => "ring_folded",
        PinkyFolded => "pinky_folded",
        PalmFacingCamera => "palm_facing_camera",
        Visible => "visible",
    }
);

gesture_enum!(
    /// Boolean head/face properties reported by the face tracker.
    HeadGesture, "head gesture" {
        Smiling => "smiling",
        OpenMouth => "open_mouth",
        RaiseEyebrows => "raise_eyebrows",
        FishFace => "fish_face",
        TiltLeft => "tilt_left",
        TiltRight => "tilt_right",
        TurnLeft => "turn_left",
        TurnRight => "turn_right",
    }
);

// ----------------------------------------------------------------------------
// Hand / Head / Person
// ----------------------------------------------------------------------------

const PALM_LANDMARKS: [&str; 5] = [
    "wrist",
    "index_base",
    "middle_base",
    "ring_base",
    "pinky_base",
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    #[serde(default)]
    pub landmarks: Landmarks,
    #[serde(default)]
    pub gestures: BTreeSet<HandGesture>,
}

impl Hand {
    pub fn new(landmarks: Landmarks) -> Self {
        Self {
            landmarks,
            gestures: BTreeSet::new(),
        }
    }

    pub fn with_gestures(mut self, gestures: &[HandGesture]) -> Self {
        self.gestures.extend(gestures.iter().copied());
        self
    }

    pub fn get(&self, name: &str) -> Option<Point> {
        self.landmarks.get(name)
    }

    pub fn is(&self, gesture: HandGesture) -> bool {
        self.gestures.contains(&gesture)
    }

    pub fn all(&self, gestures: &[HandGesture]) -> bool {
        gestures.iter().all(|g| self.is(*g))
    }

    pub fn distance(&self, a: &str, b: &str) -> Option<f32> {
        Some(self.get(a)?.distance(&self.get(b)?))
    }

    /// Mean of the wrist and finger-base landmarks that are present.
    pub fn palm_center(&self) -> Option<Point> {
        let points: Vec<Point> = PALM_LANDMARKS
            .iter()
            .filter_map(|name| self.get(name))
            .collect();
        if points.is_empty() {
            return None;
        }
        let sum = points.iter().fold(Point::default(), |acc, p| acc + *p);
        Some(sum / points.len() as f32)
    }

    /// Apparent palm size; grows as the hand approaches the camera.
    pub fn pinky_wrist_distance(&self) -> Option<f32> {
        Some(self.get("pinky_base")?.distance_xy(&self.get("wrist")?))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub landmarks: Landmarks,
    #[serde(default)]
    pub gestures: BTreeSet<HeadGesture>,
}

impl Head {
    pub fn new(landmarks: Landmarks) -> Self {
        Self {
            landmarks,
            gestures: BTreeSet::new(),
        }
    }

    pub fn with_gestures(mut self, gestures: &[HeadGesture]) -> Self {
        self.gestures.extend(gestures.iter().copied());
        self
    }

    pub fn get(&self, name: &str) -> Option<Point> {
        self.landmarks.get(name)
    }

    pub fn is(&self, gesture: HeadGesture) -> bool {
        self.gestures.contains(&gesture)
    }

    pub fn distance_squared(&self, a: &str, b: &str) -> Option<f32> {
        Some(self.get(a)?.distance_squared(&self.get(b)?))
    }

    pub fn nose_tip_position(&self) -> Option<Point> {
        self.get("nose-tip")
    }
}

/// Everything the trackers saw this frame. Absent parts are `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub body: Option<Landmarks>,
    #[serde(default)]
    pub left_hand: Option<Hand>,
    #[serde(default)]
    pub right_hand: Option<Hand>,
    #[serde(default)]
    pub head: Option<Head>,
}

impl Person {
    pub fn hand(&self, side: Side) -> Option<&Hand> {
        match side {
            Side::Left => self.left_hand.as_ref(),
            Side::Right => self.right_hand.as_ref(),
        }
    }

    pub fn body_landmark(&self, name: &str) -> Option<Point> {
        self.body.as_ref()?.get(name)
    }

    pub fn with_body(mut self, body: Landmarks) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_hand(mut self, side: Side, hand: Hand) -> Self {
        match side {
            Side::Left => self.left_hand = Some(hand),
            Side::Right => self.right_hand = Some(hand),
        }
        self
    }

    pub fn with_head(mut self, head: Head) -> Self {
        self.head = Some(head);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively_and_rejects_garbage() {
        assert_eq!("LEFT".parse::<Side>().unwrap(), Side::Left);
        assert_eq!("right".parse::<Side>().unwrap(), Side::Right);
        let err = "up".parse::<Side>().unwrap_err().to_string();
        assert!(err.contains("`up`"), "{err}");
    }

    #[test]
    fn unknown_gesture_lists_known_names() {
        let err = "waving".parse::<HandGesture>().unwrap_err().to_string();
        assert!(err.contains("waving"));
        assert!(err.contains("index_pinched"));
        assert_eq!(
            "fish_face".parse::<HeadGesture>().unwrap(),
            HeadGesture::FishFace
        );
    }

    #[test]
    fn person_deserializes_from_tracker_json() {
        let json = r#"{
            "body": {"nose": [0.5, 0.4], "left_ear": [0.45, 0.4, 0.1]},
            "right_hand": {
                "landmarks": {"wrist": [0.6, 0.8], "pinky_base": [0.63, 0.76]},
                "gestures": ["index_pinched", "visible"]
            }
        }"#;
        let person: Person = serde_json::from_str(json).unwrap();
        assert_eq!(person.body_landmark("nose"), Some(Point::xy(0.5, 0.4)));
        let hand = person.hand(Side::Right).unwrap();
        assert!(hand.is(HandGesture::IndexPinched));
        assert!(!hand.is(HandGesture::MiddlePinched));
        assert!(person.hand(Side::Left).is_none());
        assert!(person.head.is_none());
    }

    #[test]
    fn bad_landmark_arity_is_rejected() {
        let json = r#"{"body": {"nose": [0.5]}}"#;
        assert!(serde_json::from_str::<Person>(json).is_err());
    }

    #[test]
    fn palm_center_averages_available_landmarks() {
        let hand = Hand::new(
            Landmarks::new()
                .with("wrist", Point::xy(0.0, 0.0))
                .with("middle_base", Point::xy(0.0, 1.0)),
        );
        assert_eq!(hand.palm_center(), Some(Point::xy(0.0, 0.5)));
        assert_eq!(Hand::default().palm_center(), None);
    }
}
