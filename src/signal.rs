//! Scalar features derived from landmarks.
//!
//! Every extractor returns `Option`: `None` means a landmark it needs is
//! absent this frame, which callers treat as a gap.

use crate::frame::{Hand, Head, Point};

pub const MAX_JOYSTICK_RANGE: i32 = 32767;
pub const MAX_TRIGGER_RANGE: i32 = 255;

/// tan(5°): palm tilt below this on both axes is treated as noise.
pub const STICK_DEAD_THRESHOLD: f32 = 0.0875;
/// tan(8.5°): trigger tilt below this is treated as noise.
pub const TRIGGER_DEAD_THRESHOLD: f32 = 0.15;

// ----------------------------------------------------------------------------
// Hands
// ----------------------------------------------------------------------------

/// Palm tilt as `(front_back, left_right)` ratios of the wrist to
/// middle-finger-base vector.
pub fn palm_tilts(hand: &Hand) -> Option<(f32, f32)> {
    let base = hand.get("middle_base")?;
    let wrist = hand.get("wrist")?;
    let dy = base.y - wrist.y;
    if dy == 0.0 {
        return None;
    }
    Some(((base.z - wrist.z) / dy, (base.x - wrist.x) / dy))
}

/// Index-tip separation of two hands, normalised by their summed palm
/// heights so it does not depend on distance to the camera.
pub fn normalized_hands_distance(a: &Hand, b: &Hand) -> Option<f32> {
    let tips = a.get("index_tip")?.distance(&b.get("index_tip")?);
    let palms = a.distance("middle_base", "wrist")? + b.distance("middle_base", "wrist")?;
    if palms <= 0.0 {
        return None;
    }
    Some(tips * 2.0 / palms)
}

// ----------------------------------------------------------------------------
// Head
// ----------------------------------------------------------------------------

/// Roll of the head in radians; 0 when upright.
pub fn head_tilt_angle(head: &Head) -> Option<f64> {
    let v = head.get("temple-centre")? - head.get("chin-centre")?;
    Some((v.y as f64).atan2(v.x as f64) + std::f64::consts::FRAC_PI_2)
}

/// Yaw proxy: squared nose-to-left-cheek distance minus squared
/// nose-to-right-cheek distance.
pub fn head_turn_ratio(head: &Head) -> Option<f64> {
    let left = head.distance_squared("nose-tip", "left-cheek")?;
    let right = head.distance_squared("nose-tip", "right-cheek")?;
    Some((left - right) as f64)
}

// ----------------------------------------------------------------------------
// Steering
// ----------------------------------------------------------------------------

/// Wheel angle in degrees `[0, 360)` of the line between two grip points.
/// Level hands give 270.
pub fn steering_angle(left: Point, right: Point) -> f64 {
    let v = left - right;
    ((v.y as f64).atan2(v.x as f64).to_degrees() + 90.0).rem_euclid(360.0)
}

/// Steering input in `[-1, 1]`; full lock at ±60°.
pub fn steering_slope(angle: f64) -> f64 {
    ((angle - 270.0) / 60.0).clamp(-1.0, 1.0)
}

// ----------------------------------------------------------------------------
// Virtual joystick
// ----------------------------------------------------------------------------

/// Sector of an offset from the joystick centre (y grows downward):
///
/// ```text
/// 0 1 2
/// 7   3
/// 6 5 4
/// ```
pub fn joystick_sector(dx: f32, dy: f32) -> usize {
    let angle = (dy as f64).atan2(dx as f64).to_degrees();
    let shifted = (angle + 180.0 - 22.5).rem_euclid(360.0);
    (shifted / 45.0) as usize % 8
}

// ----------------------------------------------------------------------------
// Analog scaling
// ----------------------------------------------------------------------------

/// Linear map of `ratio` onto `[-max, max]` using a separate full-scale ratio
/// for each sign, rounded to the nearest integer.
pub fn scale_asymmetric(ratio: f32, positive_full: f32, negative_full: f32, max: i32) -> i32 {
    let full = if ratio > 0.0 { positive_full } else { negative_full };
    let scaled = ratio as f64 / full as f64 * max as f64;
    scaled.clamp(-(max as f64), max as f64).round() as i32
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StickRatios {
    pub left: f32,
    pub right: f32,
    pub forward: f32,
    pub backward: f32,
}

impl Default for StickRatios {
    fn default() -> Self {
        Self {
            left: 0.7,
            right: 0.57,
            forward: 0.65,
            backward: 0.35,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerRatios {
    pub outwards: f32,
    pub inwards: f32,
}

impl Default for TriggerRatios {
    fn default() -> Self {
        Self {
            outwards: 0.3,
            inwards: 0.6,
        }
    }
}

/// Stick deflection `(x, y)` for the given palm tilts. The x axis is
/// mirrored so tilting the palm left pushes the stick left.
pub fn stick_from_tilt(front_back: f32, left_right: f32, ratios: &StickRatios) -> (i32, i32) {
    let y = scale_asymmetric(front_back, ratios.forward, ratios.backward, MAX_JOYSTICK_RANGE);
    let x = scale_asymmetric(left_right, ratios.left, ratios.right, MAX_JOYSTICK_RANGE);
    (-x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Landmarks;

    #[test]
    fn sectors_follow_the_compass() {
        assert_eq!(joystick_sector(-1.0, -1.0), 0);
        assert_eq!(joystick_sector(0.0, -1.0), 1);
        assert_eq!(joystick_sector(1.0, -1.0), 2);
        assert_eq!(joystick_sector(1.0, 0.0), 3);
        assert_eq!(joystick_sector(1.0, 1.0), 4);
        assert_eq!(joystick_sector(0.0, 1.0), 5);
        assert_eq!(joystick_sector(-1.0, 1.0), 6);
        assert_eq!(joystick_sector(-1.0, 0.0), 7);
    }

    #[test]
    fn asymmetric_scaling_clamps() {
        assert_eq!(scale_asymmetric(0.65, 0.65, 0.35, 32767), 32767);
        assert_eq!(scale_asymmetric(2.0, 0.65, 0.35, 32767), 32767);
        assert_eq!(scale_asymmetric(-0.07, 0.65, 0.35, 32767), -6553);
        assert_eq!(scale_asymmetric(-1.0, 0.3, 0.6, 255), -255);
    }

    #[test]
    fn level_grip_steers_straight() {
        let angle = steering_angle(Point::xy(0.2, 0.5), Point::xy(0.8, 0.5));
        assert!((angle - 270.0).abs() < 1e-6);
        assert_eq!(steering_slope(angle), 0.0);
        assert_eq!(steering_slope(400.0), 1.0);
        assert_eq!(steering_slope(100.0), -1.0);
    }

    #[test]
    fn upright_head_has_zero_tilt() {
        let head = Head::new(
            Landmarks::new()
                .with("temple-centre", Point::xy(0.5, 0.2))
                .with("chin-centre", Point::xy(0.5, 0.6)),
        );
        assert!(head_tilt_angle(&head).unwrap().abs() < 1e-6);
        assert_eq!(head_turn_ratio(&head), None);
    }

    #[test]
    fn palm_tilt_needs_both_landmarks() {
        let hand = Hand::new(
            Landmarks::new()
                .with("wrist", Point::new(0.5, 0.8, 0.0))
                .with("middle_base", Point::new(0.45, 0.6, 0.02)),
        );
        let (fb, lr) = palm_tilts(&hand).unwrap();
        assert!((fb + 0.1).abs() < 1e-5);
        assert!((lr - 0.25).abs() < 1e-5);
        assert_eq!(palm_tilts(&Hand::default()), None);
    }
}
