//! Box tracking: a point (nose tip or a body landmark) leaving a small box
//! around its rest position drives arrow keys or the pointer.
//!
//! The box is recentred on the point the first time it is seen and whenever
//! the reset flag is raised; the new centre is written back to the settings.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{default_true, Pose, PoseKind};
use crate::action::{DirectionAction, DirectionSpec};
use crate::flags::{RESET_BP_BOX_FLAG, RESET_NOSE_BOX_FLAG};
use crate::frame::{Head, Person, Point};
use crate::holds::{Direction, HoldTable};
use crate::runtime::Runtime;
use crate::view::{Overlay, View};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    ArrowKeysHold,
    ArrowKeysPress,
    Mouse,
}

/// Where a tracker keeps its tuning in the settings tree.
struct SettingsKeys {
    section: &'static str,
    prefix: &'static str,
}

impl SettingsKeys {
    fn scaling(&self, axis: char) -> String {
        format!("{}/scaling_factor_{}", self.section, axis)
    }

    fn size(&self, axis: char) -> String {
        format!("{}/{}_percentage_size_{}", self.section, self.prefix, axis)
    }

    fn centre(&self, axis: char) -> String {
        format!("{}/{}_centre_{}_percentage", self.section, self.prefix, axis)
    }
}

const NOSE_KEYS: SettingsKeys = SettingsKeys {
    section: "nose_tracking",
    prefix: "nose_box",
};

const BP_KEYS: SettingsKeys = SettingsKeys {
    section: "bp_tracking",
    prefix: "bp_box",
};

fn arrow_keys() -> BTreeMap<Direction, DirectionSpec> {
    Direction::ALL
        .iter()
        .map(|d| (*d, DirectionSpec::Name(d.as_str().to_string())))
        .collect()
}

struct BoxTracker {
    keys: &'static SettingsKeys,
    reset_flag: &'static str,
    mode: TrackingMode,
    show_arrows: bool,
    scaling: (f32, f32),
    size: (f32, f32),
    centre: (f32, f32),
    found: bool,
    actions: BTreeMap<Direction, DirectionAction>,
    /// Engaged directions; the value says whether a device input is held.
    held: HoldTable<Direction, bool>,
    runtime: Runtime,
}

impl BoxTracker {
    fn new(
        keys: &'static SettingsKeys,
        reset_flag: &'static str,
        mode: TrackingMode,
        show_arrows: bool,
        gaming_keys: Option<BTreeMap<Direction, DirectionSpec>>,
        runtime: &Runtime,
    ) -> Result<Self> {
        let settings = &runtime.settings;
        let pair = |f: &dyn Fn(char) -> String| -> Result<(f32, f32)> {
            Ok((settings.get_f64(&f('x'))? as f32, settings.get_f64(&f('y'))? as f32))
        };
        let mut specs = arrow_keys();
        specs.extend(gaming_keys.unwrap_or_default());
        let actions = specs
            .iter()
            .map(|(d, spec)| {
                let action = DirectionAction::resolve(spec, runtime)
                    .with_context(|| format!("gaming key `{}`", d))?;
                Ok((*d, action))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            keys,
            reset_flag,
            mode,
            show_arrows,
            scaling: pair(&|a| keys.scaling(a))?,
            size: pair(&|a| keys.size(a))?,
            centre: pair(&|a| keys.centre(a))?,
            found: false,
            actions,
            held: HoldTable::new(),
            runtime: runtime.clone(),
        })
    }

    /// Move the box centre onto `position` and persist it.
    fn butterfly(&mut self, position: Point) {
        self.centre = (position.x, position.y);
        let settings = &self.runtime.settings;
        let stored = settings
            .set(&self.keys.centre('x'), position.x as f64)
            .and_then(|_| settings.set(&self.keys.centre('y'), position.y as f64));
        if let Err(err) = stored {
            log::warn!("could not store {} centre: {:#}", self.keys.section, err);
        }
        log::debug!("{} box recentred at ({:.3}, {:.3})", self.keys.section, position.x, position.y);
    }

    fn is_inside(&self, position: Point) -> bool {
        (position.x - self.centre.0).abs() <= self.size.0
            && (position.y - self.centre.1).abs() <= self.size.1
    }

    fn observe(&mut self, position: Option<Point>) -> bool {
        let Some(position) = position else {
            self.release_all();
            return false;
        };
        if self.runtime.flags.get(self.reset_flag) || !self.found {
            self.runtime.flags.set(self.reset_flag, false);
            self.butterfly(position);
            self.found = true;
        }
        if self.is_inside(position) {
            self.release_all();
            return false;
        }
        true
    }

    fn beyond(&self, direction: Direction, position: Point) -> bool {
        match direction {
            Direction::Right => position.x > self.centre.0 + self.size.0,
            Direction::Left => position.x < self.centre.0 - self.size.0,
            Direction::Up => position.y < self.centre.1 - self.size.1,
            Direction::Down => position.y > self.centre.1 + self.size.1,
        }
    }

    fn act(&mut self, position: Point, view: &mut dyn View) {
        view.draw(Overlay::Rect {
            x: (self.centre.0 - self.size.0) * view.width() as f32,
            y: (self.centre.1 - self.size.1) * view.height() as f32,
            width: 2.0 * self.size.0 * view.width() as f32,
            height: 2.0 * self.size.1 * view.height() as f32,
            active: true,
        });
        let hold = match self.mode {
            TrackingMode::Mouse => {
                let dx = (position.x - self.centre.0) * self.scaling.0;
                let dy = (position.y - self.centre.1) * self.scaling.1;
                self.runtime.devices.mouse().move_by(dx as f64, dy as f64);
                return;
            }
            TrackingMode::ArrowKeysHold => true,
            TrackingMode::ArrowKeysPress => false,
        };
        for direction in Direction::ALL {
            let beyond = self.beyond(direction, position);
            let engaged = self.held.is_held(&direction);
            if beyond && !engaged {
                let device_held = self
                    .actions
                    .get(&direction)
                    .map(|a| a.trigger(&self.runtime, hold))
                    .unwrap_or(false);
                self.held.engage(direction, device_held);
            } else if !beyond && engaged {
                self.disengage(direction);
            }
            if self.show_arrows && beyond {
                view.draw(Overlay::Arrow { direction, held: hold });
            }
        }
    }

    fn disengage(&mut self, direction: Direction) {
        if let Some(true) = self.held.disengage(&direction) {
            if let Some(action) = self.actions.get(&direction) {
                action.release(&self.runtime);
            }
        }
    }

    fn release_all(&mut self) {
        for (direction, device_held) in self.held.drain() {
            if device_held {
                if let Some(action) = self.actions.get(&direction) {
                    action.release(&self.runtime);
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// nose_tracking
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NoseTrackingOptions {
    #[serde(default)]
    pub nose_tracking_mode: TrackingMode,
    #[serde(default = "default_true")]
    pub show_arrows: bool,
    #[serde(default)]
    pub gaming_keys: Option<BTreeMap<Direction, DirectionSpec>>,
}

pub struct NoseTracking {
    tracker: BoxTracker,
}

impl PoseKind for NoseTracking {
    const KIND: &'static str = "nose_tracking";
    type Options = NoseTrackingOptions;

    fn make(options: NoseTrackingOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            tracker: BoxTracker::new(
                &NOSE_KEYS,
                RESET_NOSE_BOX_FLAG,
                options.nose_tracking_mode,
                options.show_arrows,
                options.gaming_keys,
                runtime,
            )?,
        })
    }
}

fn nose(person: &Person) -> Option<Point> {
    person.head.as_ref().and_then(Head::nose_tip_position)
}

impl Pose for NoseTracking {
    fn check(&mut self, person: &Person) -> bool {
        self.tracker.observe(nose(person))
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        if let Some(position) = nose(person) {
            self.tracker.act(position, view);
        }
    }

    fn release_all(&mut self) {
        self.tracker.release_all();
    }
}

// ----------------------------------------------------------------------------
// body_point_tracking
// ----------------------------------------------------------------------------

fn default_bp_landmark() -> String {
    "right_elbow".to_string()
}

#[derive(Debug, Deserialize)]
pub struct BodyPointTrackingOptions {
    #[serde(default)]
    pub bp_tracking_mode: TrackingMode,
    #[serde(default = "default_true")]
    pub show_arrows: bool,
    #[serde(default)]
    pub gaming_keys: Option<BTreeMap<Direction, DirectionSpec>>,
    #[serde(default = "default_bp_landmark")]
    pub landmark: String,
}

/// Box tracking on a body landmark. Body landmarks arrive in camera pixels
/// and are normalised by the camera size.
pub struct BodyPointTracking {
    landmark: String,
    camera: (f32, f32),
    tracker: BoxTracker,
}

impl PoseKind for BodyPointTracking {
    const KIND: &'static str = "body_point_tracking";
    type Options = BodyPointTrackingOptions;

    fn make(options: BodyPointTrackingOptions, runtime: &Runtime) -> Result<Self> {
        let width = runtime.settings.get_f64("camera/width")? as f32;
        let height = runtime.settings.get_f64("camera/height")? as f32;
        if width <= 0.0 || height <= 0.0 {
            anyhow::bail!("camera size must be positive, got {}x{}", width, height);
        }
        Ok(Self {
            landmark: options.landmark,
            camera: (width, height),
            tracker: BoxTracker::new(
                &BP_KEYS,
                RESET_BP_BOX_FLAG,
                options.bp_tracking_mode,
                options.show_arrows,
                options.gaming_keys,
                runtime,
            )?,
        })
    }
}

impl BodyPointTracking {
    fn position(&self, person: &Person) -> Option<Point> {
        let p = person.body_landmark(&self.landmark)?;
        Some(Point::xy(p.x / self.camera.0, p.y / self.camera.1))
    }
}

impl Pose for BodyPointTracking {
    fn check(&mut self, person: &Person) -> bool {
        let position = self.position(person);
        self.tracker.observe(position)
    }

    fn act(&mut self, person: &Person, view: &mut dyn View) {
        if let Some(position) = self.position(person) {
            self.tracker.act(position, view);
        }
    }

    fn release_all(&mut self) {
        self.tracker.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};
    use crate::frame::Landmarks;
    use crate::view::NullView;

    fn nose_at(x: f32, y: f32) -> Person {
        Person::default().with_head(Head::new(Landmarks::new().with("nose-tip", Point::xy(x, y))))
    }

    fn step(pose: &mut impl Pose, person: &Person) -> bool {
        let fired = pose.check(person);
        if fired {
            pose.act(person, &mut NullView::default());
        }
        fired
    }

    fn tracker(rt: &Runtime, json: serde_json::Value) -> NoseTracking {
        NoseTracking::make(serde_json::from_value(json).unwrap(), rt).unwrap()
    }

    #[test]
    fn first_sighting_recentres_the_box() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = tracker(&rt, serde_json::json!({}));
        assert!(!step(&mut pose, &nose_at(0.3, 0.6)));
        assert!(log.is_empty());
        let stored = rt.settings.get_f64("nose_tracking/nose_box_centre_x_percentage").unwrap();
        assert!((stored - 0.3).abs() < 1e-6);
    }

    #[test]
    fn hold_mode_pairs_holds_and_releases() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = tracker(&rt, serde_json::json!({}));
        step(&mut pose, &nose_at(0.5, 0.5));
        assert!(step(&mut pose, &nose_at(0.6, 0.4)));
        assert_eq!(log.held_keys(), ["right".to_string(), "up".to_string()].into());
        assert!(step(&mut pose, &nose_at(0.6, 0.5)));
        assert_eq!(log.held_keys(), ["right".to_string()].into());
        assert!(!step(&mut pose, &nose_at(0.5, 0.5)));
        assert!(log.held_keys().is_empty());
    }

    #[test]
    fn press_mode_taps_once_and_never_releases() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = tracker(
            &rt,
            serde_json::json!({
                "nose_tracking_mode": "arrow_keys_press",
                "gaming_keys": { "left": "a", "right": "left click" }
            }),
        );
        step(&mut pose, &nose_at(0.5, 0.5));
        step(&mut pose, &nose_at(0.4, 0.5));
        step(&mut pose, &nose_at(0.4, 0.5));
        step(&mut pose, &nose_at(0.5, 0.5));
        step(&mut pose, &nose_at(0.6, 0.5));
        assert_eq!(
            log.events(),
            vec![
                DeviceEvent::KeyPress { key: "a".into() },
                DeviceEvent::MouseClick { button: crate::device::MouseButton::Left },
            ]
        );
    }

    #[test]
    fn reset_flag_recentres_once() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let mut pose = tracker(&rt, serde_json::json!({ "nose_tracking_mode": "mouse" }));
        step(&mut pose, &nose_at(0.5, 0.5));
        rt.flags.set(RESET_NOSE_BOX_FLAG, true);
        assert!(!step(&mut pose, &nose_at(0.8, 0.8)));
        assert!(!rt.flags.get(RESET_NOSE_BOX_FLAG));
        assert!(!step(&mut pose, &nose_at(0.8, 0.8)));
    }

    #[test]
    fn body_point_uses_camera_pixels() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let options: BodyPointTrackingOptions =
            serde_json::from_value(serde_json::json!({ "bp_tracking_mode": "mouse" })).unwrap();
        let mut pose = BodyPointTracking::make(options, &rt).unwrap();
        let elbow = |x: f32, y: f32| {
            Person::default().with_body(Landmarks::new().with("right_elbow", Point::xy(x, y)))
        };
        step(&mut pose, &elbow(320.0, 240.0));
        assert!(step(&mut pose, &elbow(448.0, 240.0)));
        // (0.7 - 0.5) * 20 = 4 pixels to the right.
        assert!(matches!(log.events()[0], DeviceEvent::MouseMoveBy { dx, dy } if (dx - 4.0).abs() < 1e-3 && dy == 0.0));
    }
}
