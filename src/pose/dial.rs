//! Dwell targets and the trigger dial menu.
//!
//! A dial is a ring of dwell targets around an anchor landmark (by default
//! the right shoulder). Every dial registers its flag in the runtime's dial
//! group; while none of those flags is set the base `joystick` flag is held
//! on, and while a dial is open and tracking it is held off.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{Pose, PoseKind};
use crate::action::{ActionDescriptor, Dispatcher};
use crate::debounce::DwellTimer;
use crate::flags::{validate_flag_name, JOYSTICK_FLAG};
use crate::frame::{Person, Point};
use crate::runtime::Runtime;
use crate::view::{Overlay, View};

// ----------------------------------------------------------------------------
// hit_trigger
// ----------------------------------------------------------------------------

fn default_left_wrist() -> String {
    "left_wrist".to_string()
}

fn default_radius() -> f32 {
    40.0
}

#[derive(Debug, Deserialize)]
pub struct HitTriggerOptions {
    /// Centre in camera pixels.
    pub pos: [f32; 2],
    #[serde(default = "default_left_wrist")]
    pub landmark: String,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default)]
    pub dwell: f64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
}

/// Circle that fires its action once the landmark has dwelt inside it.
pub struct HitTrigger {
    centre: Point,
    landmark: String,
    radius: f32,
    text: Option<String>,
    timer: DwellTimer,
    dispatcher: Dispatcher,
    runtime: Runtime,
}

impl PoseKind for HitTrigger {
    const KIND: &'static str = "hit_trigger";
    type Options = HitTriggerOptions;

    fn make(options: HitTriggerOptions, runtime: &Runtime) -> Result<Self> {
        if !options.radius.is_finite() || options.radius <= 0.0 {
            bail!("radius must be positive, got {}", options.radius);
        }
        Ok(Self {
            centre: Point::xy(options.pos[0], options.pos[1]),
            landmark: options.landmark,
            radius: options.radius,
            text: options.text,
            timer: DwellTimer::from_secs(options.dwell)?,
            dispatcher: Dispatcher::resolve(options.action.as_ref(), runtime)?,
            runtime: runtime.clone(),
        })
    }
}

impl Pose for HitTrigger {
    fn check(&mut self, person: &Person) -> bool {
        let inside = person
            .body_landmark(&self.landmark)
            .is_some_and(|p| p.distance_xy(&self.centre) <= self.radius);
        if !inside {
            self.dispatcher.settle(&self.runtime);
        }
        self.timer.observe(inside, self.runtime.now())
    }

    fn act(&mut self, _person: &Person, view: &mut dyn View) {
        self.dispatcher.fire(&self.runtime);
        view.draw(Overlay::Target {
            x: self.centre.x,
            y: self.centre.y,
            radius: self.radius,
            progress: self.timer.progress(self.runtime.now()),
        });
        if let Some(text) = &self.text {
            view.draw(Overlay::Text { text: text.clone() });
        }
    }

    fn release_all(&mut self) {
        self.dispatcher.settle(&self.runtime);
    }
}

// ----------------------------------------------------------------------------
// trigger_dial
// ----------------------------------------------------------------------------

const DIAL_TARGET_RADIUS: f32 = 30.0;

#[derive(Debug, Deserialize)]
pub struct DialElementSpec {
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
    /// Image shown by renderers; not interpreted here.
    #[serde(default)]
    pub skin: Option<String>,
}

fn default_element_offset() -> f64 {
    0.5
}

fn default_dial_dwell() -> f64 {
    1.0
}

fn default_right_wrist() -> String {
    "right_wrist".to_string()
}

fn default_right_shoulder() -> String {
    "right_shoulder".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TriggerDialOptions {
    pub dial_name: String,
    pub elements: BTreeMap<String, DialElementSpec>,
    /// `0` lays the elements over the upper half-circle, `1` over the full
    /// circle.
    #[serde(default)]
    pub base_offset: f64,
    /// Share of each element's sector that counts as a hit.
    #[serde(default = "default_element_offset")]
    pub element_offset: f64,
    #[serde(default = "default_dial_dwell")]
    pub dwell: f64,
    #[serde(default = "default_right_wrist")]
    pub landmark: String,
    #[serde(default = "default_right_shoulder")]
    pub anchor: String,
    #[serde(default)]
    pub text: Option<String>,
}

struct DialElement {
    name: String,
    timer: DwellTimer,
    dispatcher: Dispatcher,
}

/// Angular layout of the dial, in degrees measured clockwise from the
/// anchor's left.
#[derive(Clone, Copy, Debug, PartialEq)]
struct DialLayout {
    start: f64,
    span: f64,
    count: usize,
    hit_share: f64,
}

impl DialLayout {
    fn new(count: usize, base_offset: f64, hit_share: f64) -> Self {
        let span = 180.0 * (1.0 + base_offset);
        Self {
            start: -(span - 180.0) / 2.0,
            span,
            count,
            hit_share,
        }
    }

    fn step(&self) -> f64 {
        self.span / self.count as f64
    }

    /// Dial angle of `landmark` seen from `anchor` (image y grows down).
    fn angle(anchor: Point, landmark: Point) -> f64 {
        let dx = (landmark.x - anchor.x) as f64;
        let dy = (anchor.y - landmark.y) as f64;
        180.0 - dy.atan2(dx).to_degrees()
    }

    /// Element under `angle`, if it falls in the hit share of a sector.
    fn select(&self, angle: f64) -> Option<usize> {
        let rel = (angle - self.start).rem_euclid(360.0);
        if rel >= self.span {
            return None;
        }
        let position = rel / self.step();
        let index = (position.floor() as usize).min(self.count - 1);
        let offset = position - index as f64 - 0.5;
        (offset.abs() <= self.hit_share / 2.0).then_some(index)
    }

    /// Centre angle of element `index`.
    fn centre(&self, index: usize) -> f64 {
        self.start + (index as f64 + 0.5) * self.step()
    }
}

/// Menu of dwell targets around the anchor, shown while its flag is set.
pub struct TriggerDial {
    name: String,
    landmark: String,
    anchor: String,
    text: Option<String>,
    layout: DialLayout,
    elements: Vec<DialElement>,
    selected: Option<usize>,
    fired: Vec<usize>,
    geometry: Option<(Point, f32)>,
    runtime: Runtime,
}

impl PoseKind for TriggerDial {
    const KIND: &'static str = "trigger_dial";
    type Options = TriggerDialOptions;

    fn make(options: TriggerDialOptions, runtime: &Runtime) -> Result<Self> {
        validate_flag_name(&options.dial_name).context("dial_name")?;
        if options.elements.is_empty() {
            bail!("dial `{}` needs at least one element", options.dial_name);
        }
        if !(0.0..=1.0).contains(&options.base_offset) {
            bail!("base_offset must be in [0, 1], got {}", options.base_offset);
        }
        if options.element_offset <= 0.0 || options.element_offset > 1.0 {
            bail!("element_offset must be in (0, 1], got {}", options.element_offset);
        }
        let elements = options
            .elements
            .iter()
            .map(|(name, spec)| {
                Ok(DialElement {
                    name: name.clone(),
                    timer: DwellTimer::from_secs(options.dwell)?,
                    dispatcher: Dispatcher::resolve(spec.action.as_ref(), runtime)
                        .with_context(|| format!("dial element `{}`", name))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        runtime.dials.register(&options.dial_name);
        Ok(Self {
            layout: DialLayout::new(elements.len(), options.base_offset, options.element_offset),
            name: options.dial_name,
            landmark: options.landmark,
            anchor: options.anchor,
            text: options.text,
            elements,
            selected: None,
            fired: Vec::new(),
            geometry: None,
            runtime: runtime.clone(),
        })
    }
}

impl TriggerDial {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element currently under the landmark.
    pub fn selected(&self) -> Option<&str> {
        self.selected.map(|i| self.elements[i].name.as_str())
    }

    fn idle(&mut self) {
        self.selected = None;
        self.geometry = None;
        for element in &mut self.elements {
            element.timer.reset();
            element.dispatcher.settle(&self.runtime);
        }
    }
}

impl Pose for TriggerDial {
    fn check(&mut self, person: &Person) -> bool {
        self.fired.clear();
        let flags = &self.runtime.flags;
        if !self.runtime.dials.any_set(flags) {
            flags.set(JOYSTICK_FLAG, true);
            self.idle();
            return false;
        }
        if !flags.get(&self.name) {
            self.idle();
            return false;
        }
        let (Some(landmark), Some(anchor)) = (
            person.body_landmark(&self.landmark),
            person.body_landmark(&self.anchor),
        ) else {
            self.idle();
            return false;
        };
        flags.set(JOYSTICK_FLAG, false);

        self.selected = self.layout.select(DialLayout::angle(anchor, landmark));
        self.geometry = Some((anchor, landmark.distance_xy(&anchor)));
        let now = self.runtime.now();
        for (i, element) in self.elements.iter_mut().enumerate() {
            let hit = self.selected == Some(i);
            if !hit {
                element.dispatcher.settle(&self.runtime);
            }
            if element.timer.observe(hit, now) {
                self.fired.push(i);
            }
        }
        true
    }

    fn act(&mut self, _person: &Person, view: &mut dyn View) {
        for &i in &self.fired {
            let element = &mut self.elements[i];
            log::info!("dial {}: {} selected", self.name, element.name);
            element.dispatcher.fire(&self.runtime);
        }
        let Some((anchor, reach)) = self.geometry else {
            return;
        };
        let now = self.runtime.now();
        for (i, element) in self.elements.iter().enumerate() {
            // Back from dial angle to image coordinates.
            let theta = (180.0 - self.layout.centre(i)).to_radians();
            view.draw(Overlay::Target {
                x: anchor.x + reach * theta.cos() as f32,
                y: anchor.y - reach * theta.sin() as f32,
                radius: DIAL_TARGET_RADIUS,
                progress: element.timer.progress(now),
            });
        }
        if let Some(text) = &self.text {
            view.draw(Overlay::Text { text: text.clone() });
        }
    }

    fn release_all(&mut self) {
        self.idle();
    }
}
