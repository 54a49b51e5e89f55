//! Pose catalogue.
//!
//! A pose is evaluated once per frame by the mode loop:
//!
//! 1. `check(person)` advances the pose's debounce state and answers whether
//!    it should fire this frame. Missing landmarks make it return `false`
//!    (and release whatever the pose holds); they are never errors.
//! 2. `act(person, view)` runs only after `check` returned `true` and issues
//!    device effects.
//!
//! Poses are built only through `PoseKind::make`, from the options
//! deserialised out of a mode file. Configuration mistakes are reported
//! there, before the first frame.

mod body;
mod dial;
mod drive;
mod face;
mod forcefield;
mod hand;
mod head;
mod joystick;
mod tracking;
mod two_hands;

pub use body::{BodyHeadTurn, BodyMouse, BodyPoint, RaiseHandTranscribe};
pub use dial::{HitTrigger, TriggerDial};
pub use drive::{HandDrive, PinchDrive};
pub use face::{Expression, FishFace, OpenMouth, RaiseEyebrows, Smile};
pub use forcefield::Forcefield;
pub use hand::{
    BrickBall, GunMove, HandDoublePinch, HandLeftClick, HandMouse, HandPinch, JoystickPress,
    SamuraiSwipe, SoundPose,
};
pub use head::{HeadDrive, HeadSuika, HeadTilt, HeadTrigger, HeadTurn, MrSwipe, NoseScroll};
pub use joystick::{JoystickWrist, VirtualJoystick};
pub use tracking::{BodyPointTracking, NoseTracking, TrackingMode};
pub use two_hands::{Rotation, Zoom};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::PoseSpec;
use crate::debounce::EdgeLatch;
use crate::frame::{Hand, Person, Side};
use crate::runtime::Runtime;
use crate::view::View;

pub trait Pose: Send {
    fn check(&mut self, person: &Person) -> bool;

    fn act(&mut self, person: &Person, view: &mut dyn View);

    /// Release every input this pose holds. Called on teardown.
    fn release_all(&mut self) {}
}

/// A pose type that can be built from mode-file options.
pub trait PoseKind: Pose + Sized + 'static {
    /// Value of `kind` in the mode file.
    const KIND: &'static str;

    type Options: DeserializeOwned;

    fn make(options: Self::Options, runtime: &Runtime) -> Result<Self>;
}

// ----------------------------------------------------------------------------
// Factory
// ----------------------------------------------------------------------------

type Builder = fn(&Map<String, Value>, &Runtime) -> Result<Box<dyn Pose>>;

fn build<P: PoseKind>(options: &Map<String, Value>, runtime: &Runtime) -> Result<Box<dyn Pose>> {
    let options: P::Options = serde_json::from_value(Value::Object(options.clone()))
        .with_context(|| format!("invalid options for `{}`", P::KIND))?;
    Ok(Box::new(P::make(options, runtime)?))
}

/// Maps `kind` strings to pose constructors.
pub struct PoseFactory {
    builders: BTreeMap<&'static str, Builder>,
}

impl PoseFactory {
    pub fn new() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Every pose kind shipped with the crate.
    pub fn standard() -> Self {
        let mut factory = Self::new();
        factory.register::<HandPinch>();
        factory.register::<HandDoublePinch>();
        factory.register::<HandLeftClick>();
        factory.register::<HandMouse>();
        factory.register::<GunMove>();
        factory.register::<BrickBall>();
        factory.register::<SamuraiSwipe>();
        factory.register::<SoundPose>();
        factory.register::<JoystickPress>();
        factory.register::<JoystickWrist>();
        factory.register::<VirtualJoystick>();
        factory.register::<Forcefield>();
        factory.register::<Zoom>();
        factory.register::<Rotation>();
        factory.register::<PinchDrive>();
        factory.register::<HandDrive>();
        factory.register::<MrSwipe>();
        factory.register::<HeadTilt>();
        factory.register::<HeadTurn>();
        factory.register::<HeadTrigger>();
        factory.register::<HeadDrive>();
        factory.register::<HeadSuika>();
        factory.register::<NoseScroll>();
        factory.register::<NoseTracking>();
        factory.register::<BodyPointTracking>();
        factory.register::<Expression<Smile>>();
        factory.register::<Expression<OpenMouth>>();
        factory.register::<Expression<RaiseEyebrows>>();
        factory.register::<Expression<FishFace>>();
        factory.register::<BodyHeadTurn>();
        factory.register::<BodyMouse>();
        factory.register::<BodyPoint>();
        factory.register::<RaiseHandTranscribe>();
        factory.register::<HitTrigger>();
        factory.register::<TriggerDial>();
        factory
    }

    pub fn register<P: PoseKind>(&mut self) {
        self.builders.insert(P::KIND, build::<P>);
    }

    pub fn build(&self, spec: &PoseSpec, runtime: &Runtime) -> Result<Box<dyn Pose>> {
        let builder = self.builders.get(spec.kind.as_str()).ok_or_else(|| {
            anyhow!(
                "unknown pose kind `{}` (known: {})",
                spec.kind,
                self.kinds().join(", ")
            )
        })?;
        builder(&spec.options, runtime)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.builders.keys().copied().collect()
    }
}

impl Default for PoseFactory {
    fn default() -> Self {
        Self::standard()
    }
}

// ----------------------------------------------------------------------------
// Shared components
// ----------------------------------------------------------------------------

/// Selects one hand of the person.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandTarget {
    pub side: Side,
}

impl HandTarget {
    pub fn new(side: Side) -> Self {
        Self { side }
    }

    pub fn hand<'a>(&self, person: &'a Person) -> Option<&'a Hand> {
        person.hand(self.side)
    }
}

/// Pinch firing policy.
///
/// With `key_hold` the pose fires every frame the pinch lasts; otherwise it
/// fires once per pinch and re-arms when the fingers open.
#[derive(Clone, Debug)]
pub struct PinchPolicy {
    key_hold: bool,
    latch: EdgeLatch,
}

impl PinchPolicy {
    pub fn new(key_hold: bool) -> Self {
        Self {
            key_hold,
            latch: EdgeLatch::new(),
        }
    }

    pub fn observe(&mut self, pinched: bool) -> bool {
        if self.key_hold {
            return pinched;
        }
        self.latch.rising(pinched)
    }

    pub fn is_level(&self) -> bool {
        self.key_hold
    }
}

fn default_true() -> bool {
    true
}
