//! Gesture Kernel
//!
//! Turns per-frame landmark observations of one person into keyboard, mouse
//! and gamepad input.
//!
//! # Architecture
//!
//! Every frame, the active `Mode` runs each configured pose in order:
//!
//! 1. **Check**: the pose folds the frame into its debounce state (level
//!    windows, majority votes, dwell timers, edge latches) and decides
//!    whether to fire.
//! 2. **Act**: a firing pose issues device effects through its dispatcher,
//!    pairing every hold with exactly one release.
//!
//! # Module Structure
//!
//! - `frame`: landmarks, hands, head and body of the observed person
//! - `debounce`: hysteresis primitives shared by the poses
//! - `signal`: continuous measurements (tilts, distances, angles)
//! - `action`: mode-file action descriptors and hold/release dispatch
//! - `pose`: the pose catalogue and factory
//! - `mode`: mode loading, the per-frame loop and teardown
//! - `device`, `view`: output sinks and overlay surface
//! - `config`, `flags`, `runtime`, `clock`: shared collaborators

pub mod action;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod device;
pub mod flags;
pub mod frame;
pub mod holds;
pub mod mode;
pub mod pose;
pub mod runtime;
pub mod signal;
pub mod view;

pub use action::{Action, ActionDescriptor, Binding, Dispatcher};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{KernelSettings, ModeFile, PoseSpec, Settings};
pub use device::{DeviceEvent, DeviceLog, Devices, DisplaySize, MouseButton};
pub use flags::{FlagGroup, Flags, JOYSTICK_FLAG};
pub use frame::{Hand, HandGesture, Head, HeadGesture, Landmarks, Person, Point, Side};
pub use mode::Mode;
pub use pose::{Pose, PoseFactory, PoseKind};
pub use runtime::{ActionRegistry, Runtime};
pub use view::{NullView, Overlay, RecordingView, View};
