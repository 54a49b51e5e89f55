//! Depth-level buttons.
//!
//! The apparent palm size (pinky base to wrist) is quantised into levels; the
//! hand pushing "through" successive force fields triggers one button per
//! level. A level must fill the whole confirmation window before it counts.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::{HandTarget, Pose, PoseKind};
use crate::action::ButtonBinding;
use crate::debounce::{even_boundaries, quantize_level, LevelWindow};
use crate::frame::{Person, Side};
use crate::runtime::Runtime;
use crate::view::{Overlay, View};

fn default_depth_buffer_size() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct ForcefieldOptions {
    pub hand: Side,
    #[serde(default)]
    pub buttons: Vec<String>,
    #[serde(default = "default_depth_buffer_size")]
    pub depth_buffer_size: usize,
}

pub struct Forcefield {
    target: HandTarget,
    /// `buttons[i]` belongs to level `i + 1`; level 0 is "no field".
    buttons: Vec<ButtonBinding>,
    boundaries: Vec<f64>,
    window: LevelWindow<usize>,
    triggered_level: usize,
    engaged: Option<usize>,
    runtime: Runtime,
}

impl PoseKind for Forcefield {
    const KIND: &'static str = "forcefield";
    type Options = ForcefieldOptions;

    fn make(options: ForcefieldOptions, runtime: &Runtime) -> Result<Self> {
        if options.depth_buffer_size == 0 {
            bail!("depth_buffer_size must be greater than 0");
        }
        if options.buttons.is_empty() {
            bail!("forcefield needs at least one button");
        }
        let buttons = options
            .buttons
            .iter()
            .enumerate()
            .map(|(i, b)| b.parse().with_context(|| format!("button {}", i)))
            .collect::<Result<Vec<ButtonBinding>>>()?;
        let start = runtime.settings.get_f64("hands/forcefield/forcefields_start")?;
        let end = runtime.settings.get_f64("hands/forcefield/forcefields_end")?;
        if start >= end {
            bail!("forcefields_start ({}) must be below forcefields_end ({})", start, end);
        }
        Ok(Self {
            target: HandTarget::new(options.hand),
            boundaries: even_boundaries(start, end, buttons.len()),
            buttons,
            window: LevelWindow::new(options.depth_buffer_size)?,
            triggered_level: 0,
            engaged: None,
            runtime: runtime.clone(),
        })
    }
}

impl Forcefield {
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn triggered_level(&self) -> usize {
        self.triggered_level
    }

    fn release_engaged(&mut self) {
        if let Some(level) = self.engaged.take() {
            self.buttons[level - 1].release(&self.runtime);
        }
    }
}

impl Pose for Forcefield {
    fn check(&mut self, person: &Person) -> bool {
        let Some(depth) = self.target.hand(person).and_then(|h| h.pinky_wrist_distance()) else {
            // Lost hand: drop the held button and start confirming afresh.
            self.release_all();
            self.window.clear();
            return false;
        };
        let level = quantize_level(&self.boundaries, depth as f64);
        self.window.push(level)
    }

    fn act(&mut self, _person: &Person, view: &mut dyn View) {
        let Some(&level) = self.window.confirmed() else {
            return;
        };
        view.draw(Overlay::Level {
            level,
            of: self.buttons.len(),
        });
        if level == self.triggered_level {
            return;
        }
        self.release_engaged();
        if level > 0 {
            log::debug!("{}: level {} confirmed", Self::KIND, level);
            if self.buttons[level - 1].trigger(&self.runtime) {
                self.engaged = Some(level);
            }
        }
        self.triggered_level = level;
    }

    fn release_all(&mut self) {
        self.release_engaged();
        self.triggered_level = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};
    use crate::frame::{Hand, Landmarks, Point};
    use crate::view::NullView;

    fn at_depth(depth: f32) -> Person {
        Person::default().with_hand(
            Side::Right,
            Hand::new(
                Landmarks::new()
                    .with("wrist", Point::xy(0.5, 0.5))
                    .with("pinky_base", Point::xy(0.5, 0.5 - depth)),
            ),
        )
    }

    fn forcefield(rt: &Runtime, buttons: &[&str], window: usize) -> Forcefield {
        Forcefield::make(
            ForcefieldOptions {
                hand: Side::Right,
                buttons: buttons.iter().map(|b| b.to_string()).collect(),
                depth_buffer_size: window,
            },
            rt,
        )
        .unwrap()
    }

    #[test]
    fn boundaries_split_the_configured_range() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let pose = forcefield(&rt, &["a_press", "b_press", "c_press"], 3);
        let b = pose.boundaries();
        assert_eq!(b.len(), 3);
        assert!((b[0] - 0.1).abs() < 1e-9);
        assert!((b[2] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn hold_buttons_release_when_the_hand_backs_off() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = forcefield(&rt, &["shift_hold", "space_press"], 2);
        let mut view = NullView::default();
        // Boundaries sit at ~0.117 and ~0.183.
        for depth in [0.15, 0.15, 0.15, 0.02, 0.02] {
            let person = at_depth(depth);
            if pose.check(&person) {
                pose.act(&person, &mut view);
            }
        }
        assert_eq!(
            log.events(),
            vec![
                DeviceEvent::KeyHold { key: "shift".into() },
                DeviceEvent::KeyRelease { key: "shift".into() },
            ]
        );
        assert_eq!(pose.triggered_level(), 0);
    }

    #[test]
    fn absent_hand_is_a_gap_not_a_sample() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let mut pose = forcefield(&rt, &["a_press"], 2);
        assert!(!pose.check(&at_depth(0.2)));
        assert!(!pose.check(&Person::default()));
        assert!(pose.check(&at_depth(0.2)));
    }

    #[test]
    fn held_button_is_released_when_the_hand_is_lost() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut pose = forcefield(&rt, &["shift_hold", "space_press"], 2);
        let mut view = NullView::default();
        for _ in 0..2 {
            let person = at_depth(0.15);
            if pose.check(&person) {
                pose.act(&person, &mut view);
            }
        }
        assert_eq!(log.held_keys(), ["shift".to_string()].into());
        for _ in 0..20 {
            assert!(!pose.check(&Person::default()));
        }
        assert!(log.held_keys().is_empty());
        assert_eq!(log.count(|e| matches!(e, DeviceEvent::KeyRelease { .. })), 1);
        assert_eq!(pose.triggered_level(), 0);
    }

    #[test]
    fn zero_window_is_rejected() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let result = Forcefield::make(
            ForcefieldOptions {
                hand: Side::Right,
                buttons: vec!["a_press".into()],
                depth_buffer_size: 0,
            },
            &rt,
        );
        assert!(result.is_err());
    }
}
