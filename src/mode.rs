//! A loaded mode: the ordered pose list run once per frame.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::ModeFile;
use crate::frame::Person;
use crate::pose::{Pose, PoseFactory};
use crate::runtime::Runtime;
use crate::view::View;

struct Slot {
    kind: String,
    pose: Box<dyn Pose>,
}

/// Poses run in file order. Dropping a mode releases everything its poses
/// still hold.
pub struct Mode {
    name: String,
    slots: Vec<Slot>,
    torn_down: bool,
}

impl Mode {
    pub fn load(path: &Path, runtime: &Runtime) -> Result<Self> {
        let file = ModeFile::read(path)?;
        Self::from_file(&file, runtime).with_context(|| format!("loading {}", path.display()))
    }

    pub fn from_file(file: &ModeFile, runtime: &Runtime) -> Result<Self> {
        Self::with_factory(file, runtime, &PoseFactory::standard())
    }

    /// Build every pose up front; the first invalid one aborts the load.
    pub fn with_factory(file: &ModeFile, runtime: &Runtime, factory: &PoseFactory) -> Result<Self> {
        let slots = file
            .poses
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let pose = factory
                    .build(spec, runtime)
                    .with_context(|| format!("mode `{}`: pose #{} (`{}`)", file.name, i + 1, spec.kind))?;
                Ok(Slot {
                    kind: spec.kind.clone(),
                    pose,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!("mode `{}` loaded with {} poses", file.name, slots.len());
        Ok(Self {
            name: file.name.clone(),
            slots,
            torn_down: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.kind.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run one frame. Returns how many poses acted.
    pub fn tick(&mut self, person: &Person, view: &mut dyn View) -> usize {
        let mut fired = 0;
        for slot in &mut self.slots {
            if slot.pose.check(person) {
                log::trace!("{} fired", slot.kind);
                slot.pose.act(person, view);
                fired += 1;
            }
        }
        fired
    }

    pub fn teardown(&mut self) {
        if std::mem::replace(&mut self.torn_down, true) {
            return;
        }
        for slot in &mut self.slots {
            slot.pose.release_all();
        }
        log::info!("mode `{}` torn down", self.name);
    }
}

impl Drop for Mode {
    fn drop(&mut self) {
        self.teardown();
    }
}
