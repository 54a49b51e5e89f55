use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::clock::{Clock, ManualClock, MonotonicClock};
use crate::config::Settings;
use crate::device::{DeviceLog, Devices, DisplaySize};
use crate::flags::{FlagGroup, Flags};

/// Callback bound to a `custom` action.
pub type Callback = Arc<dyn Fn(&Runtime) + Send + Sync>;

/// Named callbacks that mode files can bind with `"class": "custom"`.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    callbacks: HashMap<String, Callback>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        self.callbacks.insert(name.to_string(), Arc::new(callback));
    }

    pub fn get(&self, name: &str) -> Result<Callback> {
        self.callbacks
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("custom action `{}` is not registered", name))
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.callbacks.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("callbacks", &self.list())
            .finish()
    }
}

/// Shared collaborators handed to every pose at construction.
#[derive(Clone)]
pub struct Runtime {
    pub devices: Devices,
    pub flags: Flags,
    /// Flags of every dial built against this runtime.
    pub dials: FlagGroup,
    pub settings: Settings,
    pub clock: Arc<dyn Clock>,
    pub actions: ActionRegistry,
}

impl Runtime {
    pub fn new(devices: Devices, settings: Settings) -> Self {
        Self {
            devices,
            flags: Flags::new(),
            dials: FlagGroup::new(),
            settings,
            clock: Arc::new(MonotonicClock),
            actions: ActionRegistry::new(),
        }
    }

    /// Recording devices, default settings and a hand-driven clock.
    pub fn recording(display: DisplaySize) -> (Self, DeviceLog, ManualClock) {
        let (devices, log) = Devices::recording(display);
        let clock = ManualClock::new();
        let runtime = Self::new(devices, Settings::with_defaults()).with_clock(Arc::new(clock.clone()));
        (runtime, log, clock)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("devices", &self.devices)
            .field("flags", &self.flags)
            .field("dials", &self.dials)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}
