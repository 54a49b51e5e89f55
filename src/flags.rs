//! Process-wide boolean flag registry.
//!
//! Flags gate whole poses (the base `joystick` mode, dial menus, head-turn
//! panels). The registry is an explicitly injected handle: every pose that
//! reads or writes a flag receives it through the `Runtime` at construction.
//!
//! Keys read or written by the standard poses:
//! - `joystick`: base joystick mode, cleared while any dial is open.
//! - `reset_nose_box`: one-shot request to recentre nose tracking.
//! - `reset_bp_box`: one-shot request to recentre body-point tracking.
//! - any dial name, head-turn/tilt flag, or action `flag` from the mode file.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

pub const JOYSTICK_FLAG: &str = "joystick";
pub const RESET_NOSE_BOX_FLAG: &str = "reset_nose_box";
pub const RESET_BP_BOX_FLAG: &str = "reset_bp_box";

#[derive(Clone, Debug, Default)]
pub struct Flags {
    inner: Arc<Mutex<BTreeMap<String, bool>>>,
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown flags read as `false`.
    pub fn get(&self, name: &str) -> bool {
        let flags = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        flags.get(name).copied().unwrap_or(false)
    }

    pub fn set(&self, name: &str, value: bool) {
        let mut flags = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let previous = flags.insert(name.to_string(), value);
        if previous != Some(value) {
            log::debug!("flag {} -> {}", name, value);
        }
    }

    /// Flip a flag and return its new value.
    pub fn toggle(&self, name: &str) -> bool {
        let mut flags = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = flags.entry(name.to_string()).or_insert(false);
        *entry = !*entry;
        log::debug!("flag {} toggled -> {}", name, *entry);
        *entry
    }

    pub fn any(&self, names: &[String]) -> bool {
        let flags = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        names
            .iter()
            .any(|name| flags.get(name).copied().unwrap_or(false))
    }

    pub fn snapshot(&self) -> Vec<(String, bool)> {
        let flags = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        flags.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

/// Named set of flags that gate one shared feature, such as every dial
/// built for a mode. Clones share one set.
#[derive(Clone, Debug, Default)]
pub struct FlagGroup {
    names: Arc<Mutex<Vec<String>>>,
}

impl FlagGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether any member flag is set.
    pub fn any_set(&self, flags: &Flags) -> bool {
        flags.any(&self.names())
    }
}

/// Flag names are local identifiers: `[A-Za-z0-9_.-]{1,64}`.
pub fn validate_flag_name(name: &str) -> Result<()> {
    static FLAG_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = FLAG_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").expect("flag name pattern compiles")
    });
    if !re.is_match(name) {
        return Err(anyhow!(
            "invalid flag name `{}`: must match ^[A-Za-z0-9_.-]{{1,64}}$",
            name
        ));
    }
    Ok(())
}
