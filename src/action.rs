//! Action descriptors and the dispatcher that drives device sinks.
//!
//! A mode file names actions declaratively:
//!
//! ```json
//! { "class": "keyboard", "method": "hold", "args": ["w"], "flag": "driving" }
//! ```
//!
//! Descriptors are resolved into an `Action` once, when the pose is built.
//! Nothing is looked up by name per frame.

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::device::MouseButton;
use crate::flags::validate_flag_name;
use crate::runtime::{Callback, Runtime};

// ----------------------------------------------------------------------------
// Descriptors
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDescriptor {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub flag: Option<String>,
}

/// Key names are driver identifiers without whitespace.
pub fn validate_key_name(key: &str) -> Result<()> {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    let re = KEY_RE.get_or_init(|| Regex::new(r"^\S{1,32}$").expect("key name pattern compiles"));
    if !re.is_match(key) {
        return Err(anyhow!("invalid key name `{}`", key));
    }
    Ok(())
}

fn arg_str<'a>(args: &'a [Value], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .ok_or_else(|| anyhow!("missing argument {} ({})", index, what))?
        .as_str()
        .ok_or_else(|| anyhow!("argument {} ({}) must be a string", index, what))
}

fn arg_f64(args: &[Value], index: usize, what: &str) -> Result<f64> {
    args.get(index)
        .ok_or_else(|| anyhow!("missing argument {} ({})", index, what))?
        .as_f64()
        .ok_or_else(|| anyhow!("argument {} ({}) must be a number", index, what))
}

fn arg_button(args: &[Value], index: usize) -> Result<MouseButton> {
    match args.get(index) {
        None => Ok(MouseButton::Left),
        Some(value) => value
            .as_str()
            .ok_or_else(|| anyhow!("argument {} (button) must be a string", index))?
            .parse(),
    }
}

fn key_args(args: &[Value]) -> Result<Vec<String>> {
    if args.is_empty() {
        bail!("keyboard actions need at least one key");
    }
    args.iter()
        .enumerate()
        .map(|(i, _)| {
            let key = arg_str(args, i, "key")?;
            validate_key_name(key)?;
            Ok(key.to_string())
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Resolved actions
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyMethod {
    Hold,
    Press,
    Release,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MouseAction {
    Click(MouseButton),
    DoubleClick(MouseButton),
    Hold(MouseButton),
    Release(MouseButton),
    Move { dx: f64, dy: f64 },
    MoveTo { x: f64, y: f64 },
    Scroll { dx: f64, dy: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum GamepadAction {
    Press(String),
    Release(String),
    LeftTrigger(i32),
    RightTrigger(i32),
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagOp {
    Set(bool),
    Toggle,
}

#[derive(Clone)]
pub enum Action {
    Keyboard { method: KeyMethod, keys: Vec<String> },
    Mouse(MouseAction),
    Gamepad(GamepadAction),
    Flag { name: String, op: FlagOp },
    Sound(String),
    Custom { name: String, callback: Callback },
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Keyboard { method, keys } => write!(f, "Keyboard({:?} {:?})", method, keys),
            Action::Mouse(action) => write!(f, "Mouse({:?})", action),
            Action::Gamepad(action) => write!(f, "Gamepad({:?})", action),
            Action::Flag { name, op } => write!(f, "Flag({} {:?})", name, op),
            Action::Sound(sound) => write!(f, "Sound({})", sound),
            Action::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}

impl Action {
    pub fn resolve(desc: &ActionDescriptor, runtime: &Runtime) -> Result<Self> {
        let class = desc
            .class
            .as_deref()
            .ok_or_else(|| anyhow!("action is missing `class`"))?;
        let method = desc.method.as_deref().unwrap_or("");
        let args = desc.args.as_slice();
        let action = match (class, method) {
            ("keyboard", "hold") => Action::Keyboard {
                method: KeyMethod::Hold,
                keys: key_args(args)?,
            },
            ("keyboard", "press") => Action::Keyboard {
                method: KeyMethod::Press,
                keys: key_args(args)?,
            },
            ("keyboard", "release") => Action::Keyboard {
                method: KeyMethod::Release,
                keys: key_args(args)?,
            },
            ("mouse", "click") => Action::Mouse(MouseAction::Click(arg_button(args, 0)?)),
            ("mouse", "double_click") => {
                Action::Mouse(MouseAction::DoubleClick(arg_button(args, 0)?))
            }
            ("mouse", "hold") => Action::Mouse(MouseAction::Hold(arg_button(args, 0)?)),
            ("mouse", "release") => Action::Mouse(MouseAction::Release(arg_button(args, 0)?)),
            ("mouse", "move") => Action::Mouse(MouseAction::Move {
                dx: arg_f64(args, 0, "dx")?,
                dy: arg_f64(args, 1, "dy")?,
            }),
            ("mouse", "move_to") => Action::Mouse(MouseAction::MoveTo {
                x: arg_f64(args, 0, "x")?,
                y: arg_f64(args, 1, "y")?,
            }),
            ("mouse", "scroll") => Action::Mouse(MouseAction::Scroll {
                dx: arg_f64(args, 0, "dx")?,
                dy: arg_f64(args, 1, "dy")?,
            }),
            ("gamepad", "button_press") => {
                Action::Gamepad(GamepadAction::Press(arg_str(args, 0, "button")?.to_string()))
            }
            ("gamepad", "button_release") => {
                Action::Gamepad(GamepadAction::Release(arg_str(args, 0, "button")?.to_string()))
            }
            ("gamepad", "left_trigger") => {
                Action::Gamepad(GamepadAction::LeftTrigger(trigger_value(args)?))
            }
            ("gamepad", "right_trigger") => {
                Action::Gamepad(GamepadAction::RightTrigger(trigger_value(args)?))
            }
            ("gamepad", "reset") => Action::Gamepad(GamepadAction::Reset),
            ("flags", "set") => {
                let name = arg_str(args, 0, "flag")?;
                validate_flag_name(name)?;
                let value = args
                    .get(1)
                    .map(|v| v.as_bool().ok_or_else(|| anyhow!("argument 1 (value) must be a boolean")))
                    .transpose()?
                    .unwrap_or(true);
                Action::Flag {
                    name: name.to_string(),
                    op: FlagOp::Set(value),
                }
            }
            ("flags", "toggle") => {
                let name = arg_str(args, 0, "flag")?;
                validate_flag_name(name)?;
                Action::Flag {
                    name: name.to_string(),
                    op: FlagOp::Toggle,
                }
            }
            ("sound", "play") => Action::Sound(arg_str(args, 0, "sound")?.to_string()),
            ("custom", name) => Action::Custom {
                name: name.to_string(),
                callback: runtime.actions.get(name)?,
            },
            (class @ ("keyboard" | "mouse" | "gamepad" | "flags" | "sound"), method) => {
                bail!("unknown {} method `{}`", class, method)
            }
            (class, _) => bail!(
                "unknown action class `{}` (expected keyboard, mouse, gamepad, flags, sound or custom)",
                class
            ),
        };
        Ok(action)
    }

    /// Sustained actions leave an input engaged until `release`.
    pub fn is_sustained(&self) -> bool {
        matches!(
            self,
            Action::Keyboard {
                method: KeyMethod::Hold,
                ..
            } | Action::Mouse(MouseAction::Hold(_))
                | Action::Gamepad(GamepadAction::Press(_))
        )
    }

    pub fn fire(&self, runtime: &Runtime) {
        let devices = &runtime.devices;
        match self {
            Action::Keyboard { method, keys } => {
                let mut keyboard = devices.keyboard();
                match method {
                    KeyMethod::Hold => keys.iter().for_each(|k| keyboard.hold(k)),
                    KeyMethod::Press if keys.len() > 1 => keyboard.press_chord(keys),
                    KeyMethod::Press => keys.iter().for_each(|k| keyboard.press(k)),
                    KeyMethod::Release => keys.iter().for_each(|k| keyboard.release(k)),
                }
            }
            Action::Mouse(action) => {
                let mut mouse = devices.mouse();
                match *action {
                    MouseAction::Click(b) => mouse.click(b),
                    MouseAction::DoubleClick(b) => mouse.double_click(b),
                    MouseAction::Hold(b) => mouse.hold(b),
                    MouseAction::Release(b) => mouse.release(b),
                    MouseAction::Move { dx, dy } => mouse.move_by(dx, dy),
                    MouseAction::MoveTo { x, y } => mouse.move_to(x, y),
                    MouseAction::Scroll { dx, dy } => mouse.scroll(dx, dy),
                }
            }
            Action::Gamepad(action) => {
                let mut gamepad = devices.gamepad();
                match action {
                    GamepadAction::Press(b) => gamepad.press_button(b),
                    GamepadAction::Release(b) => gamepad.release_button(b),
                    GamepadAction::LeftTrigger(v) => gamepad.left_trigger(*v),
                    GamepadAction::RightTrigger(v) => gamepad.right_trigger(*v),
                    GamepadAction::Reset => gamepad.reset(),
                }
            }
            Action::Flag { name, op } => match op {
                FlagOp::Set(value) => runtime.flags.set(name, *value),
                FlagOp::Toggle => {
                    runtime.flags.toggle(name);
                }
            },
            Action::Sound(sound) => devices.speaker().play(sound),
            Action::Custom { callback, .. } => callback(runtime),
        }
    }

    /// Undo a sustained action. No-op for momentary ones.
    pub fn release(&self, runtime: &Runtime) {
        match self {
            Action::Keyboard {
                method: KeyMethod::Hold,
                keys,
            } => {
                let mut keyboard = runtime.devices.keyboard();
                keys.iter().rev().for_each(|k| keyboard.release(k));
            }
            Action::Mouse(MouseAction::Hold(b)) => runtime.devices.mouse().release(*b),
            Action::Gamepad(GamepadAction::Press(b)) => {
                runtime.devices.gamepad().release_button(b)
            }
            _ => {}
        }
    }
}

fn trigger_value(args: &[Value]) -> Result<i32> {
    let value = arg_f64(args, 0, "value")?;
    if !(0.0..=255.0).contains(&value) {
        bail!("trigger value must be in [0, 255], got {}", value);
    }
    Ok(value.round() as i32)
}

// ----------------------------------------------------------------------------
// Bindings and dispatch
// ----------------------------------------------------------------------------

/// Resolved action plus the optional flag the owning pose maintains.
#[derive(Clone, Debug, Default)]
pub struct Binding {
    pub action: Option<Action>,
    pub flag: Option<String>,
}

impl Binding {
    pub fn resolve(desc: &ActionDescriptor, runtime: &Runtime) -> Result<Self> {
        let action = if desc.class.is_some() || desc.method.is_some() {
            Some(Action::resolve(desc, runtime)?)
        } else {
            None
        };
        if let Some(flag) = &desc.flag {
            validate_flag_name(flag).context("action flag")?;
        }
        Ok(Self {
            action,
            flag: desc.flag.clone(),
        })
    }

    pub fn resolve_opt(desc: Option<&ActionDescriptor>, runtime: &Runtime) -> Result<Self> {
        match desc {
            Some(desc) => Self::resolve(desc, runtime),
            None => Ok(Self::default()),
        }
    }

    pub fn fire(&self, runtime: &Runtime) {
        if let Some(action) = &self.action {
            action.fire(runtime);
        }
    }
}

/// Drives one binding from a pose, holding sustained actions at most once
/// and keeping the matching release obligation.
#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    binding: Binding,
    engaged: bool,
}

impl Dispatcher {
    pub fn new(binding: Binding) -> Self {
        Self {
            binding,
            engaged: false,
        }
    }

    pub fn resolve(desc: Option<&ActionDescriptor>, runtime: &Runtime) -> Result<Self> {
        Ok(Self::new(Binding::resolve_opt(desc, runtime)?))
    }

    /// Fire the bound action. A sustained action already engaged is not
    /// re-issued.
    pub fn fire(&mut self, runtime: &Runtime) {
        let Some(action) = &self.binding.action else {
            return;
        };
        if action.is_sustained() {
            if self.engaged {
                return;
            }
            self.engaged = true;
        }
        action.fire(runtime);
    }

    /// Release the engaged input, if any.
    pub fn settle(&mut self, runtime: &Runtime) {
        if !self.engaged {
            return;
        }
        self.engaged = false;
        if let Some(action) = &self.binding.action {
            action.release(runtime);
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

// ----------------------------------------------------------------------------
// Forcefield buttons
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseGesture {
    Click,
    Double,
    Hold,
}

/// Level button: `"<key>_hold"`, `"<key>_press"`,
/// `"mouse_<left|right|middle>_<click|double|hold|press>"`, or `""`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonBinding {
    Nothing,
    Key { key: String, hold: bool },
    Mouse { button: MouseButton, gesture: MouseGesture },
}

impl FromStr for ButtonBinding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        static BUTTON_RE: OnceLock<Regex> = OnceLock::new();
        let re = BUTTON_RE.get_or_init(|| {
            Regex::new(r"^(?:mouse_(left|right|middle)_(click|double|hold|press)|(\S+)_(hold|press))$")
                .expect("button pattern compiles")
        });
        if s.is_empty() {
            return Ok(ButtonBinding::Nothing);
        }
        let caps = re.captures(s).ok_or_else(|| {
            anyhow!(
                "invalid button `{}` (expected <key>_hold, <key>_press or mouse_<side>_<click|double|hold|press>)",
                s
            )
        })?;
        if let (Some(button), Some(gesture)) = (caps.get(1), caps.get(2)) {
            let gesture = match gesture.as_str() {
                "click" => MouseGesture::Click,
                "double" => MouseGesture::Double,
                _ => MouseGesture::Hold,
            };
            return Ok(ButtonBinding::Mouse {
                button: button.as_str().parse()?,
                gesture,
            });
        }
        match (caps.get(3), caps.get(4)) {
            (Some(key), Some(method)) => {
                validate_key_name(key.as_str())?;
                Ok(ButtonBinding::Key {
                    key: key.as_str().to_string(),
                    hold: method.as_str() == "hold",
                })
            }
            _ => Err(anyhow!("invalid button `{}`", s)),
        }
    }
}

impl ButtonBinding {
    /// Issue the button's device effect. Returns whether an input is now
    /// engaged and needs `release`.
    pub fn trigger(&self, runtime: &Runtime) -> bool {
        match self {
            ButtonBinding::Nothing => false,
            ButtonBinding::Key { key, hold: true } => {
                runtime.devices.keyboard().hold(key);
                true
            }
            ButtonBinding::Key { key, hold: false } => {
                runtime.devices.keyboard().press(key);
                false
            }
            ButtonBinding::Mouse { button, gesture } => {
                let mut mouse = runtime.devices.mouse();
                match gesture {
                    MouseGesture::Click => {
                        mouse.click(*button);
                        false
                    }
                    MouseGesture::Double => {
                        mouse.double_click(*button);
                        false
                    }
                    MouseGesture::Hold => {
                        mouse.hold(*button);
                        true
                    }
                }
            }
        }
    }

    pub fn release(&self, runtime: &Runtime) {
        match self {
            ButtonBinding::Key { key, hold: true } => runtime.devices.keyboard().release(key),
            ButtonBinding::Mouse {
                button,
                gesture: MouseGesture::Hold,
            } => runtime.devices.mouse().release(*button),
            _ => {}
        }
    }
}

// ----------------------------------------------------------------------------
// Directional actions (tracking poses)
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum DirectionSpec {
    Name(String),
    Action { action: ActionDescriptor },
}

/// What a tracking pose does when one direction engages.
#[derive(Clone, Debug)]
pub enum DirectionAction {
    Key(String),
    Click(MouseButton),
    Action(Action),
}

impl DirectionAction {
    pub fn resolve(spec: &DirectionSpec, runtime: &Runtime) -> Result<Self> {
        match spec {
            DirectionSpec::Name(name) => match name.strip_suffix(" click") {
                Some(button) => Ok(DirectionAction::Click(button.parse()?)),
                None => {
                    validate_key_name(name)?;
                    Ok(DirectionAction::Key(name.clone()))
                }
            },
            DirectionSpec::Action { action } => {
                // A plain keyboard descriptor behaves like a bare key name.
                if action.class.as_deref() == Some("keyboard") {
                    if let Some(key) = action.args.first().and_then(|v| v.as_str()) {
                        validate_key_name(key)?;
                        return Ok(DirectionAction::Key(key.to_string()));
                    }
                }
                if action.class.as_deref() == Some("mouse") && action.method.as_deref() == Some("click") {
                    return Ok(DirectionAction::Click(arg_button(&action.args, 0)?));
                }
                Ok(DirectionAction::Action(Action::resolve(action, runtime)?))
            }
        }
    }

    /// Engage this direction. Returns whether a device input is now held.
    pub fn trigger(&self, runtime: &Runtime, hold: bool) -> bool {
        match self {
            DirectionAction::Key(key) if hold => {
                runtime.devices.keyboard().hold(key);
                true
            }
            DirectionAction::Key(key) => {
                runtime.devices.keyboard().press(key);
                false
            }
            DirectionAction::Click(button) if hold => {
                runtime.devices.mouse().hold(*button);
                true
            }
            DirectionAction::Click(button) => {
                runtime.devices.mouse().click(*button);
                false
            }
            DirectionAction::Action(action) => {
                action.fire(runtime);
                action.is_sustained()
            }
        }
    }

    pub fn release(&self, runtime: &Runtime) {
        match self {
            DirectionAction::Key(key) => runtime.devices.keyboard().release(key),
            DirectionAction::Click(button) => runtime.devices.mouse().release(*button),
            DirectionAction::Action(action) => action.release(runtime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DisplaySize};

    fn desc(json: &str) -> ActionDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn descriptors_resolve_to_typed_actions() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let hold = Action::resolve(&desc(r#"{"class":"keyboard","method":"hold","args":["w"]}"#), &rt).unwrap();
        assert!(hold.is_sustained());
        let click = Action::resolve(&desc(r#"{"class":"mouse","method":"click","args":["right"]}"#), &rt).unwrap();
        assert!(matches!(click, Action::Mouse(MouseAction::Click(MouseButton::Right))));
        let flag = Action::resolve(&desc(r#"{"class":"flags","method":"set","args":["weapons", false]}"#), &rt).unwrap();
        assert!(matches!(flag, Action::Flag { op: FlagOp::Set(false), .. }));
    }

    #[test]
    fn bad_descriptors_fail_at_resolution() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        for bad in [
            r#"{"class":"keyboard","method":"smash","args":["w"]}"#,
            r#"{"class":"telepathy","method":"think"}"#,
            r#"{"class":"keyboard","method":"press","args":[]}"#,
            r#"{"class":"mouse","method":"move","args":[1]}"#,
            r#"{"class":"custom","method":"unregistered"}"#,
            r#"{"class":"flags","method":"set","args":["bad flag"]}"#,
            r#"{"method":"press","args":["w"]}"#,
        ] {
            assert!(Action::resolve(&desc(bad), &rt).is_err(), "{bad}");
        }
    }

    #[test]
    fn custom_actions_come_from_the_registry() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let mut registry = crate::runtime::ActionRegistry::new();
        registry.register("arm", |rt: &Runtime| rt.flags.set("armed", true));
        let rt = rt.with_actions(registry);
        let action = Action::resolve(&desc(r#"{"class":"custom","method":"arm"}"#), &rt).unwrap();
        action.fire(&rt);
        assert!(rt.flags.get("armed"));
    }

    #[test]
    fn dispatcher_holds_once_and_releases_once() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut dispatcher = Dispatcher::resolve(
            Some(&desc(r#"{"class":"keyboard","method":"hold","args":["w"]}"#)),
            &rt,
        )
        .unwrap();
        dispatcher.fire(&rt);
        dispatcher.fire(&rt);
        dispatcher.settle(&rt);
        dispatcher.settle(&rt);
        assert_eq!(
            log.events(),
            vec![
                DeviceEvent::KeyHold { key: "w".into() },
                DeviceEvent::KeyRelease { key: "w".into() },
            ]
        );
    }

    #[test]
    fn momentary_actions_fire_every_time() {
        let (rt, log, _) = Runtime::recording(DisplaySize::default());
        let mut dispatcher = Dispatcher::resolve(
            Some(&desc(r#"{"class":"keyboard","method":"press","args":["space"]}"#)),
            &rt,
        )
        .unwrap();
        dispatcher.fire(&rt);
        dispatcher.fire(&rt);
        dispatcher.settle(&rt);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn button_descriptors_parse() {
        assert_eq!("".parse::<ButtonBinding>().unwrap(), ButtonBinding::Nothing);
        assert_eq!(
            "page_up_hold".parse::<ButtonBinding>().unwrap(),
            ButtonBinding::Key { key: "page_up".into(), hold: true }
        );
        assert_eq!(
            "mouse_right_press".parse::<ButtonBinding>().unwrap(),
            ButtonBinding::Mouse { button: MouseButton::Right, gesture: MouseGesture::Hold }
        );
        assert!("w_smash".parse::<ButtonBinding>().is_err());
        assert!("mouse_up_click".parse::<ButtonBinding>().is_err());
    }

    #[test]
    fn direction_specs_accept_keys_clicks_and_descriptors() {
        let (rt, _, _) = Runtime::recording(DisplaySize::default());
        let spec: DirectionSpec = serde_json::from_str(r#""left click""#).unwrap();
        assert!(matches!(DirectionAction::resolve(&spec, &rt).unwrap(), DirectionAction::Click(MouseButton::Left)));
        let spec: DirectionSpec =
            serde_json::from_str(r#"{"action": {"class": "keyboard", "method": "press", "args": ["up"]}}"#).unwrap();
        assert!(matches!(DirectionAction::resolve(&spec, &rt).unwrap(), DirectionAction::Key(k) if k == "up"));
        let spec: DirectionSpec =
            serde_json::from_str(r#"{"action": {"class": "sound", "method": "play", "args": ["ping"]}}"#).unwrap();
        assert!(matches!(DirectionAction::resolve(&spec, &rt).unwrap(), DirectionAction::Action(_)));
    }
}
