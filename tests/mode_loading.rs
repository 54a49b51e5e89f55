use std::io::Write;

use tempfile::{Builder, NamedTempFile};

use gesture_kernel::{DisplaySize, Mode, ModeFile, Runtime};

fn write_temp(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().expect("temp mode file");
    file.write_all(body.as_bytes()).expect("write mode file");
    file
}

#[test]
fn loads_json_mode_in_file_order() {
    let file = write_temp(
        ".json",
        r#"{
            "name": "racing",
            "poses": [
                { "kind": "hand_drive", "mode": "gamepad" },
                { "kind": "hand_pinch", "hand": "left", "action": { "class": "keyboard", "method": "press", "args": ["r"] } },
                { "kind": "smile" }
            ]
        }"#,
    );
    let (rt, _, _) = Runtime::recording(DisplaySize::default());
    let mode = Mode::load(file.path(), &rt).expect("load mode");
    assert_eq!(mode.name(), "racing");
    assert_eq!(mode.kinds(), vec!["hand_drive", "hand_pinch", "smile"]);
}

#[test]
fn loads_toml_mode() {
    let file = write_temp(
        ".toml",
        r#"
name = "menu"

[[poses]]
kind = "trigger_dial"
dial_name = "weapons"
dwell = 0.5

[poses.elements.sword.action]
class = "keyboard"
method = "press"
args = ["1"]

[[poses]]
kind = "joystick"
deadzone = 40.0
"#,
    );
    let parsed = ModeFile::read(file.path()).expect("parse toml");
    assert_eq!(parsed.poses.len(), 2);
    let (rt, _, _) = Runtime::recording(DisplaySize::default());
    let mode = Mode::from_file(&parsed, &rt).expect("build mode");
    assert_eq!(mode.kinds(), vec!["trigger_dial", "joystick"]);
    assert_eq!(rt.dials.names(), vec!["weapons".to_string()]);
}

#[test]
fn invalid_pose_fails_the_whole_mode() {
    let file = write_temp(
        ".json",
        r#"{
            "name": "broken",
            "poses": [
                { "kind": "smile" },
                { "kind": "forcefield", "hand": "right", "buttons": ["not a button"] }
            ]
        }"#,
    );
    let (rt, _, _) = Runtime::recording(DisplaySize::default());
    let err = Mode::load(file.path(), &rt).err().expect("mode must not load");
    let message = format!("{:#}", err);
    assert!(message.contains("pose #2 (`forcefield`)"), "{}", message);
    assert!(message.contains("not a button"), "{}", message);
}

#[test]
fn unknown_action_fields_are_rejected() {
    let file = write_temp(
        ".json",
        r#"{
            "name": "typo",
            "poses": [
                { "kind": "smile", "action": { "class": "keyboard", "methd": "press", "args": ["a"] } }
            ]
        }"#,
    );
    let (rt, _, _) = Runtime::recording(DisplaySize::default());
    assert!(Mode::load(file.path(), &rt).is_err());
}

#[test]
fn missing_file_reports_its_path() {
    let (rt, _, _) = Runtime::recording(DisplaySize::default());
    let err = Mode::load(std::path::Path::new("/nonexistent/mode.json"), &rt)
        .err()
        .expect("missing file");
    assert!(err.to_string().contains("/nonexistent/mode.json"));
}
