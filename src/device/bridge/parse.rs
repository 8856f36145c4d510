//! Parsers for adb command output
//!
//! Each function takes the stdout of one command and returns a typed value,
//! or `None` when the output does not have the expected shape.

use regex::Regex;
use std::sync::OnceLock;

use crate::device::types::{DeviceEntry, ScreenSize};

fn wakefulness_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"mWakefulness=(\w+)").expect("valid regex"))
}

fn display_power_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Display Power: state=(\w+)").expect("valid regex"))
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(Physical|Override) size:\s*(\d+)x(\d+)").expect("valid regex"))
}

fn current_focus_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mCurrentFocus=Window\{\S+ \S+ ([A-Za-z0-9_.]+)/").expect("valid regex")
    })
}

fn focused_app_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mFocusedApp=\S*\{\S+ \S+ ([A-Za-z0-9_.]+)/").expect("valid regex")
    })
}

/// Parse `adb devices -l`
pub fn parse_device_list(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            let mut entry = DeviceEntry::new(serial, state);
            if let Some(model) = parts.find_map(|p| p.strip_prefix("model:")) {
                entry = entry.with_model(model);
            }
            Some(entry)
        })
        .collect()
}

/// Parse `dumpsys power` into whether the screen is on
pub fn parse_screen_on(output: &str) -> Option<bool> {
    if let Some(caps) = wakefulness_re().captures(output) {
        return Some(&caps[1] == "Awake");
    }
    display_power_re()
        .captures(output)
        .map(|caps| caps[1].eq_ignore_ascii_case("ON"))
}

/// Parse `wm size`; an override size takes precedence over the physical one
pub fn parse_screen_size(output: &str) -> Option<ScreenSize> {
    let mut physical = None;
    let mut overridden = None;

    for caps in size_re().captures_iter(output) {
        let size = ScreenSize::new(caps[2].parse().ok()?, caps[3].parse().ok()?);
        match &caps[1] {
            "Override" => overridden = Some(size),
            _ => physical = Some(size),
        }
    }

    overridden.or(physical)
}

/// Parse `dumpsys window` into the focused package
pub fn parse_foreground_package(output: &str) -> Option<String> {
    current_focus_re()
        .captures(output)
        .or_else(|| focused_app_re().captures(output))
        .map(|caps| caps[1].to_string())
}

/// Parse `df /sdcard` into available KiB
pub fn parse_available_kb(output: &str) -> Option<u64> {
    let line = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("Filesystem"))
        .last()?;
    let columns: Vec<&str> = line.split_whitespace().collect();
    columns.get(3)?.parse().ok()
}

/// Slice the XML document out of `uiautomator dump /dev/tty` output
pub fn extract_hierarchy_xml(output: &str) -> Option<&str> {
    let start = output
        .find("<?xml")
        .or_else(|| output.find("<hierarchy"))?;
    let end = output.rfind("</hierarchy>")? + "</hierarchy>".len();
    (end > start).then(|| &output[start..end])
}

/// Whether `am start` output reports a launched activity
pub fn compose_launch_succeeded(output: &str) -> bool {
    !(output.contains("Error:")
        || output.contains("does not exist")
        || output.contains("unable to resolve Intent"))
}

/// `am start` arguments for a SENDTO intent with the body pre-filled
///
/// The app stays open after sending so the result can be read off the screen.
pub fn compose_intent_args(number: &str, body: &str) -> Vec<String> {
    let uri = format!("sms:{}?body={}", number, urlencoding::encode(body));
    vec![
        "am".to_string(),
        "start".to_string(),
        "-a".to_string(),
        "android.intent.action.SENDTO".to_string(),
        "-d".to_string(),
        shell_quote(&uri),
        "--es".to_string(),
        "sms_body".to_string(),
        shell_quote(body),
    ]
}

/// Quote a value for the device shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Split text into `input text` arguments
///
/// `input text` turns every `%s` into a space and has no escape for it, so a
/// literal `%` followed by `s` is typed by two separate calls. Line breaks are
/// flattened to spaces: an Enter key would send the message early.
pub fn input_text_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut prev = None;

    for ch in text.chars() {
        if ch == 's' && prev == Some('%') {
            chunks.push(escape_input_text(&current));
            current.clear();
        }
        current.push(ch);
        prev = Some(ch);
    }
    if !current.is_empty() {
        chunks.push(escape_input_text(&current));
    }
    chunks
}

/// Encode text for `input text`: whitespace becomes `%s`, shell metacharacters are escaped
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' | '\n' | '\r' | '\t' => out.push_str("%s"),
            '\\' | '\'' | '"' | '`' | '$' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '*' | '~'
            | '#' | '?' | '!' | '[' | ']' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
