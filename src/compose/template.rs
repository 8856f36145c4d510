use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::models::{ContactFields, MAX_BODY_CHARS};

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("valid token regex"))
}

/// Expand `{name}`, `{firstName}`, `{lastName}`, `{company}`, `{date}` and `{time}`
///
/// Unknown tokens are left as written. A known token with no value renders
/// empty. The result is trimmed.
pub fn render_template(template: &str, fields: &ContactFields) -> String {
    let rendered = token_regex().replace_all(template, |caps: &Captures| {
        match resolve(&caps[1], fields) {
            Some(value) => value,
            None => caps[0].to_string(),
        }
    });

    rendered.trim().to_string()
}

/// Value for a recognized token, `None` for anything else
fn resolve(token: &str, fields: &ContactFields) -> Option<String> {
    let value = match token {
        "name" => non_empty(&fields.name).map(str::trim).unwrap_or_default().to_string(),
        "firstName" => non_empty(&fields.first_name)
            .map(str::to_string)
            .unwrap_or_else(|| split_name(fields).0),
        "lastName" => non_empty(&fields.last_name)
            .map(str::to_string)
            .unwrap_or_else(|| split_name(fields).1),
        "company" => non_empty(&fields.company).unwrap_or_default().to_string(),
        "date" => non_empty(&fields.date).unwrap_or_default().to_string(),
        "time" => non_empty(&fields.time).unwrap_or_default().to_string(),
        _ => return None,
    };
    Some(value)
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.trim().is_empty())
}

/// `name` split on its first space
fn split_name(fields: &ContactFields) -> (String, String) {
    let name = non_empty(&fields.name).map(str::trim).unwrap_or_default();
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// Body fits in a single send
pub fn check_length(body: &str) -> bool {
    body.chars().count() <= MAX_BODY_CHARS
}
