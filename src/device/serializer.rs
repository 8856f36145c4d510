use super::hierarchy::HierarchySnapshot;
use super::types::UiElement;

/// Format a snapshot as a readable element listing
///
/// Written next to failed attempts so a human can see what the locator saw.
/// Example output:
/// ```text
/// Packages: com.google.android.apps.messaging
/// Nodes: 3
///
/// [1] EditText "Hi Jane" id=compose_message_text (150,2050)-(880,2180) [clickable, focused]
/// [2] ImageView desc="Send SMS" id=send_message_button_icon (900,2060)-(1040,2170) [clickable]
/// ```
pub fn format_snapshot(snapshot: &HierarchySnapshot) -> String {
    let mut lines = Vec::new();

    let packages: Vec<&str> = snapshot.packages().into_iter().collect();
    lines.push(format!("Packages: {}", packages.join(", ")));
    lines.push(format!("Nodes: {}", snapshot.len()));
    lines.push(format!("Captured: {}", snapshot.captured_at().to_rfc3339()));
    lines.push(String::new());

    let mut shown = 0;
    for element in snapshot.elements() {
        if is_worth_listing(element) {
            lines.push(format_element(element));
            shown += 1;
        }
    }

    if shown == 0 {
        lines.push("  (no labelled or interactive elements)".to_string());
    }

    lines.join("\n")
}

/// Layout containers without text or interaction are noise
fn is_worth_listing(element: &UiElement) -> bool {
    element.clickable
        || element.is_editable()
        || !element.text.is_empty()
        || !element.content_desc.is_empty()
}

/// Format a single element for display
pub fn format_element(element: &UiElement) -> String {
    let mut parts = Vec::new();

    parts.push(format!("[{}]", element.index));
    parts.push(element.short_class().to_string());

    if !element.text.is_empty() {
        parts.push(format!("\"{}\"", truncate_str(&element.text, 40)));
    }

    if !element.content_desc.is_empty() {
        parts.push(format!("desc=\"{}\"", truncate_str(&element.content_desc, 30)));
    }

    if !element.resource_id.is_empty() {
        let short_id = element
            .resource_id
            .rsplit('/')
            .next()
            .unwrap_or(element.resource_id.as_str());
        parts.push(format!("id={}", short_id));
    }

    let b = &element.bounds;
    parts.push(format!("({},{})-({},{})", b.x1, b.y1, b.x2, b.y2));

    let mut states = Vec::new();
    if element.clickable {
        states.push("clickable");
    }
    if !element.enabled {
        states.push("disabled");
    }
    if element.focused {
        states.push("focused");
    }
    if !states.is_empty() {
        parts.push(format!("[{}]", states.join(", ")));
    }

    parts.join(" ")
}

/// Truncate to at most `max_chars` characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
