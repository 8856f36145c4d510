//! uiautomator hierarchy snapshots
//!
//! A dump is parsed once into an ordered list of [`UiElement`]s and never
//! mutated afterwards. Callers hold snapshots behind `Arc` and compare them.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;
use thiserror::Error;

use super::types::{Bounds, UiElement};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("malformed hierarchy XML: {0}")]
    Malformed(String),

    #[error("hierarchy dump has no <hierarchy> root")]
    MissingRoot,
}

/// Immutable capture of the on-screen UI tree at one instant
#[derive(Debug, Clone)]
pub struct HierarchySnapshot {
    elements: Vec<UiElement>,
    raw: String,
    captured_at: DateTime<Utc>,
}

impl HierarchySnapshot {
    /// Parse a uiautomator XML dump
    pub fn parse(raw: impl Into<String>) -> Result<Self, HierarchyError> {
        let raw = raw.into();
        let elements = parse_elements(&raw)?;
        Ok(Self {
            elements,
            raw,
            captured_at: Utc::now(),
        })
    }

    pub fn elements(&self) -> &[UiElement] {
        &self.elements
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Distinct packages that own at least one node
    pub fn packages(&self) -> BTreeSet<&str> {
        self.elements
            .iter()
            .map(|e| e.package.as_str())
            .filter(|p| !p.is_empty())
            .collect()
    }

    pub fn editable_elements(&self) -> impl Iterator<Item = &UiElement> {
        self.elements.iter().filter(|e| e.is_editable())
    }

    /// Whether any editable field currently shows `excerpt`
    pub fn field_contains(&self, excerpt: &str) -> bool {
        !excerpt.is_empty() && self.editable_elements().any(|e| e.text.contains(excerpt))
    }

    /// Best guess at the message input of a compose screen
    pub fn compose_field(&self) -> Option<&UiElement> {
        let visible = || self.editable_elements().filter(|e| e.bounds.is_visible());

        visible()
            .find(|e| e.resource_id.to_ascii_lowercase().contains("compose"))
            .or_else(|| visible().find(|e| e.focused))
            .or_else(|| visible().next())
    }
}

fn parse_elements(raw: &str) -> Result<Vec<UiElement>, HierarchyError> {
    let mut reader = Reader::from_str(raw);
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref start)) => {
                match start.name().as_ref() {
                    b"hierarchy" => saw_root = true,
                    b"node" => elements.push(parse_node(start, elements.len(), depth)?),
                    _ => {}
                }
                depth += 1;
            }
            Ok(Event::Empty(ref start)) => match start.name().as_ref() {
                b"hierarchy" => saw_root = true,
                b"node" => elements.push(parse_node(start, elements.len(), depth)?),
                _ => {}
            },
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(HierarchyError::Malformed(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if !saw_root {
        return Err(HierarchyError::MissingRoot);
    }

    Ok(elements)
}

fn parse_node(start: &BytesStart<'_>, index: usize, depth: usize) -> Result<UiElement, HierarchyError> {
    let mut element = UiElement::new(index, depth);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| HierarchyError::Malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| HierarchyError::Malformed(e.to_string()))?;

        match attr.key.as_ref() {
            b"text" => element.text = value.into_owned(),
            b"resource-id" => element.resource_id = value.into_owned(),
            b"content-desc" => element.content_desc = value.into_owned(),
            b"class" => element.class_name = value.into_owned(),
            b"package" => element.package = value.into_owned(),
            b"clickable" => element.clickable = value == "true",
            b"enabled" => element.enabled = value == "true",
            b"focused" => element.focused = value == "true",
            b"bounds" => element.bounds = Bounds::parse(&value).unwrap_or_default(),
            _ => {}
        }
    }

    Ok(element)
}
