//! Post-tap send verification
//!
//! Compares the snapshot taken before the tap with one taken after it.
//! Evidence is indirect, so the default mode leans towards reporting a send.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use super::locator::is_send_like;
use crate::config::AutomationConfig;
use crate::device::HierarchySnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Sent unless strong negative evidence shows up
    #[default]
    Optimistic,
    /// Sent only when the body has left the input and no failure appeared
    Strict,
}

impl VerificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMode::Optimistic => "optimistic",
            VerificationMode::Strict => "strict",
        }
    }
}

impl FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimistic" => Ok(VerificationMode::Optimistic),
            "strict" => Ok(VerificationMode::Strict),
            other => Err(format!("unknown verification mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Sent,
    Uncertain,
}

/// Observations on the after-tap snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSignals {
    pub active_send_present: bool,
    pub body_still_in_field: bool,
    pub in_messaging_app: bool,
    pub no_failure_markers: bool,
}

#[derive(Debug, Clone)]
pub struct SendVerifier {
    mode: VerificationMode,
    messaging_packages: Vec<String>,
    /// Lowercase
    failure_markers: Vec<String>,
}

impl SendVerifier {
    pub fn new(mode: VerificationMode, messaging_packages: Vec<String>, failure_markers: Vec<String>) -> Self {
        Self {
            mode,
            messaging_packages,
            failure_markers: failure_markers.into_iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &AutomationConfig) -> Self {
        Self::new(
            config.verification_mode,
            config.messaging_packages.clone(),
            config.failure_markers.clone(),
        )
    }

    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    pub fn verify(&self, before: &HierarchySnapshot, after: &HierarchySnapshot, excerpt: &str) -> Verdict {
        let signals = self.signals(before, after, excerpt);
        let verdict = self.decide(&signals);
        tracing::debug!("Verification signals {:?} -> {:?}", signals, verdict);
        verdict
    }

    pub fn signals(&self, before: &HierarchySnapshot, after: &HierarchySnapshot, excerpt: &str) -> SendSignals {
        SendSignals {
            active_send_present: after
                .elements()
                .iter()
                .any(|e| e.clickable && e.enabled && is_send_like(e)),
            body_still_in_field: after.field_contains(excerpt),
            in_messaging_app: self.in_messaging_app(after),
            no_failure_markers: self.new_failure_markers(before, after, excerpt).is_empty(),
        }
    }

    pub fn decide(&self, s: &SendSignals) -> Verdict {
        let sent = match self.mode {
            VerificationMode::Optimistic => {
                s.in_messaging_app
                    && (!s.active_send_present || !s.body_still_in_field || s.no_failure_markers)
            }
            VerificationMode::Strict => s.in_messaging_app && !s.body_still_in_field && s.no_failure_markers,
        };

        if sent {
            Verdict::Sent
        } else {
            Verdict::Uncertain
        }
    }

    pub fn is_messaging_package(&self, package: &str) -> bool {
        self.messaging_packages.iter().any(|p| p == package)
            || package.contains("messaging")
            || package.contains("mms")
    }

    pub fn in_messaging_app(&self, snapshot: &HierarchySnapshot) -> bool {
        snapshot.packages().into_iter().any(|p| self.is_messaging_package(p))
    }

    /// Failure texts on `after` that were not already on `before`
    ///
    /// The message body itself is skipped, since it may contain a marker word.
    pub fn new_failure_markers(
        &self,
        before: &HierarchySnapshot,
        after: &HierarchySnapshot,
        excerpt: &str,
    ) -> Vec<String> {
        let seen: HashSet<String> = visible_labels(before, excerpt).collect();

        visible_labels(after, excerpt)
            .filter(|label| !seen.contains(label))
            .filter(|label| self.failure_markers.iter().any(|m| label.contains(m.as_str())))
            .collect()
    }
}

/// Lowercased non-editable texts and descriptions, minus the message body
fn visible_labels<'a>(snapshot: &'a HierarchySnapshot, excerpt: &'a str) -> impl Iterator<Item = String> + 'a {
    snapshot
        .elements()
        .iter()
        .filter(|e| !e.is_editable())
        .flat_map(|e| [e.text.as_str(), e.content_desc.as_str()])
        .filter(move |label| !label.is_empty() && (excerpt.is_empty() || !label.contains(excerpt)))
        .map(str::to_lowercase)
}

/// First `chars` characters of the body, trimmed
pub fn body_excerpt(body: &str, chars: usize) -> String {
    body.chars().take(chars).collect::<String>().trim().to_string()
}
