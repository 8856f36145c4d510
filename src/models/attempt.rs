use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::message::OutboundMessage;
use crate::device::{Device, Point};

/// Strategy that produced a tap target, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    ExactText,
    ResourceId,
    ContentDescription,
    CoordinateHeuristic,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::ExactText => "exact_text",
            Tier::ResourceId => "resource_id",
            Tier::ContentDescription => "content_description",
            Tier::CoordinateHeuristic => "coordinate_heuristic",
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Tier::ExactText => 1,
            Tier::ResourceId => 2,
            Tier::ContentDescription => 3,
            Tier::CoordinateHeuristic => 4,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier {} ({})", self.number(), self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Sent,
    Failed,
}

/// Persisted status of a completed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// The verifier saw evidence of the send
    SentAutomatically,
    /// Tapped a validated candidate; the evidence stayed ambiguous
    OpenedAutoClickAttempted,
    /// The device could not be prepared or the body could not be composed
    Failed,
    /// No send control could be found or confirmed
    AutoClickFailed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::SentAutomatically => "sent_automatically",
            SendStatus::OpenedAutoClickAttempted => "opened_auto_click_attempted",
            SendStatus::Failed => "failed",
            SendStatus::AutoClickFailed => "auto_click_failed",
        }
    }

    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            SendStatus::SentAutomatically | SendStatus::OpenedAutoClickAttempted => AttemptOutcome::Sent,
            SendStatus::Failed | SendStatus::AutoClickFailed => AttemptOutcome::Failed,
        }
    }
}

impl FromStr for SendStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent_automatically" => Ok(SendStatus::SentAutomatically),
            "opened_auto_click_attempted" => Ok(SendStatus::OpenedAutoClickAttempted),
            "failed" => Ok(SendStatus::Failed),
            "auto_click_failed" => Ok(SendStatus::AutoClickFailed),
            _ => Err(()),
        }
    }
}

/// One full compose, locate, tap and verify cycle for a single message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAttempt {
    pub id: String,
    pub message: OutboundMessage,
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap_point: Option<Point>,
    pub outcome: AttemptOutcome,
    pub status: SendStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub verify_rounds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Files retained for diagnosis; only populated on failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    /// Whether the history record was written
    pub recorded: bool,
}

impl SendAttempt {
    pub fn is_sent(&self) -> bool {
        self.outcome == AttemptOutcome::Sent
    }
}

/// An attempt still in flight
///
/// Finishing consumes it, so the terminal state is written exactly once.
#[derive(Debug)]
pub struct PendingAttempt {
    pub id: String,
    message: OutboundMessage,
    device: Device,
    started_at: DateTime<Utc>,
    strategy_used: Option<Tier>,
    tap_point: Option<Point>,
    verify_rounds: u32,
}

impl PendingAttempt {
    pub fn start(message: OutboundMessage, device: Device) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message,
            device,
            started_at: Utc::now(),
            strategy_used: None,
            tap_point: None,
            verify_rounds: 0,
        }
    }

    pub fn message(&self) -> &OutboundMessage {
        &self.message
    }

    /// Remember the candidate about to be tapped
    pub fn tapping(&mut self, tier: Tier, point: Point) {
        self.strategy_used = Some(tier);
        self.tap_point = Some(point);
    }

    pub fn count_verify_round(&mut self) {
        self.verify_rounds += 1;
    }

    pub fn sent(self, status: SendStatus) -> SendAttempt {
        debug_assert_eq!(status.outcome(), AttemptOutcome::Sent);
        self.finish(status, None, Vec::new())
    }

    pub fn failed(self, status: SendStatus, error: String, evidence: Vec<String>) -> SendAttempt {
        debug_assert_eq!(status.outcome(), AttemptOutcome::Failed);
        self.finish(status, Some(error), evidence)
    }

    fn finish(self, status: SendStatus, error: Option<String>, evidence: Vec<String>) -> SendAttempt {
        SendAttempt {
            id: self.id,
            message: self.message,
            device: self.device,
            strategy_used: self.strategy_used,
            tap_point: self.tap_point,
            outcome: status.outcome(),
            status,
            started_at: self.started_at,
            completed_at: Utc::now(),
            verify_rounds: self.verify_rounds,
            error,
            evidence,
            recorded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ConnectionState;
    use crate::models::ContactFields;

    fn pending() -> PendingAttempt {
        let message = OutboundMessage::new(
            "5551234567".to_string(),
            "Hi Jane".to_string(),
            Some("contact-7".to_string()),
            ContactFields::default(),
        );
        let device = Device {
            id: "emu".to_string(),
            display_name: "emu".to_string(),
            connection_state: ConnectionState::Connected,
        };
        PendingAttempt::start(message, device)
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            SendStatus::SentAutomatically,
            SendStatus::OpenedAutoClickAttempted,
            SendStatus::Failed,
            SendStatus::AutoClickFailed,
        ] {
            assert_eq!(status.as_str().parse::<SendStatus>(), Ok(status));
        }
        assert!("delivered".parse::<SendStatus>().is_err());
    }

    #[test]
    fn test_finishing_records_candidate_and_outcome() {
        let mut attempt = pending();
        attempt.tapping(Tier::ExactText, Point::new(875, 1440));
        attempt.count_verify_round();

        let done = attempt.sent(SendStatus::OpenedAutoClickAttempted);
        assert!(done.is_sent());
        assert_eq!(done.strategy_used, Some(Tier::ExactText));
        assert_eq!(done.tap_point, Some(Point::new(875, 1440)));
        assert_eq!(done.verify_rounds, 1);
        assert!(done.completed_at >= done.started_at);
        assert!(done.evidence.is_empty());
    }

    #[test]
    fn test_failed_attempt_keeps_error_and_evidence() {
        let done = pending().failed(
            SendStatus::AutoClickFailed,
            "no send control".to_string(),
            vec!["/tmp/a/hierarchy.xml".to_string()],
        );
        assert_eq!(done.outcome, AttemptOutcome::Failed);
        assert_eq!(done.error.as_deref(), Some("no send control"));
        assert_eq!(done.evidence.len(), 1);
        assert_eq!(done.strategy_used, None);
    }
}
