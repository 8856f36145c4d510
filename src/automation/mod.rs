//! Send pipeline
//!
//! `Autopilot` is the caller-facing facade. Each message runs through
//! `RetryController`, which composes on the device, asks `SendButtonLocator`
//! for tap candidates and lets `SendVerifier` judge the result.

pub mod batch;
pub mod controller;
pub mod evidence;
pub mod locator;
pub mod service;
pub mod verifier;

pub use batch::{BatchEvent, BatchHandle, BatchProgress, BatchSender, BatchStatus};
pub use controller::{AttemptState, RetryController};
pub use evidence::EvidenceStore;
pub use locator::{HeuristicPoint, LocatorExhausted, SendButtonLocator, SendCandidate};
pub use service::Autopilot;
pub use verifier::{SendVerifier, Verdict, VerificationMode};
