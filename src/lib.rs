//! Sends SMS through an attached Android device's messaging app
//!
//! The device is driven over its debugging bridge: the compose screen is
//! opened with a prefilled body, the send control is located in a UI
//! hierarchy dump, tapped and the result verified. Every attempt ends in
//! exactly one history record.

pub mod api;
pub mod automation;
pub mod compose;
pub mod config;
pub mod device;
pub mod error;
pub mod history;
pub mod models;
