//! Send history persistence
//!
//! One record per completed attempt. Records are never updated or deleted.

pub mod models;
pub mod repository;

pub use models::HistoryRecord;
pub use repository::HistoryStore;
