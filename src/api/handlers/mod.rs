pub mod batch;
pub mod devices;
pub mod health;
pub mod history;
pub mod messages;
