// Presentation layer - HTTP handlers and error mapping
pub mod app_state;
pub mod error;
pub mod handlers;
