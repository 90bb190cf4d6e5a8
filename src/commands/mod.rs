//! Command handlers for the CLI
//!
//! - `session` -- login, logout, and status
//! - `request` -- authenticated requests through the dispatcher

pub mod request;
pub mod session;
