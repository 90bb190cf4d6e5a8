//! Backend API access
//!
//! [`ApiClient`] is the single entry point UI collaborators use to talk to
//! the storefront backend. Requests are described with [`ApiRequest`] and
//! successful replies come back as [`ApiResponse`].

pub mod client;
pub mod request;

pub use client::ApiClient;
pub use request::{ApiRequest, ApiResponse, MAX_AUTH_RETRIES};
