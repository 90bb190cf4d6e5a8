//! Credential storage, token refresh, and session lifecycle
//!
//! Submodules:
//!
//! - [`token_store`] -- tolerant persistence of the access/refresh token pair.
//! - [`refresh`] -- one refresh round-trip against the backend.
//! - [`coordinator`] -- single-flight refresh shared by concurrent requests.
//! - [`session`] -- broadcast of login, logout, and forced-logout events.
//! - [`service`] -- login and logout.

pub mod coordinator;
pub mod refresh;
pub mod service;
pub mod session;
pub mod token_store;

pub use coordinator::RefreshCoordinator;
pub use refresh::{HttpTokenRefresher, TokenRefresher};
pub use service::AuthService;
pub use session::{SessionEvent, SessionSignal};
pub use token_store::{CredentialBackend, KeyringBackend, MemoryBackend, TokenKey, TokenStore};
