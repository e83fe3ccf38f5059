//! HTTP server for the NeuroGuard Consent Ledger (NCL).
//!
//! Exposes consent status, history, audit, and gate decisions over a small
//! REST API. Writes pass through a pluggable [`AuthProvider`]; reads are
//! open.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity, TokenAuth};
pub use config::{AuthConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::ConsentServer;
