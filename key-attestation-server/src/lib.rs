//! HTTP hosting for the key attestation verifier.
//!
//! Devices `POST /attestation` with `{"challenge": ..., "certChain": [...]}`
//! and receive the JSON verdict produced by
//! [`key_attestation::AttestationVerifier`].

pub mod config;
pub mod constants;
pub mod errors;
pub mod server;
#[cfg(test)]
mod tests;

pub use config::ServerConfig;
pub use errors::{Result, ServerError};
pub use server::{router, serve, AppState};
