//! Parley core - domain model and session controller for the interactive
//! chat client.
//!
//! The crate is transport-agnostic: everything network-facing goes through
//! the [`session::BackendGateway`] trait, implemented over HTTP in
//! `parley-gateway`.

pub mod error;
pub mod session;

// Re-export common error type
pub use error::ClientError;
