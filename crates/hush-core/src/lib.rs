//! hush core - end-to-end encryption and key exchange for a relay-mediated messenger.
//!
//! This crate implements:
//! - Device identity store backed by a secure storage capability
//! - Public key directory client (publish / resolve through the relay)
//! - Envelope encryption engine with per-message ephemeral keys
//! - Key consistency tracking (key drift detection before decryption)
//! - MITM verification with short authentication strings
//! - A zero-knowledge harness that attacks real ciphertext through the relay

#![forbid(unsafe_code)]

// Components
pub mod device;
pub mod directory;
pub mod engine;
pub mod tracker;
pub mod verification;
pub mod harness;
pub mod messenger;

// Capabilities and external collaborators
pub mod secure_storage;
pub mod relay;

// Supporting modules
pub mod errors;
pub mod config;
pub mod audit;

// Optional relay transport
#[cfg(feature = "http-relay")]
pub mod http_relay;

pub use errors::CoreError;

#[cfg(test)]
mod proptests;
