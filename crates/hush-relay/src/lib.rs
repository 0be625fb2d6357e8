//! hush-relay: untrusted relay for hush
//!
//! Stores published public key records (one current record per user device,
//! superseded records kept as history) and opaque envelope blobs. It never
//! sees plaintext or private keys.

pub mod api;
pub mod config;
pub mod registry;
pub mod server;
pub mod store;

pub use config::RelayConfig;
pub use server::RelayServer;
