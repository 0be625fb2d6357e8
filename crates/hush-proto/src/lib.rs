//! Wire types shared by hush clients and the relay.
//!
//! Messages are declared with `prost` derives directly, so the crate needs no
//! protoc toolchain at build time. Field tags are stable and must never be
//! reused.

#![forbid(unsafe_code)]

pub mod v1;
pub mod conversions;
pub mod validation;

#[cfg(test)]
mod proptests;
