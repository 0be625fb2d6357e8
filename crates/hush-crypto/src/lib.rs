#![forbid(unsafe_code)]

pub mod hash;
pub mod transcript;
pub mod identity;
pub mod sas;

pub mod envelope;
pub mod utils;

#[cfg(test)]
mod proptests;
