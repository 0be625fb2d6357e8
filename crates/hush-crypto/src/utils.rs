//! Constant-time comparison helpers.
//!
//! Used wherever key material or key identifiers are compared, so the
//! comparison time does not reveal how many leading bytes matched.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time. Slices of different length are unequal.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Compare two fixed-size arrays in constant time.
///
/// ```rust
/// use hush_crypto::utils::constant_time_compare_array;
///
/// let key1 = [0u8; 32];
/// let key2 = [0u8; 32];
/// assert!(constant_time_compare_array(&key1, &key2));
///
/// let key3 = [1u8; 32];
/// assert!(!constant_time_compare_array(&key1, &key3));
/// ```
pub fn constant_time_compare_array<const N: usize>(a: &[u8; N], b: &[u8; N]) -> bool {
    constant_time_eq(a, b)
}
