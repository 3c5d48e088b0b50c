//! Core type definitions for the moonbeam library
//!
//! This module defines fundamental types and protocol constants used
//! across multiple modules, providing a common location for shared
//! definitions.

// ============================================================================
// Fundamental Types
// ============================================================================

/// Type alias for 32-byte arrays used across cryptographic operations
pub type Bytes32 = [u8; 32];

/// Rolling digest over the payments accepted on a channel
///
/// Starts at all-zero and advances as `SHA256(payment || previous)` on
/// each accepted payment, so both parties derive the same chain
/// deterministically.
pub type PaymentsHash = Bytes32;

// ============================================================================
// Protocol Constants
// ============================================================================

/// Protocol version spoken by both roles
pub const PROTOCOL_VERSION: i64 = 1;

/// Minimum non-provably-prunable output value in satoshis
///
/// Outputs below this value are omitted from settlement transactions and
/// payments may not leave the receiver balance below it.
pub const DUST_THRESHOLD: i64 = 546;

/// Typical size of a cooperative close transaction in bytes
///
/// The absolute close fee is negotiated as `fee_rate * TYPICAL_CLOSE_TX_SIZE`.
pub const TYPICAL_CLOSE_TX_SIZE: i64 = 369;

/// Upper bound on the serialized size of a standard transaction
///
/// Larger transactions are valid by consensus but will not be relayed.
pub const MAX_STANDARD_TX_SIZE: usize = 100_000;

// ============================================================================
// Payment Bounds
// ============================================================================

/// Exclusive lower bound on payment blob size in bytes
pub const MIN_PAYMENT_SIZE: usize = 0;

/// Exclusive upper bound on payment blob size in bytes
pub const MAX_PAYMENT_SIZE: usize = 1 << 16;

/// Returns whether a payment blob size is within protocol bounds
pub fn validate_payment_size(size: usize) -> bool {
    size > MIN_PAYMENT_SIZE && size < MAX_PAYMENT_SIZE
}
