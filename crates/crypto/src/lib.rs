//! Pincraft Crypto
//!
//! Signing primitives for the operator identity. No dependency on any
//! ledger- or protocol-specific types.

pub mod keys;

pub use keys::{verify_detached, KeyError, SigningKeypair};
