//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, metrics and timing.
//!
//! ## Components
//! - **Crypto**: ChaCha20-Poly1305 / XChaCha20-Poly1305 payload sealing
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe per-role counters
//! - **Timeout**: Async timeout wrappers and default intervals
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom) for nonces
//! - Derived key material is zeroed after cipher setup (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod timeout;
