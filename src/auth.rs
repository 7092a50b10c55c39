//! Request authentication and anti-replay.
//!
//! # Submodules
//!
//! - [`nonce`]: file-backed nonce map with TTL purge
//! - [`guard`]: token, allow-list, skew and nonce checks in one pass
mod guard;
mod nonce;

pub use guard::{parse_timestamp, AuthGuard};
pub use nonce::NonceStore;
