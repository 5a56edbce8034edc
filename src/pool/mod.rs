//! Master key pool — per-SID key management.
//!
//! This module provides:
//! - the pool itself: loading, unlocking, caching (`store`)
//! - the lazy credential-history walk (`chain`)
//! - the crackable `$DPAPImk$` export (`export`)

mod chain;
pub mod export;
pub mod store;

// Re-export the most commonly used items.
pub use export::HashContext;
pub use store::{MasterKeyPool, UnlockMethod, UnlockOutcome, UnlockStatus};
