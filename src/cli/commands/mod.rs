//! Subcommand implementations, one module per command.

pub mod blob;
pub mod cred;
pub mod hash;
pub mod unlock;
pub mod vault;
