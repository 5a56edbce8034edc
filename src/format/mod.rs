//! Parsers for the on-disk structures the engine consumes.
//!
//! Everything in here is a pure decoder over byte slices. File IO lives in
//! the pool and the CLI; parsers only validate shape and report precise
//! truncation or malformed-structure errors.

pub mod blob;
pub mod cred;
pub mod credhist;
pub mod guid;
pub mod masterkey;
pub(crate) mod reader;
pub mod vault;

// Re-export the types callers pass across module boundaries.
pub use blob::DpapiBlob;
pub use credhist::CredHistFile;
pub use guid::Guid;
pub use masterkey::{MasterKeyFile, Preferred};
