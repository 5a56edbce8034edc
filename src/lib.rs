pub mod cli;
pub mod config;
pub mod crypto;
pub mod decrypt;
pub mod errors;
pub mod format;
pub mod pool;
