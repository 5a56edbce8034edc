//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use clap::Parser;
use zeroize::Zeroizing;

use crate::config::UnlockOptions;
use crate::errors::{DpapiError, Result};
use crate::pool::{HashContext, MasterKeyPool, UnlockOutcome};

/// unprotect CLI: offline DPAPI master key and secret recovery.
#[derive(Parser)]
#[command(
    name = "unprotect",
    about = "Offline DPAPI master key and secret recovery",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments every subcommand shares: where the master key files live and
/// which identity owns them.
#[derive(clap::Args)]
pub struct PoolArgs {
    /// Master key directory (e.g. .../Roaming/Microsoft/Protect/<SID>)
    #[arg(long, value_name = "DIR")]
    pub masterkeys: PathBuf,

    /// Owner SID; inferred from the directory path when omitted
    #[arg(long)]
    pub sid: Option<String>,

    /// CREDHIST file for password-change fallback
    #[arg(long, value_name = "FILE")]
    pub credhist: Option<PathBuf>,
}

/// Credential source for unlocking: one of three flags, or an interactive
/// prompt when none is given.
#[derive(clap::Args)]
pub struct CredentialArgs {
    /// Account password
    #[arg(long, env = "UNPROTECT_PASSWORD")]
    pub password: Option<String>,

    /// SHA-1 or NTLM password hash, hex-encoded
    #[arg(long, value_name = "HEX", conflicts_with = "password")]
    pub pwhash: Option<String>,

    /// File with one candidate password per line
    #[arg(long, value_name = "FILE", conflicts_with_all = ["password", "pwhash"])]
    pub wordlist: Option<PathBuf>,
}

/// Credential context for the `$DPAPImk$` export.
#[derive(Clone, Copy, clap::ValueEnum)]
pub enum ContextArg {
    /// Local account password
    Local,
    /// Domain account, pre-1607 derivation
    Domain,
    /// Domain account on Windows 10 1607 or later
    #[value(name = "domain1607")]
    Domain1607,
}

impl From<ContextArg> for HashContext {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Local => HashContext::Local,
            ContextArg::Domain => HashContext::Domain,
            ContextArg::Domain1607 => HashContext::Domain1607,
        }
    }
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Unlock master key files with a password, hash, or wordlist
    Unlock {
        #[command(flatten)]
        pool: PoolArgs,

        #[command(flatten)]
        credential: CredentialArgs,

        /// Stop a wordlist run after this many candidates
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// Stop a wordlist run after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,

        /// Include recovered master key bytes in the output
        #[arg(long)]
        show_keys: bool,
    },

    /// Print a crackable $DPAPImk$ line for the preferred master key
    Hash {
        #[command(flatten)]
        pool: PoolArgs,

        /// Credential context of the target account
        #[arg(long, value_enum, default_value = "local")]
        context: ContextArg,
    },

    /// Decrypt one CryptProtectData blob file
    Blob {
        #[command(flatten)]
        pool: PoolArgs,

        #[command(flatten)]
        credential: CredentialArgs,

        /// Blob file to decrypt
        file: PathBuf,

        /// Entropy the protecting application supplied, hex-encoded
        #[arg(long, value_name = "HEX")]
        entropy: Option<String>,

        /// Write the raw plaintext here instead of printing it
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Decrypt a Credential Manager file
    Cred {
        #[command(flatten)]
        pool: PoolArgs,

        #[command(flatten)]
        credential: CredentialArgs,

        /// Credential file to decrypt
        file: PathBuf,

        /// Print the credential as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decrypt every item in a Windows Vault directory
    Vault {
        #[command(flatten)]
        pool: PoolArgs,

        #[command(flatten)]
        credential: CredentialArgs,

        /// Vault directory (holds Policy.vpol and *.vcrd files)
        dir: PathBuf,

        /// Print the items as JSON
        #[arg(long)]
        json: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Build and load the pool from the shared arguments: fix the SID, load
/// the master key directory, attach the CREDHIST chain when given.
pub fn build_pool(args: &PoolArgs) -> Result<MasterKeyPool> {
    let sid = match &args.sid {
        Some(sid) => sid.clone(),
        None => infer_sid(&args.masterkeys)?,
    };
    let mut pool = MasterKeyPool::new(&sid)?;
    pool.load_directory(&args.masterkeys)?;
    if let Some(path) = &args.credhist {
        pool.add_credhist_file(path)?;
    }
    Ok(pool)
}

/// Unlock the pool with whichever credential flag was given, falling back
/// to an interactive prompt. Returns one outcome per loaded file.
pub fn unlock_pool(
    pool: &MasterKeyPool,
    credential: &CredentialArgs,
    options: &UnlockOptions,
) -> Result<Vec<UnlockOutcome>> {
    if let Some(password) = &credential.password {
        return Ok(pool.try_credential(password));
    }
    if let Some(hash_hex) = &credential.pwhash {
        let hash = hex::decode(hash_hex)?;
        return pool.try_credential_hash(&hash);
    }
    if let Some(path) = &credential.wordlist {
        let words = std::fs::read_to_string(path)?;
        return Ok(pool.try_wordlist(words.lines(), options));
    }
    let password = prompt_password()?;
    Ok(pool.try_credential(&password))
}

/// Interactive password prompt, used when no credential flag is given.
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    let pw = dialoguer::Password::new()
        .with_prompt("Windows account password")
        .interact()
        .map_err(|e| DpapiError::Prompt(e.to_string()))?;
    Ok(Zeroizing::new(pw))
}

/// Pull the owner SID out of the directory path. Windows lays master keys
/// out as `Protect\<SID>\<guid files>`, so the SID is normally the last
/// path component.
fn infer_sid(dir: &Path) -> Result<String> {
    dir.components()
        .rev()
        .find_map(|c| {
            let name = c.as_os_str().to_str()?;
            name.starts_with("S-1-").then(|| name.to_string())
        })
        .ok_or_else(|| {
            DpapiError::InvalidSid(format!(
                "{} (no S-1-* component; pass --sid)",
                dir.display()
            ))
        })
}
