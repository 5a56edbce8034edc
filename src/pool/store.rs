//! The pool every decryptor consumes: one SID's master key files, their
//! unlock state, and the decrypted-key cache.
//!
//! Unlocking is the only expensive operation (thousands of KDF rounds per
//! candidate), so it runs once per file across scoped threads and the
//! results are cached for the lifetime of the pool. Everything downstream
//! (`resolve`, the blob/credential/vault decryptors) is a cache read.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::UnlockOptions;
use crate::crypto::kdf::{self, hash_candidates, password_candidates, sha1_prekey};
use crate::crypto::keys::MasterKey;
use crate::errors::{DpapiError, Result};
use crate::format::credhist::CredHistFile;
use crate::format::guid::Guid;
use crate::format::masterkey::{KeyDerivationRecord, MasterKeyFile, Preferred};
use crate::pool::chain::ChainWalk;
use crate::pool::export::{format_dpapi_hash, HashContext};

const PREFERRED_FILE_NAME: &str = "Preferred";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockStatus {
    Unlocked,
    Locked,
}

/// What kind of credential produced a key: the supplied password, the
/// supplied raw hash, or a hash recovered from the credential history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockMethod {
    Password,
    Hash,
    History,
}

/// Per-file result of an unlock batch. `method` is absent when the file
/// was already unlocked by an earlier call (or when reporting cache state),
/// `key` is absent whenever the file stayed locked.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockOutcome {
    pub guid: Guid,
    pub status: UnlockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<UnlockMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl UnlockOutcome {
    fn locked(guid: Guid) -> Self {
        UnlockOutcome {
            guid,
            status: UnlockStatus::Locked,
            method: None,
            key: None,
        }
    }

    fn unlocked(guid: Guid, method: Option<UnlockMethod>, key: &MasterKey) -> Self {
        UnlockOutcome {
            guid,
            status: UnlockStatus::Unlocked,
            method,
            key: Some(key.to_hex()),
        }
    }
}

/// All master key material for one SID.
pub struct MasterKeyPool {
    sid: String,
    files: BTreeMap<Guid, MasterKeyFile>,
    credhist: Option<CredHistFile>,
    preferred: Option<Preferred>,
    cache: Mutex<HashMap<Guid, MasterKey>>,
    /// Cleartext that unlocked the preferred key, when one did.
    unlock_password: Mutex<Option<Zeroizing<String>>>,
    attempts: AtomicU64,
}

impl MasterKeyPool {
    // ------------------------------------------------------------------
    // Construction and loading
    // ------------------------------------------------------------------

    /// Create an empty pool bound to `sid`. Every prekey is HMAC-bound to
    /// the SID, so it must be fixed before anything can be derived.
    pub fn new(sid: &str) -> Result<Self> {
        // The pattern is a literal; compilation cannot fail.
        let shape = Regex::new(r"^S-1-\d+(-\d+)+$").expect("SID pattern");
        if !shape.is_match(sid) {
            return Err(DpapiError::InvalidSid(sid.to_string()));
        }
        Ok(MasterKeyPool {
            sid: sid.to_string(),
            files: BTreeMap::new(),
            credhist: None,
            preferred: None,
            cache: Mutex::new(HashMap::new()),
            unlock_password: Mutex::new(None),
            attempts: AtomicU64::new(0),
        })
    }

    /// Load every master key file in `dir`, plus the `Preferred` marker if
    /// present. Unreadable entries are skipped with a warning; the count of
    /// files actually added is returned.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Err(DpapiError::NotADirectory(dir.to_path_buf()));
        }
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(file = %name, %err, "skipping unreadable file");
                    continue;
                }
            };
            if name.eq_ignore_ascii_case(PREFERRED_FILE_NAME) {
                match Preferred::parse(&bytes) {
                    Ok(p) => self.preferred = Some(p),
                    Err(err) => warn!(%err, "skipping unreadable Preferred marker"),
                }
                continue;
            }
            match MasterKeyFile::parse(&bytes) {
                Ok(file) => {
                    self.files.insert(file.guid, file);
                    loaded += 1;
                }
                Err(err) => warn!(file = %name, %err, "skipping non-masterkey file"),
            }
        }
        Ok(loaded)
    }

    /// Attach the CREDHIST chain used as a fallback when the supplied
    /// credential fails on a file directly.
    pub fn add_credhist_file(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        self.credhist = Some(CredHistFile::parse(&bytes)?);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn guids(&self) -> Vec<Guid> {
        self.files.keys().copied().collect()
    }

    /// GUID the `Preferred` marker points at, when one was loaded.
    pub fn preferred_guid(&self) -> Option<Guid> {
        self.preferred.as_ref().map(|p| p.guid)
    }

    pub fn loaded_count(&self) -> usize {
        self.files.len()
    }

    pub fn unlocked_count(&self) -> usize {
        self.cache_lock().len()
    }

    /// Number of history entries available for chain fallback.
    pub fn history_len(&self) -> usize {
        self.credhist.as_ref().map_or(0, |c| c.entries.len())
    }

    /// Total KDF attempts so far. Each candidate tried against each record
    /// counts once; cache hits count zero.
    pub fn derivation_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Current unlock state of every file, from the cache alone.
    pub fn status(&self) -> Vec<UnlockOutcome> {
        let cache = self.cache_lock();
        self.files
            .keys()
            .map(|guid| match cache.get(guid) {
                Some(key) => UnlockOutcome::unlocked(*guid, None, key),
                None => UnlockOutcome::locked(*guid),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Unlocking
    // ------------------------------------------------------------------

    /// Try a cleartext password against every loaded file: its SHA-1,
    /// NTLM, and Windows-10 prekeys directly, then the credential history
    /// for files still locked. One outcome per file, failures included.
    pub fn try_credential(&self, password: &str) -> Vec<UnlockOutcome> {
        let candidates = password_candidates(password, &self.sid);
        let start = sha1_prekey(password);
        let outcomes = self.run_batch(&candidates, &start, UnlockMethod::Password);

        // Remember the cleartext only if it opened the preferred key
        // itself; a history unlock means this is not the current password.
        if let Some(preferred) = self.preferred_guid() {
            let direct_hit = outcomes.iter().any(|o| {
                o.guid == preferred
                    && o.status == UnlockStatus::Unlocked
                    && o.method == Some(UnlockMethod::Password)
            });
            if direct_hit {
                *self.password_lock() = Some(Zeroizing::new(password.to_string()));
            }
        }
        outcomes
    }

    /// Same batch from a raw SHA-1 (20 byte) or NTLM (16 byte) hash.
    pub fn try_credential_hash(&self, hash: &[u8]) -> Result<Vec<UnlockOutcome>> {
        if hash.len() != 16 && hash.len() != 20 {
            return Err(DpapiError::InvalidHash(format!(
                "{} bytes (expected a 16-byte NTLM or 20-byte SHA-1 hash)",
                hash.len()
            )));
        }
        let candidates = hash_candidates(hash, &self.sid);
        Ok(self.run_batch(&candidates, hash, UnlockMethod::Hash))
    }

    /// Run a wordlist until everything is unlocked or the budget runs out,
    /// then report the cumulative state.
    pub fn try_wordlist<I, S>(&self, words: I, options: &UnlockOptions) -> Vec<UnlockOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started = Instant::now();
        let mut tried = 0usize;
        for word in words {
            if options.exhausted(tried, started) {
                debug!(tried, "unlock budget exhausted, abandoning remaining candidates");
                break;
            }
            let outcomes = self.try_credential(word.as_ref());
            tried += 1;
            if outcomes.iter().all(|o| o.status == UnlockStatus::Unlocked) {
                break;
            }
        }
        self.status()
    }

    // ------------------------------------------------------------------
    // Downstream access
    // ------------------------------------------------------------------

    /// Hand out a previously unlocked key. Never derives; repeat calls for
    /// the same GUID are pure cache reads, observable through
    /// `derivation_attempts`.
    pub fn resolve(&self, guid: &Guid) -> Result<MasterKey> {
        self.cache_lock()
            .get(guid)
            .cloned()
            .ok_or(DpapiError::KeyNotFound(*guid))
    }

    /// Crackable `$DPAPImk$` line for the preferred master key (or the
    /// first loaded one when no usable marker exists). No decryption.
    pub fn dpapi_hash(&self, context: HashContext) -> Result<String> {
        let guid = match self.preferred_guid() {
            Some(g) if self.files.contains_key(&g) => g,
            Some(g) => {
                warn!(guid = %g, "preferred master key is not in the pool, exporting the first loaded one");
                *self
                    .files
                    .keys()
                    .next()
                    .ok_or(DpapiError::PreferredKeyUnknown)?
            }
            None => *self
                .files
                .keys()
                .next()
                .ok_or(DpapiError::PreferredKeyUnknown)?,
        };
        let record = self
            .files
            .get(&guid)
            .and_then(MasterKeyFile::key_record)
            .ok_or(DpapiError::PreferredKeyUnknown)?;
        Ok(format_dpapi_hash(&self.sid, record, context))
    }

    /// The cleartext that unlocked the preferred master key, if any call
    /// to `try_credential` managed that. This is normally the Windows
    /// logon password.
    pub fn cleartext_password(&self) -> Option<Zeroizing<String>> {
        self.password_lock().clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// One unlock batch: direct candidates against every file in parallel,
    /// then history links, pulled lazily, for whatever stayed locked.
    fn run_batch(
        &self,
        candidates: &[Zeroizing<Vec<u8>>],
        chain_start_sha1: &[u8],
        method: UnlockMethod,
    ) -> Vec<UnlockOutcome> {
        // Phase 1: each file on its own scoped thread. The KDF dominates,
        // so this scales with the number of still-locked files.
        let mut outcomes: BTreeMap<Guid, UnlockOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .files
                .iter()
                .map(|(guid, file)| {
                    scope.spawn(move || self.attempt_direct(*guid, file, candidates, method))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(outcome) => (outcome.guid, outcome),
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        });

        // Phase 2: walk the history only as far as locked files remain.
        if let Some(credhist) = &self.credhist {
            let mut walk = ChainWalk::new(credhist, chain_start_sha1);
            while outcomes.values().any(|o| o.status == UnlockStatus::Locked) {
                let Some(link) = walk.next() else { break };
                let mut link_candidates = hash_candidates(&link.sha1, &self.sid);
                if let Some(ntlm) = &link.ntlm {
                    link_candidates.extend(hash_candidates(ntlm, &self.sid));
                }
                for outcome in outcomes.values_mut() {
                    if outcome.status != UnlockStatus::Locked {
                        continue;
                    }
                    let guid = outcome.guid;
                    let record = self.files.get(&guid).and_then(MasterKeyFile::key_record);
                    let Some(record) = record else { continue };
                    if let Some(key) = self.attempt_record(guid, record, &link_candidates) {
                        debug!(guid = %guid, link = %link.guid, "unlocked from a history link");
                        self.cache_key(guid, &key);
                        *outcome =
                            UnlockOutcome::unlocked(guid, Some(UnlockMethod::History), &key);
                    }
                }
            }
        }

        outcomes.into_values().collect()
    }

    fn attempt_direct(
        &self,
        guid: Guid,
        file: &MasterKeyFile,
        candidates: &[Zeroizing<Vec<u8>>],
        method: UnlockMethod,
    ) -> UnlockOutcome {
        if let Some(key) = self.cache_lock().get(&guid) {
            return UnlockOutcome::unlocked(guid, None, key);
        }
        let Some(record) = file.key_record() else {
            warn!(guid = %guid, "file carries no user key record, cannot unlock");
            return UnlockOutcome::locked(guid);
        };
        match self.attempt_record(guid, record, candidates) {
            Some(key) => {
                self.cache_key(guid, &key);
                UnlockOutcome::unlocked(guid, Some(method), &key)
            }
            None => UnlockOutcome::locked(guid),
        }
    }

    /// Try each candidate against one record, counting every derivation.
    fn attempt_record(
        &self,
        guid: Guid,
        record: &KeyDerivationRecord,
        candidates: &[Zeroizing<Vec<u8>>],
    ) -> Option<MasterKey> {
        for (index, candidate) in candidates.iter().enumerate() {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            match kdf::unlock_record(record, candidate) {
                Ok(key) => return Some(key),
                Err(DpapiError::WrongCredential) => {
                    debug!(guid = %guid, candidate = index, "candidate rejected");
                }
                Err(err) => {
                    debug!(guid = %guid, candidate = index, %err, "candidate failed structurally");
                }
            }
        }
        None
    }

    /// Idempotent: every successful derivation for a GUID converges on the
    /// same bytes, so first write wins.
    fn cache_key(&self, guid: Guid, key: &MasterKey) {
        self.cache_lock().entry(guid).or_insert_with(|| key.clone());
    }

    fn cache_lock(&self) -> MutexGuard<'_, HashMap<Guid, MasterKey>> {
        // A panicked thread cannot leave a partial insert behind.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn password_lock(&self) -> MutexGuard<'_, Option<Zeroizing<String>>> {
        self.unlock_password
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
