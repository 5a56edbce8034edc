//! Lazy walk of the credential history chain.
//!
//! Each link yields the previous password's hashes, which both unlock the
//! next link and serve as master-key candidates. The walk is pulled only as
//! far as a caller needs: an early hit on a master key stops it, and a
//! corrupt or cyclic chain ends it with a warning instead of an error.

use std::collections::HashSet;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::format::credhist::{CredHistFile, HistoryHashes};
use crate::format::guid::Guid;

/// Hashes recovered for one historical password.
pub(crate) struct ChainLink {
    pub(crate) guid: Guid,
    pub(crate) sha1: Zeroizing<Vec<u8>>,
    pub(crate) ntlm: Option<Zeroizing<Vec<u8>>>,
}

pub(crate) struct ChainWalk<'a> {
    file: &'a CredHistFile,
    index: usize,
    visited: HashSet<Guid>,
    /// SHA-1 that opens the entry at `index`; starts as the current
    /// credential's hash and becomes each recovered link's hash in turn.
    running: Zeroizing<Vec<u8>>,
    stopped: bool,
}

impl<'a> ChainWalk<'a> {
    pub(crate) fn new(file: &'a CredHistFile, start_sha1: &[u8]) -> Self {
        ChainWalk {
            file,
            index: 0,
            visited: HashSet::new(),
            running: Zeroizing::new(start_sha1.to_vec()),
            stopped: false,
        }
    }
}

impl Iterator for ChainWalk<'_> {
    type Item = ChainLink;

    fn next(&mut self) -> Option<ChainLink> {
        if self.stopped {
            return None;
        }
        let entry = self.file.entries.get(self.index)?;
        if !self.visited.insert(entry.guid) {
            warn!(guid = %entry.guid, "credential history repeats an entry, stopping walk");
            self.stopped = true;
            return None;
        }
        match entry.decrypt_with_hash(&self.running) {
            Ok(HistoryHashes { sha1, ntlm }) => {
                debug!(guid = %entry.guid, "recovered a history link");
                self.index += 1;
                self.running = Zeroizing::new(sha1.to_vec());
                Some(ChainLink {
                    guid: entry.guid,
                    sha1,
                    ntlm,
                })
            }
            Err(err) => {
                warn!(guid = %entry.guid, %err, "history entry failed to decrypt, stopping walk");
                self.stopped = true;
                None
            }
        }
    }
}
