//! Majority-hash consensus across replicas.
//!
//! Each block position is voted on independently: a hash wins only with a
//! strict majority of the whole replica set (`2 * votes > replicas`). A
//! replica missing a position casts no vote but still counts towards the
//! total. Votes are the hash of a block's current contents, so a block whose
//! stored hash went stale votes for what it actually holds. Nothing here is
//! cached; every call walks the replicas as they are right now.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ledger::Ledger;
use crate::model::recompute_hash;
use crate::replica::ReplicaSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "hash", rename_all = "snake_case")]
pub enum MajorityHash {
    Agreed(String),
    NoConsensus,
}

impl MajorityHash {
    pub fn agreed(&self) -> Option<&str> {
        match self {
            MajorityHash::Agreed(h) => Some(h),
            MajorityHash::NoConsensus => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplicaStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusReport {
    pub statuses: BTreeMap<String, ReplicaStatus>,
    /// Positions where no hash reached a strict majority.
    pub no_consensus: Vec<u64>,
    /// Majority hash per block position, up to the longest replica.
    pub majority: Vec<MajorityHash>,
}

impl ConsensusReport {
    pub fn status(&self, replica_id: &str) -> Option<ReplicaStatus> {
        self.statuses.get(replica_id).copied()
    }
}

fn content_hashes(ledger: &Ledger) -> Vec<String> {
    ledger.blocks().iter().map(recompute_hash).collect()
}

fn vote<'a>(hashes: impl IntoIterator<Item = &'a str>, total: usize) -> MajorityHash {
    // vote counts in first-seen order
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for hash in hashes {
        match tally.iter_mut().find(|(h, _)| *h == hash) {
            Some((_, n)) => *n += 1,
            None => tally.push((hash, 1)),
        }
    }

    tally
        .into_iter()
        .find(|&(_, votes)| 2 * votes > total)
        .map(|(h, _)| MajorityHash::Agreed(h.to_string()))
        .unwrap_or(MajorityHash::NoConsensus)
}

/// The hash held by a strict majority of replicas at `index`.
pub fn majority_hash(replicas: &ReplicaSet, index: u64) -> MajorityHash {
    let hashes: Vec<String> = replicas
        .iter()
        .filter_map(|(_, ledger)| ledger.get(index))
        .map(recompute_hash)
        .collect();
    vote(hashes.iter().map(String::as_str), replicas.len())
}

/// Classify each replica against the per-position majority.
pub fn replica_status(replicas: &ReplicaSet) -> ConsensusReport {
    let hashed: Vec<(&str, Vec<String>)> = replicas
        .iter()
        .map(|(id, ledger)| (id, content_hashes(ledger)))
        .collect();
    let depth = hashed.iter().map(|(_, h)| h.len()).max().unwrap_or(0);
    let majority: Vec<MajorityHash> = (0..depth)
        .map(|i| {
            let votes = hashed.iter().filter_map(|(_, h)| h.get(i)).map(String::as_str);
            vote(votes, replicas.len())
        })
        .collect();

    let no_consensus: Vec<u64> = majority
        .iter()
        .enumerate()
        .filter(|(_, m)| m.agreed().is_none())
        .map(|(i, _)| i as u64)
        .collect();
    if !no_consensus.is_empty() {
        warn!(positions = ?no_consensus, "no majority at some block positions");
    }

    let mut statuses = BTreeMap::new();
    for (id, hashes) in &hashed {
        let agrees = majority.iter().enumerate().all(|(i, m)| {
            match (m.agreed(), hashes.get(i)) {
                (Some(expected), Some(own)) => own == expected,
                _ => false,
            }
        });
        let status = if agrees {
            ReplicaStatus::Accepted
        } else {
            debug!(replica = id, "replica diverges from majority");
            ReplicaStatus::Rejected
        };
        statuses.insert(id.to_string(), status);
    }

    ConsensusReport {
        statuses,
        no_consensus,
        majority,
    }
}
