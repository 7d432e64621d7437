//! Tamper simulation against a single replica.
//!
//! A tamper either replaces one block with an edited copy or removes it.
//! The [`Propagation`] policy decides what happens to the blocks after it.
//! Every successful call leaves exactly one [`TamperRecord`] in the audit
//! log; a rejected call changes nothing.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::audit::{AuditLog, TamperRecord};
use crate::codec::Codec;
use crate::ledger::{Ledger, LedgerError};
use crate::model::{now_rfc3339, Block, BlockEdits, GENESIS_PREV_HASH};
use crate::replica::{ReplicaError, ReplicaSet};

/// How a tampered block's new hash affects the blocks after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Rehash the block and rewrite every downstream link. The replica stays
    /// internally valid; only consensus exposes it.
    #[default]
    Cascade,
    /// Rehash the block only; the next block's link breaks. A removal leaves
    /// the following blocks untouched.
    Isolated,
    /// Change the fields but keep the stale hash. A removal shifts later
    /// indices down without rehashing.
    Unhashed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperOptions {
    #[serde(default)]
    pub propagation: Propagation,
    /// Refuse edits behind an earlier block that already differs from the
    /// canonical ledger.
    #[serde(default)]
    pub enforce_edit_guard: bool,
}

#[derive(Debug, Error)]
pub enum TamperError {
    #[error("block {index} is outside replica {replica_id:?} (len {len})")]
    InvalidEditTarget {
        replica_id: String,
        index: u64,
        len: usize,
    },
    #[error("an earlier block of replica {replica_id:?} already differs from the canonical ledger")]
    EditGuardViolation { replica_id: String, index: u64 },
    #[error("no metadata or payload edits given")]
    EmptyEdit,
    #[error("cannot remove the only block of replica {replica_id:?}")]
    LastBlock { replica_id: String },
    #[error(transparent)]
    Replica(#[from] ReplicaError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<time::error::Format> for TamperError {
    fn from(e: time::error::Format) -> Self {
        TamperError::Ledger(LedgerError::Clock(e))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TamperAction<'a> {
    Edit(&'a BlockEdits),
    Remove,
}

pub struct TamperRequest<'a> {
    pub replica_id: &'a str,
    pub block_index: u64,
    pub action: TamperAction<'a>,
    pub options: TamperOptions,
}

/// Allowed iff every block before `block_index` in the replica still matches
/// the canonical block at the same position and its own stored hash. A UX
/// guard, not an integrity control.
pub fn is_edit_allowed(
    canonical: &Ledger,
    replicas: &ReplicaSet,
    replica_id: &str,
    block_index: u64,
) -> Result<bool, ReplicaError> {
    let replica = replicas.get(replica_id)?;
    let before = usize::try_from(block_index).unwrap_or(usize::MAX);
    let tampered_before = replica
        .blocks()
        .iter()
        .take(before)
        .enumerate()
        .any(|(i, b)| {
            canonical.get(i as u64).map(Block::hash) != Some(b.hash()) || !b.is_consistent()
        });
    Ok(!tampered_before)
}

pub fn tamper(
    canonical: &Ledger,
    replicas: &mut ReplicaSet,
    audit: &mut AuditLog,
    codec: &Codec,
    req: &TamperRequest<'_>,
) -> Result<TamperRecord, TamperError> {
    if let TamperAction::Edit(edits) = req.action {
        if edits.is_empty() {
            return Err(TamperError::EmptyEdit);
        }
    }
    if req.options.enforce_edit_guard
        && !is_edit_allowed(canonical, replicas, req.replica_id, req.block_index)?
    {
        return Err(TamperError::EditGuardViolation {
            replica_id: req.replica_id.to_string(),
            index: req.block_index,
        });
    }

    let ledger = replicas.get_mut(req.replica_id)?;
    if ledger.get(req.block_index).is_none() {
        return Err(TamperError::InvalidEditTarget {
            replica_id: req.replica_id.to_string(),
            index: req.block_index,
            len: ledger.len(),
        });
    }
    let time = now_rfc3339()?;

    let propagation = req.options.propagation;
    let note = match req.action {
        TamperAction::Edit(edits) => {
            edit_block(ledger, req.block_index, edits, codec, propagation)?;
            describe(edits)
        }
        TamperAction::Remove => {
            if ledger.len() == 1 {
                return Err(TamperError::LastBlock {
                    replica_id: req.replica_id.to_string(),
                });
            }
            remove_block(ledger, req.block_index, propagation)?;
            "Block deleted.".to_string()
        }
    };

    let record = TamperRecord {
        replica_id: req.replica_id.to_string(),
        block_index: req.block_index,
        time,
        note,
        propagation,
    };
    warn!(
        replica = req.replica_id,
        block = req.block_index,
        ?propagation,
        action = ?req.action,
        "block tampered"
    );
    audit.append(record.clone());
    Ok(record)
}

fn edit_block(
    ledger: &mut Ledger,
    index: u64,
    edits: &BlockEdits,
    codec: &Codec,
    propagation: Propagation,
) -> Result<(), LedgerError> {
    let Some(target) = ledger.get(index) else {
        return Ok(());
    };

    // Build every replacement first so a failure leaves the replica untouched.
    let edited = target.tampered(edits, codec, propagation != Propagation::Unhashed);
    let mut replacements = vec![edited];
    if propagation == Propagation::Cascade {
        for block in ledger.blocks().iter().skip(index as usize + 1) {
            let prev = replacements[replacements.len() - 1].hash().to_string();
            replacements.push(block.relinked(&prev));
        }
    }
    for (position, block) in (index..).zip(replacements) {
        ledger.replace(position, block)?;
    }
    Ok(())
}

fn remove_block(
    ledger: &mut Ledger,
    index: u64,
    propagation: Propagation,
) -> Result<(), LedgerError> {
    let mut prev = match index.checked_sub(1).and_then(|i| ledger.get(i)) {
        Some(b) => b.hash().to_string(),
        None => GENESIS_PREV_HASH.to_string(),
    };
    let mut shifted = Vec::new();
    for (position, block) in (index..).zip(ledger.blocks().iter().skip(index as usize + 1)) {
        let moved = match propagation {
            Propagation::Cascade => block.reindexed(position, &prev, true),
            Propagation::Unhashed => block.reindexed(position, block.previous_hash(), false),
            Propagation::Isolated => break,
        };
        prev = moved.hash().to_string();
        shifted.push(moved);
    }

    ledger.remove(index)?;
    for (position, block) in (index..).zip(shifted) {
        ledger.replace(position, block)?;
    }
    Ok(())
}

fn describe(edits: &BlockEdits) -> String {
    let metadata = edits.metadata.as_ref().is_some_and(|m| !m.is_empty());
    match (metadata, edits.payload.is_some()) {
        (true, true) => "Metadata and payload manually tampered.",
        (true, false) => "Metadata manually tampered.",
        _ => "Payload manually tampered.",
    }
    .to_string()
}
