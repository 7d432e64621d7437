//! Data model for genetic records and hash-linked blocks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::codec::Codec;

/// `previous_hash` of a genesis block: 64 zero hex digits.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Ordered key/value metadata (patient id, sample code, ...).
pub type Metadata = BTreeMap<String, String>;

/// One input record: metadata plus plaintext payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub metadata: Metadata,
    pub payload: String,
}

impl Record {
    pub fn new(metadata: Metadata, payload: impl Into<String>) -> Self {
        Self {
            metadata,
            payload: payload.into(),
        }
    }

    /// Record with a single `Patient ID` metadata entry.
    pub fn patient(patient_id: &str, payload: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("Patient ID".to_string(), patient_id.to_string());
        Self::new(metadata, payload)
    }
}

/// Field changes applied by a tamper. Metadata entries overwrite existing keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEdits {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub payload: Option<String>,
}

impl BlockEdits {
    pub fn payload(payload: impl Into<String>) -> Self {
        Self {
            metadata: None,
            payload: Some(payload.into()),
        }
    }

    pub fn metadata(entries: Metadata) -> Self {
        Self {
            metadata: Some(entries),
            payload: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none() && self.metadata.as_ref().map_or(true, |m| m.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// 0-indexed position in the ledger.
    index: u64,
    /// RFC3339 timestamp string.
    timestamp: String,
    metadata: Metadata,
    /// Codec token; the plaintext is never stored.
    payload: String,
    /// Hash of the previous block, [`GENESIS_PREV_HASH`] for genesis.
    previous_hash: String,
    /// SHA-256 hex over all of the above.
    hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: impl Into<String>,
        metadata: Metadata,
        payload: &str,
        previous_hash: impl Into<String>,
        codec: &Codec,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp: timestamp.into(),
            metadata,
            payload: codec.encode(payload),
            previous_hash: previous_hash.into(),
            hash: String::new(),
        };
        block.hash = recompute_hash(&block);
        block
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The encoded payload token.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Whether the stored hash matches the current fields.
    pub fn is_consistent(&self) -> bool {
        recompute_hash(self) == self.hash
    }

    /// New block value carrying `edits`. With `rehash` unset the stored hash
    /// is kept as-is and goes stale.
    pub(crate) fn tampered(&self, edits: &BlockEdits, codec: &Codec, rehash: bool) -> Block {
        let mut next = self.clone();
        if let Some(entries) = &edits.metadata {
            for (k, v) in entries {
                next.metadata.insert(k.clone(), v.clone());
            }
        }
        if let Some(payload) = &edits.payload {
            next.payload = codec.encode(payload);
        }
        if rehash {
            next.hash = recompute_hash(&next);
        }
        next
    }

    /// New block value pointing at `previous_hash`, rehashed.
    pub(crate) fn relinked(&self, previous_hash: &str) -> Block {
        let mut next = self.clone();
        next.previous_hash = previous_hash.to_string();
        next.hash = recompute_hash(&next);
        next
    }

    /// New block value moved to `index` behind `previous_hash`. Without
    /// `rehash` the stored hash still covers the old position.
    pub(crate) fn reindexed(&self, index: u64, previous_hash: &str, rehash: bool) -> Block {
        let mut next = self.clone();
        next.index = index;
        next.previous_hash = previous_hash.to_string();
        if rehash {
            next.hash = recompute_hash(&next);
        }
        next
    }
}

/// Hash inputs (concatenate as bytes, SHA-256) and return lowercase hex.
pub fn hash_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Compute a block hash from its current fields.
/// Variable-length fields are length-prefixed so distinct blocks cannot
/// collide by shifting bytes between neighbouring fields.
pub fn recompute_hash(b: &Block) -> String {
    let mut material = Vec::new();
    push_field(&mut material, b.timestamp.as_bytes());
    material.extend_from_slice(&(b.metadata.len() as u64).to_le_bytes());
    for (k, v) in &b.metadata {
        push_field(&mut material, k.as_bytes());
        push_field(&mut material, v.as_bytes());
    }
    push_field(&mut material, b.payload.as_bytes());
    push_field(&mut material, b.previous_hash.as_bytes());

    hash_concat(&[&b.index.to_le_bytes(), &material])
}

fn push_field(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u64).to_le_bytes());
    out.extend_from_slice(field);
}

/// Current UTC time as RFC3339.
pub fn now_rfc3339() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(&Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let mut metadata = Metadata::new();
        metadata.insert("Patient ID".into(), "P001".into());
        metadata.insert("Sample Code".into(), "S1".into());
        Block::new(
            0,
            "2023-08-01T00:00:00Z",
            metadata,
            "ATGCTACGATCG",
            GENESIS_PREV_HASH,
            &Codec::new(),
        )
    }

    #[test]
    fn new_block_is_consistent_and_hides_plaintext() {
        let block = sample_block();
        assert!(block.is_consistent());
        assert_ne!(block.payload(), "ATGCTACGATCG");
        assert_eq!(block.hash().len(), 64);
    }

    #[test]
    fn recompute_hash_is_pure() {
        let block = sample_block();
        assert_eq!(recompute_hash(&block), recompute_hash(&block));
        assert_eq!(recompute_hash(&block), block.hash());
    }

    #[test]
    fn every_field_feeds_the_hash() {
        let base = sample_block();
        let codec = Codec::new();

        let other_payload = base.tampered(&BlockEdits::payload("GGGG"), &codec, true);
        assert_ne!(other_payload.hash(), base.hash());

        let mut entries = Metadata::new();
        entries.insert("Sample Code".into(), "S9".into());
        let other_meta = base.tampered(&BlockEdits::metadata(entries), &codec, true);
        assert_ne!(other_meta.hash(), base.hash());

        let other_prev = base.relinked("ff");
        assert_ne!(other_prev.hash(), base.hash());
    }

    #[test]
    fn unhashed_tamper_leaves_stale_hash() {
        let base = sample_block();
        let stale = base.tampered(&BlockEdits::payload("HACKED"), &Codec::new(), false);
        assert_eq!(stale.hash(), base.hash());
        assert!(!stale.is_consistent());
    }

    #[test]
    fn metadata_edits_merge_into_existing_keys() {
        let base = sample_block();
        let mut entries = Metadata::new();
        entries.insert("Patient ID".into(), "P999".into());
        let edited = base.tampered(&BlockEdits::metadata(entries), &Codec::new(), true);
        assert_eq!(edited.metadata()["Patient ID"], "P999");
        assert_eq!(edited.metadata()["Sample Code"], "S1");
    }

    #[test]
    fn empty_edits() {
        assert!(BlockEdits::default().is_empty());
        assert!(BlockEdits::metadata(Metadata::new()).is_empty());
        assert!(!BlockEdits::payload("").is_empty());
    }
}
