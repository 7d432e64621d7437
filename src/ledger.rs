//! The in-memory hash-linked ledger and its chain validator.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::codec::Codec;
use crate::model::{now_rfc3339, Block, Record, GENESIS_PREV_HASH};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("a ledger needs at least one record")]
    Empty,
    #[error("block index {found} does not fit a ledger of {len} blocks")]
    NonContiguousIndex { len: usize, found: u64 },
    #[error("time format error: {0}")]
    Clock(#[from] time::error::Format),
}

/// Ordered sequence of blocks; `blocks[0]` is genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Ledger {
    /// Build from records, stamping each block with the current time.
    pub fn build(records: &[Record], codec: &Codec) -> Result<Ledger, LedgerError> {
        Self::build_with(records, codec, || Ok(now_rfc3339()?))
    }

    /// Build with one fixed timestamp for every block. Deterministic.
    pub fn build_at(
        records: &[Record],
        codec: &Codec,
        timestamp: &str,
    ) -> Result<Ledger, LedgerError> {
        Self::build_with(records, codec, || Ok(timestamp.to_string()))
    }

    fn build_with<F>(
        records: &[Record],
        codec: &Codec,
        mut stamp: F,
    ) -> Result<Ledger, LedgerError>
    where
        F: FnMut() -> Result<String, LedgerError>,
    {
        let (first, rest) = records.split_first().ok_or(LedgerError::Empty)?;
        let genesis = Block::new(
            0,
            stamp()?,
            first.metadata.clone(),
            &first.payload,
            GENESIS_PREV_HASH,
            codec,
        );
        let mut ledger = Ledger {
            blocks: vec![genesis],
        };
        for record in rest {
            let ts = stamp()?;
            ledger.push(record, codec, ts);
        }
        debug!(blocks = ledger.len(), "ledger built");
        Ok(ledger)
    }

    /// Append a block linked to the current tip.
    pub fn append(&mut self, record: &Record, codec: &Codec) -> Result<&Block, LedgerError> {
        let ts = now_rfc3339()?;
        Ok(self.push(record, codec, ts))
    }

    fn push(&mut self, record: &Record, codec: &Codec, timestamp: String) -> &Block {
        let index = self.blocks.len() as u64;
        let prev = self
            .blocks
            .last()
            .map(|b| b.hash().to_string())
            .unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
        self.blocks.push(Block::new(
            index,
            timestamp,
            record.metadata.clone(),
            &record.payload,
            prev,
            codec,
        ));
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn position(&self, index: u64) -> Result<usize, LedgerError> {
        usize::try_from(index)
            .ok()
            .filter(|&p| p < self.blocks.len())
            .ok_or(LedgerError::NonContiguousIndex {
                len: self.blocks.len(),
                found: index,
            })
    }

    /// Swap in a new value for the block at `position`.
    pub(crate) fn replace(&mut self, position: u64, block: Block) -> Result<(), LedgerError> {
        let p = self.position(position)?;
        self.blocks[p] = block;
        Ok(())
    }

    /// Drop the block at `position`; later blocks shift down unchanged.
    pub(crate) fn remove(&mut self, position: u64) -> Result<Block, LedgerError> {
        let p = self.position(position)?;
        Ok(self.blocks.remove(p))
    }

    /// Walk the chain and report the first point of divergence.
    pub fn validate(&self) -> ValidationResult {
        validate_chain(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// `previous_hash` differs from the predecessor's hash.
    LinkMismatch,
    /// Genesis does not carry the zero sentinel.
    GenesisNotAnchored,
    /// Block index differs from its position.
    IndexMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub index: u64,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub first_divergence_index: Option<u64>,
    pub violations: Vec<Violation>,
}

/// Verify content hashes and linkages in index order.
pub fn validate_chain(ledger: &Ledger) -> ValidationResult {
    let mut violations = vec![];

    for (i, b) in ledger.blocks().iter().enumerate() {
        let index = i as u64;

        if b.index() != index {
            violations.push(Violation {
                index,
                kind: ViolationKind::IndexMismatch,
            });
        }

        // block hash
        if !b.is_consistent() {
            violations.push(Violation {
                index,
                kind: ViolationKind::HashMismatch,
            });
        }

        // linkage
        if i > 0 {
            let prev = &ledger.blocks()[i - 1];
            if b.previous_hash() != prev.hash() {
                violations.push(Violation {
                    index,
                    kind: ViolationKind::LinkMismatch,
                });
            }
        } else if b.previous_hash() != GENESIS_PREV_HASH {
            violations.push(Violation {
                index,
                kind: ViolationKind::GenesisNotAnchored,
            });
        }
    }

    ValidationResult {
        valid: violations.is_empty(),
        first_divergence_index: violations.first().map(|v| v.index),
        violations,
    }
}
