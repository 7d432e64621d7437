//! Crate-wide error type.

use thiserror::Error;

use crate::access::{AccessError, DecryptError};
use crate::codec::DecodeError;
use crate::ledger::LedgerError;
use crate::replica::ReplicaError;
use crate::tamper::TamperError;

/// Every failure the ledger core can report. None of them is fatal; callers
/// are expected to display them and carry on.
#[derive(Debug, Error)]
pub enum GeneBlockError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),
    #[error("tamper rejected: {0}")]
    Tamper(#[from] TamperError),
    #[error("access denied: {0}")]
    Access(#[from] AccessError),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

impl From<DecryptError> for GeneBlockError {
    fn from(e: DecryptError) -> Self {
        match e {
            DecryptError::Access(a) => GeneBlockError::Access(a),
            DecryptError::Decode(d) => GeneBlockError::Decode(d),
        }
    }
}
