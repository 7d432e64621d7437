//! Tamper-evident ledger for genetic records.
//!
//! Records are chained into hash-linked blocks, copied onto several in-memory
//! replicas, and checked both by walking each chain and by a majority vote
//! over block hashes across replicas. Payloads are kept encoded and only
//! decoded for an authenticated admin or a holder of an admin-issued key.

pub mod access;
pub mod audit;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod error;
pub mod ledger;
pub mod model;
pub mod replica;
pub mod routes;
pub mod session;
pub mod tamper;

pub use access::{AccessError, AccessGateway, DecryptError, GatewayState};
pub use audit::{AuditLog, TamperRecord};
pub use codec::{Codec, DecodeError};
pub use consensus::{majority_hash, replica_status, ConsensusReport, MajorityHash, ReplicaStatus};
pub use error::GeneBlockError;
pub use ledger::{validate_chain, Ledger, LedgerError, ValidationResult};
pub use model::{recompute_hash, Block, BlockEdits, Metadata, Record};
pub use replica::{ReplicaError, ReplicaSet};
pub use session::{Session, SessionConfig};
pub use tamper::{Propagation, TamperAction, TamperError, TamperOptions};
