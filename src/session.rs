//! One interaction context: canonical ledger, replicas, audit log and access
//! gateway, owned together instead of living in globals.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::access::{
    AccessError, AccessGateway, DecryptError, GatewayState, DEFAULT_ADMIN_CREDENTIAL,
};
use crate::audit::{AuditLog, TamperRecord};
use crate::codec::Codec;
use crate::consensus::{self, ConsensusReport, MajorityHash};
use crate::error::GeneBlockError;
use crate::ledger::{Ledger, ValidationResult};
use crate::model::{Block, BlockEdits, Metadata, Record};
use crate::replica::{ReplicaError, ReplicaSet, DEFAULT_REPLICA_IDS};
use crate::tamper::{self, TamperAction, TamperError, TamperOptions, TamperRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub admin_credential: String,
    pub replica_ids: Vec<String>,
    /// XOR-fold payloads with this key before base64.
    pub xor_key: Option<u8>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            admin_credential: DEFAULT_ADMIN_CREDENTIAL.to_string(),
            replica_ids: DEFAULT_REPLICA_IDS.iter().map(|s| s.to_string()).collect(),
            xor_key: None,
        }
    }
}

/// Plaintext view of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecryptedBlock {
    pub index: u64,
    pub metadata: Metadata,
    /// The payload, or the decode-failure sentinel.
    pub payload: String,
}

#[derive(Debug)]
pub struct Session {
    codec: Codec,
    replica_ids: Vec<String>,
    canonical: Arc<Ledger>,
    replicas: ReplicaSet,
    audit: AuditLog,
    gateway: AccessGateway,
}

impl Session {
    pub fn new(config: SessionConfig, records: &[Record]) -> Result<Session, GeneBlockError> {
        let codec = session_codec(&config);
        let canonical = Ledger::build(records, &codec)?;
        Self::from_ledger(config, canonical)
    }

    /// Session over the demo patient records.
    pub fn seeded(config: SessionConfig) -> Result<Session, GeneBlockError> {
        Self::new(config, &demo_records())
    }

    /// Session over an already built canonical ledger.
    pub fn from_ledger(config: SessionConfig, ledger: Ledger) -> Result<Session, GeneBlockError> {
        let codec = session_codec(&config);
        let replicas = ReplicaSet::fork(&ledger, config.replica_ids.iter().cloned())?;
        Ok(Session {
            codec,
            replica_ids: config.replica_ids,
            canonical: Arc::new(ledger),
            replicas,
            audit: AuditLog::new(),
            gateway: AccessGateway::new(config.admin_credential),
        })
    }

    /// Replace the canonical ledger and re-fork every replica from it.
    /// The audit log and gateway state carry over.
    pub fn rebuild(&mut self, records: &[Record]) -> Result<Arc<Ledger>, GeneBlockError> {
        let canonical = Ledger::build(records, &self.codec)?;
        let replicas = ReplicaSet::fork(&canonical, self.replica_ids.iter().cloned())?;
        info!(blocks = canonical.len(), "ledger rebuilt");
        self.canonical = Arc::new(canonical);
        self.replicas = replicas;
        Ok(Arc::clone(&self.canonical))
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn canonical(&self) -> Arc<Ledger> {
        Arc::clone(&self.canonical)
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    pub fn validate_canonical(&self) -> ValidationResult {
        self.canonical.validate()
    }

    pub fn validate_replica(&self, replica_id: &str) -> Result<ValidationResult, ReplicaError> {
        Ok(self.replicas.get(replica_id)?.validate())
    }

    pub fn tamper(
        &mut self,
        replica_id: &str,
        block_index: u64,
        edits: &BlockEdits,
        options: TamperOptions,
    ) -> Result<TamperRecord, TamperError> {
        tamper::tamper(
            &self.canonical,
            &mut self.replicas,
            &mut self.audit,
            &self.codec,
            &TamperRequest {
                replica_id,
                block_index,
                action: TamperAction::Edit(edits),
                options,
            },
        )
    }

    /// Delete one block from a replica; `options.propagation` decides whether
    /// later blocks are reindexed and relinked.
    pub fn remove_block(
        &mut self,
        replica_id: &str,
        block_index: u64,
        options: TamperOptions,
    ) -> Result<TamperRecord, TamperError> {
        tamper::tamper(
            &self.canonical,
            &mut self.replicas,
            &mut self.audit,
            &self.codec,
            &TamperRequest {
                replica_id,
                block_index,
                action: TamperAction::Remove,
                options,
            },
        )
    }

    pub fn is_edit_allowed(
        &self,
        replica_id: &str,
        block_index: u64,
    ) -> Result<bool, ReplicaError> {
        tamper::is_edit_allowed(&self.canonical, &self.replicas, replica_id, block_index)
    }

    pub fn majority_hash(&self, index: u64) -> MajorityHash {
        consensus::majority_hash(&self.replicas, index)
    }

    pub fn evaluate_consensus(&self) -> ConsensusReport {
        consensus::replica_status(&self.replicas)
    }

    pub fn audit_log(&self) -> &[TamperRecord] {
        self.audit.records()
    }

    pub fn gateway_state(&self) -> GatewayState {
        self.gateway.state()
    }

    pub fn authenticate_admin(&mut self, credential: &str) -> bool {
        self.gateway.authenticate_admin(credential)
    }

    pub fn issue_key(&mut self) -> Result<String, AccessError> {
        self.gateway.issue_key()
    }

    pub fn authorize_with_key(&mut self, candidate: &str) -> bool {
        self.gateway.authorize_with_key(candidate)
    }

    pub fn sign_out(&mut self) {
        self.gateway.sign_out()
    }

    pub fn decrypt_payload(&self, block: &Block) -> Result<String, DecryptError> {
        self.gateway.decrypt_payload(block, &self.codec)
    }

    /// A new unauthenticated caller sharing this session's credential and
    /// issued key.
    pub fn caller(&self) -> AccessGateway {
        self.gateway.caller()
    }

    /// Plaintext of every block in `ledger` for this session's own gateway.
    pub fn decrypt_ledger(&self, ledger: &Ledger) -> Result<Vec<DecryptedBlock>, AccessError> {
        self.decrypt_ledger_for(&self.gateway, ledger)
    }

    /// Plaintext of every block in `ledger` as seen by `caller`; undecodable
    /// payloads show the sentinel instead of failing the whole view.
    pub fn decrypt_ledger_for(
        &self,
        caller: &AccessGateway,
        ledger: &Ledger,
    ) -> Result<Vec<DecryptedBlock>, AccessError> {
        if !caller.can_decrypt() {
            return Err(AccessError::AuthorizationFailure);
        }
        Ok(ledger
            .blocks()
            .iter()
            .map(|b| DecryptedBlock {
                index: b.index(),
                metadata: b.metadata().clone(),
                payload: self.codec.decode_or_sentinel(b.payload()),
            })
            .collect())
    }
}

fn session_codec(config: &SessionConfig) -> Codec {
    config.xor_key.map_or_else(Codec::new, Codec::with_xor_key)
}

/// The three patient samples of the consensus demo.
pub fn demo_records() -> Vec<Record> {
    [
        ("P001", "2023-08-01", "S1", "ATGCTACGATCG"),
        ("P002", "2023-08-02", "S2", "GGGCTAGCTTAC"),
        ("P003", "2023-08-03", "S3", "TACGGGCTAGCA"),
    ]
    .into_iter()
    .map(|(patient, date, sample, dna)| {
        let mut metadata = Metadata::new();
        metadata.insert("Patient ID".to_string(), patient.to_string());
        metadata.insert("Test Date".to_string(), date.to_string());
        metadata.insert("Sample Code".to_string(), sample.to_string());
        Record::new(metadata, dna)
    })
    .collect()
}
