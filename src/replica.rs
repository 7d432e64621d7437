//! Redundant in-memory copies of a ledger, one per simulated server.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::ledger::Ledger;

/// Replica ids used when none are configured.
pub const DEFAULT_REPLICA_IDS: [&str; 3] = ["Server 1", "Server 2", "Server 3"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicaError {
    #[error("at least one replica id is required")]
    NoReplicas,
    #[error("replica id {0:?} given more than once")]
    DuplicateReplica(String),
    #[error("unknown replica {0:?}")]
    UnknownReplica(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReplicaSet {
    replicas: BTreeMap<String, Ledger>,
}

impl ReplicaSet {
    /// Deep-copy `ledger` once per id.
    pub fn fork<I, S>(ledger: &Ledger, ids: I) -> Result<ReplicaSet, ReplicaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut replicas = BTreeMap::new();
        for id in ids {
            let id = id.into();
            if replicas.contains_key(&id) {
                return Err(ReplicaError::DuplicateReplica(id));
            }
            replicas.insert(id, ledger.clone());
        }
        if replicas.is_empty() {
            return Err(ReplicaError::NoReplicas);
        }
        info!(replicas = replicas.len(), blocks = ledger.len(), "replicas forked");
        Ok(ReplicaSet { replicas })
    }

    pub fn get(&self, id: &str) -> Result<&Ledger, ReplicaError> {
        self.replicas
            .get(id)
            .ok_or_else(|| ReplicaError::UnknownReplica(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut Ledger, ReplicaError> {
        self.replicas
            .get_mut(id)
            .ok_or_else(|| ReplicaError::UnknownReplica(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.replicas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Ledger)> {
        self.replicas.iter().map(|(id, l)| (id.as_str(), l))
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::model::Record;

    fn ledger() -> Ledger {
        Ledger::build_at(
            &[Record::patient("P001", "ATCG"), Record::patient("P002", "GGCT")],
            &Codec::new(),
            "2023-08-01T00:00:00Z",
        )
        .unwrap()
    }

    #[test]
    fn fork_copies_the_ledger_per_id() {
        let base = ledger();
        let set = ReplicaSet::fork(&base, DEFAULT_REPLICA_IDS).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.ids().collect::<Vec<_>>(), DEFAULT_REPLICA_IDS);
        for (_, replica) in set.iter() {
            assert_eq!(replica, &base);
        }
    }

    #[test]
    fn fork_rejects_empty_and_duplicate_ids() {
        let base = ledger();
        assert_eq!(
            ReplicaSet::fork(&base, Vec::<String>::new()),
            Err(ReplicaError::NoReplicas)
        );
        assert_eq!(
            ReplicaSet::fork(&base, ["A", "B", "A"]),
            Err(ReplicaError::DuplicateReplica("A".into()))
        );
    }

    #[test]
    fn unknown_replica_lookup_fails() {
        let set = ReplicaSet::fork(&ledger(), ["A"]).unwrap();
        assert_eq!(
            set.get("B"),
            Err(ReplicaError::UnknownReplica("B".into()))
        );
    }
}
