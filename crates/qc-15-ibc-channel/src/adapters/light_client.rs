//! # Mock Light Client
//!
//! A [`ProofVerifier`] that tracks a counterparty chain by recording a copy
//! of its committed store at each height. Membership proofs are checked
//! against that copy, so a two-chain test harness exercises real proof
//! failures (stale heights, forged values) without Merkle proofs.
//!
//! Clones share state: the harness keeps one handle to feed updates while
//! the keeper owns another.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{ClientId, CommitmentProof, Height, Path, ProofError, Timestamp};
use crate::ports::{KeyValueStore, ProofVerifier};

use super::memory_store::InMemoryStore;

#[derive(Debug, Default)]
struct ClientState {
    latest: Height,
    consensus: BTreeMap<Height, ConsensusState>,
}

#[derive(Debug)]
struct ConsensusState {
    timestamp: Timestamp,
    root: InMemoryStore,
}

/// Light client backed by counterparty store snapshots.
#[derive(Clone, Debug, Default)]
pub struct MockLightClient {
    clients: Arc<RwLock<BTreeMap<ClientId, ClientState>>>,
}

impl MockLightClient {
    /// Create a light client with no clients registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the counterparty's committed store at `height`.
    ///
    /// Creates the client on first use. The latest height only moves forward.
    pub fn update_client(
        &self,
        client_id: &ClientId,
        height: Height,
        timestamp: Timestamp,
        root: InMemoryStore,
    ) {
        let mut clients = self.clients.write();
        let client = clients.entry(client_id.clone()).or_default();
        if height > client.latest {
            client.latest = height;
        }
        client
            .consensus
            .insert(height, ConsensusState { timestamp, root });
        debug!(
            "[qc-15] Light client {} updated to {} ({} keys)",
            client_id,
            height,
            client.consensus.get(&height).map_or(0, |c| c.root.len())
        );
    }

    fn with_root<T>(
        &self,
        client_id: &ClientId,
        height: Height,
        f: impl FnOnce(&InMemoryStore) -> Result<T, ProofError>,
    ) -> Result<T, ProofError> {
        let clients = self.clients.read();
        let client = clients
            .get(client_id)
            .ok_or_else(|| ProofError::ClientNotFound(client_id.clone()))?;
        let consensus =
            client
                .consensus
                .get(&height)
                .ok_or_else(|| ProofError::ConsensusStateNotFound {
                    client_id: client_id.clone(),
                    height,
                })?;
        f(&consensus.root)
    }
}

impl ProofVerifier for MockLightClient {
    fn latest_height(&self, client_id: &ClientId) -> Result<Height, ProofError> {
        self.clients
            .read()
            .get(client_id)
            .map(|c| c.latest)
            .ok_or_else(|| ProofError::ClientNotFound(client_id.clone()))
    }

    fn consensus_timestamp(
        &self,
        client_id: &ClientId,
        height: Height,
    ) -> Result<Timestamp, ProofError> {
        let clients = self.clients.read();
        let client = clients
            .get(client_id)
            .ok_or_else(|| ProofError::ClientNotFound(client_id.clone()))?;
        client
            .consensus
            .get(&height)
            .map(|c| c.timestamp)
            .ok_or_else(|| ProofError::ConsensusStateNotFound {
                client_id: client_id.clone(),
                height,
            })
    }

    fn verify_membership(
        &self,
        client_id: &ClientId,
        height: Height,
        proof: &CommitmentProof,
        path: &Path,
        value: &[u8],
    ) -> Result<(), ProofError> {
        if proof.is_empty() {
            return Err(ProofError::EmptyProof);
        }
        self.with_root(client_id, height, |root| {
            let key = path.to_key();
            match root.get(&key) {
                Ok(Some(stored)) if stored == value => Ok(()),
                _ => Err(ProofError::MembershipFailed {
                    path: path.to_string(),
                }),
            }
        })
    }

    fn verify_non_membership(
        &self,
        client_id: &ClientId,
        height: Height,
        proof: &CommitmentProof,
        path: &Path,
    ) -> Result<(), ProofError> {
        if proof.is_empty() {
            return Err(ProofError::EmptyProof);
        }
        self.with_root(client_id, height, |root| {
            let key = path.to_key();
            match root.exists(&key) {
                Ok(false) => Ok(()),
                _ => Err(ProofError::NonMembershipFailed {
                    path: path.to_string(),
                }),
            }
        })
    }
}
