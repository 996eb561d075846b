//! # Outbound Ports
//!
//! Traits for the collaborators the channel keeper depends on: the persisted
//! store, the light client proof oracle, the capability keeper, and the
//! applications bound to ports.

use crate::algorithms::intersect_versions;
use crate::domain::{
    Acknowledgement, CapabilityToken, ChannelError, ChannelId, ClientId, CommitmentProof,
    ConnectionId, Counterparty, Height, Order, Packet, Path, PortId, ProofError, RecvOutcome,
    StoreError, Timestamp,
};

/// Abstract interface for key-value storage operations.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Execute an atomic batch write. Either every operation is applied or none.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Light client proof oracle for the counterparty chain.
///
/// Proofs are checked against the consensus root the client stored for
/// `height`; the oracle never looks at local state.
pub trait ProofVerifier: Send + Sync {
    /// Latest counterparty height known to the client.
    fn latest_height(&self, client_id: &ClientId) -> Result<Height, ProofError>;

    /// Counterparty block time at `height`.
    fn consensus_timestamp(&self, client_id: &ClientId, height: Height)
        -> Result<Timestamp, ProofError>;

    /// Prove that `path` holds exactly `value` on the counterparty.
    fn verify_membership(
        &self,
        client_id: &ClientId,
        height: Height,
        proof: &CommitmentProof,
        path: &Path,
        value: &[u8],
    ) -> Result<(), ProofError>;

    /// Prove that `path` is absent on the counterparty.
    fn verify_non_membership(
        &self,
        client_id: &ClientId,
        height: Height,
        proof: &CommitmentProof,
        path: &Path,
    ) -> Result<(), ProofError>;
}

/// Capability keeper: exclusive ownership of ports and channel ends.
pub trait CapabilityAdapter: Send + Sync {
    /// Issue the capability for a port. Fails if the port is already bound.
    fn bind_port(&mut self, port_id: &PortId) -> Result<CapabilityToken, ChannelError>;

    /// Does `token` own `port_id`?
    fn authenticate_port(&self, token: &CapabilityToken, port_id: &PortId) -> bool;

    /// Issue the capability for a channel end. Fails if already bound.
    fn bind_new(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<CapabilityToken, ChannelError>;

    /// Does `token` own the channel end?
    fn authenticate(&self, token: &CapabilityToken, port_id: &PortId, channel_id: &ChannelId)
        -> bool;

    /// Has a capability been issued for the channel end?
    fn is_bound(&self, port_id: &PortId, channel_id: &ChannelId) -> bool;
}

/// Application callbacks, one implementation per application bound to a port.
///
/// Handshake and upgrade callbacks may veto by returning an error. Packet
/// callbacks report application failures through the acknowledgement.
pub trait ChannelModule: Send + Sync {
    /// Chain opening a channel. Returns the version to record.
    fn on_chan_open_init(
        &mut self,
        order: Order,
        connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty: &Counterparty,
        version: &str,
    ) -> Result<String, ChannelError>;

    /// Chain answering a counterparty `ChanOpenInit`. Returns the version to record.
    fn on_chan_open_try(
        &mut self,
        order: Order,
        connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty: &Counterparty,
        counterparty_version: &str,
    ) -> Result<String, ChannelError>;

    /// Initiator learns the counterparty's version.
    fn on_chan_open_ack(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty_channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), ChannelError>;

    /// Answering end is open.
    fn on_chan_open_confirm(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError>;

    /// Local close requested.
    fn on_chan_close_init(
        &mut self,
        _port_id: &PortId,
        _channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Counterparty closed.
    fn on_chan_close_confirm(
        &mut self,
        _port_id: &PortId,
        _channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Process an incoming packet.
    fn on_recv_packet(&mut self, packet: &Packet) -> RecvOutcome;

    /// The counterparty acknowledged a packet we sent.
    fn on_acknowledgement_packet(
        &mut self,
        packet: &Packet,
        acknowledgement: &Acknowledgement,
    ) -> Result<(), ChannelError>;

    /// A packet we sent timed out.
    fn on_timeout_packet(&mut self, packet: &Packet) -> Result<(), ChannelError>;

    /// A deferred acknowledgement for `packet` is about to be committed.
    /// Returns the acknowledgement to store; middleware wraps it here.
    fn on_write_acknowledgement(
        &mut self,
        _packet: &Packet,
        acknowledgement: Acknowledgement,
    ) -> Result<Acknowledgement, ChannelError> {
        Ok(acknowledgement)
    }

    /// Local upgrade proposal. Returns the (possibly adjusted) proposed version.
    fn on_chan_upgrade_init(
        &mut self,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _order: Order,
        _connection_hops: &[ConnectionId],
        version: &str,
    ) -> Result<String, ChannelError> {
        Ok(version.to_string())
    }

    /// Crossing hellos with different proposals: the version both `ours`
    /// and `theirs` accept, as a proposal this application understands.
    /// `None` when they have nothing in common.
    fn intersect_upgrade_versions(&self, ours: &str, theirs: &str) -> Option<String> {
        let common = intersect_versions(ours, theirs);
        if common.is_empty() {
            None
        } else {
            Some(common.join(","))
        }
    }

    /// Counterparty upgrade proposal. Returns the version this end accepts.
    fn on_chan_upgrade_try(
        &mut self,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _order: Order,
        _connection_hops: &[ConnectionId],
        counterparty_version: &str,
    ) -> Result<String, ChannelError> {
        Ok(counterparty_version.to_string())
    }

    /// Counterparty accepted our proposal with `counterparty_version`.
    fn on_chan_upgrade_ack(
        &mut self,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _counterparty_version: &str,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    /// The upgrade completed; the channel now runs with these parameters.
    fn on_chan_upgrade_open(
        &mut self,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _order: Order,
        _connection_hops: &[ConnectionId],
        _version: &str,
    ) {
    }
    /// The transaction that ran the callbacks since the last commit or
    /// rollback was persisted.
    fn on_commit(&mut self) {}

    /// The transaction that ran the callbacks since the last commit or
    /// rollback was dropped. Side effects staged by those callbacks must
    /// be discarded.
    fn on_rollback(&mut self) {}
}
