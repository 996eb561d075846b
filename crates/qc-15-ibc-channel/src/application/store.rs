//! # Channel Store
//!
//! Typed accessors over the ICS-24 key space, layered on a write overlay.
//!
//! Every entry point works on a [`CacheStore`]. Reads fall through to the
//! persisted store; writes stay in the overlay until the keeper flushes them
//! with one atomic batch. Dropping the overlay discards every write.
//!
//! ## Encoding
//!
//! | Record | Encoding |
//! |--------|----------|
//! | channel ends, connections, upgrades, error receipts, timeouts | bincode |
//! | next sequences, upgrade sequence, channel counter | u64 big-endian |
//! | packet / ack commitments | raw 32 bytes |
//! | packet receipts | `[0x01]` |
//!
//! Membership proofs compare these bytes verbatim.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{
    ChannelEnd, ChannelId, ConnectionEnd, ConnectionId, ErrorReceipt, Hash, Path, PortId,
    Sequence, StoreError, Timeout, Upgrade,
};
use crate::ports::{BatchOperation, KeyValueStore};

/// Value stored under a packet receipt path.
pub const RECEIPT_OK: &[u8] = &[0x01];

/// Encode a structured record.
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

/// Decode a structured record read from `path`.
pub fn decode_record<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupted {
        key: path.to_string(),
        reason: e.to_string(),
    })
}

/// Encode a counter.
pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

fn decode_u64(path: &Path, bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StoreError::Corrupted {
        key: path.to_string(),
        reason: format!("expected 8 bytes, got {}", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_hash(path: &Path, bytes: &[u8]) -> Result<Hash, StoreError> {
    bytes.try_into().map_err(|_| StoreError::Corrupted {
        key: path.to_string(),
        reason: format!("expected 32 bytes, got {}", bytes.len()),
    })
}

fn missing(path: &Path) -> StoreError {
    StoreError::Corrupted {
        key: path.to_string(),
        reason: "record not found".to_string(),
    }
}

/// Write overlay over a persisted store.
pub struct CacheStore<'a> {
    parent: &'a dyn KeyValueStore,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> CacheStore<'a> {
    /// Create an empty overlay.
    pub fn new(parent: &'a dyn KeyValueStore) -> Self {
        Self {
            parent,
            pending: BTreeMap::new(),
        }
    }

    /// Raw read (overlay first).
    pub fn get(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        let key = path.to_key();
        match self.pending.get(&key) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(&key),
        }
    }

    /// Raw write.
    pub fn set(&mut self, path: &Path, value: Vec<u8>) {
        self.pending.insert(path.to_key(), Some(value));
    }

    /// Raw delete.
    pub fn delete(&mut self, path: &Path) {
        self.pending.insert(path.to_key(), None);
    }

    /// Drain into one batch for [`KeyValueStore::atomic_batch_write`].
    pub fn into_batch(self) -> Vec<BatchOperation> {
        self.pending
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => BatchOperation::put(key, value),
                None => BatchOperation::delete(key),
            })
            .collect()
    }

    fn get_record<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        self.get(path)?
            .map(|bytes| decode_record(path, &bytes))
            .transpose()
    }

    fn set_record<T: Serialize>(&mut self, path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = encode_record(value)?;
        self.set(path, bytes);
        Ok(())
    }

    fn get_u64(&self, path: &Path) -> Result<Option<u64>, StoreError> {
        self.get(path)?.map(|bytes| decode_u64(path, &bytes)).transpose()
    }

    fn get_hash(&self, path: &Path) -> Result<Option<Hash>, StoreError> {
        self.get(path)?.map(|bytes| decode_hash(path, &bytes)).transpose()
    }

    // -------------------------------------------------------------------------
    // Connections and channel ends
    // -------------------------------------------------------------------------

    /// Connection end.
    pub fn connection(&self, id: &ConnectionId) -> Result<Option<ConnectionEnd>, StoreError> {
        self.get_record(&Path::Connections(id.clone()))
    }

    /// Store a connection end.
    pub fn set_connection(
        &mut self,
        id: &ConnectionId,
        connection: &ConnectionEnd,
    ) -> Result<(), StoreError> {
        self.set_record(&Path::Connections(id.clone()), connection)
    }

    /// Channel identifier counter.
    pub fn next_channel_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.get_u64(&Path::NextChannelSequence)?.unwrap_or(0))
    }

    /// Store the channel identifier counter.
    pub fn set_next_channel_sequence(&mut self, value: u64) {
        self.set(&Path::NextChannelSequence, encode_u64(value));
    }

    /// Channel end.
    pub fn channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelEnd>, StoreError> {
        self.get_record(&Path::ChannelEnds(port_id.clone(), channel_id.clone()))
    }

    /// Store a channel end.
    pub fn set_channel(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        channel: &ChannelEnd,
    ) -> Result<(), StoreError> {
        self.set_record(&Path::ChannelEnds(port_id.clone(), channel_id.clone()), channel)
    }

    // -------------------------------------------------------------------------
    // Packet sequences
    // -------------------------------------------------------------------------

    fn sequence(&self, path: Path) -> Result<Sequence, StoreError> {
        self.get_u64(&path)?
            .map(Sequence::from)
            .ok_or_else(|| missing(&path))
    }

    /// Next sequence to send.
    pub fn next_sequence_send(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, StoreError> {
        self.sequence(Path::SeqSends(port_id.clone(), channel_id.clone()))
    }

    /// Store the next sequence to send.
    pub fn set_next_sequence_send(&mut self, port_id: &PortId, channel_id: &ChannelId, seq: Sequence) {
        self.set(
            &Path::SeqSends(port_id.clone(), channel_id.clone()),
            encode_u64(seq.value()),
        );
    }

    /// Next sequence expected on an ORDERED channel.
    pub fn next_sequence_recv(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, StoreError> {
        self.sequence(Path::SeqRecvs(port_id.clone(), channel_id.clone()))
    }

    /// Store the next sequence expected.
    pub fn set_next_sequence_recv(&mut self, port_id: &PortId, channel_id: &ChannelId, seq: Sequence) {
        self.set(
            &Path::SeqRecvs(port_id.clone(), channel_id.clone()),
            encode_u64(seq.value()),
        );
    }

    /// Next acknowledgement expected on an ORDERED channel.
    pub fn next_sequence_ack(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, StoreError> {
        self.sequence(Path::SeqAcks(port_id.clone(), channel_id.clone()))
    }

    /// Store the next acknowledgement expected.
    pub fn set_next_sequence_ack(&mut self, port_id: &PortId, channel_id: &ChannelId, seq: Sequence) {
        self.set(
            &Path::SeqAcks(port_id.clone(), channel_id.clone()),
            encode_u64(seq.value()),
        );
    }

    // -------------------------------------------------------------------------
    // Packet commitments, receipts, acknowledgements
    // -------------------------------------------------------------------------

    /// Packet commitment.
    pub fn packet_commitment(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        seq: Sequence,
    ) -> Result<Option<Hash>, StoreError> {
        self.get_hash(&Path::Commitments(port_id.clone(), channel_id.clone(), seq))
    }

    /// Store a packet commitment.
    pub fn set_packet_commitment(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        seq: Sequence,
        commitment: Hash,
    ) {
        self.set(
            &Path::Commitments(port_id.clone(), channel_id.clone(), seq),
            commitment.to_vec(),
        );
    }

    /// Delete a packet commitment.
    pub fn delete_packet_commitment(&mut self, port_id: &PortId, channel_id: &ChannelId, seq: Sequence) {
        self.delete(&Path::Commitments(port_id.clone(), channel_id.clone(), seq));
    }

    /// Has the packet been received?
    pub fn has_packet_receipt(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        seq: Sequence,
    ) -> Result<bool, StoreError> {
        Ok(self
            .get(&Path::Receipts(port_id.clone(), channel_id.clone(), seq))?
            .is_some())
    }

    /// Mark a packet received.
    pub fn set_packet_receipt(&mut self, port_id: &PortId, channel_id: &ChannelId, seq: Sequence) {
        self.set(
            &Path::Receipts(port_id.clone(), channel_id.clone(), seq),
            RECEIPT_OK.to_vec(),
        );
    }

    /// Acknowledgement commitment.
    pub fn packet_acknowledgement(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        seq: Sequence,
    ) -> Result<Option<Hash>, StoreError> {
        self.get_hash(&Path::Acks(port_id.clone(), channel_id.clone(), seq))
    }

    /// Store an acknowledgement commitment.
    pub fn set_packet_acknowledgement(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        seq: Sequence,
        commitment: Hash,
    ) {
        self.set(
            &Path::Acks(port_id.clone(), channel_id.clone(), seq),
            commitment.to_vec(),
        );
    }

    // -------------------------------------------------------------------------
    // Upgrades
    // -------------------------------------------------------------------------

    /// Upgrade proposal.
    pub fn upgrade(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<Upgrade>, StoreError> {
        self.get_record(&Path::Upgrades(port_id.clone(), channel_id.clone()))
    }

    /// Store an upgrade proposal.
    pub fn set_upgrade(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        upgrade: &Upgrade,
    ) -> Result<(), StoreError> {
        self.set_record(&Path::Upgrades(port_id.clone(), channel_id.clone()), upgrade)
    }

    /// Delete the upgrade proposal.
    pub fn delete_upgrade(&mut self, port_id: &PortId, channel_id: &ChannelId) {
        self.delete(&Path::Upgrades(port_id.clone(), channel_id.clone()));
    }

    /// Pre-upgrade snapshot.
    pub fn restore_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelEnd>, StoreError> {
        self.get_record(&Path::UpgradeRestore(port_id.clone(), channel_id.clone()))
    }

    /// Store the pre-upgrade snapshot.
    pub fn set_restore_channel(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        channel: &ChannelEnd,
    ) -> Result<(), StoreError> {
        self.set_record(
            &Path::UpgradeRestore(port_id.clone(), channel_id.clone()),
            channel,
        )
    }

    /// Delete the pre-upgrade snapshot.
    pub fn delete_restore_channel(&mut self, port_id: &PortId, channel_id: &ChannelId) {
        self.delete(&Path::UpgradeRestore(port_id.clone(), channel_id.clone()));
    }

    /// Upgrade sequence (0 before the first upgrade).
    pub fn upgrade_sequence(&self, port_id: &PortId, channel_id: &ChannelId) -> Result<u64, StoreError> {
        Ok(self
            .get_u64(&Path::UpgradeSequence(port_id.clone(), channel_id.clone()))?
            .unwrap_or(0))
    }

    /// Store the upgrade sequence.
    pub fn set_upgrade_sequence(&mut self, port_id: &PortId, channel_id: &ChannelId, sequence: u64) {
        self.set(
            &Path::UpgradeSequence(port_id.clone(), channel_id.clone()),
            encode_u64(sequence),
        );
    }

    /// Latest upgrade error receipt.
    pub fn error_receipt(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ErrorReceipt>, StoreError> {
        self.get_record(&Path::UpgradeError(port_id.clone(), channel_id.clone()))
    }

    /// Store an upgrade error receipt.
    pub fn set_error_receipt(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        receipt: &ErrorReceipt,
    ) -> Result<(), StoreError> {
        self.set_record(&Path::UpgradeError(port_id.clone(), channel_id.clone()), receipt)
    }

    /// Upgrade timeout.
    pub fn upgrade_timeout(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<Timeout>, StoreError> {
        self.get_record(&Path::UpgradeTimeout(port_id.clone(), channel_id.clone()))
    }

    /// Store the upgrade timeout.
    pub fn set_upgrade_timeout(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        timeout: &Timeout,
    ) -> Result<(), StoreError> {
        self.set_record(
            &Path::UpgradeTimeout(port_id.clone(), channel_id.clone()),
            timeout,
        )
    }

    /// Delete the upgrade timeout.
    pub fn delete_upgrade_timeout(&mut self, port_id: &PortId, channel_id: &ChannelId) {
        self.delete(&Path::UpgradeTimeout(port_id.clone(), channel_id.clone()));
    }
}
