//! # Proof Adapter
//!
//! Turns counterparty claims into proof-oracle queries. Each function
//! renders the store path and value the counterparty must hold and asks the
//! light client of the channel's connection to prove it.

use tracing::debug;

use crate::domain::{
    ChannelEnd, ChannelError, ChannelId, CommitmentProof, ConnectionEnd, ErrorReceipt, Hash,
    Height, Path, PortId, Sequence, Timestamp, Upgrade,
};

use super::context::ExecutionContext;
use super::store::{encode_record, encode_u64};

impl ExecutionContext<'_> {
    fn verify_member(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        path: Path,
        value: &[u8],
    ) -> Result<(), ChannelError> {
        self.verifier
            .verify_membership(&connection.client_id, height, proof, &path, value)
            .map_err(|e| {
                debug!("[qc-15] Membership proof rejected for {} at {}: {}", path, height, e);
                ChannelError::Proof(e)
            })
    }

    fn verify_absent(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        path: Path,
    ) -> Result<(), ChannelError> {
        self.verifier
            .verify_non_membership(&connection.client_id, height, proof, &path)
            .map_err(|e| {
                debug!("[qc-15] Non-membership proof rejected for {} at {}: {}", path, height, e);
                ChannelError::Proof(e)
            })
    }

    /// Counterparty channel end equals `expected`.
    pub fn verify_channel_state(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        expected: &ChannelEnd,
    ) -> Result<(), ChannelError> {
        let value = encode_record(expected)?;
        self.verify_member(
            connection,
            height,
            proof,
            Path::ChannelEnds(port_id.clone(), channel_id.clone()),
            &value,
        )
    }

    /// Counterparty stores `commitment` for the packet.
    #[allow(clippy::too_many_arguments)]
    pub fn verify_packet_commitment(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
        commitment: Hash,
    ) -> Result<(), ChannelError> {
        self.verify_member(
            connection,
            height,
            proof,
            Path::Commitments(port_id.clone(), channel_id.clone(), sequence),
            &commitment,
        )
    }

    /// Counterparty stores `commitment` as the acknowledgement.
    #[allow(clippy::too_many_arguments)]
    pub fn verify_packet_acknowledgement(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
        commitment: Hash,
    ) -> Result<(), ChannelError> {
        self.verify_member(
            connection,
            height,
            proof,
            Path::Acks(port_id.clone(), channel_id.clone(), sequence),
            &commitment,
        )
    }

    /// Counterparty holds no receipt for the packet.
    pub fn verify_packet_receipt_absence(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
    ) -> Result<(), ChannelError> {
        self.verify_absent(
            connection,
            height,
            proof,
            Path::Receipts(port_id.clone(), channel_id.clone(), sequence),
        )
    }

    /// Counterparty `nextSequenceRecv` equals `next_sequence_recv`.
    pub fn verify_next_sequence_recv(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        next_sequence_recv: Sequence,
    ) -> Result<(), ChannelError> {
        self.verify_member(
            connection,
            height,
            proof,
            Path::SeqRecvs(port_id.clone(), channel_id.clone()),
            &encode_u64(next_sequence_recv.value()),
        )
    }

    /// Counterparty upgrade proposal equals `upgrade`.
    pub fn verify_upgrade(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        upgrade: &Upgrade,
    ) -> Result<(), ChannelError> {
        let value = encode_record(upgrade)?;
        self.verify_member(
            connection,
            height,
            proof,
            Path::Upgrades(port_id.clone(), channel_id.clone()),
            &value,
        )
    }

    /// Counterparty upgrade sequence equals `sequence`.
    pub fn verify_upgrade_sequence(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: u64,
    ) -> Result<(), ChannelError> {
        self.verify_member(
            connection,
            height,
            proof,
            Path::UpgradeSequence(port_id.clone(), channel_id.clone()),
            &encode_u64(sequence),
        )
    }

    /// Counterparty error receipt equals `receipt`.
    pub fn verify_error_receipt(
        &self,
        connection: &ConnectionEnd,
        height: Height,
        proof: &CommitmentProof,
        port_id: &PortId,
        channel_id: &ChannelId,
        receipt: &ErrorReceipt,
    ) -> Result<(), ChannelError> {
        let value = encode_record(receipt)?;
        self.verify_member(
            connection,
            height,
            proof,
            Path::UpgradeError(port_id.clone(), channel_id.clone()),
            &value,
        )
    }

    /// Counterparty block time at `height`.
    pub fn counterparty_timestamp(
        &self,
        connection: &ConnectionEnd,
        height: Height,
    ) -> Result<Timestamp, ChannelError> {
        Ok(self
            .verifier
            .consensus_timestamp(&connection.client_id, height)?)
    }

    /// Latest counterparty height and time known to the light client.
    pub fn counterparty_latest(
        &self,
        connection: &ConnectionEnd,
    ) -> Result<(Height, Timestamp), ChannelError> {
        let height = self.verifier.latest_height(&connection.client_id)?;
        let timestamp = self.counterparty_timestamp(connection, height)?;
        Ok((height, timestamp))
    }
}
