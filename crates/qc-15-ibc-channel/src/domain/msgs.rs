//! # Messages
//!
//! Handshake, upgrade and packet messages submitted by relayers (or, for
//! `ChanOpenInit`, `ChanCloseInit` and `ChanUpgradeInit`, by users of the
//! port). Each message carries the proofs it needs; `validate_basic` runs
//! before any state is read.

use serde::{Deserialize, Serialize};

use super::entities::{
    Acknowledgement, ChannelEnd, CommitmentProof, Counterparty, ErrorReceipt, Packet, Upgrade,
};
use super::errors::ChannelError;
use super::identifiers::{ChannelId, ConnectionId, PortId, Sequence};
use super::value_objects::{Height, Order, Timeout};

fn require_proof(proof: &CommitmentProof, name: &str) -> Result<(), ChannelError> {
    if proof.is_empty() {
        return Err(ChannelError::InvalidMessage(format!("{name} cannot be empty")));
    }
    Ok(())
}

fn require_height(height: Height) -> Result<(), ChannelError> {
    if height.is_zero() {
        return Err(ChannelError::InvalidMessage(
            "proof height cannot be zero".to_string(),
        ));
    }
    Ok(())
}

fn require_hops(hops: &[ConnectionId]) -> Result<(), ChannelError> {
    if hops.is_empty() {
        return Err(ChannelError::InvalidMessage(
            "connection hops cannot be empty".to_string(),
        ));
    }
    hops.iter().try_for_each(ConnectionId::validate)
}

fn validate_packet(packet: &Packet) -> Result<(), ChannelError> {
    packet.source_port.validate()?;
    packet.source_channel.validate()?;
    packet.destination_port.validate()?;
    packet.destination_channel.validate()?;
    if packet.sequence.is_zero() {
        return Err(ChannelError::InvalidMessage(
            "packet sequence cannot be 0".to_string(),
        ));
    }
    if packet.data.is_empty() {
        return Err(ChannelError::InvalidMessage(
            "packet data cannot be empty".to_string(),
        ));
    }
    if !packet.timeout().is_set() {
        return Err(ChannelError::MissingTimeout);
    }
    Ok(())
}

// =============================================================================
// OPENING / CLOSING HANDSHAKE
// =============================================================================

/// Start an opening handshake on the local chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelOpenInit {
    /// Local port.
    pub port_id: PortId,
    /// Requested ordering.
    pub ordering: Order,
    /// Connection to run over.
    pub connection_hops: Vec<ConnectionId>,
    /// Remote port.
    pub counterparty_port_id: PortId,
    /// Proposed application version (may be empty; the application decides).
    pub version: String,
}

impl MsgChannelOpenInit {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.counterparty_port_id.validate()?;
        require_hops(&self.connection_hops)
    }
}

/// Answer a counterparty `ChanOpenInit`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelOpenTry {
    /// Local port.
    pub port_id: PortId,
    /// Local INIT end to reuse when both sides initiated (crossing hellos).
    pub previous_channel_id: Option<ChannelId>,
    /// Ordering, identical on both ends.
    pub ordering: Order,
    /// Local connection.
    pub connection_hops: Vec<ConnectionId>,
    /// Remote end; the channel identifier is required.
    pub counterparty: Counterparty,
    /// Version recorded in the counterparty's INIT end.
    pub counterparty_version: String,
    /// Proof of the counterparty channel end.
    pub proof_init: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgChannelOpenTry {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        if let Some(previous) = &self.previous_channel_id {
            previous.validate()?;
        }
        self.counterparty.port_id.validate()?;
        match &self.counterparty.channel_id {
            Some(channel_id) => channel_id.validate()?,
            None => {
                return Err(ChannelError::InvalidMessage(
                    "counterparty channel identifier is required".to_string(),
                ))
            }
        }
        require_hops(&self.connection_hops)?;
        require_proof(&self.proof_init, "proof init")?;
        require_height(self.proof_height)
    }
}

/// Complete the handshake on the initiating end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelOpenAck {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Channel allocated by the counterparty's `ChanOpenTry`.
    pub counterparty_channel_id: ChannelId,
    /// Version chosen by the counterparty.
    pub counterparty_version: String,
    /// Proof of the counterparty TRYOPEN end.
    pub proof_try: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgChannelOpenAck {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        self.counterparty_channel_id.validate()?;
        require_proof(&self.proof_try, "proof try")?;
        require_height(self.proof_height)
    }
}

/// Complete the handshake on the answering end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelOpenConfirm {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Proof of the counterparty OPEN end.
    pub proof_ack: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgChannelOpenConfirm {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        require_proof(&self.proof_ack, "proof ack")?;
        require_height(self.proof_height)
    }
}

/// Close an open channel locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelCloseInit {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
}

impl MsgChannelCloseInit {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()
    }
}

/// Close after the counterparty closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelCloseConfirm {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Proof of the counterparty CLOSED end.
    pub proof_init: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgChannelCloseConfirm {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        require_proof(&self.proof_init, "proof init")?;
        require_height(self.proof_height)
    }
}

// =============================================================================
// UPGRADE HANDSHAKE
// =============================================================================

/// Propose new parameters for an open channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelUpgradeInit {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Proposed ordering.
    pub ordering: Order,
    /// Proposed connection hops.
    pub connection_hops: Vec<ConnectionId>,
    /// Proposed version (may list several, comma separated, in preference order).
    pub version: String,
    /// Absolute timeout on the counterparty's clock.
    pub timeout: Timeout,
}

impl MsgChannelUpgradeInit {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        require_hops(&self.connection_hops)?;
        if !self.timeout.is_set() {
            return Err(ChannelError::MissingTimeout);
        }
        Ok(())
    }
}

/// Accept a counterparty upgrade proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelUpgradeTry {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Counterparty channel end as claimed by the relayer.
    pub counterparty_channel: ChannelEnd,
    /// Counterparty upgrade proposal as claimed by the relayer.
    pub counterparty_upgrade: Upgrade,
    /// Counterparty upgrade sequence as claimed by the relayer.
    pub counterparty_upgrade_sequence: u64,
    /// Proof of `counterparty_channel`.
    pub proof_channel: CommitmentProof,
    /// Proof of `counterparty_upgrade`.
    pub proof_upgrade: CommitmentProof,
    /// Proof of `counterparty_upgrade_sequence`.
    pub proof_upgrade_sequence: CommitmentProof,
    /// Height the proofs were taken at.
    pub proof_height: Height,
}

impl MsgChannelUpgradeTry {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        if self.counterparty_upgrade_sequence == 0 {
            return Err(ChannelError::InvalidMessage(
                "counterparty upgrade sequence cannot be 0".to_string(),
            ));
        }
        if !self.counterparty_upgrade.timeout.is_set() {
            return Err(ChannelError::MissingTimeout);
        }
        require_proof(&self.proof_channel, "proof channel")?;
        require_proof(&self.proof_upgrade, "proof upgrade")?;
        require_proof(&self.proof_upgrade_sequence, "proof upgrade sequence")?;
        require_height(self.proof_height)
    }
}

/// Finish an upgrade on the initiating end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelUpgradeAck {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Counterparty TRYUPGRADE channel end as claimed by the relayer.
    pub counterparty_channel: ChannelEnd,
    /// Counterparty upgrade proposal as claimed by the relayer.
    pub counterparty_upgrade: Upgrade,
    /// Counterparty upgrade sequence as claimed by the relayer.
    pub counterparty_upgrade_sequence: u64,
    /// Proof of `counterparty_channel`.
    pub proof_channel: CommitmentProof,
    /// Proof of `counterparty_upgrade`.
    pub proof_upgrade: CommitmentProof,
    /// Proof of `counterparty_upgrade_sequence`.
    pub proof_upgrade_sequence: CommitmentProof,
    /// Height the proofs were taken at.
    pub proof_height: Height,
}

impl MsgChannelUpgradeAck {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        require_proof(&self.proof_channel, "proof channel")?;
        require_proof(&self.proof_upgrade, "proof upgrade")?;
        require_proof(&self.proof_upgrade_sequence, "proof upgrade sequence")?;
        require_height(self.proof_height)
    }
}

/// Finish an upgrade on the answering end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelUpgradeConfirm {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Counterparty channel end as claimed by the relayer.
    pub counterparty_channel: ChannelEnd,
    /// Proof of `counterparty_channel`.
    pub proof_channel: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgChannelUpgradeConfirm {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        require_proof(&self.proof_channel, "proof channel")?;
        require_height(self.proof_height)
    }
}

/// Abort an in-flight upgrade using the counterparty's error receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelUpgradeCancel {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Counterparty error receipt as claimed by the relayer.
    pub error_receipt: ErrorReceipt,
    /// Proof of `error_receipt`.
    pub proof_error_receipt: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgChannelUpgradeCancel {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        require_proof(&self.proof_error_receipt, "proof error receipt")?;
        require_height(self.proof_height)
    }
}

/// Abort an in-flight upgrade whose timeout elapsed on the counterparty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChannelUpgradeTimeout {
    /// Local port.
    pub port_id: PortId,
    /// Local channel.
    pub channel_id: ChannelId,
    /// Counterparty channel end as claimed by the relayer.
    pub counterparty_channel: ChannelEnd,
    /// Proof of `counterparty_channel`.
    pub proof_channel: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgChannelUpgradeTimeout {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        self.port_id.validate()?;
        self.channel_id.validate()?;
        require_proof(&self.proof_channel, "proof channel")?;
        require_height(self.proof_height)
    }
}

// =============================================================================
// PACKETS
// =============================================================================

/// Deliver a packet to the receiving chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRecvPacket {
    /// The packet.
    pub packet: Packet,
    /// Proof of the packet commitment on the sending chain.
    pub proof_commitment: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgRecvPacket {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        validate_packet(&self.packet)?;
        require_proof(&self.proof_commitment, "proof commitment")?;
        require_height(self.proof_height)
    }
}

/// Relay an acknowledgement back to the sending chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAcknowledgement {
    /// The packet.
    pub packet: Packet,
    /// Acknowledgement written by the receiving chain.
    pub acknowledgement: Acknowledgement,
    /// Proof of the acknowledgement commitment.
    pub proof_acked: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgAcknowledgement {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        validate_packet(&self.packet)?;
        require_proof(&self.proof_acked, "proof acked")?;
        require_height(self.proof_height)
    }
}

/// Time out an undelivered packet on the sending chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTimeout {
    /// The packet.
    pub packet: Packet,
    /// Counterparty `nextSequenceRecv` (ORDERED channels).
    pub next_sequence_recv: Sequence,
    /// Proof of receipt absence (UNORDERED) or of `nextSequenceRecv` (ORDERED).
    pub proof_unreceived: CommitmentProof,
    /// Height the proof was taken at.
    pub proof_height: Height,
}

impl MsgTimeout {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        validate_packet(&self.packet)?;
        require_proof(&self.proof_unreceived, "proof unreceived")?;
        require_height(self.proof_height)
    }
}

/// Time out a packet early because the counterparty closed the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTimeoutOnClose {
    /// The packet.
    pub packet: Packet,
    /// Counterparty `nextSequenceRecv` (ORDERED channels).
    pub next_sequence_recv: Sequence,
    /// Proof of receipt absence (UNORDERED) or of `nextSequenceRecv` (ORDERED).
    pub proof_unreceived: CommitmentProof,
    /// Proof of the counterparty CLOSED end.
    pub proof_close: CommitmentProof,
    /// Height the proofs were taken at.
    pub proof_height: Height,
}

impl MsgTimeoutOnClose {
    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), ChannelError> {
        validate_packet(&self.packet)?;
        require_proof(&self.proof_unreceived, "proof unreceived")?;
        require_proof(&self.proof_close, "proof close")?;
        require_height(self.proof_height)
    }
}
