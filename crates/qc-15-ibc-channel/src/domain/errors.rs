//! # Domain Errors
//!
//! Error types for the channel subsystem.
//!
//! Every [`ChannelError`] maps onto one [`ErrorKind`]. Rejections of every
//! kind leave persisted state untouched; the keeper drops the transaction
//! overlay before returning them.

use thiserror::Error;

use super::identifiers::{ChannelId, ClientId, ConnectionId, PortId, Sequence};
use super::value_objects::{Height, State};

/// Hash type (32-byte SHA-256).
pub type Hash = [u8; 32];

/// Coarse error taxonomy shared by all operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state read.
    Validation,
    /// Capability mismatch.
    Authorization,
    /// Proof oracle rejected a claim.
    Proof,
    /// Wrong current state, stale sequence or elapsed timeout.
    StateConflict,
    /// The enclosing transaction cannot complete safely.
    Fatal,
    /// Storage backend failure.
    Store,
}

/// Failures reported by the proof oracle (light client).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// No light client is registered under this identifier.
    #[error("Light client not found: {0}")]
    ClientNotFound(ClientId),

    /// No consensus state at the requested height.
    #[error("Consensus state not found for {client_id} at {height}")]
    ConsensusStateNotFound {
        /// Client queried
        client_id: ClientId,
        /// Height queried
        height: Height,
    },

    /// Proof bytes were empty.
    #[error("Empty proof")]
    EmptyProof,

    /// The proven value differs from the expected one.
    #[error("Membership verification failed for path {path}")]
    MembershipFailed {
        /// Store path
        path: String,
    },

    /// A value exists where absence was claimed.
    #[error("Non-membership verification failed for path {path}")]
    NonMembershipFailed {
        /// Store path
        path: String,
    },
}

/// Failures reported by the storage backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// I/O failure in the backend.
    #[error("Store I/O error: {0}")]
    Io(String),

    /// A stored record could not be decoded.
    #[error("Corrupted record at {key}: {reason}")]
    Corrupted {
        /// Store key
        key: String,
        /// Decoder message
        reason: String,
    },

    /// A record could not be encoded.
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// Channel subsystem error types.
#[derive(Debug, Error)]
pub enum ChannelError {
    // ----- validation -----
    /// Identifier failed ICS-24 validation.
    #[error("Invalid identifier {id:?}: {reason}")]
    InvalidIdentifier {
        /// Offending identifier
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Malformed message field.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Neither timeout height nor timestamp set.
    #[error("Timeout height and timestamp are both unset")]
    MissingTimeout,

    /// Version string empty or too long.
    #[error("Invalid version {version:?}: {reason}")]
    InvalidVersion {
        /// Offending version
        version: String,
        /// Why it was rejected
        reason: String,
    },

    /// Packet data empty or too large.
    #[error("Invalid packet data length {len} (max {max})")]
    InvalidPacketData {
        /// Actual length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Proposed upgrade is not a valid change of the current end.
    #[error("Invalid upgrade proposal: {0}")]
    InvalidUpgrade(String),

    // ----- authorization -----
    /// Capability does not authenticate for this port/channel.
    #[error("Capability not authenticated for {port_id}/{channel_id}")]
    Unauthorized {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    /// Port capability missing or invalid.
    #[error("Port {0} is not bound to the calling module")]
    PortUnauthorized(PortId),

    /// Channel capability already bound.
    #[error("Channel capability already bound for {port_id}/{channel_id}")]
    CapabilityAlreadyBound {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    /// Port capability already issued.
    #[error("Port {0} is already bound")]
    PortAlreadyBound(PortId),

    // ----- proof -----
    /// Proof oracle rejected a claim.
    #[error("Proof verification failed: {0}")]
    Proof(#[from] ProofError),

    // ----- state conflicts -----
    /// No channel end stored.
    #[error("Channel not found: {port_id}/{channel_id}")]
    ChannelNotFound {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    /// Channel is in the wrong state for this operation.
    #[error("Invalid channel state for {channel_id}: expected {expected}, got {actual:?}")]
    InvalidChannelState {
        /// Channel
        channel_id: ChannelId,
        /// Allowed states
        expected: String,
        /// Current state
        actual: State,
    },

    /// Attempted edge is not part of the state machine.
    #[error("Invalid channel transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: State,
        /// Attempted state
        to: State,
    },

    /// Connection missing.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection exists but is not OPEN.
    #[error("Connection {0} is not open")]
    ConnectionNotOpen(ConnectionId),

    /// Packet endpoints do not match the channel counterparty.
    #[error("Packet counterparty mismatch: {port_id}/{channel_id:?}")]
    CounterpartyMismatch {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: Option<ChannelId>,
    },

    /// No route registered for the port.
    #[error("No module routed for port {0}")]
    ModuleNotFound(PortId),

    /// Packet timed out on the receiving chain.
    #[error("Packet timed out: timeout {timeout_height}/{timeout_timestamp}, current {height}/{timestamp}")]
    PacketTimedOut {
        /// Packet timeout height
        timeout_height: Height,
        /// Packet timeout timestamp
        timeout_timestamp: u64,
        /// Height compared against
        height: Height,
        /// Timestamp compared against
        timestamp: u64,
    },

    /// Packet timeout not yet reached at the proof height.
    #[error("Packet timeout not reached at proof height {proof_height}")]
    TimeoutNotReached {
        /// Proof height
        proof_height: Height,
    },

    /// Out-of-order or stale packet sequence.
    #[error("Invalid packet sequence {given}, expected {expected}")]
    InvalidPacketSequence {
        /// Sequence supplied
        given: Sequence,
        /// Sequence expected
        expected: Sequence,
    },

    /// Unordered packet already received.
    #[error("Packet {sequence} already received on {channel_id}")]
    PacketAlreadyReceived {
        /// Channel
        channel_id: ChannelId,
        /// Sequence
        sequence: Sequence,
    },

    /// Packet never received (async acknowledgement).
    #[error("Packet {0} has not been received")]
    PacketNotReceived(Sequence),

    /// Commitment absent (already acknowledged or timed out).
    #[error("Packet commitment not found for sequence {0}")]
    PacketCommitmentNotFound(Sequence),

    /// Stored commitment differs from the recomputed one.
    #[error("Packet commitment mismatch for sequence {0}")]
    PacketCommitmentMismatch(Sequence),

    /// A sequence counter has no successor.
    #[error("Sequence counter exhausted on {port_id}/{channel_id}")]
    SequenceOverflow {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    /// Acknowledgement already written.
    #[error("Acknowledgement already exists for sequence {0}")]
    AcknowledgementExists(Sequence),

    /// No upgrade proposal stored.
    #[error("Upgrade not found for {port_id}/{channel_id}")]
    UpgradeNotFound {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    /// No upgrade sequence stored.
    #[error("Upgrade sequence not found for {port_id}/{channel_id}")]
    UpgradeSequenceNotFound {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    /// Sequence arbitration failed.
    #[error("Invalid upgrade sequence: local {local}, counterparty {counterparty}")]
    InvalidUpgradeSequence {
        /// Local upgrade sequence
        local: u64,
        /// Counterparty upgrade sequence
        counterparty: u64,
    },

    /// Upgrade timeout elapsed.
    #[error("Upgrade timed out at {height}/{timestamp}")]
    UpgradeTimedOut {
        /// Height compared against
        height: Height,
        /// Timestamp compared against
        timestamp: u64,
    },

    /// Upgrade timeout not yet reached on the counterparty.
    #[error("Upgrade timeout not reached at proof height {proof_height}")]
    UpgradeTimeoutNotReached {
        /// Proof height
        proof_height: Height,
    },

    /// Counterparty proposal incompatible with ours.
    #[error("Incompatible counterparty upgrade: {0}")]
    IncompatibleUpgrade(String),

    /// Counterparty has not reached the required state yet.
    #[error("Counterparty channel not ready: {0}")]
    CounterpartyNotReady(String),

    /// Application callback vetoed the transition.
    #[error("Application on port {port_id} rejected the transition: {reason}")]
    AppCallback {
        /// Port
        port_id: PortId,
        /// Veto reason
        reason: String,
    },

    // ----- fatal -----
    /// Restore invoked with no snapshot to return to.
    #[error("Restore channel not found for {port_id}/{channel_id}")]
    MissingRestoreChannel {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    // ----- store -----
    /// Storage backend failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ChannelError {
    /// Error taxonomy bucket.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier { .. }
            | Self::InvalidMessage(_)
            | Self::MissingTimeout
            | Self::InvalidVersion { .. }
            | Self::InvalidPacketData { .. }
            | Self::InvalidUpgrade(_) => ErrorKind::Validation,

            Self::Unauthorized { .. }
            | Self::PortUnauthorized(_)
            | Self::CapabilityAlreadyBound { .. }
            | Self::PortAlreadyBound(_) => ErrorKind::Authorization,

            Self::Proof(_) => ErrorKind::Proof,

            Self::MissingRestoreChannel { .. } => ErrorKind::Fatal,

            Self::Store(_) => ErrorKind::Store,

            _ => ErrorKind::StateConflict,
        }
    }

    /// Shorthand for building an [`ChannelError::InvalidChannelState`].
    pub fn invalid_state(channel_id: &ChannelId, expected: &str, actual: State) -> Self {
        Self::InvalidChannelState {
            channel_id: channel_id.clone(),
            expected: expected.to_string(),
            actual,
        }
    }
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
