//! # Domain Entities
//!
//! Channel ends, connections, packets, acknowledgements and upgrade records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ChannelError;
use super::identifiers::{ChannelId, ClientId, ConnectionId, PortId, Sequence};
use super::value_objects::{ConnectionState, Height, Order, State, Timeout, Timestamp};

/// The other end of a channel.
///
/// `channel_id` is `None` until the counterparty has allocated its end
/// (i.e. while a `ChanOpenInit` is the only step executed).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counterparty {
    /// Counterparty port.
    pub port_id: PortId,
    /// Counterparty channel, once known.
    pub channel_id: Option<ChannelId>,
}

impl Counterparty {
    /// Create a counterparty.
    pub fn new(port_id: PortId, channel_id: Option<ChannelId>) -> Self {
        Self {
            port_id,
            channel_id,
        }
    }
}

/// One end of a channel, as stored under `channelEnds/ports/{p}/channels/{c}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelEnd {
    /// Handshake / upgrade state.
    pub state: State,
    /// Packet ordering.
    pub ordering: Order,
    /// Remote end.
    pub counterparty: Counterparty,
    /// Connections the channel runs over (exactly one in practice).
    pub connection_hops: Vec<ConnectionId>,
    /// Application version string.
    pub version: String,
}

impl ChannelEnd {
    /// Create a channel end.
    pub fn new(
        state: State,
        ordering: Order,
        counterparty: Counterparty,
        connection_hops: Vec<ConnectionId>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            state,
            ordering,
            counterparty,
            connection_hops,
            version: version.into(),
        }
    }

    /// Copy with a different state.
    pub fn with_state(&self, state: State) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// Apply a state transition, rejecting edges outside the state machine.
    pub fn transition(&mut self, next: State) -> Result<(), ChannelError> {
        if !self.state.can_transition_to(next) {
            return Err(ChannelError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// First connection hop.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_hops.first()
    }

    /// Counterparty port/channel equal to the given pair?
    pub fn counterparty_matches(&self, port_id: &PortId, channel_id: &ChannelId) -> bool {
        &self.counterparty.port_id == port_id
            && self.counterparty.channel_id.as_ref() == Some(channel_id)
    }
}

/// Connection end as seen by the channel layer. Connections are managed by
/// the connection handshake, which lives outside this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEnd {
    /// Handshake state.
    pub state: ConnectionState,
    /// Light client tracking the counterparty chain.
    pub client_id: ClientId,
    /// Counterparty connection identifier, once known.
    pub counterparty_connection_id: Option<ConnectionId>,
}

impl ConnectionEnd {
    /// Create an OPEN connection.
    pub fn open(client_id: ClientId, counterparty_connection_id: ConnectionId) -> Self {
        Self {
            state: ConnectionState::Open,
            client_id,
            counterparty_connection_id: Some(counterparty_connection_id),
        }
    }

    /// Is the connection usable by channels?
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

/// A packet travelling over a channel. Only its commitment is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Sequence assigned by the sending end.
    pub sequence: Sequence,
    /// Sending port.
    pub source_port: PortId,
    /// Sending channel.
    pub source_channel: ChannelId,
    /// Receiving port.
    pub destination_port: PortId,
    /// Receiving channel.
    pub destination_channel: ChannelId,
    /// Opaque application payload.
    pub data: Vec<u8>,
    /// Timeout height on the receiving chain (zero = unset).
    pub timeout_height: Height,
    /// Timeout timestamp on the receiving chain (zero = unset).
    pub timeout_timestamp: Timestamp,
}

impl Packet {
    /// Timeout as a single value.
    pub fn timeout(&self) -> Timeout {
        Timeout::new(self.timeout_height, self.timeout_timestamp)
    }

    /// Checks whether a packet from a [`SendPacket`](crate::domain::events::ChannelEvent::SendPacket)
    /// event is timed-out relative to the given destination chain height and timestamp.
    pub fn timed_out(&self, dst_chain_height: Height, dst_chain_ts: Timestamp) -> bool {
        self.timeout().has_elapsed(dst_chain_height, dst_chain_ts)
    }
}

#[derive(Serialize, Deserialize)]
struct AckJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Acknowledgement bytes written by the receiving chain.
///
/// The channel layer treats the bytes as opaque; the `success`/`error`
/// constructors produce the standard JSON envelope applications agree on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement(Vec<u8>);

impl Acknowledgement {
    /// Wrap raw bytes. Empty acknowledgements are rejected.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ChannelError> {
        if bytes.is_empty() {
            return Err(ChannelError::InvalidMessage(
                "acknowledgement cannot be empty".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// `{"result":"<hex>"}`.
    pub fn success(result: &[u8]) -> Self {
        Self::encode(AckJson {
            result: Some(hex::encode(result)),
            error: None,
        })
    }

    /// `{"error":"<message>"}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::encode(AckJson {
            result: None,
            error: Some(message.into()),
        })
    }

    fn encode(json: AckJson) -> Self {
        // Serializing a struct of optional strings cannot fail.
        Self(serde_json::to_vec(&json).unwrap_or_default())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// False only for a well-formed error envelope.
    pub fn is_success(&self) -> bool {
        match serde_json::from_slice::<AckJson>(&self.0) {
            Ok(json) => json.error.is_none(),
            Err(_) => true,
        }
    }

    /// Decoded result payload of a success envelope.
    pub fn result(&self) -> Option<Vec<u8>> {
        let json: AckJson = serde_json::from_slice(&self.0).ok()?;
        hex::decode(json.result?).ok()
    }
}

/// Result of an application's `on_recv_packet`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecvOutcome {
    /// Write this acknowledgement now.
    Ack(Acknowledgement),
    /// The application will call `write_acknowledgement` later.
    Pending,
}

/// Upgrade proposal stored while a channel is upgrading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrade {
    /// The channel end both sides should end up with.
    pub proposed: ChannelEnd,
    /// Absolute timeout on the counterparty's clock.
    pub timeout: Timeout,
}

impl Upgrade {
    /// Create a proposal.
    pub fn new(proposed: ChannelEnd, timeout: Timeout) -> Self {
        Self { proposed, timeout }
    }
}

/// Durable marker written whenever an upgrade attempt is aborted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReceipt {
    /// Upgrade sequence the abort applies to.
    pub sequence: u64,
    /// Message of the triggering error.
    pub message: String,
}

impl ErrorReceipt {
    /// Create a receipt.
    pub fn new(sequence: u64, message: impl Into<String>) -> Self {
        Self {
            sequence,
            message: message.into(),
        }
    }
}

/// Unforgeable token proving ownership of a port or channel end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityToken(Uuid);

impl CapabilityToken {
    /// Fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Opaque proof bytes relayed alongside a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentProof(Vec<u8>);

impl CommitmentProof {
    /// Wrap proof bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when no bytes were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(state: State) -> ChannelEnd {
        ChannelEnd::new(
            state,
            Order::Unordered,
            Counterparty::new(PortId::new("transfer"), Some(ChannelId::new(1))),
            vec![ConnectionId::new("connection-0")],
            "ics20-1",
        )
    }

    #[test]
    fn test_transition_rejects_invalid_edge() {
        let mut end = channel(State::Closed);
        let err = end.transition(State::Open).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidTransition { .. }));
        assert_eq!(end.state, State::Closed);
    }

    #[test]
    fn test_transition_applies_valid_edge() {
        let mut end = channel(State::Open);
        end.transition(State::InitUpgrade).unwrap();
        assert_eq!(end.state, State::InitUpgrade);
    }

    #[test]
    fn test_counterparty_matches() {
        let end = channel(State::Open);
        assert!(end.counterparty_matches(&PortId::new("transfer"), &ChannelId::new(1)));
        assert!(!end.counterparty_matches(&PortId::new("transfer"), &ChannelId::new(2)));
    }

    #[test]
    fn test_ack_envelopes() {
        let ok = Acknowledgement::success(b"done");
        assert!(ok.is_success());
        assert_eq!(ok.result(), Some(b"done".to_vec()));

        let err = Acknowledgement::error("insufficient funds");
        assert!(!err.is_success());
        assert_eq!(err.result(), None);

        let opaque = Acknowledgement::from_bytes(vec![0x01]).unwrap();
        assert!(opaque.is_success());
        assert!(Acknowledgement::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_packet_timed_out() {
        let packet = Packet {
            sequence: Sequence::from(1),
            source_port: PortId::new("transfer"),
            source_channel: ChannelId::new(0),
            destination_port: PortId::new("transfer"),
            destination_channel: ChannelId::new(1),
            data: vec![1],
            timeout_height: Height::new(0, 10),
            timeout_timestamp: Timestamp::none(),
        };
        assert!(!packet.timed_out(Height::new(0, 9), Timestamp::from_nanos(u64::MAX)));
        assert!(packet.timed_out(Height::new(0, 10), Timestamp::none()));
    }

    #[test]
    fn test_capability_tokens_unique() {
        assert_ne!(CapabilityToken::generate(), CapabilityToken::generate());
    }
}
