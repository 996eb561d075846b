//! # Store Paths
//!
//! Path-space as listed in ICS-024. Proofs are checked against these exact
//! strings, so both chains must render them byte-for-byte identically.

use std::fmt::{Display, Formatter, Result};

use super::identifiers::{ChannelId, ConnectionId, PortId, Sequence};

/// The Path enum abstracts out the different sub-paths.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Path {
    /// Connection end (read-only here).
    Connections(ConnectionId),
    /// Channel identifier counter.
    NextChannelSequence,
    /// Channel end.
    ChannelEnds(PortId, ChannelId),
    /// Next send sequence.
    SeqSends(PortId, ChannelId),
    /// Next receive sequence.
    SeqRecvs(PortId, ChannelId),
    /// Next acknowledgement sequence.
    SeqAcks(PortId, ChannelId),
    /// Packet commitment.
    Commitments(PortId, ChannelId, Sequence),
    /// Packet receipt.
    Receipts(PortId, ChannelId, Sequence),
    /// Acknowledgement commitment.
    Acks(PortId, ChannelId, Sequence),
    /// Upgrade proposal.
    Upgrades(PortId, ChannelId),
    /// Pre-upgrade channel end snapshot.
    UpgradeRestore(PortId, ChannelId),
    /// Upgrade sequence counter.
    UpgradeSequence(PortId, ChannelId),
    /// Upgrade error receipt.
    UpgradeError(PortId, ChannelId),
    /// Upgrade timeout.
    UpgradeTimeout(PortId, ChannelId),
}

impl Path {
    /// Store key: the UTF-8 path string.
    pub fn to_key(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match &self {
            Path::Connections(id) => write!(f, "connections/{}", id),
            Path::NextChannelSequence => f.write_str("nextChannelSequence"),
            Path::ChannelEnds(port_id, channel_id) => {
                write!(f, "channelEnds/ports/{}/channels/{}", port_id, channel_id)
            }
            Path::SeqSends(port_id, channel_id) => write!(
                f,
                "nextSequenceSend/ports/{}/channels/{}",
                port_id, channel_id
            ),
            Path::SeqRecvs(port_id, channel_id) => write!(
                f,
                "nextSequenceRecv/ports/{}/channels/{}",
                port_id, channel_id
            ),
            Path::SeqAcks(port_id, channel_id) => write!(
                f,
                "nextSequenceAck/ports/{}/channels/{}",
                port_id, channel_id
            ),
            Path::Commitments(port_id, channel_id, seq) => write!(
                f,
                "commitments/ports/{}/channels/{}/sequences/{}",
                port_id, channel_id, seq
            ),
            Path::Receipts(port_id, channel_id, seq) => write!(
                f,
                "receipts/ports/{}/channels/{}/sequences/{}",
                port_id, channel_id, seq
            ),
            Path::Acks(port_id, channel_id, seq) => write!(
                f,
                "acks/ports/{}/channels/{}/sequences/{}",
                port_id, channel_id, seq
            ),
            Path::Upgrades(port_id, channel_id) => write!(
                f,
                "channelUpgrades/upgrades/ports/{}/channels/{}",
                port_id, channel_id
            ),
            Path::UpgradeRestore(port_id, channel_id) => write!(
                f,
                "channelUpgrades/restore/ports/{}/channels/{}",
                port_id, channel_id
            ),
            Path::UpgradeSequence(port_id, channel_id) => write!(
                f,
                "channelUpgrades/upgradeSequence/ports/{}/channels/{}",
                port_id, channel_id
            ),
            Path::UpgradeError(port_id, channel_id) => write!(
                f,
                "channelUpgrades/upgradeError/ports/{}/channels/{}",
                port_id, channel_id
            ),
            Path::UpgradeTimeout(port_id, channel_id) => write!(
                f,
                "channelUpgrades/upgradeTimeout/ports/{}/channels/{}",
                port_id, channel_id
            ),
        }
    }
}
