//! # Channel Events
//!
//! One event per committed transition. Events raised inside a transaction
//! that is later rejected are dropped together with its writes.

use serde::{Deserialize, Serialize};

use super::entities::{Acknowledgement, ErrorReceipt, Packet};
use super::identifiers::{ChannelId, ConnectionId, PortId};
use super::value_objects::Order;

/// Channel subsystem events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEvent {
    /// `ChanOpenInit` committed.
    OpenInit {
        /// Local port
        port_id: PortId,
        /// Allocated channel
        channel_id: ChannelId,
        /// Remote port
        counterparty_port_id: PortId,
        /// Connection used
        connection_id: ConnectionId,
        /// Version chosen by the application
        version: String,
    },
    /// `ChanOpenTry` committed.
    OpenTry {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Remote port
        counterparty_port_id: PortId,
        /// Remote channel
        counterparty_channel_id: ChannelId,
        /// Connection used
        connection_id: ConnectionId,
        /// Version chosen by the application
        version: String,
    },
    /// `ChanOpenAck` committed.
    OpenAck {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Remote channel
        counterparty_channel_id: ChannelId,
    },
    /// `ChanOpenConfirm` committed.
    OpenConfirm {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
    },
    /// `ChanCloseInit` committed.
    CloseInit {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
    },
    /// `ChanCloseConfirm` committed.
    CloseConfirm {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
    },
    /// Channel closed by an ORDERED packet timeout.
    ChannelClosed {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Ordering of the closed channel
        ordering: Order,
    },
    /// Packet commitment written.
    SendPacket {
        /// The packet
        packet: Packet,
    },
    /// Packet delivered to the application.
    RecvPacket {
        /// The packet
        packet: Packet,
    },
    /// Acknowledgement commitment written.
    WriteAcknowledgement {
        /// The packet
        packet: Packet,
        /// The acknowledgement
        acknowledgement: Acknowledgement,
    },
    /// Packet commitment cleared by an acknowledgement.
    AcknowledgePacket {
        /// The packet
        packet: Packet,
    },
    /// Packet commitment cleared by a timeout.
    TimeoutPacket {
        /// The packet
        packet: Packet,
    },
    /// `ChanUpgradeInit` committed.
    UpgradeInit {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// New upgrade sequence
        upgrade_sequence: u64,
        /// Proposed version
        version: String,
    },
    /// `ChanUpgradeTry` committed.
    UpgradeTry {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Upgrade sequence
        upgrade_sequence: u64,
        /// Negotiated version
        version: String,
    },
    /// `ChanUpgradeAck` committed (initiator now OPEN with the new parameters).
    UpgradeAck {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Upgrade sequence
        upgrade_sequence: u64,
    },
    /// Upgrade finalised locally.
    UpgradeOpen {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Upgrade sequence
        upgrade_sequence: u64,
        /// Ordering after the upgrade
        ordering: Order,
        /// Version after the upgrade
        version: String,
    },
    /// Upgrade aborted; an error receipt was written.
    UpgradeError {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Receipt written
        receipt: ErrorReceipt,
    },
    /// Upgrade cancelled with the counterparty's error receipt.
    UpgradeCancelled {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Upgrade sequence after cancellation
        upgrade_sequence: u64,
    },
    /// Upgrade rolled back after its timeout elapsed.
    UpgradeTimedOut {
        /// Local port
        port_id: PortId,
        /// Local channel
        channel_id: ChannelId,
        /// Upgrade sequence
        upgrade_sequence: u64,
    },
}

impl ChannelEvent {
    /// Short event name, as used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenInit { .. } => "channel_open_init",
            Self::OpenTry { .. } => "channel_open_try",
            Self::OpenAck { .. } => "channel_open_ack",
            Self::OpenConfirm { .. } => "channel_open_confirm",
            Self::CloseInit { .. } => "channel_close_init",
            Self::CloseConfirm { .. } => "channel_close_confirm",
            Self::ChannelClosed { .. } => "channel_closed",
            Self::SendPacket { .. } => "send_packet",
            Self::RecvPacket { .. } => "recv_packet",
            Self::WriteAcknowledgement { .. } => "write_acknowledgement",
            Self::AcknowledgePacket { .. } => "acknowledge_packet",
            Self::TimeoutPacket { .. } => "timeout_packet",
            Self::UpgradeInit { .. } => "channel_upgrade_init",
            Self::UpgradeTry { .. } => "channel_upgrade_try",
            Self::UpgradeAck { .. } => "channel_upgrade_ack",
            Self::UpgradeOpen { .. } => "channel_upgrade_open",
            Self::UpgradeError { .. } => "channel_upgrade_error",
            Self::UpgradeCancelled { .. } => "channel_upgrade_cancelled",
            Self::UpgradeTimedOut { .. } => "channel_upgrade_timeout",
        }
    }
}
