//! # Inbound Ports
//!
//! API trait defining what the channel subsystem can do.

use crate::domain::{
    Acknowledgement, CapabilityToken, ChannelError, ChannelId, ErrorReceipt,
    MsgAcknowledgement, MsgChannelCloseConfirm, MsgChannelCloseInit, MsgChannelOpenAck,
    MsgChannelOpenConfirm, MsgChannelOpenInit, MsgChannelOpenTry, MsgChannelUpgradeAck,
    MsgChannelUpgradeCancel, MsgChannelUpgradeConfirm, MsgChannelUpgradeInit,
    MsgChannelUpgradeTimeout, MsgChannelUpgradeTry, MsgRecvPacket, MsgTimeout, MsgTimeoutOnClose,
    Packet, PortId, RecvOutcome, Sequence, Timeout,
};

/// Result of `ChanOpenInit` / `ChanOpenTry`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelOpenResult {
    /// Local channel identifier.
    pub channel_id: ChannelId,
    /// Version recorded in the channel end.
    pub version: String,
    /// Capability for the channel end, held by the routed module.
    pub capability: CapabilityToken,
}

/// Outcome of a proof-gated upgrade step.
///
/// An abort is a committed transition: the channel was restored (or left
/// OPEN) and the error receipt is readable by the counterparty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The step was applied.
    Success {
        /// Upgrade sequence after the step.
        upgrade_sequence: u64,
        /// For `Try`: the pre-upgrade version. For `Ack`/`Confirm`: the
        /// version the channel now runs with.
        version: String,
    },
    /// The upgrade was aborted and this receipt was written.
    Aborted(ErrorReceipt),
}

impl UpgradeOutcome {
    /// Was the upgrade aborted?
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// Channel API - inbound port.
///
/// Every method is atomic: on `Err` no write is persisted.
pub trait ChannelApi {
    /// Start an opening handshake.
    fn chan_open_init(&mut self, msg: MsgChannelOpenInit)
        -> Result<ChannelOpenResult, ChannelError>;

    /// Answer a counterparty `ChanOpenInit`.
    fn chan_open_try(&mut self, msg: MsgChannelOpenTry) -> Result<ChannelOpenResult, ChannelError>;

    /// Complete the handshake on the initiating end.
    fn chan_open_ack(&mut self, msg: MsgChannelOpenAck) -> Result<(), ChannelError>;

    /// Complete the handshake on the answering end.
    fn chan_open_confirm(&mut self, msg: MsgChannelOpenConfirm) -> Result<(), ChannelError>;

    /// Close a channel locally.
    fn chan_close_init(&mut self, msg: MsgChannelCloseInit) -> Result<(), ChannelError>;

    /// Close after the counterparty closed.
    fn chan_close_confirm(&mut self, msg: MsgChannelCloseConfirm) -> Result<(), ChannelError>;

    /// Propose an upgrade. Returns the new upgrade sequence and the pre-upgrade version.
    fn chan_upgrade_init(&mut self, msg: MsgChannelUpgradeInit)
        -> Result<(u64, String), ChannelError>;

    /// Accept a counterparty proposal.
    fn chan_upgrade_try(&mut self, msg: MsgChannelUpgradeTry)
        -> Result<UpgradeOutcome, ChannelError>;

    /// Finish an upgrade on the initiating end.
    fn chan_upgrade_ack(&mut self, msg: MsgChannelUpgradeAck)
        -> Result<UpgradeOutcome, ChannelError>;

    /// Finish an upgrade on the answering end.
    fn chan_upgrade_confirm(
        &mut self,
        msg: MsgChannelUpgradeConfirm,
    ) -> Result<UpgradeOutcome, ChannelError>;

    /// Abort with the counterparty's error receipt.
    fn chan_upgrade_cancel(&mut self, msg: MsgChannelUpgradeCancel) -> Result<(), ChannelError>;

    /// Abort after the upgrade timeout elapsed on the counterparty.
    fn chan_upgrade_timeout(&mut self, msg: MsgChannelUpgradeTimeout) -> Result<(), ChannelError>;

    /// Send a packet. Returns its sequence.
    fn send_packet(
        &mut self,
        capability: &CapabilityToken,
        source_port: &PortId,
        source_channel: &ChannelId,
        timeout: Timeout,
        data: Vec<u8>,
    ) -> Result<Sequence, ChannelError>;

    /// Deliver a packet.
    fn recv_packet(&mut self, msg: MsgRecvPacket) -> Result<RecvOutcome, ChannelError>;

    /// Write a deferred acknowledgement.
    fn write_acknowledgement(
        &mut self,
        capability: &CapabilityToken,
        packet: &Packet,
        acknowledgement: Acknowledgement,
    ) -> Result<(), ChannelError>;

    /// Process an acknowledgement for a packet we sent.
    fn acknowledge_packet(&mut self, msg: MsgAcknowledgement) -> Result<(), ChannelError>;

    /// Time out a packet we sent.
    fn timeout_packet(&mut self, msg: MsgTimeout) -> Result<(), ChannelError>;

    /// Time out a packet because the counterparty closed the channel.
    fn timeout_on_close(&mut self, msg: MsgTimeoutOnClose) -> Result<(), ChannelError>;
}
