//! # Channel API Implementation
//!
//! Implements [`ChannelApi`] on the keeper by running each operation in a
//! transaction.

use tracing::info;

use crate::domain::{
    Acknowledgement, CapabilityToken, ChannelError, ChannelId, MsgAcknowledgement,
    MsgChannelCloseConfirm, MsgChannelCloseInit, MsgChannelOpenAck, MsgChannelOpenConfirm,
    MsgChannelOpenInit, MsgChannelOpenTry, MsgChannelUpgradeAck, MsgChannelUpgradeCancel,
    MsgChannelUpgradeConfirm, MsgChannelUpgradeInit, MsgChannelUpgradeTimeout,
    MsgChannelUpgradeTry, MsgRecvPacket, MsgTimeout, MsgTimeoutOnClose, Packet, PortId,
    RecvOutcome, Sequence, Timeout,
};
use crate::ports::{
    CapabilityAdapter, ChannelApi, ChannelOpenResult, KeyValueStore, ProofVerifier,
    UpgradeOutcome,
};

use super::handshake::{self, Allocated};
use super::keeper::ChannelKeeper;
use super::packet as lifecycle;
use super::upgrade;

impl<S, V, C> ChannelKeeper<S, V, C>
where
    S: KeyValueStore,
    V: ProofVerifier,
    C: CapabilityAdapter,
{
    fn open_result(
        &mut self,
        port_id: &PortId,
        allocated: Allocated,
    ) -> Result<ChannelOpenResult, ChannelError> {
        let capability = if allocated.is_new {
            self.claim_channel(port_id, &allocated.channel_id)?
        } else {
            self.channel_capability(port_id, &allocated.channel_id)
                .ok_or_else(|| ChannelError::Unauthorized {
                    port_id: port_id.clone(),
                    channel_id: allocated.channel_id.clone(),
                })?
        };
        Ok(ChannelOpenResult {
            channel_id: allocated.channel_id,
            version: allocated.version,
            capability,
        })
    }
}

impl<S, V, C> ChannelApi for ChannelKeeper<S, V, C>
where
    S: KeyValueStore,
    V: ProofVerifier,
    C: CapabilityAdapter,
{
    fn chan_open_init(
        &mut self,
        msg: MsgChannelOpenInit,
    ) -> Result<ChannelOpenResult, ChannelError> {
        let allocated = self.execute("ChanOpenInit", |ctx| handshake::chan_open_init(ctx, &msg))?;
        self.open_result(&msg.port_id, allocated)
    }

    fn chan_open_try(&mut self, msg: MsgChannelOpenTry) -> Result<ChannelOpenResult, ChannelError> {
        let allocated = self.execute("ChanOpenTry", |ctx| handshake::chan_open_try(ctx, &msg))?;
        self.open_result(&msg.port_id, allocated)
    }

    fn chan_open_ack(&mut self, msg: MsgChannelOpenAck) -> Result<(), ChannelError> {
        self.execute("ChanOpenAck", |ctx| handshake::chan_open_ack(ctx, &msg))
    }

    fn chan_open_confirm(&mut self, msg: MsgChannelOpenConfirm) -> Result<(), ChannelError> {
        self.execute("ChanOpenConfirm", |ctx| handshake::chan_open_confirm(ctx, &msg))
    }

    fn chan_close_init(&mut self, msg: MsgChannelCloseInit) -> Result<(), ChannelError> {
        self.execute("ChanCloseInit", |ctx| handshake::chan_close_init(ctx, &msg))
    }

    fn chan_close_confirm(&mut self, msg: MsgChannelCloseConfirm) -> Result<(), ChannelError> {
        self.execute("ChanCloseConfirm", |ctx| handshake::chan_close_confirm(ctx, &msg))
    }

    fn chan_upgrade_init(
        &mut self,
        msg: MsgChannelUpgradeInit,
    ) -> Result<(u64, String), ChannelError> {
        self.execute("ChanUpgradeInit", |ctx| upgrade::chan_upgrade_init(ctx, &msg))
    }

    fn chan_upgrade_try(
        &mut self,
        msg: MsgChannelUpgradeTry,
    ) -> Result<UpgradeOutcome, ChannelError> {
        self.execute("ChanUpgradeTry", |ctx| upgrade::chan_upgrade_try(ctx, &msg))
    }

    fn chan_upgrade_ack(
        &mut self,
        msg: MsgChannelUpgradeAck,
    ) -> Result<UpgradeOutcome, ChannelError> {
        self.execute("ChanUpgradeAck", |ctx| upgrade::chan_upgrade_ack(ctx, &msg))
    }

    fn chan_upgrade_confirm(
        &mut self,
        msg: MsgChannelUpgradeConfirm,
    ) -> Result<UpgradeOutcome, ChannelError> {
        self.execute("ChanUpgradeConfirm", |ctx| {
            upgrade::chan_upgrade_confirm(ctx, &msg)
        })
    }

    fn chan_upgrade_cancel(&mut self, msg: MsgChannelUpgradeCancel) -> Result<(), ChannelError> {
        self.execute("ChanUpgradeCancel", |ctx| upgrade::chan_upgrade_cancel(ctx, &msg))
    }

    fn chan_upgrade_timeout(&mut self, msg: MsgChannelUpgradeTimeout) -> Result<(), ChannelError> {
        self.execute("ChanUpgradeTimeout", |ctx| {
            upgrade::chan_upgrade_timeout(ctx, &msg)
        })
    }

    fn send_packet(
        &mut self,
        capability: &CapabilityToken,
        source_port: &PortId,
        source_channel: &ChannelId,
        timeout: Timeout,
        data: Vec<u8>,
    ) -> Result<Sequence, ChannelError> {
        let sequence = self.execute("SendPacket", |ctx| {
            lifecycle::send_packet(ctx, capability, source_port, source_channel, timeout, data)
        })?;
        info!(
            port = %source_port,
            channel = %source_channel,
            sequence = %sequence,
            "[qc-15] 📤 Packet committed"
        );
        Ok(sequence)
    }

    fn recv_packet(&mut self, msg: MsgRecvPacket) -> Result<RecvOutcome, ChannelError> {
        self.execute("RecvPacket", |ctx| lifecycle::recv_packet(ctx, &msg))
    }

    fn write_acknowledgement(
        &mut self,
        capability: &CapabilityToken,
        packet: &Packet,
        acknowledgement: Acknowledgement,
    ) -> Result<(), ChannelError> {
        self.execute("WriteAcknowledgement", |ctx| {
            lifecycle::write_acknowledgement(ctx, capability, packet, acknowledgement)
        })
    }

    fn acknowledge_packet(&mut self, msg: MsgAcknowledgement) -> Result<(), ChannelError> {
        self.execute("AcknowledgePacket", |ctx| lifecycle::acknowledge_packet(ctx, &msg))
    }

    fn timeout_packet(&mut self, msg: MsgTimeout) -> Result<(), ChannelError> {
        self.execute("TimeoutPacket", |ctx| lifecycle::timeout_packet(ctx, &msg))
    }

    fn timeout_on_close(&mut self, msg: MsgTimeoutOnClose) -> Result<(), ChannelError> {
        self.execute("TimeoutOnClose", |ctx| lifecycle::timeout_on_close(ctx, &msg))
    }
}
