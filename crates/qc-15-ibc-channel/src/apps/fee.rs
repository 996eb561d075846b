//! # Fee Middleware (ICS-29)
//!
//! Wraps an application to pay relayers for delivering packets.
//!
//! Fee-enabled channels carry a JSON version envelope
//! `{"fee_version":"ics29-1","app_version":"..."}`; the wrapped application
//! only ever sees `app_version`. On fee-enabled channels every
//! acknowledgement, synchronous or written later by the application, is
//! wrapped in an [`IncentivizedAcknowledgement`] naming the relayer that
//! delivered the packet.
//!
//! Callbacks run inside keeper transactions, so the middleware stages its
//! fee-state changes and applies them only when the keeper reports a commit.
//! A rejected transaction leaves escrow, balances and enabled channels as
//! they were.
//!
//! Fees are escrowed per packet through a [`FeeController`] and paid out on
//! acknowledgement or timeout. The controller's `locked` flag is a circuit
//! breaker: only the configured authority can set it, and while it is set no
//! fee is escrowed or distributed while packets keep flowing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    Acknowledgement, ChannelError, ChannelId, ConnectionId, Counterparty, Order, Packet, PortId,
    RecvOutcome, Sequence,
};
use crate::ports::ChannelModule;

/// Fee version negotiated on fee-enabled channels.
pub const FEE_VERSION: &str = "ics29-1";

/// Version envelope of a fee-enabled channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMetadata {
    /// Must be [`FEE_VERSION`].
    pub fee_version: String,
    /// Version of the wrapped application.
    pub app_version: String,
}

impl FeeMetadata {
    /// Envelope around `app_version`.
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            fee_version: FEE_VERSION.to_string(),
            app_version: app_version.into(),
        }
    }

    /// Parse a channel version. `None` when the version is not an envelope.
    pub fn parse(version: &str) -> Option<Self> {
        serde_json::from_str(version).ok()
    }

    /// JSON channel version.
    pub fn to_version(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::InvalidMessage(e.to_string()))
    }
}

/// Acknowledgement written on fee-enabled channels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncentivizedAcknowledgement {
    /// Hex of the wrapped application's acknowledgement bytes.
    pub app_acknowledgement: String,
    /// Relayer that delivered the packet, paid the receive fee.
    pub forward_relayer_address: String,
    /// Did the wrapped application succeed?
    pub underlying_app_success: bool,
}

impl IncentivizedAcknowledgement {
    fn wrap(app_ack: &Acknowledgement, relayer: &str) -> Self {
        Self {
            app_acknowledgement: hex::encode(app_ack.as_bytes()),
            forward_relayer_address: relayer.to_string(),
            underlying_app_success: app_ack.is_success(),
        }
    }

    /// Acknowledgement bytes carrying this envelope.
    fn encode(&self) -> Result<Acknowledgement, FeeError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| FeeError::MalformedAcknowledgement(e.to_string()))?;
        Acknowledgement::from_bytes(bytes)
            .map_err(|e| FeeError::MalformedAcknowledgement(e.to_string()))
    }

    /// Decode from acknowledgement bytes.
    pub fn decode(ack: &Acknowledgement) -> Result<Self, FeeError> {
        serde_json::from_slice(ack.as_bytes())
            .map_err(|e| FeeError::MalformedAcknowledgement(e.to_string()))
    }

    /// The wrapped application's acknowledgement.
    pub fn app_acknowledgement(&self) -> Result<Acknowledgement, FeeError> {
        let bytes = hex::decode(&self.app_acknowledgement)
            .map_err(|e| FeeError::MalformedAcknowledgement(e.to_string()))?;
        Acknowledgement::from_bytes(bytes)
            .map_err(|e| FeeError::MalformedAcknowledgement(e.to_string()))
    }
}

/// Fees escrowed for one packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketFee {
    /// Paid to the relayer that delivered the packet.
    pub recv_fee: u64,
    /// Paid to the relayer that relayed the acknowledgement.
    pub ack_fee: u64,
    /// Paid to the relayer that relayed the timeout.
    pub timeout_fee: u64,
    /// Receives whatever is not paid out.
    pub refund_address: String,
}

impl PacketFee {
    fn validate(&self) -> Result<(), FeeError> {
        if self.refund_address.trim().is_empty() {
            return Err(FeeError::InvalidFee("refund address cannot be empty".into()));
        }
        if self.recv_fee == 0 && self.ack_fee == 0 && self.timeout_fee == 0 {
            return Err(FeeError::InvalidFee("all fees are zero".into()));
        }
        Ok(())
    }
}

/// Fee middleware errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeeError {
    /// The circuit breaker is engaged.
    #[error("Fee module is locked")]
    Locked,

    /// Caller is not the fee authority.
    #[error("{0} is not the fee authority")]
    Unauthorized(String),

    /// Channel does not run the fee protocol.
    #[error("Fees not enabled on {port_id}/{channel_id}")]
    FeeNotEnabled {
        /// Port
        port_id: PortId,
        /// Channel
        channel_id: ChannelId,
    },

    /// Rejected fee.
    #[error("Invalid fee: {0}")]
    InvalidFee(String),

    /// Version envelope with a fee version other than ours.
    #[error("Expected fee version ics29-1, got {0}")]
    InvalidFeeVersion(String),

    /// A deferred acknowledgement for a packet whose receiving relayer was
    /// never recorded.
    #[error("No forward relayer recorded for packet {0}")]
    RelayerNotFound(Sequence),

    /// Counterparty acknowledgement is not an incentivized acknowledgement.
    #[error("Malformed incentivized acknowledgement: {0}")]
    MalformedAcknowledgement(String),
}

type PacketKey = (PortId, ChannelId, Sequence);

#[derive(Debug, Default)]
struct FeeState {
    locked: bool,
    enabled: BTreeSet<(PortId, ChannelId)>,
    escrow: BTreeMap<PacketKey, Vec<PacketFee>>,
    balances: BTreeMap<String, u64>,
    /// Relayer that delivered a packet whose acknowledgement is deferred,
    /// keyed by the destination end.
    forward_relayers: BTreeMap<PacketKey, String>,
}

impl FeeState {
    fn credit(&mut self, address: &str, amount: u64) {
        if amount == 0 || address.is_empty() {
            return;
        }
        let balance = self.balances.entry(address.to_string()).or_default();
        *balance = balance.saturating_add(amount);
    }
}

/// Fee-state change made by a callback, applied once the transaction
/// that ran the callback commits.
#[derive(Clone, Debug, PartialEq, Eq)]
enum StagedFee {
    Enable {
        port_id: PortId,
        channel_id: ChannelId,
        enabled: bool,
    },
    PayOnAck {
        key: PacketKey,
        forward_relayer: String,
        ack_relayer: String,
    },
    PayOnTimeout {
        key: PacketKey,
        timeout_relayer: String,
    },
    Refund {
        port_id: PortId,
        channel_id: ChannelId,
    },
    RecordRelayer {
        key: PacketKey,
        relayer: String,
    },
    ForgetRelayer {
        key: PacketKey,
    },
}

fn source_key(packet: &Packet) -> PacketKey {
    (
        packet.source_port.clone(),
        packet.source_channel.clone(),
        packet.sequence,
    )
}

fn destination_key(packet: &Packet) -> PacketKey {
    (
        packet.destination_port.clone(),
        packet.destination_channel.clone(),
        packet.sequence,
    )
}

/// Shared handle on the middleware's fee state.
///
/// The middleware itself lives in the keeper's router; the host keeps a
/// controller to escrow fees and operate the circuit breaker.
#[derive(Clone, Debug)]
pub struct FeeController {
    authority: String,
    state: Arc<RwLock<FeeState>>,
}

impl FeeController {
    /// Controller whose circuit breaker is operated by `authority`.
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            state: Arc::default(),
        }
    }

    fn authorize(&self, caller: &str) -> Result<(), FeeError> {
        if caller != self.authority {
            return Err(FeeError::Unauthorized(caller.to_string()));
        }
        Ok(())
    }

    /// Engage the circuit breaker.
    pub fn lock(&self, caller: &str) -> Result<(), FeeError> {
        self.authorize(caller)?;
        self.state.write().locked = true;
        warn!("[qc-15] 🔒 Fee module locked by {}", caller);
        Ok(())
    }

    /// Release the circuit breaker.
    pub fn unlock(&self, caller: &str) -> Result<(), FeeError> {
        self.authorize(caller)?;
        self.state.write().locked = false;
        info!("[qc-15] 🔓 Fee module unlocked by {}", caller);
        Ok(())
    }

    /// Is the circuit breaker engaged?
    pub fn is_locked(&self) -> bool {
        self.state.read().locked
    }

    /// Does the channel run the fee protocol?
    pub fn is_fee_enabled(&self, port_id: &PortId, channel_id: &ChannelId) -> bool {
        self.state
            .read()
            .enabled
            .contains(&(port_id.clone(), channel_id.clone()))
    }

    fn set_fee_enabled(&self, port_id: &PortId, channel_id: &ChannelId, enabled: bool) {
        let key = (port_id.clone(), channel_id.clone());
        let mut state = self.state.write();
        if enabled {
            state.enabled.insert(key);
        } else {
            state.enabled.remove(&key);
        }
    }

    /// Escrow `fee` for a packet sent on a fee-enabled channel.
    pub fn pay_packet_fee(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
        fee: PacketFee,
    ) -> Result<(), FeeError> {
        fee.validate()?;
        let mut state = self.state.write();
        if state.locked {
            return Err(FeeError::Locked);
        }
        if !state
            .enabled
            .contains(&(port_id.clone(), channel_id.clone()))
        {
            return Err(FeeError::FeeNotEnabled {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            });
        }
        state
            .escrow
            .entry((port_id.clone(), channel_id.clone(), sequence))
            .or_default()
            .push(fee);
        Ok(())
    }

    /// Fees escrowed for a packet.
    pub fn fees_in_escrow(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
    ) -> Vec<PacketFee> {
        self.state
            .read()
            .escrow
            .get(&(port_id.clone(), channel_id.clone(), sequence))
            .cloned()
            .unwrap_or_default()
    }

    /// Total paid out to `address`.
    pub fn balance(&self, address: &str) -> u64 {
        self.state.read().balances.get(address).copied().unwrap_or(0)
    }

    /// Relayer recorded for a deferred acknowledgement.
    fn forward_relayer(&self, key: &PacketKey) -> Option<String> {
        self.state.read().forward_relayers.get(key).cloned()
    }

    fn apply(&self, change: StagedFee) {
        match change {
            StagedFee::Enable {
                port_id,
                channel_id,
                enabled,
            } => self.set_fee_enabled(&port_id, &channel_id, enabled),
            StagedFee::PayOnAck {
                key,
                forward_relayer,
                ack_relayer,
            } => self.distribute_on_ack(&key, &forward_relayer, &ack_relayer),
            StagedFee::PayOnTimeout {
                key,
                timeout_relayer,
            } => self.distribute_on_timeout(&key, &timeout_relayer),
            StagedFee::Refund {
                port_id,
                channel_id,
            } => self.refund_channel(&port_id, &channel_id),
            StagedFee::RecordRelayer { key, relayer } => {
                self.state.write().forward_relayers.insert(key, relayer);
            }
            StagedFee::ForgetRelayer { key } => {
                self.state.write().forward_relayers.remove(&key);
            }
        }
    }

    fn distribute_on_ack(&self, key: &PacketKey, forward_relayer: &str, ack_relayer: &str) {
        let mut state = self.state.write();
        for fee in state.escrow.remove(key).unwrap_or_default() {
            // No forward relayer means nobody is owed the receive fee.
            if forward_relayer.is_empty() {
                state.credit(&fee.refund_address, fee.recv_fee);
            } else {
                state.credit(forward_relayer, fee.recv_fee);
            }
            state.credit(ack_relayer, fee.ack_fee);
            state.credit(&fee.refund_address, fee.timeout_fee);
        }
    }

    fn distribute_on_timeout(&self, key: &PacketKey, timeout_relayer: &str) {
        let mut state = self.state.write();
        for fee in state.escrow.remove(key).unwrap_or_default() {
            state.credit(timeout_relayer, fee.timeout_fee);
            state.credit(
                &fee.refund_address,
                fee.recv_fee.saturating_add(fee.ack_fee),
            );
        }
    }

    fn refund_channel(&self, port_id: &PortId, channel_id: &ChannelId) {
        let mut state = self.state.write();
        if state.locked {
            return;
        }
        let keys: Vec<PacketKey> = state
            .escrow
            .keys()
            .filter(|(p, c, _)| p == port_id && c == channel_id)
            .cloned()
            .collect();
        for key in keys {
            for fee in state.escrow.remove(&key).unwrap_or_default() {
                let total = fee
                    .recv_fee
                    .saturating_add(fee.ack_fee)
                    .saturating_add(fee.timeout_fee);
                state.credit(&fee.refund_address, total);
            }
        }
    }
}

/// ICS-29 middleware around `app`.
pub struct FeeMiddleware<M> {
    app: M,
    controller: FeeController,
    relayer: String,
    staged: Vec<StagedFee>,
}

impl<M: ChannelModule> FeeMiddleware<M> {
    /// Wrap `app`. `relayer` is the address this chain's relayer is paid at.
    pub fn new(app: M, controller: FeeController, relayer: impl Into<String>) -> Self {
        Self {
            app,
            controller,
            relayer: relayer.into(),
            staged: Vec::new(),
        }
    }

    /// Handle on the fee state.
    pub fn controller(&self) -> FeeController {
        self.controller.clone()
    }

    fn stage_enabled(&mut self, port_id: &PortId, channel_id: &ChannelId, enabled: bool) {
        self.staged.push(StagedFee::Enable {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
            enabled,
        });
    }

    fn stage_refund(&mut self, port_id: &PortId, channel_id: &ChannelId) {
        self.staged.push(StagedFee::Refund {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
        });
    }

    fn reject(port_id: &PortId, err: FeeError) -> ChannelError {
        ChannelError::AppCallback {
            port_id: port_id.clone(),
            reason: err.to_string(),
        }
    }

    /// Parse a proposed version. `Ok(None)` means the channel is not fee enabled.
    fn metadata(port_id: &PortId, version: &str) -> Result<Option<FeeMetadata>, ChannelError> {
        // An empty proposal defaults to a fee-enabled channel.
        if version.trim().is_empty() {
            return Ok(Some(FeeMetadata::new("")));
        }
        match FeeMetadata::parse(version) {
            Some(md) if md.fee_version != FEE_VERSION => Err(Self::reject(
                port_id,
                FeeError::InvalidFeeVersion(md.fee_version),
            )),
            other => Ok(other),
        }
    }

    /// Parse a counterparty version on a fee-enabled channel.
    fn counterparty_metadata(
        port_id: &PortId,
        counterparty_version: &str,
    ) -> Result<FeeMetadata, ChannelError> {
        let md = FeeMetadata::parse(counterparty_version).ok_or_else(|| {
            Self::reject(
                port_id,
                FeeError::InvalidFeeVersion(counterparty_version.to_string()),
            )
        })?;
        if md.fee_version != FEE_VERSION {
            return Err(Self::reject(port_id, FeeError::InvalidFeeVersion(md.fee_version)));
        }
        Ok(md)
    }

    fn propose(
        &mut self,
        port_id: &PortId,
        version: &str,
        inner: impl FnOnce(&mut M, &str) -> Result<String, ChannelError>,
    ) -> Result<(String, bool), ChannelError> {
        match Self::metadata(port_id, version)? {
            Some(md) => {
                let app_version = inner(&mut self.app, &md.app_version)?;
                Ok((FeeMetadata::new(app_version).to_version()?, true))
            }
            None => Ok((inner(&mut self.app, version)?, false)),
        }
    }
}

impl<M: ChannelModule> ChannelModule for FeeMiddleware<M> {
    fn on_chan_open_init(
        &mut self,
        order: Order,
        connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty: &Counterparty,
        version: &str,
    ) -> Result<String, ChannelError> {
        let (version, enabled) = self.propose(port_id, version, |app, v| {
            app.on_chan_open_init(order, connection_hops, port_id, channel_id, counterparty, v)
        })?;
        self.stage_enabled(port_id, channel_id, enabled);
        Ok(version)
    }

    fn on_chan_open_try(
        &mut self,
        order: Order,
        connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty: &Counterparty,
        counterparty_version: &str,
    ) -> Result<String, ChannelError> {
        let Some(md) = FeeMetadata::parse(counterparty_version) else {
            self.stage_enabled(port_id, channel_id, false);
            return self.app.on_chan_open_try(
                order,
                connection_hops,
                port_id,
                channel_id,
                counterparty,
                counterparty_version,
            );
        };
        if md.fee_version != FEE_VERSION {
            return Err(Self::reject(port_id, FeeError::InvalidFeeVersion(md.fee_version)));
        }
        let app_version = self.app.on_chan_open_try(
            order,
            connection_hops,
            port_id,
            channel_id,
            counterparty,
            &md.app_version,
        )?;
        self.stage_enabled(port_id, channel_id, true);
        FeeMetadata::new(app_version).to_version()
    }

    fn on_chan_open_ack(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty_channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), ChannelError> {
        if !self.controller.is_fee_enabled(port_id, channel_id) {
            return self.app.on_chan_open_ack(
                port_id,
                channel_id,
                counterparty_channel_id,
                counterparty_version,
            );
        }
        let md = Self::counterparty_metadata(port_id, counterparty_version)?;
        self.app
            .on_chan_open_ack(port_id, channel_id, counterparty_channel_id, &md.app_version)
    }

    fn on_chan_open_confirm(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        self.app.on_chan_open_confirm(port_id, channel_id)
    }

    fn on_chan_close_init(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        self.app.on_chan_close_init(port_id, channel_id)?;
        self.stage_refund(port_id, channel_id);
        Ok(())
    }

    fn on_chan_close_confirm(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        self.app.on_chan_close_confirm(port_id, channel_id)?;
        self.stage_refund(port_id, channel_id);
        Ok(())
    }

    fn on_recv_packet(&mut self, packet: &Packet) -> RecvOutcome {
        let outcome = self.app.on_recv_packet(packet);
        if !self
            .controller
            .is_fee_enabled(&packet.destination_port, &packet.destination_channel)
        {
            return outcome;
        }
        match outcome {
            RecvOutcome::Ack(app_ack) => {
                match IncentivizedAcknowledgement::wrap(&app_ack, &self.relayer).encode() {
                    Ok(ack) => RecvOutcome::Ack(ack),
                    Err(_) => RecvOutcome::Ack(app_ack),
                }
            }
            RecvOutcome::Pending => {
                self.staged.push(StagedFee::RecordRelayer {
                    key: destination_key(packet),
                    relayer: self.relayer.clone(),
                });
                RecvOutcome::Pending
            }
        }
    }

    fn on_write_acknowledgement(
        &mut self,
        packet: &Packet,
        acknowledgement: Acknowledgement,
    ) -> Result<Acknowledgement, ChannelError> {
        let app_ack = self.app.on_write_acknowledgement(packet, acknowledgement)?;
        let port_id = &packet.destination_port;
        if !self
            .controller
            .is_fee_enabled(port_id, &packet.destination_channel)
        {
            return Ok(app_ack);
        }
        let key = destination_key(packet);
        let relayer = self
            .controller
            .forward_relayer(&key)
            .ok_or_else(|| Self::reject(port_id, FeeError::RelayerNotFound(packet.sequence)))?;
        let ack = IncentivizedAcknowledgement::wrap(&app_ack, &relayer)
            .encode()
            .map_err(|e| Self::reject(port_id, e))?;
        self.staged.push(StagedFee::ForgetRelayer { key });
        Ok(ack)
    }

    fn on_acknowledgement_packet(
        &mut self,
        packet: &Packet,
        acknowledgement: &Acknowledgement,
    ) -> Result<(), ChannelError> {
        if !self
            .controller
            .is_fee_enabled(&packet.source_port, &packet.source_channel)
        {
            return self.app.on_acknowledgement_packet(packet, acknowledgement);
        }
        let port_id = &packet.source_port;
        let ack = IncentivizedAcknowledgement::decode(acknowledgement)
            .map_err(|e| Self::reject(port_id, e))?;
        let app_ack = ack
            .app_acknowledgement()
            .map_err(|e| Self::reject(port_id, e))?;

        self.app.on_acknowledgement_packet(packet, &app_ack)?;
        if !self.controller.is_locked() {
            self.staged.push(StagedFee::PayOnAck {
                key: source_key(packet),
                forward_relayer: ack.forward_relayer_address,
                ack_relayer: self.relayer.clone(),
            });
        }
        Ok(())
    }

    fn on_timeout_packet(&mut self, packet: &Packet) -> Result<(), ChannelError> {
        self.app.on_timeout_packet(packet)?;
        if self
            .controller
            .is_fee_enabled(&packet.source_port, &packet.source_channel)
            && !self.controller.is_locked()
        {
            self.staged.push(StagedFee::PayOnTimeout {
                key: source_key(packet),
                timeout_relayer: self.relayer.clone(),
            });
        }
        Ok(())
    }

    fn on_chan_upgrade_init(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        order: Order,
        connection_hops: &[ConnectionId],
        version: &str,
    ) -> Result<String, ChannelError> {
        let (version, _) = self.propose(port_id, version, |app, v| {
            app.on_chan_upgrade_init(port_id, channel_id, order, connection_hops, v)
        })?;
        Ok(version)
    }

    fn intersect_upgrade_versions(&self, ours: &str, theirs: &str) -> Option<String> {
        match (FeeMetadata::parse(ours), FeeMetadata::parse(theirs)) {
            (Some(ours), Some(theirs)) => {
                if ours.fee_version != FEE_VERSION || theirs.fee_version != FEE_VERSION {
                    return None;
                }
                let common = self
                    .app
                    .intersect_upgrade_versions(&ours.app_version, &theirs.app_version)?;
                FeeMetadata::new(common).to_version().ok()
            }
            (None, None) => self.app.intersect_upgrade_versions(ours, theirs),
            // One side wants fees and the other does not.
            _ => None,
        }
    }

    fn on_chan_upgrade_try(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        order: Order,
        connection_hops: &[ConnectionId],
        counterparty_version: &str,
    ) -> Result<String, ChannelError> {
        match FeeMetadata::parse(counterparty_version) {
            Some(md) => {
                if md.fee_version != FEE_VERSION {
                    return Err(Self::reject(port_id, FeeError::InvalidFeeVersion(md.fee_version)));
                }
                let app_version = self.app.on_chan_upgrade_try(
                    port_id,
                    channel_id,
                    order,
                    connection_hops,
                    &md.app_version,
                )?;
                FeeMetadata::new(app_version).to_version()
            }
            None => self.app.on_chan_upgrade_try(
                port_id,
                channel_id,
                order,
                connection_hops,
                counterparty_version,
            ),
        }
    }

    fn on_chan_upgrade_ack(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), ChannelError> {
        match FeeMetadata::parse(counterparty_version) {
            Some(md) => {
                if md.fee_version != FEE_VERSION {
                    return Err(Self::reject(port_id, FeeError::InvalidFeeVersion(md.fee_version)));
                }
                self.app
                    .on_chan_upgrade_ack(port_id, channel_id, &md.app_version)
            }
            None => self
                .app
                .on_chan_upgrade_ack(port_id, channel_id, counterparty_version),
        }
    }

    fn on_chan_upgrade_open(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        order: Order,
        connection_hops: &[ConnectionId],
        version: &str,
    ) {
        let enabled = match FeeMetadata::parse(version) {
            Some(md) => {
                self.app.on_chan_upgrade_open(
                    port_id,
                    channel_id,
                    order,
                    connection_hops,
                    &md.app_version,
                );
                true
            }
            None => {
                self.app
                    .on_chan_upgrade_open(port_id, channel_id, order, connection_hops, version);
                false
            }
        };
        self.stage_enabled(port_id, channel_id, enabled);
        info!(
            port = %port_id,
            channel = %channel_id,
            fee_enabled = enabled,
            "[qc-15] Fee middleware upgraded channel"
        );
    }

    fn on_commit(&mut self) {
        for change in self.staged.drain(..) {
            self.controller.apply(change);
        }
        self.app.on_commit();
    }

    fn on_rollback(&mut self) {
        if !self.staged.is_empty() {
            debug!("[qc-15] Fee middleware dropped {} staged changes", self.staged.len());
            self.staged.clear();
        }
        self.app.on_rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{MockModule, MockRecv, MOCK_ACK_RESULT};
    use crate::domain::{Height, Timestamp};

    const AUTHORITY: &str = "gov";
    const RELAYER: &str = "relayer-a";

    fn ids() -> (PortId, ChannelId) {
        (PortId::new("mock"), ChannelId::new(0))
    }

    fn fee_app() -> FeeMiddleware<MockModule> {
        FeeMiddleware::new(MockModule::new("mock-v1"), FeeController::new(AUTHORITY), RELAYER)
    }

    fn open_fee_channel(app: &mut FeeMiddleware<MockModule>) -> String {
        let (port, chan) = ids();
        let version = app
            .on_chan_open_init(
                Order::Unordered,
                &[],
                &port,
                &chan,
                &Counterparty::new(PortId::new("mock"), None),
                &FeeMetadata::new("mock-v1").to_version().unwrap(),
            )
            .unwrap();
        app.on_commit();
        version
    }

    fn envelope(app_version: &str) -> String {
        FeeMetadata::new(app_version).to_version().unwrap()
    }

    fn packet(seq: u64) -> Packet {
        let (port, chan) = ids();
        Packet {
            sequence: seq.into(),
            source_port: port.clone(),
            source_channel: chan.clone(),
            destination_port: port,
            destination_channel: chan,
            data: b"data".to_vec(),
            timeout_height: Height::new(0, 100),
            timeout_timestamp: Timestamp::none(),
        }
    }

    fn fee() -> PacketFee {
        PacketFee {
            recv_fee: 10,
            ack_fee: 5,
            timeout_fee: 3,
            refund_address: "payer".into(),
        }
    }

    #[test]
    fn test_open_init_wraps_app_version() {
        let mut app = fee_app();
        let version = open_fee_channel(&mut app);
        let md = FeeMetadata::parse(&version).unwrap();
        assert_eq!(md.fee_version, FEE_VERSION);
        assert_eq!(md.app_version, "mock-v1");

        let (port, chan) = ids();
        assert!(app.controller().is_fee_enabled(&port, &chan));
    }

    #[test]
    fn test_plain_version_passes_through() {
        let mut app = fee_app();
        let (port, chan) = ids();
        let version = app
            .on_chan_open_init(
                Order::Unordered,
                &[],
                &port,
                &chan,
                &Counterparty::new(PortId::new("mock"), None),
                "mock-v1",
            )
            .unwrap();
        assert_eq!(version, "mock-v1");
        assert!(!app.controller().is_fee_enabled(&port, &chan));
    }

    #[test]
    fn test_wrong_fee_version_rejected() {
        let mut app = fee_app();
        let (port, chan) = ids();
        let bad = r#"{"fee_version":"ics29-9","app_version":"mock-v1"}"#;
        let err = app
            .on_chan_open_init(
                Order::Unordered,
                &[],
                &port,
                &chan,
                &Counterparty::new(PortId::new("mock"), None),
                bad,
            )
            .unwrap_err();
        assert!(matches!(err, ChannelError::AppCallback { .. }));
    }

    #[test]
    fn test_recv_wraps_and_ack_distributes() {
        let mut app = fee_app();
        open_fee_channel(&mut app);
        let controller = app.controller();
        let (port, chan) = ids();
        controller.pay_packet_fee(&port, &chan, 1u64.into(), fee()).unwrap();

        let ack = match app.on_recv_packet(&packet(1)) {
            RecvOutcome::Ack(ack) => ack,
            RecvOutcome::Pending => panic!("expected ack"),
        };
        let incentivized = IncentivizedAcknowledgement::decode(&ack).unwrap();
        assert_eq!(incentivized.forward_relayer_address, RELAYER);
        assert!(incentivized.underlying_app_success);
        assert_eq!(
            incentivized.app_acknowledgement().unwrap().result().as_deref(),
            Some(MOCK_ACK_RESULT)
        );

        app.on_acknowledgement_packet(&packet(1), &ack).unwrap();
        app.on_commit();
        assert_eq!(controller.balance(RELAYER), 15);
        assert_eq!(controller.balance("payer"), 3);
        assert!(controller.fees_in_escrow(&port, &chan, 1u64.into()).is_empty());
    }

    #[test]
    fn test_timeout_refunds_recv_and_ack_fees() {
        let mut app = fee_app();
        open_fee_channel(&mut app);
        let controller = app.controller();
        let (port, chan) = ids();
        controller.pay_packet_fee(&port, &chan, 2u64.into(), fee()).unwrap();

        app.on_timeout_packet(&packet(2)).unwrap();
        app.on_commit();
        assert_eq!(controller.balance(RELAYER), 3);
        assert_eq!(controller.balance("payer"), 15);
    }

    #[test]
    fn test_circuit_breaker() {
        let mut app = fee_app();
        open_fee_channel(&mut app);
        let controller = app.controller();
        let (port, chan) = ids();
        controller.pay_packet_fee(&port, &chan, 1u64.into(), fee()).unwrap();

        assert_eq!(
            controller.lock("mallory"),
            Err(FeeError::Unauthorized("mallory".into()))
        );
        controller.lock(AUTHORITY).unwrap();
        assert_eq!(
            controller.pay_packet_fee(&port, &chan, 2u64.into(), fee()),
            Err(FeeError::Locked)
        );

        // Packets still flow while locked; fees stay in escrow.
        let ack = match app.on_recv_packet(&packet(1)) {
            RecvOutcome::Ack(ack) => ack,
            RecvOutcome::Pending => panic!("expected ack"),
        };
        app.on_acknowledgement_packet(&packet(1), &ack).unwrap();
        app.on_commit();
        assert_eq!(controller.balance(RELAYER), 0);
        assert_eq!(controller.fees_in_escrow(&port, &chan, 1u64.into()).len(), 1);

        controller.unlock(AUTHORITY).unwrap();
        assert!(!controller.is_locked());
    }

    #[test]
    fn test_malformed_incentivized_ack_rejected() {
        let mut app = fee_app();
        open_fee_channel(&mut app);
        let plain = Acknowledgement::success(b"not wrapped");
        assert!(matches!(
            app.on_acknowledgement_packet(&packet(1), &plain),
            Err(ChannelError::AppCallback { .. })
        ));
    }

    #[test]
    fn test_close_refunds_escrow() {
        let mut app = fee_app();
        open_fee_channel(&mut app);
        let controller = app.controller();
        let (port, chan) = ids();
        controller.pay_packet_fee(&port, &chan, 1u64.into(), fee()).unwrap();

        app.on_chan_close_init(&port, &chan).unwrap();
        app.on_commit();
        assert_eq!(controller.balance("payer"), 18);
    }

    #[test]
    fn test_rollback_discards_staged_fee_changes() {
        let mut app = fee_app();
        let (port, chan) = ids();
        app.on_chan_open_init(
            Order::Unordered,
            &[],
            &port,
            &chan,
            &Counterparty::new(PortId::new("mock"), None),
            &envelope("mock-v1"),
        )
        .unwrap();
        app.on_rollback();
        assert!(!app.controller().is_fee_enabled(&port, &chan));

        open_fee_channel(&mut app);
        let controller = app.controller();
        controller.pay_packet_fee(&port, &chan, 1u64.into(), fee()).unwrap();
        let ack = match app.on_recv_packet(&packet(1)) {
            RecvOutcome::Ack(ack) => ack,
            RecvOutcome::Pending => panic!("expected ack"),
        };

        // Nothing is paid until the transaction commits.
        app.on_acknowledgement_packet(&packet(1), &ack).unwrap();
        assert_eq!(controller.balance(RELAYER), 0);
        app.on_rollback();
        assert_eq!(controller.balance(RELAYER), 0);
        assert_eq!(controller.fees_in_escrow(&port, &chan, 1u64.into()).len(), 1);

        // The relayed acknowledgement lands in a later transaction.
        app.on_acknowledgement_packet(&packet(1), &ack).unwrap();
        app.on_commit();
        assert_eq!(controller.balance(RELAYER), 15);
        assert!(controller.fees_in_escrow(&port, &chan, 1u64.into()).is_empty());
    }

    #[test]
    fn test_deferred_ack_names_receiving_relayer() {
        let mut app = FeeMiddleware::new(
            MockModule::new("mock-v1").with_recv(MockRecv::Async),
            FeeController::new(AUTHORITY),
            RELAYER,
        );
        open_fee_channel(&mut app);

        assert_eq!(app.on_recv_packet(&packet(1)), RecvOutcome::Pending);
        app.on_commit();

        let ack = app
            .on_write_acknowledgement(&packet(1), Acknowledgement::success(b"late"))
            .unwrap();
        app.on_commit();
        let incentivized = IncentivizedAcknowledgement::decode(&ack).unwrap();
        assert_eq!(incentivized.forward_relayer_address, RELAYER);
        assert!(incentivized.underlying_app_success);
        assert_eq!(
            incentivized.app_acknowledgement().unwrap(),
            Acknowledgement::success(b"late")
        );

        // The recorded relayer is consumed by the first write.
        let err = app
            .on_write_acknowledgement(&packet(1), Acknowledgement::success(b"late"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::AppCallback { .. }));
    }

    #[test]
    fn test_deferred_ack_on_plain_channel_unchanged() {
        let mut app = fee_app();
        let ack = Acknowledgement::success(b"late");
        assert_eq!(
            app.on_write_acknowledgement(&packet(1), ack.clone()).unwrap(),
            ack
        );
    }

    #[test]
    fn test_upgrade_intersection_looks_inside_envelopes() {
        let app = fee_app();
        assert_eq!(
            app.intersect_upgrade_versions(&envelope("mock-v2,mock-v1"), &envelope("mock-v1")),
            Some(envelope("mock-v1"))
        );
        assert_eq!(
            app.intersect_upgrade_versions(&envelope("mock-v2"), &envelope("mock-v3")),
            None
        );
        assert_eq!(
            app.intersect_upgrade_versions(&envelope("mock-v2"), "mock-v2"),
            None
        );
        assert_eq!(
            app.intersect_upgrade_versions("mock-v2,mock-v1", "mock-v1"),
            Some("mock-v1".to_string())
        );
    }
}
