//! # Mock Application
//!
//! Reference [`ChannelModule`] for tests and local networks. It negotiates
//! versions from a fixed supported list, produces acknowledgements according
//! to a configurable [`MockRecv`] mode and records every callback it sees in
//! a shared [`CallLog`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::algorithms::{negotiate_version, split_versions, version_supported};
use crate::domain::{
    Acknowledgement, ChannelError, ChannelId, ConnectionId, Counterparty, Order, Packet, PortId,
    RecvOutcome,
};
use crate::ports::ChannelModule;

/// Acknowledgement payload of a successful mock receive.
pub const MOCK_ACK_RESULT: &[u8] = b"mock acknowledgement";

/// How the mock answers `on_recv_packet`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockRecv {
    /// Acknowledge immediately with [`MOCK_ACK_RESULT`].
    Success,
    /// Acknowledge immediately with an error envelope.
    Error(String),
    /// Return `Pending`; the host writes the acknowledgement later.
    Async,
}

/// Shared record of the callbacks a mock received, as `"Callback:channel"`.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, callback: &str, channel_id: &ChannelId) {
        self.0.lock().push(format!("{}:{}", callback, channel_id));
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Number of times `callback` fired, on any channel.
    pub fn count(&self, callback: &str) -> usize {
        let prefix = format!("{}:", callback);
        self.0
            .lock()
            .iter()
            .filter(|e| e.starts_with(&prefix))
            .count()
    }
}

/// Mock application.
pub struct MockModule {
    supported: Vec<String>,
    recv: MockRecv,
    veto_upgrades: bool,
    proposals: BTreeMap<(PortId, ChannelId), String>,
    log: CallLog,
}

impl MockModule {
    /// Mock supporting the candidates listed in `versions` (comma separated,
    /// preferred first).
    pub fn new(versions: &str) -> Self {
        Self {
            supported: split_versions(versions)
                .into_iter()
                .map(str::to_string)
                .collect(),
            recv: MockRecv::Success,
            veto_upgrades: false,
            proposals: BTreeMap::new(),
            log: CallLog::default(),
        }
    }

    /// Answer receives with `recv`.
    pub fn with_recv(mut self, recv: MockRecv) -> Self {
        self.recv = recv;
        self
    }

    /// Reject every upgrade in `on_chan_upgrade_try`/`on_chan_upgrade_ack`.
    pub fn vetoing_upgrades(mut self) -> Self {
        self.veto_upgrades = true;
        self
    }

    /// Handle on the call log, valid after the module is boxed into a router.
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    fn reject(&self, port_id: &PortId, reason: impl Into<String>) -> ChannelError {
        ChannelError::AppCallback {
            port_id: port_id.clone(),
            reason: reason.into(),
        }
    }

    fn supported(&self) -> Vec<&str> {
        self.supported.iter().map(String::as_str).collect()
    }

    /// Accept `version` as a proposal: empty picks our preferred version.
    fn propose(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        version: &str,
    ) -> Result<String, ChannelError> {
        let proposal = if version.is_empty() {
            self.supported
                .first()
                .cloned()
                .ok_or_else(|| self.reject(port_id, "no supported versions"))?
        } else if negotiate_version(version, &self.supported()).is_some() {
            version.to_string()
        } else {
            return Err(self.reject(port_id, format!("unsupported version {}", version)));
        };
        self.proposals
            .insert((port_id.clone(), channel_id.clone()), proposal.clone());
        Ok(proposal)
    }

    fn answer(&self, port_id: &PortId, counterparty_version: &str) -> Result<String, ChannelError> {
        negotiate_version(counterparty_version, &self.supported()).ok_or_else(|| {
            self.reject(
                port_id,
                format!("no common version in {}", counterparty_version),
            )
        })
    }

    /// Did we propose a list containing `chosen`?
    fn accepts(&self, port_id: &PortId, channel_id: &ChannelId, chosen: &str) -> bool {
        match self.proposals.get(&(port_id.clone(), channel_id.clone())) {
            Some(proposal) => version_supported(proposal, chosen),
            None => self.supported.iter().any(|v| v == chosen),
        }
    }
}

impl ChannelModule for MockModule {
    fn on_chan_open_init(
        &mut self,
        _order: Order,
        _connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        _counterparty: &Counterparty,
        version: &str,
    ) -> Result<String, ChannelError> {
        self.log.push("OnChanOpenInit", channel_id);
        self.propose(port_id, channel_id, version)
    }

    fn on_chan_open_try(
        &mut self,
        _order: Order,
        _connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        _counterparty: &Counterparty,
        counterparty_version: &str,
    ) -> Result<String, ChannelError> {
        self.log.push("OnChanOpenTry", channel_id);
        self.answer(port_id, counterparty_version)
    }

    fn on_chan_open_ack(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        _counterparty_channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), ChannelError> {
        self.log.push("OnChanOpenAck", channel_id);
        if !self.accepts(port_id, channel_id, counterparty_version) {
            return Err(self.reject(
                port_id,
                format!("counterparty chose unproposed version {}", counterparty_version),
            ));
        }
        self.proposals.remove(&(port_id.clone(), channel_id.clone()));
        Ok(())
    }

    fn on_chan_open_confirm(
        &mut self,
        _port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        self.log.push("OnChanOpenConfirm", channel_id);
        Ok(())
    }

    fn on_chan_close_init(
        &mut self,
        _port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        self.log.push("OnChanCloseInit", channel_id);
        Ok(())
    }

    fn on_chan_close_confirm(
        &mut self,
        _port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        self.log.push("OnChanCloseConfirm", channel_id);
        Ok(())
    }

    fn on_recv_packet(&mut self, packet: &Packet) -> RecvOutcome {
        self.log.push("OnRecvPacket", &packet.destination_channel);
        debug!(
            "[qc-15] Mock received packet {} on {}",
            packet.sequence, packet.destination_channel
        );
        match &self.recv {
            MockRecv::Success => RecvOutcome::Ack(Acknowledgement::success(MOCK_ACK_RESULT)),
            MockRecv::Error(message) => RecvOutcome::Ack(Acknowledgement::error(message.clone())),
            MockRecv::Async => RecvOutcome::Pending,
        }
    }

    fn on_acknowledgement_packet(
        &mut self,
        packet: &Packet,
        _acknowledgement: &Acknowledgement,
    ) -> Result<(), ChannelError> {
        self.log
            .push("OnAcknowledgementPacket", &packet.source_channel);
        Ok(())
    }

    fn on_timeout_packet(&mut self, packet: &Packet) -> Result<(), ChannelError> {
        self.log.push("OnTimeoutPacket", &packet.source_channel);
        Ok(())
    }

    fn on_chan_upgrade_init(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        _order: Order,
        _connection_hops: &[ConnectionId],
        version: &str,
    ) -> Result<String, ChannelError> {
        self.log.push("OnChanUpgradeInit", channel_id);
        self.propose(port_id, channel_id, version)
    }

    fn on_chan_upgrade_try(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        _order: Order,
        _connection_hops: &[ConnectionId],
        counterparty_version: &str,
    ) -> Result<String, ChannelError> {
        self.log.push("OnChanUpgradeTry", channel_id);
        if self.veto_upgrades {
            return Err(self.reject(port_id, "upgrades disabled"));
        }
        self.answer(port_id, counterparty_version)
    }

    fn on_chan_upgrade_ack(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), ChannelError> {
        self.log.push("OnChanUpgradeAck", channel_id);
        if self.veto_upgrades {
            return Err(self.reject(port_id, "upgrades disabled"));
        }
        if !self.accepts(port_id, channel_id, counterparty_version) {
            return Err(self.reject(
                port_id,
                format!("counterparty chose unproposed version {}", counterparty_version),
            ));
        }
        Ok(())
    }

    fn on_chan_upgrade_open(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        _order: Order,
        _connection_hops: &[ConnectionId],
        _version: &str,
    ) {
        self.log.push("OnChanUpgradeOpen", channel_id);
        self.proposals.remove(&(port_id.clone(), channel_id.clone()));
    }
}
