//! # Execution Context
//!
//! Per-transaction state handle. Carries the write overlay, the proof
//! oracle, the capability keeper, the module router and the host block;
//! every handshake, upgrade and packet function takes one.

use crate::config::ChannelConfig;
use crate::domain::{
    CapabilityToken, ChannelEnd, ChannelError, ChannelEvent, ChannelId, ConnectionEnd,
    ConnectionId, Height, PortId, Timestamp,
};
use crate::ports::{BatchOperation, CapabilityAdapter, ChannelModule, KeyValueStore, ProofVerifier};

use super::router::ModuleRouter;
use super::store::CacheStore;

/// Height and time of the block being executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostBlock {
    /// Current height.
    pub height: Height,
    /// Current block time.
    pub timestamp: Timestamp,
}

impl HostBlock {
    /// Create a host block.
    pub fn new(height: Height, timestamp: Timestamp) -> Self {
        Self { height, timestamp }
    }
}

/// Transaction-scoped view of the keeper.
pub struct ExecutionContext<'a> {
    /// Write overlay.
    pub store: CacheStore<'a>,
    /// Light client proof oracle.
    pub verifier: &'a dyn ProofVerifier,
    /// Capability keeper (read-only during the transaction).
    pub capabilities: &'a dyn CapabilityAdapter,
    /// Port routing.
    pub router: &'a mut ModuleRouter,
    /// Limits.
    pub config: &'a ChannelConfig,
    /// Current block.
    pub host: HostBlock,
    events: Vec<ChannelEvent>,
}

impl<'a> ExecutionContext<'a> {
    /// Open a transaction.
    pub fn new(
        store: &'a dyn KeyValueStore,
        verifier: &'a dyn ProofVerifier,
        capabilities: &'a dyn CapabilityAdapter,
        router: &'a mut ModuleRouter,
        config: &'a ChannelConfig,
        host: HostBlock,
    ) -> Self {
        Self {
            store: CacheStore::new(store),
            verifier,
            capabilities,
            router,
            config,
            host,
            events: Vec::new(),
        }
    }

    /// Buffer an event; published only if the transaction commits.
    pub fn emit(&mut self, event: ChannelEvent) {
        self.events.push(event);
    }

    /// Buffered events.
    pub fn events(&self) -> &[ChannelEvent] {
        &self.events
    }

    /// Close the transaction, yielding the write batch and the events.
    pub fn into_parts(self) -> (Vec<BatchOperation>, Vec<ChannelEvent>) {
        (self.store.into_batch(), self.events)
    }

    /// Stored channel end or `ChannelNotFound`.
    pub fn channel_end(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<ChannelEnd, ChannelError> {
        self.store
            .channel(port_id, channel_id)?
            .ok_or_else(|| ChannelError::ChannelNotFound {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            })
    }

    /// Stored connection that must be OPEN.
    pub fn open_connection(&self, id: &ConnectionId) -> Result<ConnectionEnd, ChannelError> {
        let connection = self
            .store
            .connection(id)?
            .ok_or_else(|| ChannelError::ConnectionNotFound(id.clone()))?;
        if !connection.is_open() {
            return Err(ChannelError::ConnectionNotOpen(id.clone()));
        }
        Ok(connection)
    }

    /// OPEN connection underlying a channel end.
    pub fn channel_connection(&self, channel: &ChannelEnd) -> Result<ConnectionEnd, ChannelError> {
        let id = channel.connection_id().ok_or_else(|| {
            ChannelError::InvalidMessage("channel has no connection hops".to_string())
        })?;
        self.open_connection(id)
    }

    /// Check the routed module still holds the port capability.
    pub fn authenticate_port(&self, port_id: &PortId) -> Result<(), ChannelError> {
        match self.router.port_capability(port_id) {
            Some(token) if self.capabilities.authenticate_port(token, port_id) => Ok(()),
            _ => Err(ChannelError::PortUnauthorized(port_id.clone())),
        }
    }

    /// Check the routed module holds the channel capability.
    pub fn authenticate_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        match self.router.channel_capability(port_id, channel_id) {
            Some(token) => self.authenticate_token(token, port_id, channel_id),
            None => Err(ChannelError::Unauthorized {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            }),
        }
    }

    /// Check a caller-supplied channel capability.
    pub fn authenticate_token(
        &self,
        token: &CapabilityToken,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelError> {
        if !self.capabilities.authenticate(token, port_id, channel_id) {
            return Err(ChannelError::Unauthorized {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            });
        }
        Ok(())
    }

    /// Application routed for the port.
    pub fn module(&mut self, port_id: &PortId) -> Result<&mut dyn ChannelModule, ChannelError> {
        self.router.module_mut(port_id)
    }

    /// Version length limit.
    pub fn validate_version(&self, version: &str) -> Result<(), ChannelError> {
        if version.len() > self.config.max_version_len {
            return Err(ChannelError::InvalidVersion {
                version: version.chars().take(32).collect(),
                reason: format!("longer than {} bytes", self.config.max_version_len),
            });
        }
        Ok(())
    }

    /// Connection hop limit.
    pub fn validate_hops(&self, hops: &[ConnectionId]) -> Result<(), ChannelError> {
        if hops.is_empty() || hops.len() > self.config.max_connection_hops {
            return Err(ChannelError::InvalidMessage(format!(
                "connection hops must number between 1 and {}",
                self.config.max_connection_hops
            )));
        }
        Ok(())
    }
}
