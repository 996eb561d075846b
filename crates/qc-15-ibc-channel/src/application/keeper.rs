//! # Channel Keeper
//!
//! Owns the persisted store, the proof oracle, the capability keeper and the
//! module router for one chain. Every entry point runs in its own
//! transaction: writes and events are buffered in an [`ExecutionContext`]
//! and flushed with one atomic batch only if the operation succeeds.

use tracing::{debug, error, info};

use crate::config::ChannelConfig;
use crate::domain::{
    CapabilityToken, ChannelEnd, ChannelError, ChannelEvent, ChannelId, ConnectionEnd,
    ConnectionId, ErrorKind, ErrorReceipt, Hash, Height, PortId, Sequence, Timeout, Timestamp,
    Upgrade,
};
use crate::ports::{CapabilityAdapter, ChannelModule, KeyValueStore, ProofVerifier};

use super::context::{ExecutionContext, HostBlock};
use super::router::ModuleRouter;
use super::store::CacheStore;

/// The channel keeper.
///
/// Generic over its collaborators so hosts can plug in RocksDB, a real
/// light client and their own capability keeper.
pub struct ChannelKeeper<S, V, C>
where
    S: KeyValueStore,
    V: ProofVerifier,
    C: CapabilityAdapter,
{
    pub(crate) config: ChannelConfig,
    pub(crate) store: S,
    pub(crate) verifier: V,
    pub(crate) capabilities: C,
    pub(crate) router: ModuleRouter,
    pub(crate) host: HostBlock,
    events: Vec<ChannelEvent>,
}

impl<S, V, C> ChannelKeeper<S, V, C>
where
    S: KeyValueStore,
    V: ProofVerifier,
    C: CapabilityAdapter,
{
    /// Create a keeper with no ports bound.
    pub fn new(config: ChannelConfig, store: S, verifier: V, capabilities: C) -> Self {
        Self {
            config,
            store,
            verifier,
            capabilities,
            router: ModuleRouter::new(),
            host: HostBlock::default(),
            events: Vec::new(),
        }
    }

    /// Set the block the next operations execute in.
    pub fn begin_block(&mut self, height: Height, timestamp: Timestamp) {
        self.host = HostBlock::new(height, timestamp);
    }

    /// Current host block.
    pub fn host(&self) -> HostBlock {
        self.host
    }

    /// Limits in force.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Persisted store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Proof oracle.
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Bind `port_id` to `module`. The module receives the port capability.
    pub fn bind_port(
        &mut self,
        port_id: PortId,
        module: Box<dyn ChannelModule>,
    ) -> Result<CapabilityToken, ChannelError> {
        port_id.validate()?;
        if self.router.has_route(&port_id) {
            return Err(ChannelError::PortAlreadyBound(port_id));
        }
        let capability = self.capabilities.bind_port(&port_id)?;
        self.router.add_route(port_id.clone(), module, capability)?;
        info!(port = %port_id, "[qc-15] Port bound");
        Ok(capability)
    }

    /// Store a connection end. Connections are established by the
    /// connection handshake; hosts mirror them here.
    pub fn set_connection(
        &mut self,
        id: &ConnectionId,
        connection: &ConnectionEnd,
    ) -> Result<(), ChannelError> {
        id.validate()?;
        let mut cache = CacheStore::new(&self.store);
        cache.set_connection(id, connection)?;
        let batch = cache.into_batch();
        self.store.atomic_batch_write(batch)?;
        debug!("[qc-15] Connection {} stored ({:?})", id, connection.state);
        Ok(())
    }

    /// Run `op` in a transaction. On success the writes are flushed with one
    /// atomic batch and the events published; on failure nothing persists.
    pub(crate) fn execute<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut ExecutionContext<'_>) -> Result<T, ChannelError>,
    ) -> Result<T, ChannelError> {
        let mut ctx = ExecutionContext::new(
            &self.store,
            &self.verifier,
            &self.capabilities,
            &mut self.router,
            &self.config,
            self.host,
        );

        let result = f(&mut ctx);
        let (batch, events) = ctx.into_parts();
        match result {
            Ok(value) => {
                let writes = batch.len();
                if let Err(e) = self.store.atomic_batch_write(batch) {
                    error!("[qc-15] {} failed to commit {} writes: {}", op, writes, e);
                    self.router.rollback_modules();
                    return Err(e.into());
                }
                self.router.commit_modules();
                debug!(
                    "[qc-15] {} committed ({} writes, {} events)",
                    op,
                    writes,
                    events.len()
                );
                self.events.extend(events);
                Ok(value)
            }
            Err(e) => {
                self.router.rollback_modules();
                match e.kind() {
                    ErrorKind::Fatal | ErrorKind::Store => {
                        error!("[qc-15] {} aborted: {}", op, e)
                    }
                    _ => debug!("[qc-15] {} rejected: {}", op, e),
                }
                Err(e)
            }
        }
    }

    /// Issue the channel capability after a successful open and hand it to
    /// the routed module.
    pub(crate) fn claim_channel(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<CapabilityToken, ChannelError> {
        let capability = self.capabilities.bind_new(port_id, channel_id)?;
        self.router
            .claim_channel_capability(port_id, channel_id.clone(), capability)?;
        Ok(capability)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn reader(&self) -> CacheStore<'_> {
        CacheStore::new(&self.store)
    }

    /// Published events, oldest first.
    pub fn events(&self) -> &[ChannelEvent] {
        &self.events
    }

    /// Drain published events.
    pub fn take_events(&mut self) -> Vec<ChannelEvent> {
        std::mem::take(&mut self.events)
    }

    /// Channel capability held by the module routed on `port_id`.
    pub fn channel_capability(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Option<CapabilityToken> {
        self.router.channel_capability(port_id, channel_id).copied()
    }

    /// Channel end.
    pub fn channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelEnd>, ChannelError> {
        Ok(self.reader().channel(port_id, channel_id)?)
    }

    /// Connection end.
    pub fn connection(&self, id: &ConnectionId) -> Result<Option<ConnectionEnd>, ChannelError> {
        Ok(self.reader().connection(id)?)
    }

    /// Next sequence to send.
    pub fn next_sequence_send(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, ChannelError> {
        Ok(self.reader().next_sequence_send(port_id, channel_id)?)
    }

    /// Next sequence to receive.
    pub fn next_sequence_recv(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, ChannelError> {
        Ok(self.reader().next_sequence_recv(port_id, channel_id)?)
    }

    /// Next acknowledgement expected.
    pub fn next_sequence_ack(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, ChannelError> {
        Ok(self.reader().next_sequence_ack(port_id, channel_id)?)
    }

    /// Packet commitment.
    pub fn packet_commitment(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
    ) -> Result<Option<Hash>, ChannelError> {
        Ok(self.reader().packet_commitment(port_id, channel_id, sequence)?)
    }

    /// Has the packet been received (UNORDERED)?
    pub fn has_packet_receipt(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
    ) -> Result<bool, ChannelError> {
        Ok(self.reader().has_packet_receipt(port_id, channel_id, sequence)?)
    }

    /// Acknowledgement commitment.
    pub fn packet_acknowledgement(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
    ) -> Result<Option<Hash>, ChannelError> {
        Ok(self
            .reader()
            .packet_acknowledgement(port_id, channel_id, sequence)?)
    }

    /// Upgrade proposal.
    pub fn upgrade(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<Upgrade>, ChannelError> {
        Ok(self.reader().upgrade(port_id, channel_id)?)
    }

    /// Upgrade sequence.
    pub fn upgrade_sequence(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<u64, ChannelError> {
        Ok(self.reader().upgrade_sequence(port_id, channel_id)?)
    }

    /// Latest upgrade error receipt.
    pub fn error_receipt(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ErrorReceipt>, ChannelError> {
        Ok(self.reader().error_receipt(port_id, channel_id)?)
    }

    /// Pre-upgrade snapshot.
    pub fn restore_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelEnd>, ChannelError> {
        Ok(self.reader().restore_channel(port_id, channel_id)?)
    }

    /// Upgrade timeout.
    pub fn upgrade_timeout(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<Timeout>, ChannelError> {
        Ok(self.reader().upgrade_timeout(port_id, channel_id)?)
    }
}
