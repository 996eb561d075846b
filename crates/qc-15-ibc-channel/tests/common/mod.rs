//! Two-chain test harness.
//!
//! Each chain runs its own keeper. A chain's light client of the other side
//! is fed a copy of the other side's committed store every time that side
//! commits a block, so proofs only verify against state the counterparty
//! actually committed.

#![allow(dead_code)]

use qc_15_ibc_channel::apps::{CallLog, FeeController, FeeMetadata, FeeMiddleware, MockModule};
use qc_15_ibc_channel::domain::{
    Acknowledgement, ChannelEnd, ChannelId, ClientId, CommitmentProof, ConnectionEnd,
    ConnectionId, Height, MsgAcknowledgement, MsgChannelOpenAck, MsgChannelOpenConfirm,
    MsgChannelOpenInit, MsgChannelOpenTry, MsgChannelUpgradeAck, MsgChannelUpgradeConfirm,
    MsgChannelUpgradeInit, MsgChannelUpgradeTry, MsgRecvPacket, Order, Packet, PortId,
    RecvOutcome, Sequence, Timeout, Timestamp,
};
use qc_15_ibc_channel::ports::{ChannelApi, ChannelModule, UpgradeOutcome};
use qc_15_ibc_channel::{
    ChannelConfig, ChannelKeeper, InMemoryCapabilities, InMemoryStore, MockLightClient,
};

pub type Keeper = ChannelKeeper<InMemoryStore, MockLightClient, InMemoryCapabilities>;

pub const PORT: &str = "mock";
pub const BLOCK_TIME_NANOS: u64 = 1_000_000_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn proof() -> CommitmentProof {
    CommitmentProof::new(vec![0x01])
}

/// One chain.
pub struct Chain {
    pub keeper: Keeper,
    /// Light client of the counterparty, shared with the keeper.
    pub light_client: MockLightClient,
    /// Client tracking the counterparty.
    pub client_id: ClientId,
    pub connection_id: ConnectionId,
    pub port: PortId,
    pub log: CallLog,
    pub height: Height,
    pub timestamp: Timestamp,
}

impl Chain {
    fn new(
        client_id: &str,
        connection_id: &str,
        counterparty_connection_id: &str,
        module: Box<dyn ChannelModule>,
        log: CallLog,
    ) -> Self {
        let light_client = MockLightClient::new();
        let mut keeper = ChannelKeeper::new(
            ChannelConfig::for_testing(),
            InMemoryStore::new(),
            light_client.clone(),
            InMemoryCapabilities::new(),
        );
        let client_id = ClientId::new(client_id);
        let connection_id = ConnectionId::new(connection_id);
        keeper
            .set_connection(
                &connection_id,
                &ConnectionEnd::open(
                    client_id.clone(),
                    ConnectionId::new(counterparty_connection_id),
                ),
            )
            .unwrap();

        let port = PortId::new(PORT);
        keeper.bind_port(port.clone(), module).unwrap();

        let height = Height::new(0, 1);
        let timestamp = Timestamp::from_nanos(BLOCK_TIME_NANOS);
        keeper.begin_block(height, timestamp);

        Self {
            keeper,
            light_client,
            client_id,
            connection_id,
            port,
            log,
            height,
            timestamp,
        }
    }

    pub fn channel(&self, channel_id: &ChannelId) -> ChannelEnd {
        self.keeper
            .channel(&self.port, channel_id)
            .unwrap()
            .expect("channel exists")
    }

    pub fn upgrade_sequence(&self, channel_id: &ChannelId) -> u64 {
        self.keeper.upgrade_sequence(&self.port, channel_id).unwrap()
    }

    fn advance(&mut self) {
        self.height = self.height.increment();
        self.timestamp = Timestamp::from_nanos(self.timestamp.nanos() + BLOCK_TIME_NANOS);
        self.keeper.begin_block(self.height, self.timestamp);
    }
}

/// Which side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Two connected chains and a relayer.
pub struct Pair {
    pub a: Chain,
    pub b: Chain,
}

impl Pair {
    pub fn new() -> Self {
        Self::with_modules(MockModule::new("mock-v1,mock-v2"), MockModule::new("mock-v1,mock-v2"))
    }

    pub fn with_modules(module_a: MockModule, module_b: MockModule) -> Self {
        let (log_a, log_b) = (module_a.call_log(), module_b.call_log());
        Self::build((boxed(module_a), log_a), (boxed(module_b), log_b))
    }

    /// Both chains run `app` behind the fee middleware. Relayers are paid at
    /// `relayer-a` on A and `relayer-b` on B.
    pub fn with_fee(app_a: MockModule, app_b: MockModule) -> (Self, FeeController, FeeController) {
        let (fees_a, fees_b) = (FeeController::new("gov"), FeeController::new("gov"));
        let (log_a, log_b) = (app_a.call_log(), app_b.call_log());
        let module_a: Box<dyn ChannelModule> =
            Box::new(FeeMiddleware::new(app_a, fees_a.clone(), "relayer-a"));
        let module_b: Box<dyn ChannelModule> =
            Box::new(FeeMiddleware::new(app_b, fees_b.clone(), "relayer-b"));
        let pair = Self::build((module_a, log_a), (module_b, log_b));
        (pair, fees_a, fees_b)
    }

    fn build(
        (module_a, log_a): (Box<dyn ChannelModule>, CallLog),
        (module_b, log_b): (Box<dyn ChannelModule>, CallLog),
    ) -> Self {
        init_tracing();
        let mut pair = Self {
            a: Chain::new("07-tendermint-0", "connection-0", "connection-1", module_a, log_a),
            b: Chain::new("07-tendermint-1", "connection-1", "connection-0", module_b, log_b),
        };
        pair.commit(Side::A);
        pair.commit(Side::B);
        pair
    }

    pub fn chain(&self, side: Side) -> &Chain {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn chain_mut(&mut self, side: Side) -> &mut Chain {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    /// End the current block on `side`: the other side's light client
    /// learns the committed store. Returns the committed height.
    pub fn commit(&mut self, side: Side) -> Height {
        let (from, to) = match side {
            Side::A => (&mut self.a, &self.b),
            Side::B => (&mut self.b, &self.a),
        };
        let committed = from.height;
        to.light_client.update_client(
            &to.client_id,
            committed,
            from.timestamp,
            from.keeper.store().clone(),
        );
        from.advance();
        committed
    }

    /// Produce empty blocks on `side` until its height reaches `target`.
    pub fn advance_to(&mut self, side: Side, target: Height) {
        while self.chain(side).height < target {
            self.commit(side);
        }
    }

    // -------------------------------------------------------------------------
    // Handshake
    // -------------------------------------------------------------------------

    pub fn open_init(&mut self, side: Side, order: Order, version: &str) -> ChannelId {
        let chain = self.chain_mut(side);
        let msg = MsgChannelOpenInit {
            port_id: chain.port.clone(),
            ordering: order,
            connection_hops: vec![chain.connection_id.clone()],
            counterparty_port_id: PortId::new(PORT),
            version: version.to_string(),
        };
        chain.keeper.chan_open_init(msg).unwrap().channel_id
    }

    /// Try on the other side against `init`'s committed INIT end.
    pub fn open_try(
        &mut self,
        init_side: Side,
        init_channel: &ChannelId,
        previous: Option<ChannelId>,
    ) -> Result<ChannelId, qc_15_ibc_channel::ChannelError> {
        let proof_height = self.commit(init_side);
        let init_end = self.chain(init_side).channel(init_channel);
        let try_side = other(init_side);
        let chain = self.chain_mut(try_side);
        let msg = MsgChannelOpenTry {
            port_id: chain.port.clone(),
            previous_channel_id: previous,
            ordering: init_end.ordering,
            connection_hops: vec![chain.connection_id.clone()],
            counterparty: qc_15_ibc_channel::Counterparty::new(
                PortId::new(PORT),
                Some(init_channel.clone()),
            ),
            counterparty_version: init_end.version,
            proof_init: proof(),
            proof_height,
        };
        chain.keeper.chan_open_try(msg).map(|r| r.channel_id)
    }

    pub fn open_ack(
        &mut self,
        ack_side: Side,
        channel: &ChannelId,
        counterparty_channel: &ChannelId,
    ) -> Result<(), qc_15_ibc_channel::ChannelError> {
        let try_side = other(ack_side);
        let proof_height = self.commit(try_side);
        let try_end = self.chain(try_side).channel(counterparty_channel);
        let chain = self.chain_mut(ack_side);
        chain.keeper.chan_open_ack(MsgChannelOpenAck {
            port_id: chain.port.clone(),
            channel_id: channel.clone(),
            counterparty_channel_id: counterparty_channel.clone(),
            counterparty_version: try_end.version,
            proof_try: proof(),
            proof_height,
        })
    }

    pub fn open_confirm(
        &mut self,
        confirm_side: Side,
        channel: &ChannelId,
    ) -> Result<(), qc_15_ibc_channel::ChannelError> {
        let proof_height = self.commit(other(confirm_side));
        let chain = self.chain_mut(confirm_side);
        chain.keeper.chan_open_confirm(MsgChannelOpenConfirm {
            port_id: chain.port.clone(),
            channel_id: channel.clone(),
            proof_ack: proof(),
            proof_height,
        })
    }

    /// Full handshake initiated by A. Returns (A's channel, B's channel).
    pub fn open_channel(&mut self, order: Order) -> (ChannelId, ChannelId) {
        self.open_channel_with_version(order, "mock-v1")
    }

    /// Full handshake on a fee-enabled channel running `mock-v1`.
    pub fn open_fee_channel(&mut self, order: Order) -> (ChannelId, ChannelId) {
        let version = fee_version("mock-v1");
        self.open_channel_with_version(order, &version)
    }

    pub fn open_channel_with_version(
        &mut self,
        order: Order,
        version: &str,
    ) -> (ChannelId, ChannelId) {
        let chan_a = self.open_init(Side::A, order, version);
        let chan_b = self.open_try(Side::A, &chan_a, None).unwrap();
        self.open_ack(Side::A, &chan_a, &chan_b).unwrap();
        self.open_confirm(Side::B, &chan_b).unwrap();
        (chan_a, chan_b)
    }

    // -------------------------------------------------------------------------
    // Upgrades
    // -------------------------------------------------------------------------

    pub fn upgrade_timeout(&self) -> Timeout {
        Timeout::at_height(Height::new(0, 1_000))
    }

    pub fn upgrade_init(
        &mut self,
        side: Side,
        channel: &ChannelId,
        order: Order,
        version: &str,
    ) -> u64 {
        let timeout = self.upgrade_timeout();
        let chain = self.chain_mut(side);
        let msg = MsgChannelUpgradeInit {
            port_id: chain.port.clone(),
            channel_id: channel.clone(),
            ordering: order,
            connection_hops: vec![chain.connection_id.clone()],
            version: version.to_string(),
            timeout,
        };
        chain.keeper.chan_upgrade_init(msg).unwrap().0
    }

    /// `ChanUpgradeTry` on `try_side` against the other side's committed state.
    pub fn upgrade_try(
        &mut self,
        try_side: Side,
        channel: &ChannelId,
        counterparty_channel: &ChannelId,
    ) -> Result<UpgradeOutcome, qc_15_ibc_channel::ChannelError> {
        let msg = self.upgrade_try_msg(try_side, channel, counterparty_channel);
        self.chain_mut(try_side).keeper.chan_upgrade_try(msg)
    }

    pub fn upgrade_try_msg(
        &mut self,
        try_side: Side,
        channel: &ChannelId,
        counterparty_channel: &ChannelId,
    ) -> MsgChannelUpgradeTry {
        let cp_side = other(try_side);
        let proof_height = self.commit(cp_side);
        let cp = self.chain(cp_side);
        MsgChannelUpgradeTry {
            port_id: PortId::new(PORT),
            channel_id: channel.clone(),
            counterparty_channel: cp.channel(counterparty_channel),
            counterparty_upgrade: cp
                .keeper
                .upgrade(&cp.port, counterparty_channel)
                .unwrap()
                .expect("counterparty upgrade"),
            counterparty_upgrade_sequence: cp.upgrade_sequence(counterparty_channel),
            proof_channel: proof(),
            proof_upgrade: proof(),
            proof_upgrade_sequence: proof(),
            proof_height,
        }
    }

    pub fn upgrade_ack(
        &mut self,
        ack_side: Side,
        channel: &ChannelId,
        counterparty_channel: &ChannelId,
    ) -> Result<UpgradeOutcome, qc_15_ibc_channel::ChannelError> {
        let cp_side = other(ack_side);
        let proof_height = self.commit(cp_side);
        let cp = self.chain(cp_side);
        let msg = MsgChannelUpgradeAck {
            port_id: PortId::new(PORT),
            channel_id: channel.clone(),
            counterparty_channel: cp.channel(counterparty_channel),
            counterparty_upgrade: cp
                .keeper
                .upgrade(&cp.port, counterparty_channel)
                .unwrap()
                .expect("counterparty upgrade"),
            counterparty_upgrade_sequence: cp.upgrade_sequence(counterparty_channel),
            proof_channel: proof(),
            proof_upgrade: proof(),
            proof_upgrade_sequence: proof(),
            proof_height,
        };
        self.chain_mut(ack_side).keeper.chan_upgrade_ack(msg)
    }

    pub fn upgrade_confirm(
        &mut self,
        confirm_side: Side,
        channel: &ChannelId,
        counterparty_channel: &ChannelId,
    ) -> Result<UpgradeOutcome, qc_15_ibc_channel::ChannelError> {
        let cp_side = other(confirm_side);
        let proof_height = self.commit(cp_side);
        let msg = MsgChannelUpgradeConfirm {
            port_id: PortId::new(PORT),
            channel_id: channel.clone(),
            counterparty_channel: self.chain(cp_side).channel(counterparty_channel),
            proof_channel: proof(),
            proof_height,
        };
        self.chain_mut(confirm_side).keeper.chan_upgrade_confirm(msg)
    }

    // -------------------------------------------------------------------------
    // Packets
    // -------------------------------------------------------------------------

    /// Send from `side`. Returns the packet as the receiver will see it.
    pub fn send(
        &mut self,
        side: Side,
        channel: &ChannelId,
        data: &[u8],
        timeout: Timeout,
    ) -> Result<Packet, qc_15_ibc_channel::ChannelError> {
        let chain = self.chain_mut(side);
        let capability = chain
            .keeper
            .channel_capability(&chain.port, channel)
            .expect("channel capability");
        let sequence = chain.keeper.send_packet(
            &capability,
            &chain.port.clone(),
            channel,
            timeout,
            data.to_vec(),
        )?;
        let end = chain.channel(channel);
        Ok(Packet {
            sequence,
            source_port: chain.port.clone(),
            source_channel: channel.clone(),
            destination_port: end.counterparty.port_id.clone(),
            destination_channel: end.counterparty.channel_id.expect("open channel"),
            data: data.to_vec(),
            timeout_height: timeout.height,
            timeout_timestamp: timeout.timestamp,
        })
    }

    /// Deliver `packet` to the other side of `sender`.
    pub fn recv(
        &mut self,
        sender: Side,
        packet: &Packet,
    ) -> Result<RecvOutcome, qc_15_ibc_channel::ChannelError> {
        let proof_height = self.commit(sender);
        self.chain_mut(other(sender))
            .keeper
            .recv_packet(MsgRecvPacket {
                packet: packet.clone(),
                proof_commitment: proof(),
                proof_height,
            })
    }

    /// Relay the receiver's acknowledgement back to `sender`.
    pub fn acknowledge(
        &mut self,
        sender: Side,
        packet: &Packet,
        ack: &Acknowledgement,
    ) -> Result<(), qc_15_ibc_channel::ChannelError> {
        let proof_height = self.commit(other(sender));
        self.chain_mut(sender)
            .keeper
            .acknowledge_packet(MsgAcknowledgement {
                packet: packet.clone(),
                acknowledgement: ack.clone(),
                proof_acked: proof(),
                proof_height,
            })
    }

    /// The receiver's `nextSequenceRecv`.
    pub fn next_recv(&self, sender: Side, packet: &Packet) -> Sequence {
        self.chain(other(sender))
            .keeper
            .next_sequence_recv(&packet.destination_port, &packet.destination_channel)
            .unwrap()
    }
}

pub fn other(side: Side) -> Side {
    match side {
        Side::A => Side::B,
        Side::B => Side::A,
    }
}

/// Box a module for `bind_port`.
pub fn boxed(module: MockModule) -> Box<dyn ChannelModule> {
    Box::new(module)
}

/// Fee envelope around `app_version`.
pub fn fee_version(app_version: &str) -> String {
    FeeMetadata::new(app_version).to_version().unwrap()
}
