//! # Channel Handshake
//!
//! Opening and closing handshake.
//!
//! ```text
//! A: ChanOpenInit      ──→ A: INIT
//! B: ChanOpenTry       ──→ B: TRYOPEN     (proves A INIT)
//! A: ChanOpenAck       ──→ A: OPEN        (proves B TRYOPEN)
//! B: ChanOpenConfirm   ──→ B: OPEN        (proves A OPEN)
//! ```
//!
//! When both ends ran `ChanOpenInit` (crossing hellos), `ChanOpenTry` names
//! the local INIT end as `previous_channel_id` and the counterparty may be
//! proven in INIT or TRYOPEN.

use tracing::{debug, info};

use crate::domain::{
    ChannelEnd, ChannelError, ChannelEvent, ChannelId, ConnectionEnd, ConnectionId,
    Counterparty, MsgChannelCloseConfirm, MsgChannelCloseInit, MsgChannelOpenAck,
    MsgChannelOpenConfirm, MsgChannelOpenInit, MsgChannelOpenTry, PortId, Sequence, State,
};

use super::context::ExecutionContext;

/// Result of a channel allocation: identifier, version and whether a new
/// channel capability must be bound once the transaction commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocated {
    /// Local channel identifier.
    pub channel_id: ChannelId,
    /// Version recorded.
    pub version: String,
    /// A new channel end was created.
    pub is_new: bool,
}

pub(crate) fn counterparty_connection_id(
    connection: &ConnectionEnd,
    id: &ConnectionId,
) -> Result<ConnectionId, ChannelError> {
    connection
        .counterparty_connection_id
        .clone()
        .ok_or_else(|| ChannelError::ConnectionNotOpen(id.clone()))
}

fn allocate_channel_id(
    ctx: &mut ExecutionContext<'_>,
    port_id: &PortId,
) -> Result<ChannelId, ChannelError> {
    let counter = ctx.store.next_channel_sequence()?;
    let channel_id = ChannelId::with_prefix(&ctx.config.channel_id_prefix, counter);
    if ctx.capabilities.is_bound(port_id, &channel_id) {
        return Err(ChannelError::CapabilityAlreadyBound {
            port_id: port_id.clone(),
            channel_id,
        });
    }
    ctx.store.set_next_channel_sequence(counter + 1);
    Ok(channel_id)
}

fn init_sequences(ctx: &mut ExecutionContext<'_>, port_id: &PortId, channel_id: &ChannelId) {
    let first = Sequence::from(1);
    ctx.store.set_next_sequence_send(port_id, channel_id, first);
    ctx.store.set_next_sequence_recv(port_id, channel_id, first);
    ctx.store.set_next_sequence_ack(port_id, channel_id, first);
}

/// `ChanOpenInit`: UNINITIALIZED -> INIT.
pub fn chan_open_init(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelOpenInit,
) -> Result<Allocated, ChannelError> {
    msg.validate_basic()?;
    ctx.validate_hops(&msg.connection_hops)?;
    ctx.validate_version(&msg.version)?;
    ctx.authenticate_port(&msg.port_id)?;
    ctx.open_connection(&msg.connection_hops[0])?;

    let channel_id = allocate_channel_id(ctx, &msg.port_id)?;
    let counterparty = Counterparty::new(msg.counterparty_port_id.clone(), None);

    let version = ctx.module(&msg.port_id)?.on_chan_open_init(
        msg.ordering,
        &msg.connection_hops,
        &msg.port_id,
        &channel_id,
        &counterparty,
        &msg.version,
    )?;
    ctx.validate_version(&version)?;

    let mut channel = ChannelEnd::new(
        State::Uninitialized,
        msg.ordering,
        counterparty,
        msg.connection_hops.clone(),
        version.clone(),
    );
    channel.transition(State::Init)?;
    ctx.store.set_channel(&msg.port_id, &channel_id, &channel)?;
    init_sequences(ctx, &msg.port_id, &channel_id);

    ctx.emit(ChannelEvent::OpenInit {
        port_id: msg.port_id.clone(),
        channel_id: channel_id.clone(),
        counterparty_port_id: msg.counterparty_port_id.clone(),
        connection_id: msg.connection_hops[0].clone(),
        version: version.clone(),
    });
    info!(
        port = %msg.port_id,
        channel = %channel_id,
        "[qc-15] Channel open init ({})", msg.ordering
    );

    Ok(Allocated {
        channel_id,
        version,
        is_new: true,
    })
}

/// `ChanOpenTry`: UNINITIALIZED (or INIT, crossing hellos) -> TRYOPEN.
pub fn chan_open_try(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelOpenTry,
) -> Result<Allocated, ChannelError> {
    msg.validate_basic()?;
    ctx.validate_hops(&msg.connection_hops)?;
    ctx.validate_version(&msg.counterparty_version)?;
    ctx.authenticate_port(&msg.port_id)?;

    let connection_id = &msg.connection_hops[0];
    let connection = ctx.open_connection(connection_id)?;
    let counterparty_connection = counterparty_connection_id(&connection, connection_id)?;
    let counterparty_channel_id = msg.counterparty.channel_id.clone().ok_or_else(|| {
        ChannelError::CounterpartyMismatch {
            port_id: msg.counterparty.port_id.clone(),
            channel_id: None,
        }
    })?;

    let previous = match &msg.previous_channel_id {
        Some(previous_id) => {
            let previous = ctx.channel_end(&msg.port_id, previous_id)?;
            if previous.state != State::Init {
                return Err(ChannelError::invalid_state(previous_id, "INIT", previous.state));
            }
            if previous.ordering != msg.ordering
                || previous.connection_hops != msg.connection_hops
                || previous.counterparty.port_id != msg.counterparty.port_id
            {
                return Err(ChannelError::InvalidMessage(format!(
                    "previous channel {} does not match the proposed channel",
                    previous_id
                )));
            }
            ctx.authenticate_channel(&msg.port_id, previous_id)?;
            Some((previous_id.clone(), previous))
        }
        None => None,
    };

    let expected_init = ChannelEnd::new(
        State::Init,
        msg.ordering,
        Counterparty::new(msg.port_id.clone(), None),
        vec![counterparty_connection.clone()],
        msg.counterparty_version.clone(),
    );
    let proven = ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_init,
        &msg.counterparty.port_id,
        &counterparty_channel_id,
        &expected_init,
    );
    match (proven, &previous) {
        (Ok(()), _) => {}
        (Err(_), Some((previous_id, _))) => {
            // The counterparty may already have answered our INIT.
            let expected_try = ChannelEnd::new(
                State::TryOpen,
                msg.ordering,
                Counterparty::new(msg.port_id.clone(), Some(previous_id.clone())),
                vec![counterparty_connection],
                msg.counterparty_version.clone(),
            );
            ctx.verify_channel_state(
                &connection,
                msg.proof_height,
                &msg.proof_init,
                &msg.counterparty.port_id,
                &counterparty_channel_id,
                &expected_try,
            )?;
        }
        (Err(e), None) => return Err(e),
    }

    let (channel_id, mut channel, is_new) = match previous {
        Some((previous_id, previous)) => (previous_id, previous, false),
        None => {
            let channel_id = allocate_channel_id(ctx, &msg.port_id)?;
            let channel = ChannelEnd::new(
                State::Uninitialized,
                msg.ordering,
                msg.counterparty.clone(),
                msg.connection_hops.clone(),
                String::new(),
            );
            (channel_id, channel, true)
        }
    };

    let version = ctx.module(&msg.port_id)?.on_chan_open_try(
        msg.ordering,
        &msg.connection_hops,
        &msg.port_id,
        &channel_id,
        &msg.counterparty,
        &msg.counterparty_version,
    )?;
    ctx.validate_version(&version)?;

    channel.counterparty = msg.counterparty.clone();
    channel.version = version.clone();
    channel.transition(State::TryOpen)?;
    ctx.store.set_channel(&msg.port_id, &channel_id, &channel)?;
    if is_new {
        init_sequences(ctx, &msg.port_id, &channel_id);
    }

    ctx.emit(ChannelEvent::OpenTry {
        port_id: msg.port_id.clone(),
        channel_id: channel_id.clone(),
        counterparty_port_id: msg.counterparty.port_id.clone(),
        counterparty_channel_id,
        connection_id: connection_id.clone(),
        version: version.clone(),
    });
    info!(
        port = %msg.port_id,
        channel = %channel_id,
        crossing_hellos = !is_new,
        "[qc-15] Channel open try"
    );

    Ok(Allocated {
        channel_id,
        version,
        is_new,
    })
}

/// `ChanOpenAck`: INIT or TRYOPEN -> OPEN.
pub fn chan_open_ack(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelOpenAck,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;
    ctx.validate_version(&msg.counterparty_version)?;

    let mut channel = ctx.channel_end(&msg.port_id, &msg.channel_id)?;
    if !matches!(channel.state, State::Init | State::TryOpen) {
        return Err(ChannelError::invalid_state(
            &msg.channel_id,
            "INIT or TRYOPEN",
            channel.state,
        ));
    }
    if let Some(existing) = &channel.counterparty.channel_id {
        if existing != &msg.counterparty_channel_id {
            return Err(ChannelError::CounterpartyMismatch {
                port_id: channel.counterparty.port_id.clone(),
                channel_id: Some(msg.counterparty_channel_id.clone()),
            });
        }
    }
    ctx.authenticate_channel(&msg.port_id, &msg.channel_id)?;

    let connection = ctx.channel_connection(&channel)?;
    let connection_id = channel.connection_hops[0].clone();
    let expected = ChannelEnd::new(
        State::TryOpen,
        channel.ordering,
        Counterparty::new(msg.port_id.clone(), Some(msg.channel_id.clone())),
        vec![counterparty_connection_id(&connection, &connection_id)?],
        msg.counterparty_version.clone(),
    );
    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_try,
        &channel.counterparty.port_id,
        &msg.counterparty_channel_id,
        &expected,
    )?;

    ctx.module(&msg.port_id)?.on_chan_open_ack(
        &msg.port_id,
        &msg.channel_id,
        &msg.counterparty_channel_id,
        &msg.counterparty_version,
    )?;

    channel.version = msg.counterparty_version.clone();
    channel.counterparty.channel_id = Some(msg.counterparty_channel_id.clone());
    channel.transition(State::Open)?;
    ctx.store.set_channel(&msg.port_id, &msg.channel_id, &channel)?;

    ctx.emit(ChannelEvent::OpenAck {
        port_id: msg.port_id.clone(),
        channel_id: msg.channel_id.clone(),
        counterparty_channel_id: msg.counterparty_channel_id.clone(),
    });
    info!(port = %msg.port_id, channel = %msg.channel_id, "[qc-15] Channel open ack");
    Ok(())
}

/// `ChanOpenConfirm`: TRYOPEN -> OPEN.
pub fn chan_open_confirm(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelOpenConfirm,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;

    let mut channel = ctx.channel_end(&msg.port_id, &msg.channel_id)?;
    if channel.state != State::TryOpen {
        return Err(ChannelError::invalid_state(&msg.channel_id, "TRYOPEN", channel.state));
    }
    ctx.authenticate_channel(&msg.port_id, &msg.channel_id)?;

    let connection = ctx.channel_connection(&channel)?;
    let counterparty_channel_id = counterparty_channel(&channel)?;
    let connection_id = channel.connection_hops[0].clone();
    let expected = ChannelEnd::new(
        State::Open,
        channel.ordering,
        Counterparty::new(msg.port_id.clone(), Some(msg.channel_id.clone())),
        vec![counterparty_connection_id(&connection, &connection_id)?],
        channel.version.clone(),
    );
    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_ack,
        &channel.counterparty.port_id,
        &counterparty_channel_id,
        &expected,
    )?;

    ctx.module(&msg.port_id)?
        .on_chan_open_confirm(&msg.port_id, &msg.channel_id)?;

    channel.transition(State::Open)?;
    ctx.store.set_channel(&msg.port_id, &msg.channel_id, &channel)?;

    ctx.emit(ChannelEvent::OpenConfirm {
        port_id: msg.port_id.clone(),
        channel_id: msg.channel_id.clone(),
    });
    info!(port = %msg.port_id, channel = %msg.channel_id, "[qc-15] Channel open confirm");
    Ok(())
}

/// `ChanCloseInit`: OPEN -> CLOSED.
pub fn chan_close_init(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelCloseInit,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;

    let mut channel = ctx.channel_end(&msg.port_id, &msg.channel_id)?;
    ctx.authenticate_channel(&msg.port_id, &msg.channel_id)?;
    if channel.state != State::Open {
        debug!(
            "[qc-15] Close init rejected for {}/{}: channel is {}",
            msg.port_id, msg.channel_id, channel.state
        );
        return Err(ChannelError::invalid_state(&msg.channel_id, "OPEN", channel.state));
    }
    ctx.channel_connection(&channel)?;

    ctx.module(&msg.port_id)?
        .on_chan_close_init(&msg.port_id, &msg.channel_id)?;

    channel.transition(State::Closed)?;
    ctx.store.set_channel(&msg.port_id, &msg.channel_id, &channel)?;

    ctx.emit(ChannelEvent::CloseInit {
        port_id: msg.port_id.clone(),
        channel_id: msg.channel_id.clone(),
    });
    info!(port = %msg.port_id, channel = %msg.channel_id, "[qc-15] Channel close init");
    Ok(())
}

/// `ChanCloseConfirm`: OPEN -> CLOSED after the counterparty closed.
pub fn chan_close_confirm(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelCloseConfirm,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;

    let mut channel = ctx.channel_end(&msg.port_id, &msg.channel_id)?;
    ctx.authenticate_channel(&msg.port_id, &msg.channel_id)?;
    if channel.state != State::Open {
        return Err(ChannelError::invalid_state(&msg.channel_id, "OPEN", channel.state));
    }

    let connection = ctx.channel_connection(&channel)?;
    let counterparty_channel_id = counterparty_channel(&channel)?;
    let connection_id = channel.connection_hops[0].clone();
    let expected = ChannelEnd::new(
        State::Closed,
        channel.ordering,
        Counterparty::new(msg.port_id.clone(), Some(msg.channel_id.clone())),
        vec![counterparty_connection_id(&connection, &connection_id)?],
        channel.version.clone(),
    );
    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_init,
        &channel.counterparty.port_id,
        &counterparty_channel_id,
        &expected,
    )?;

    ctx.module(&msg.port_id)?
        .on_chan_close_confirm(&msg.port_id, &msg.channel_id)?;

    channel.transition(State::Closed)?;
    ctx.store.set_channel(&msg.port_id, &msg.channel_id, &channel)?;

    ctx.emit(ChannelEvent::CloseConfirm {
        port_id: msg.port_id.clone(),
        channel_id: msg.channel_id.clone(),
    });
    info!(port = %msg.port_id, channel = %msg.channel_id, "[qc-15] Channel close confirm");
    Ok(())
}

/// Counterparty channel identifier of an end past INIT.
pub(crate) fn counterparty_channel(channel: &ChannelEnd) -> Result<ChannelId, ChannelError> {
    channel
        .counterparty
        .channel_id
        .clone()
        .ok_or_else(|| ChannelError::CounterpartyMismatch {
            port_id: channel.counterparty.port_id.clone(),
            channel_id: None,
        })
}
