//! # Packet Lifecycle
//!
//! Send, receive, acknowledge and time out packets over an open channel.
//!
//! Only commitments are stored. The sender keeps
//! `commitments/.../sequences/{n}` until the packet is acknowledged or timed
//! out; the receiver keeps a receipt (UNORDERED) or advances
//! `nextSequenceRecv` (ORDERED), plus the acknowledgement commitment.

use tracing::{debug, info, warn};

use crate::algorithms::{compute_ack_commitment, compute_packet_commitment};
use crate::domain::{
    invariant_sequence_monotonic, invariant_timeout_set, Acknowledgement, CapabilityToken,
    ChannelEnd, ChannelError, ChannelEvent, ChannelId, CommitmentProof, Counterparty, Height,
    MsgAcknowledgement, MsgRecvPacket, MsgTimeout, MsgTimeoutOnClose, Order, Packet, PortId,
    RecvOutcome, Sequence, State, Timeout,
};

use super::context::ExecutionContext;
use super::handshake::{counterparty_channel, counterparty_connection_id};

fn require_state(
    channel: &ChannelEnd,
    channel_id: &ChannelId,
    allowed: &[State],
    expected: &str,
) -> Result<(), ChannelError> {
    if !allowed.contains(&channel.state) {
        return Err(ChannelError::invalid_state(channel_id, expected, channel.state));
    }
    Ok(())
}

fn require_counterparty(
    channel: &ChannelEnd,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Result<(), ChannelError> {
    if !channel.counterparty_matches(port_id, channel_id) {
        return Err(ChannelError::CounterpartyMismatch {
            port_id: port_id.clone(),
            channel_id: Some(channel_id.clone()),
        });
    }
    Ok(())
}

fn successor(
    sequence: Sequence,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Result<Sequence, ChannelError> {
    sequence
        .checked_increment()
        .ok_or_else(|| ChannelError::SequenceOverflow {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
        })
}

/// Stored commitment must exist and match the relayed packet.
fn require_commitment(ctx: &ExecutionContext<'_>, packet: &Packet) -> Result<(), ChannelError> {
    let stored = ctx
        .store
        .packet_commitment(&packet.source_port, &packet.source_channel, packet.sequence)?
        .ok_or(ChannelError::PacketCommitmentNotFound(packet.sequence))?;
    if stored != compute_packet_commitment(packet) {
        return Err(ChannelError::PacketCommitmentMismatch(packet.sequence));
    }
    Ok(())
}

/// `SendPacket`. Returns the sequence assigned to the packet.
pub fn send_packet(
    ctx: &mut ExecutionContext<'_>,
    capability: &CapabilityToken,
    source_port: &PortId,
    source_channel: &ChannelId,
    timeout: Timeout,
    data: Vec<u8>,
) -> Result<Sequence, ChannelError> {
    source_port.validate()?;
    source_channel.validate()?;
    invariant_timeout_set(&timeout)?;
    let max = ctx.config.max_packet_data_len;
    if data.is_empty() || data.len() > max {
        return Err(ChannelError::InvalidPacketData { len: data.len(), max });
    }

    let channel = ctx.channel_end(source_port, source_channel)?;
    require_state(&channel, source_channel, &[State::Open], "OPEN")?;
    ctx.authenticate_token(capability, source_port, source_channel)?;

    let connection = ctx.channel_connection(&channel)?;
    let (cp_height, cp_timestamp) = ctx.counterparty_latest(&connection)?;
    if timeout.has_elapsed(cp_height, cp_timestamp) {
        return Err(ChannelError::PacketTimedOut {
            timeout_height: timeout.height,
            timeout_timestamp: timeout.timestamp.nanos(),
            height: cp_height,
            timestamp: cp_timestamp.nanos(),
        });
    }

    let sequence = ctx.store.next_sequence_send(source_port, source_channel)?;
    let next = successor(sequence, source_port, source_channel)?;
    let packet = Packet {
        sequence,
        source_port: source_port.clone(),
        source_channel: source_channel.clone(),
        destination_port: channel.counterparty.port_id.clone(),
        destination_channel: counterparty_channel(&channel)?,
        data,
        timeout_height: timeout.height,
        timeout_timestamp: timeout.timestamp,
    };

    ctx.store
        .set_next_sequence_send(source_port, source_channel, next);
    ctx.store.set_packet_commitment(
        source_port,
        source_channel,
        sequence,
        compute_packet_commitment(&packet),
    );

    debug!(
        port = %source_port,
        channel = %source_channel,
        sequence = %sequence,
        "[qc-15] Packet sent ({} bytes)", packet.data.len()
    );
    ctx.emit(ChannelEvent::SendPacket { packet });
    Ok(sequence)
}

/// `RecvPacket`.
pub fn recv_packet(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgRecvPacket,
) -> Result<RecvOutcome, ChannelError> {
    msg.validate_basic()?;
    let packet = &msg.packet;
    let port_id = &packet.destination_port;
    let channel_id = &packet.destination_channel;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_state(&channel, channel_id, &[State::Open], "OPEN")?;
    ctx.authenticate_channel(port_id, channel_id)?;
    require_counterparty(&channel, &packet.source_port, &packet.source_channel)?;

    let host = ctx.host;
    if packet.timed_out(host.height, host.timestamp) {
        return Err(ChannelError::PacketTimedOut {
            timeout_height: packet.timeout_height,
            timeout_timestamp: packet.timeout_timestamp.nanos(),
            height: host.height,
            timestamp: host.timestamp.nanos(),
        });
    }

    let connection = ctx.channel_connection(&channel)?;
    ctx.verify_packet_commitment(
        &connection,
        msg.proof_height,
        &msg.proof_commitment,
        &packet.source_port,
        &packet.source_channel,
        packet.sequence,
        compute_packet_commitment(packet),
    )?;

    match channel.ordering {
        Order::Ordered => {
            let expected = ctx.store.next_sequence_recv(port_id, channel_id)?;
            if packet.sequence != expected {
                return Err(ChannelError::InvalidPacketSequence {
                    given: packet.sequence,
                    expected,
                });
            }
            let next = successor(expected, port_id, channel_id)?;
            ctx.store.set_next_sequence_recv(port_id, channel_id, next);
        }
        Order::Unordered => {
            if ctx
                .store
                .has_packet_receipt(port_id, channel_id, packet.sequence)?
            {
                return Err(ChannelError::PacketAlreadyReceived {
                    channel_id: channel_id.clone(),
                    sequence: packet.sequence,
                });
            }
            ctx.store
                .set_packet_receipt(port_id, channel_id, packet.sequence);
        }
    }

    let outcome = ctx.module(port_id)?.on_recv_packet(packet);
    ctx.emit(ChannelEvent::RecvPacket {
        packet: packet.clone(),
    });
    if let RecvOutcome::Ack(ack) = &outcome {
        ctx.store.set_packet_acknowledgement(
            port_id,
            channel_id,
            packet.sequence,
            compute_ack_commitment(ack),
        );
        ctx.emit(ChannelEvent::WriteAcknowledgement {
            packet: packet.clone(),
            acknowledgement: ack.clone(),
        });
    }

    debug!(
        port = %port_id,
        channel = %channel_id,
        sequence = %packet.sequence,
        deferred = matches!(outcome, RecvOutcome::Pending),
        "[qc-15] Packet received"
    );
    Ok(outcome)
}

/// `WriteAcknowledgement` for a packet whose application deferred the ack.
pub fn write_acknowledgement(
    ctx: &mut ExecutionContext<'_>,
    capability: &CapabilityToken,
    packet: &Packet,
    acknowledgement: Acknowledgement,
) -> Result<(), ChannelError> {
    let port_id = &packet.destination_port;
    let channel_id = &packet.destination_channel;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_state(
        &channel,
        channel_id,
        &[State::Open, State::InitUpgrade, State::TryUpgrade],
        "OPEN or upgrading",
    )?;
    ctx.authenticate_token(capability, port_id, channel_id)?;

    let received = match channel.ordering {
        Order::Unordered => ctx
            .store
            .has_packet_receipt(port_id, channel_id, packet.sequence)?,
        Order::Ordered => packet.sequence < ctx.store.next_sequence_recv(port_id, channel_id)?,
    };
    if !received {
        return Err(ChannelError::PacketNotReceived(packet.sequence));
    }
    if ctx
        .store
        .packet_acknowledgement(port_id, channel_id, packet.sequence)?
        .is_some()
    {
        return Err(ChannelError::AcknowledgementExists(packet.sequence));
    }

    let acknowledgement = ctx
        .module(port_id)?
        .on_write_acknowledgement(packet, acknowledgement)?;
    ctx.store.set_packet_acknowledgement(
        port_id,
        channel_id,
        packet.sequence,
        compute_ack_commitment(&acknowledgement),
    );
    ctx.emit(ChannelEvent::WriteAcknowledgement {
        packet: packet.clone(),
        acknowledgement,
    });
    debug!(
        port = %port_id,
        channel = %channel_id,
        sequence = %packet.sequence,
        "[qc-15] Deferred acknowledgement written"
    );
    Ok(())
}

/// `AcknowledgePacket` on the sending chain.
pub fn acknowledge_packet(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgAcknowledgement,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;
    let packet = &msg.packet;
    let port_id = &packet.source_port;
    let channel_id = &packet.source_channel;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_state(
        &channel,
        channel_id,
        &[State::Open, State::InitUpgrade, State::TryUpgrade],
        "OPEN or upgrading",
    )?;
    ctx.authenticate_channel(port_id, channel_id)?;
    require_counterparty(&channel, &packet.destination_port, &packet.destination_channel)?;
    require_commitment(ctx, packet)?;

    let connection = ctx.channel_connection(&channel)?;
    ctx.verify_packet_acknowledgement(
        &connection,
        msg.proof_height,
        &msg.proof_acked,
        &packet.destination_port,
        &packet.destination_channel,
        packet.sequence,
        compute_ack_commitment(&msg.acknowledgement),
    )?;

    if channel.ordering == Order::Ordered {
        let expected = ctx.store.next_sequence_ack(port_id, channel_id)?;
        if packet.sequence != expected {
            return Err(ChannelError::InvalidPacketSequence {
                given: packet.sequence,
                expected,
            });
        }
        let next = successor(expected, port_id, channel_id)?;
        ctx.store.set_next_sequence_ack(port_id, channel_id, next);
    }

    ctx.store
        .delete_packet_commitment(port_id, channel_id, packet.sequence);
    ctx.module(port_id)?
        .on_acknowledgement_packet(packet, &msg.acknowledgement)?;

    ctx.emit(ChannelEvent::AcknowledgePacket {
        packet: packet.clone(),
    });
    debug!(
        port = %port_id,
        channel = %channel_id,
        sequence = %packet.sequence,
        success = msg.acknowledgement.is_success(),
        "[qc-15] Packet acknowledged"
    );
    Ok(())
}

/// Proof that the counterparty never received `packet`.
fn verify_unreceived(
    ctx: &ExecutionContext<'_>,
    channel: &ChannelEnd,
    packet: &Packet,
    next_sequence_recv: Sequence,
    proof: &CommitmentProof,
    proof_height: Height,
) -> Result<(), ChannelError> {
    let connection = ctx.channel_connection(channel)?;
    match channel.ordering {
        Order::Ordered => {
            // The counterparty must not have moved past this packet.
            invariant_sequence_monotonic(next_sequence_recv, packet.sequence)?;
            ctx.verify_next_sequence_recv(
                &connection,
                proof_height,
                proof,
                &packet.destination_port,
                &packet.destination_channel,
                next_sequence_recv,
            )
        }
        Order::Unordered => ctx.verify_packet_receipt_absence(
            &connection,
            proof_height,
            proof,
            &packet.destination_port,
            &packet.destination_channel,
            packet.sequence,
        ),
    }
}

/// Delete the commitment, close an ORDERED channel and notify the application.
fn finish_timeout(
    ctx: &mut ExecutionContext<'_>,
    mut channel: ChannelEnd,
    packet: &Packet,
) -> Result<(), ChannelError> {
    let port_id = &packet.source_port;
    let channel_id = &packet.source_channel;

    ctx.store
        .delete_packet_commitment(port_id, channel_id, packet.sequence);

    if channel.ordering == Order::Ordered && channel.state != State::Closed {
        if channel.state.is_upgrading() {
            ctx.store.delete_upgrade(port_id, channel_id);
            ctx.store.delete_restore_channel(port_id, channel_id);
            ctx.store.delete_upgrade_timeout(port_id, channel_id);
        }
        channel.transition(State::Closed)?;
        ctx.store.set_channel(port_id, channel_id, &channel)?;
        ctx.emit(ChannelEvent::ChannelClosed {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
            ordering: channel.ordering,
        });
        warn!(
            port = %port_id,
            channel = %channel_id,
            sequence = %packet.sequence,
            "[qc-15] Ordered channel closed by packet timeout"
        );
    }

    ctx.module(port_id)?.on_timeout_packet(packet)?;
    ctx.emit(ChannelEvent::TimeoutPacket {
        packet: packet.clone(),
    });
    info!(
        port = %port_id,
        channel = %channel_id,
        sequence = %packet.sequence,
        "[qc-15] Packet timed out"
    );
    Ok(())
}

const TIMEOUT_STATES: &[State] = &[
    State::Open,
    State::InitUpgrade,
    State::TryUpgrade,
    State::Closed,
];

/// `TimeoutPacket` on the sending chain.
pub fn timeout_packet(ctx: &mut ExecutionContext<'_>, msg: &MsgTimeout) -> Result<(), ChannelError> {
    msg.validate_basic()?;
    let packet = &msg.packet;
    let port_id = &packet.source_port;
    let channel_id = &packet.source_channel;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_state(&channel, channel_id, TIMEOUT_STATES, "OPEN, upgrading or CLOSED")?;
    ctx.authenticate_channel(port_id, channel_id)?;
    require_counterparty(&channel, &packet.destination_port, &packet.destination_channel)?;
    require_commitment(ctx, packet)?;

    let connection = ctx.channel_connection(&channel)?;
    let cp_timestamp = ctx.counterparty_timestamp(&connection, msg.proof_height)?;
    if !packet.timed_out(msg.proof_height, cp_timestamp) {
        return Err(ChannelError::TimeoutNotReached {
            proof_height: msg.proof_height,
        });
    }

    verify_unreceived(
        ctx,
        &channel,
        packet,
        msg.next_sequence_recv,
        &msg.proof_unreceived,
        msg.proof_height,
    )?;
    finish_timeout(ctx, channel, packet)
}

/// `TimeoutOnClose`: the counterparty closed the channel before receiving.
pub fn timeout_on_close(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgTimeoutOnClose,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;
    let packet = &msg.packet;
    let port_id = &packet.source_port;
    let channel_id = &packet.source_channel;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_state(&channel, channel_id, TIMEOUT_STATES, "OPEN, upgrading or CLOSED")?;
    ctx.authenticate_channel(port_id, channel_id)?;
    require_counterparty(&channel, &packet.destination_port, &packet.destination_channel)?;
    require_commitment(ctx, packet)?;

    let connection = ctx.channel_connection(&channel)?;
    let connection_id = channel.connection_hops[0].clone();
    let expected = ChannelEnd::new(
        State::Closed,
        channel.ordering,
        Counterparty::new(port_id.clone(), Some(channel_id.clone())),
        vec![counterparty_connection_id(&connection, &connection_id)?],
        channel.version.clone(),
    );
    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_close,
        &packet.destination_port,
        &packet.destination_channel,
        &expected,
    )?;

    verify_unreceived(
        ctx,
        &channel,
        packet,
        msg.next_sequence_recv,
        &msg.proof_unreceived,
        msg.proof_height,
    )?;
    finish_timeout(ctx, channel, packet)
}
