//! # Channel Upgrade Handshake
//!
//! In-place renegotiation of ordering, connection hops and version for an
//! OPEN channel.
//!
//! ```text
//! A: ChanUpgradeInit     OPEN ──→ INITUPGRADE
//! B: ChanUpgradeTry      OPEN ──→ TRYUPGRADE      (proves A INITUPGRADE)
//! A: ChanUpgradeAck      INITUPGRADE ──→ OPEN'    (proves B TRYUPGRADE)
//! B: ChanUpgradeConfirm  TRYUPGRADE ──→ OPEN'     (proves A OPEN')
//! ```
//!
//! A rejected proposal is not a failed call. The step commits an abort:
//! the channel goes back to its pre-upgrade snapshot (or stays OPEN if it
//! never left it) and an error receipt stamped with the upgrade sequence is
//! written for the counterparty to cancel against.

use tracing::{info, warn};

use crate::domain::{
    invariant_upgrade_is_change, invariant_upgrade_ordering, ChannelEnd, ChannelError,
    ChannelEvent, ChannelId, ConnectionEnd, ErrorReceipt, MsgChannelUpgradeAck,
    MsgChannelUpgradeCancel, MsgChannelUpgradeConfirm, MsgChannelUpgradeInit,
    MsgChannelUpgradeTimeout, MsgChannelUpgradeTry, PortId, State, Upgrade,
};
use crate::ports::UpgradeOutcome;

use super::context::ExecutionContext;
use super::handshake::counterparty_channel;

fn require_upgrading(channel: &ChannelEnd, channel_id: &ChannelId) -> Result<(), ChannelError> {
    if !channel.state.is_upgrading() {
        return Err(ChannelError::invalid_state(
            channel_id,
            "INITUPGRADE or TRYUPGRADE",
            channel.state,
        ));
    }
    Ok(())
}

fn stored_upgrade(
    ctx: &ExecutionContext<'_>,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Result<Upgrade, ChannelError> {
    ctx.store
        .upgrade(port_id, channel_id)?
        .ok_or_else(|| ChannelError::UpgradeNotFound {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
        })
}

fn clear_upgrade(ctx: &mut ExecutionContext<'_>, port_id: &PortId, channel_id: &ChannelId) {
    ctx.store.delete_upgrade(port_id, channel_id);
    ctx.store.delete_restore_channel(port_id, channel_id);
    ctx.store.delete_upgrade_timeout(port_id, channel_id);
}

/// Does `proposal` connect to the counterparty through `connection`?
fn hops_match(proposal: &ChannelEnd, connection: &ConnectionEnd) -> bool {
    proposal.connection_hops.len() == 1
        && connection.counterparty_connection_id.as_ref() == proposal.connection_hops.first()
}

/// Roll the channel back to its pre-upgrade snapshot.
///
/// Writes the snapshot back as OPEN, drops the proposal and records an
/// error receipt stamped with the current upgrade sequence.
pub fn restore(
    ctx: &mut ExecutionContext<'_>,
    port_id: &PortId,
    channel_id: &ChannelId,
    message: impl Into<String>,
) -> Result<ErrorReceipt, ChannelError> {
    let snapshot = ctx.store.restore_channel(port_id, channel_id)?.ok_or_else(|| {
        ChannelError::MissingRestoreChannel {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
        }
    })?;
    let sequence = ctx.store.upgrade_sequence(port_id, channel_id)?;

    ctx.store
        .set_channel(port_id, channel_id, &snapshot.with_state(State::Open))?;
    clear_upgrade(ctx, port_id, channel_id);

    let receipt = ErrorReceipt::new(sequence, message);
    ctx.store.set_error_receipt(port_id, channel_id, &receipt)?;
    ctx.emit(ChannelEvent::UpgradeError {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        receipt: receipt.clone(),
    });
    warn!(
        port = %port_id,
        channel = %channel_id,
        upgrade_sequence = sequence,
        "[qc-15] Upgrade restored: {}", receipt.message
    );
    Ok(receipt)
}

/// Commit an abort. An upgrading channel is restored at its current
/// sequence. An OPEN channel only records a receipt for `sequence` and
/// moves its own sequence past it, so the next local proposal cannot
/// collide with the rejected one.
fn abort(
    ctx: &mut ExecutionContext<'_>,
    port_id: &PortId,
    channel_id: &ChannelId,
    upgrading: bool,
    sequence: u64,
    message: String,
) -> Result<UpgradeOutcome, ChannelError> {
    if upgrading {
        return Ok(UpgradeOutcome::Aborted(restore(ctx, port_id, channel_id, message)?));
    }

    ctx.store
        .set_upgrade_sequence(port_id, channel_id, sequence.saturating_add(1));
    let receipt = ErrorReceipt::new(sequence, message);
    ctx.store.set_error_receipt(port_id, channel_id, &receipt)?;
    ctx.emit(ChannelEvent::UpgradeError {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        receipt: receipt.clone(),
    });
    warn!(
        port = %port_id,
        channel = %channel_id,
        upgrade_sequence = sequence,
        "[qc-15] Upgrade rejected: {}", receipt.message
    );
    Ok(UpgradeOutcome::Aborted(receipt))
}

/// Replace the channel end with the agreed proposal and drop upgrade state.
fn finalize(
    ctx: &mut ExecutionContext<'_>,
    port_id: &PortId,
    channel_id: &ChannelId,
    proposal: &ChannelEnd,
    sequence: u64,
) -> Result<(), ChannelError> {
    let upgraded = proposal.with_state(State::Open);
    ctx.store.set_channel(port_id, channel_id, &upgraded)?;
    clear_upgrade(ctx, port_id, channel_id);

    ctx.module(port_id)?.on_chan_upgrade_open(
        port_id,
        channel_id,
        upgraded.ordering,
        &upgraded.connection_hops,
        &upgraded.version,
    );

    ctx.emit(ChannelEvent::UpgradeOpen {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        upgrade_sequence: sequence,
        ordering: upgraded.ordering,
        version: upgraded.version.clone(),
    });
    info!(
        port = %port_id,
        channel = %channel_id,
        upgrade_sequence = sequence,
        "[qc-15] Channel upgraded to {} {}", upgraded.ordering, upgraded.version
    );
    Ok(())
}

/// `ChanUpgradeInit`: OPEN -> INITUPGRADE.
///
/// Returns the new upgrade sequence and the pre-upgrade version.
pub fn chan_upgrade_init(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelUpgradeInit,
) -> Result<(u64, String), ChannelError> {
    msg.validate_basic()?;
    ctx.validate_hops(&msg.connection_hops)?;
    ctx.validate_version(&msg.version)?;

    let mut channel = ctx.channel_end(&msg.port_id, &msg.channel_id)?;
    if channel.state != State::Open {
        return Err(ChannelError::invalid_state(&msg.channel_id, "OPEN", channel.state));
    }
    ctx.authenticate_channel(&msg.port_id, &msg.channel_id)?;
    ctx.open_connection(&msg.connection_hops[0])?;

    let mut proposed = ChannelEnd::new(
        State::Open,
        msg.ordering,
        channel.counterparty.clone(),
        msg.connection_hops.clone(),
        msg.version.clone(),
    );
    invariant_upgrade_is_change(&channel, &proposed)?;
    invariant_upgrade_ordering(
        channel.ordering,
        msg.ordering,
        ctx.config.allow_ordered_to_unordered_upgrade,
    )?;

    let version = ctx.module(&msg.port_id)?.on_chan_upgrade_init(
        &msg.port_id,
        &msg.channel_id,
        msg.ordering,
        &msg.connection_hops,
        &msg.version,
    )?;
    if version.is_empty() {
        return Err(ChannelError::InvalidVersion {
            version,
            reason: "upgrade version cannot be empty".to_string(),
        });
    }
    ctx.validate_version(&version)?;
    proposed.version = version.clone();

    let sequence = ctx.store.upgrade_sequence(&msg.port_id, &msg.channel_id)? + 1;
    let previous_version = channel.version.clone();

    ctx.store
        .set_restore_channel(&msg.port_id, &msg.channel_id, &channel)?;
    ctx.store.set_upgrade(
        &msg.port_id,
        &msg.channel_id,
        &Upgrade::new(proposed, msg.timeout),
    )?;
    ctx.store
        .set_upgrade_timeout(&msg.port_id, &msg.channel_id, &msg.timeout)?;
    ctx.store
        .set_upgrade_sequence(&msg.port_id, &msg.channel_id, sequence);

    channel.transition(State::InitUpgrade)?;
    ctx.store.set_channel(&msg.port_id, &msg.channel_id, &channel)?;

    ctx.emit(ChannelEvent::UpgradeInit {
        port_id: msg.port_id.clone(),
        channel_id: msg.channel_id.clone(),
        upgrade_sequence: sequence,
        version: version.clone(),
    });
    info!(
        port = %msg.port_id,
        channel = %msg.channel_id,
        upgrade_sequence = sequence,
        "[qc-15] Upgrade init: {} {}", msg.ordering, version
    );

    Ok((sequence, previous_version))
}

/// `ChanUpgradeTry`: OPEN, INITUPGRADE or TRYUPGRADE -> TRYUPGRADE.
///
/// From OPEN the counterparty sequence must be ahead of ours. From an
/// in-flight upgrade (crossing hellos) both sequences and both proposals
/// must agree, otherwise the local upgrade is restored.
pub fn chan_upgrade_try(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelUpgradeTry,
) -> Result<UpgradeOutcome, ChannelError> {
    msg.validate_basic()?;
    let port_id = &msg.port_id;
    let channel_id = &msg.channel_id;

    let mut channel = ctx.channel_end(port_id, channel_id)?;
    if !matches!(
        channel.state,
        State::Open | State::InitUpgrade | State::TryUpgrade
    ) {
        return Err(ChannelError::invalid_state(
            channel_id,
            "OPEN, INITUPGRADE or TRYUPGRADE",
            channel.state,
        ));
    }
    ctx.authenticate_channel(port_id, channel_id)?;

    let connection = ctx.channel_connection(&channel)?;
    let counterparty_channel_id = counterparty_channel(&channel)?;
    let counterparty_port_id = channel.counterparty.port_id.clone();

    let claimed = &msg.counterparty_channel;
    let cp_upgrade = &msg.counterparty_upgrade;
    if !matches!(claimed.state, State::InitUpgrade | State::TryUpgrade) {
        return Err(ChannelError::CounterpartyNotReady(format!(
            "counterparty channel is {}, expected INITUPGRADE",
            claimed.state
        )));
    }
    if !claimed.counterparty_matches(port_id, channel_id)
        || !cp_upgrade.proposed.counterparty_matches(port_id, channel_id)
    {
        return Err(ChannelError::CounterpartyMismatch {
            port_id: port_id.clone(),
            channel_id: Some(channel_id.clone()),
        });
    }
    if claimed.ordering != channel.ordering {
        return Err(ChannelError::IncompatibleUpgrade(format!(
            "counterparty channel ordering {} differs from local {}",
            claimed.ordering, channel.ordering
        )));
    }
    if !hops_match(&cp_upgrade.proposed, &connection) {
        return Err(ChannelError::IncompatibleUpgrade(
            "proposed connection hops do not map to a local connection".to_string(),
        ));
    }

    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_channel,
        &counterparty_port_id,
        &counterparty_channel_id,
        claimed,
    )?;
    ctx.verify_upgrade(
        &connection,
        msg.proof_height,
        &msg.proof_upgrade,
        &counterparty_port_id,
        &counterparty_channel_id,
        cp_upgrade,
    )?;
    ctx.verify_upgrade_sequence(
        &connection,
        msg.proof_height,
        &msg.proof_upgrade_sequence,
        &counterparty_port_id,
        &counterparty_channel_id,
        msg.counterparty_upgrade_sequence,
    )?;

    let upgrading = channel.state.is_upgrading();
    let mut candidates = cp_upgrade.proposed.version.clone();
    let local_sequence = ctx.store.upgrade_sequence(port_id, channel_id)?;
    let cp_sequence = msg.counterparty_upgrade_sequence;
    let abort_sequence = if upgrading {
        local_sequence
    } else {
        local_sequence.max(cp_sequence)
    };
    let host = ctx.host;

    if cp_upgrade.timeout.has_elapsed(host.height, host.timestamp) {
        let reason = format!(
            "counterparty upgrade timed out at {}/{}",
            host.height, host.timestamp
        );
        return abort(ctx, port_id, channel_id, upgrading, abort_sequence, reason);
    }
    if let Err(e) = invariant_upgrade_ordering(
        channel.ordering,
        cp_upgrade.proposed.ordering,
        ctx.config.allow_ordered_to_unordered_upgrade,
    ) {
        return abort(ctx, port_id, channel_id, upgrading, abort_sequence, e.to_string());
    }

    if upgrading {
        if cp_sequence != local_sequence {
            let reason = format!(
                "upgrade sequence mismatch: local {}, counterparty {}",
                local_sequence, cp_sequence
            );
            return abort(ctx, port_id, channel_id, true, abort_sequence, reason);
        }
        let ours = stored_upgrade(ctx, port_id, channel_id)?;
        if ours.proposed.ordering != cp_upgrade.proposed.ordering {
            let reason = format!(
                "counterparty proposed ordering {}, local proposal {}",
                cp_upgrade.proposed.ordering, ours.proposed.ordering
            );
            return abort(ctx, port_id, channel_id, true, abort_sequence, reason);
        }
        if ours.proposed.version != cp_upgrade.proposed.version {
            let common = ctx
                .module(port_id)?
                .intersect_upgrade_versions(&ours.proposed.version, &cp_upgrade.proposed.version);
            match common {
                Some(common) => candidates = common,
                None => {
                    let reason = format!(
                        "no common version between {:?} and {:?}",
                        ours.proposed.version, cp_upgrade.proposed.version
                    );
                    return abort(ctx, port_id, channel_id, true, abort_sequence, reason);
                }
            }
        }
    } else if cp_sequence <= local_sequence {
        let reason = format!(
            "counterparty upgrade sequence {} is not ahead of local {}",
            cp_sequence, local_sequence
        );
        return abort(ctx, port_id, channel_id, false, abort_sequence, reason);
    }

    let accepted = ctx.module(port_id)?.on_chan_upgrade_try(
        port_id,
        channel_id,
        cp_upgrade.proposed.ordering,
        &channel.connection_hops,
        &candidates,
    );
    let version = match accepted {
        Ok(version) if !version.is_empty() => version,
        Ok(_) => {
            let reason = "application accepted an empty version".to_string();
            return abort(ctx, port_id, channel_id, upgrading, abort_sequence, reason);
        }
        Err(e) => {
            return abort(ctx, port_id, channel_id, upgrading, abort_sequence, e.to_string());
        }
    };
    ctx.validate_version(&version)?;

    if !upgrading {
        ctx.store.set_restore_channel(port_id, channel_id, &channel)?;
    }
    let proposed = ChannelEnd::new(
        State::Open,
        cp_upgrade.proposed.ordering,
        channel.counterparty.clone(),
        channel.connection_hops.clone(),
        version.clone(),
    );
    ctx.store
        .set_upgrade(port_id, channel_id, &Upgrade::new(proposed, cp_upgrade.timeout))?;
    ctx.store
        .set_upgrade_timeout(port_id, channel_id, &cp_upgrade.timeout)?;
    ctx.store.set_upgrade_sequence(port_id, channel_id, cp_sequence);

    let previous_version = match ctx.store.restore_channel(port_id, channel_id)? {
        Some(snapshot) => snapshot.version,
        None => channel.version.clone(),
    };
    channel.transition(State::TryUpgrade)?;
    ctx.store.set_channel(port_id, channel_id, &channel)?;

    ctx.emit(ChannelEvent::UpgradeTry {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        upgrade_sequence: cp_sequence,
        version: version.clone(),
    });
    info!(
        port = %port_id,
        channel = %channel_id,
        upgrade_sequence = cp_sequence,
        crossing_hellos = upgrading,
        "[qc-15] Upgrade try: {}", version
    );

    Ok(UpgradeOutcome::Success {
        upgrade_sequence: cp_sequence,
        version: previous_version,
    })
}

/// `ChanUpgradeAck`: INITUPGRADE or TRYUPGRADE -> OPEN with the agreed end.
pub fn chan_upgrade_ack(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelUpgradeAck,
) -> Result<UpgradeOutcome, ChannelError> {
    msg.validate_basic()?;
    let port_id = &msg.port_id;
    let channel_id = &msg.channel_id;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_upgrading(&channel, channel_id)?;
    ctx.authenticate_channel(port_id, channel_id)?;

    let connection = ctx.channel_connection(&channel)?;
    let counterparty_channel_id = counterparty_channel(&channel)?;
    let counterparty_port_id = channel.counterparty.port_id.clone();

    let claimed = &msg.counterparty_channel;
    let cp_upgrade = &msg.counterparty_upgrade;
    if claimed.state != State::TryUpgrade {
        return Err(ChannelError::CounterpartyNotReady(format!(
            "counterparty channel is {}, expected TRYUPGRADE",
            claimed.state
        )));
    }
    if !claimed.counterparty_matches(port_id, channel_id) {
        return Err(ChannelError::CounterpartyMismatch {
            port_id: port_id.clone(),
            channel_id: Some(channel_id.clone()),
        });
    }

    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_channel,
        &counterparty_port_id,
        &counterparty_channel_id,
        claimed,
    )?;
    ctx.verify_upgrade(
        &connection,
        msg.proof_height,
        &msg.proof_upgrade,
        &counterparty_port_id,
        &counterparty_channel_id,
        cp_upgrade,
    )?;
    ctx.verify_upgrade_sequence(
        &connection,
        msg.proof_height,
        &msg.proof_upgrade_sequence,
        &counterparty_port_id,
        &counterparty_channel_id,
        msg.counterparty_upgrade_sequence,
    )?;

    let local_sequence = ctx.store.upgrade_sequence(port_id, channel_id)?;
    let cp_sequence = msg.counterparty_upgrade_sequence;
    if cp_sequence < local_sequence {
        return Err(ChannelError::InvalidUpgradeSequence {
            local: local_sequence,
            counterparty: cp_sequence,
        });
    }
    if cp_sequence > local_sequence {
        let reason = format!(
            "upgrade sequence mismatch: local {}, counterparty {}",
            local_sequence, cp_sequence
        );
        return abort(ctx, port_id, channel_id, true, local_sequence, reason);
    }

    let mut ours = stored_upgrade(ctx, port_id, channel_id)?;
    let proposal_connection = ctx.channel_connection(&ours.proposed)?;
    let host = ctx.host;
    let incompatible = if cp_upgrade.timeout.has_elapsed(host.height, host.timestamp) {
        Some(format!("upgrade timed out at {}/{}", host.height, host.timestamp))
    } else if cp_upgrade.proposed.ordering != ours.proposed.ordering {
        Some(format!(
            "counterparty accepted ordering {}, proposed {}",
            cp_upgrade.proposed.ordering, ours.proposed.ordering
        ))
    } else if !hops_match(&cp_upgrade.proposed, &proposal_connection)
        || !cp_upgrade.proposed.counterparty_matches(port_id, channel_id)
    {
        Some("counterparty proposal does not connect back to this channel".to_string())
    } else if cp_upgrade.proposed.version.is_empty() {
        Some("counterparty accepted an empty version".to_string())
    } else {
        None
    };
    if let Some(reason) = incompatible {
        return abort(ctx, port_id, channel_id, true, local_sequence, reason);
    }

    let cp_version = cp_upgrade.proposed.version.clone();
    if let Err(e) = ctx
        .module(port_id)?
        .on_chan_upgrade_ack(port_id, channel_id, &cp_version)
    {
        return abort(ctx, port_id, channel_id, true, local_sequence, e.to_string());
    }

    ours.proposed.version = cp_version.clone();
    ctx.emit(ChannelEvent::UpgradeAck {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        upgrade_sequence: local_sequence,
    });
    finalize(ctx, port_id, channel_id, &ours.proposed, local_sequence)?;

    Ok(UpgradeOutcome::Success {
        upgrade_sequence: local_sequence,
        version: cp_version,
    })
}

/// `ChanUpgradeConfirm`: TRYUPGRADE -> OPEN once the counterparty opened.
pub fn chan_upgrade_confirm(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelUpgradeConfirm,
) -> Result<UpgradeOutcome, ChannelError> {
    msg.validate_basic()?;
    let port_id = &msg.port_id;
    let channel_id = &msg.channel_id;

    let channel = ctx.channel_end(port_id, channel_id)?;
    if channel.state != State::TryUpgrade {
        return Err(ChannelError::invalid_state(channel_id, "TRYUPGRADE", channel.state));
    }
    ctx.authenticate_channel(port_id, channel_id)?;

    let connection = ctx.channel_connection(&channel)?;
    let counterparty_channel_id = counterparty_channel(&channel)?;

    let claimed = &msg.counterparty_channel;
    if !claimed.counterparty_matches(port_id, channel_id) {
        return Err(ChannelError::CounterpartyMismatch {
            port_id: port_id.clone(),
            channel_id: Some(channel_id.clone()),
        });
    }
    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_channel,
        &channel.counterparty.port_id,
        &counterparty_channel_id,
        claimed,
    )?;
    if claimed.state != State::Open {
        return Err(ChannelError::CounterpartyNotReady(format!(
            "counterparty channel is {}, expected OPEN",
            claimed.state
        )));
    }

    let ours = stored_upgrade(ctx, port_id, channel_id)?;
    let sequence = ctx.store.upgrade_sequence(port_id, channel_id)?;
    let agreed = claimed.ordering == ours.proposed.ordering
        && claimed.version == ours.proposed.version
        && hops_match(claimed, &connection);
    if !agreed {
        return Err(ChannelError::IncompatibleUpgrade(format!(
            "counterparty is OPEN with {} / {:?}, not the agreed upgrade",
            claimed.ordering, claimed.version
        )));
    }

    finalize(ctx, port_id, channel_id, &ours.proposed, sequence)?;
    Ok(UpgradeOutcome::Success {
        upgrade_sequence: sequence,
        version: ours.proposed.version,
    })
}

/// `ChanUpgradeCancel`: abort with the counterparty's error receipt.
pub fn chan_upgrade_cancel(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelUpgradeCancel,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;
    let port_id = &msg.port_id;
    let channel_id = &msg.channel_id;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_upgrading(&channel, channel_id)?;
    ctx.authenticate_channel(port_id, channel_id)?;

    let connection = ctx.channel_connection(&channel)?;
    let counterparty_channel_id = counterparty_channel(&channel)?;
    ctx.verify_error_receipt(
        &connection,
        msg.proof_height,
        &msg.proof_error_receipt,
        &channel.counterparty.port_id,
        &counterparty_channel_id,
        &msg.error_receipt,
    )?;

    let local_sequence = ctx.store.upgrade_sequence(port_id, channel_id)?;
    if msg.error_receipt.sequence < local_sequence {
        return Err(ChannelError::InvalidUpgradeSequence {
            local: local_sequence,
            counterparty: msg.error_receipt.sequence,
        });
    }

    restore(
        ctx,
        port_id,
        channel_id,
        format!("cancelled by counterparty: {}", msg.error_receipt.message),
    )?;
    // Step past the receipt so it cannot cancel a later attempt.
    let next = msg.error_receipt.sequence + 1;
    ctx.store.set_upgrade_sequence(port_id, channel_id, next);

    ctx.emit(ChannelEvent::UpgradeCancelled {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        upgrade_sequence: next,
    });
    info!(
        port = %port_id,
        channel = %channel_id,
        upgrade_sequence = next,
        "[qc-15] Upgrade cancelled"
    );
    Ok(())
}

/// `ChanUpgradeTimeout`: abort once the upgrade timeout elapsed on the
/// counterparty without it completing.
pub fn chan_upgrade_timeout(
    ctx: &mut ExecutionContext<'_>,
    msg: &MsgChannelUpgradeTimeout,
) -> Result<(), ChannelError> {
    msg.validate_basic()?;
    let port_id = &msg.port_id;
    let channel_id = &msg.channel_id;

    let channel = ctx.channel_end(port_id, channel_id)?;
    require_upgrading(&channel, channel_id)?;
    ctx.authenticate_channel(port_id, channel_id)?;

    let connection = ctx.channel_connection(&channel)?;
    let counterparty_channel_id = counterparty_channel(&channel)?;
    let timeout = ctx
        .store
        .upgrade_timeout(port_id, channel_id)?
        .ok_or_else(|| ChannelError::UpgradeNotFound {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
        })?;

    let cp_timestamp = ctx.counterparty_timestamp(&connection, msg.proof_height)?;
    if !timeout.has_elapsed(msg.proof_height, cp_timestamp) {
        return Err(ChannelError::UpgradeTimeoutNotReached {
            proof_height: msg.proof_height,
        });
    }

    ctx.verify_channel_state(
        &connection,
        msg.proof_height,
        &msg.proof_channel,
        &channel.counterparty.port_id,
        &counterparty_channel_id,
        &msg.counterparty_channel,
    )?;

    let ours = stored_upgrade(ctx, port_id, channel_id)?;
    let claimed = &msg.counterparty_channel;
    if claimed.state == State::Open
        && claimed.ordering == ours.proposed.ordering
        && claimed.version == ours.proposed.version
    {
        return Err(ChannelError::IncompatibleUpgrade(
            "counterparty already completed the upgrade; confirm instead".to_string(),
        ));
    }

    let sequence = ctx.store.upgrade_sequence(port_id, channel_id)?;
    restore(ctx, port_id, channel_id, "upgrade timed out")?;
    ctx.emit(ChannelEvent::UpgradeTimedOut {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        upgrade_sequence: sequence,
    });
    Ok(())
}
