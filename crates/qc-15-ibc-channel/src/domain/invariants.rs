//! # Domain Invariants
//!
//! Business rules for the channel layer.

use super::entities::{ChannelEnd, ErrorReceipt};
use super::errors::ChannelError;
use super::identifiers::Sequence;
use super::value_objects::{Order, Timeout};

/// Invariant: packet sequences only move forward.
pub fn invariant_sequence_monotonic(current: Sequence, next: Sequence) -> Result<(), ChannelError> {
    if next < current {
        return Err(ChannelError::InvalidPacketSequence {
            given: next,
            expected: current,
        });
    }
    Ok(())
}

/// Invariant: a stored error receipt never refers to a future upgrade.
pub fn invariant_receipt_not_ahead(receipt: &ErrorReceipt, upgrade_sequence: u64) -> bool {
    receipt.sequence <= upgrade_sequence
}

/// Invariant: at least one timeout bound is set.
pub fn invariant_timeout_set(timeout: &Timeout) -> Result<(), ChannelError> {
    if !timeout.is_set() {
        return Err(ChannelError::MissingTimeout);
    }
    Ok(())
}

/// Invariant: ordering may only be relaxed by an upgrade.
///
/// UNORDERED channels keep per-sequence receipts, which cannot be folded back
/// into a `nextSequenceRecv` counter, so UNORDERED -> ORDERED is refused.
pub fn invariant_upgrade_ordering(
    current: Order,
    proposed: Order,
    allow_ordered_to_unordered: bool,
) -> Result<(), ChannelError> {
    match (current, proposed) {
        (Order::Unordered, Order::Ordered) => Err(ChannelError::InvalidUpgrade(
            "cannot upgrade an UNORDERED channel to ORDERED".to_string(),
        )),
        (Order::Ordered, Order::Unordered) if !allow_ordered_to_unordered => {
            Err(ChannelError::InvalidUpgrade(
                "ORDERED to UNORDERED upgrades are disabled".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

/// Invariant: an upgrade must change something and keep the counterparty.
pub fn invariant_upgrade_is_change(
    current: &ChannelEnd,
    proposed: &ChannelEnd,
) -> Result<(), ChannelError> {
    if proposed.counterparty != current.counterparty {
        return Err(ChannelError::InvalidUpgrade(
            "proposed counterparty differs from the current one".to_string(),
        ));
    }
    if proposed.ordering == current.ordering
        && proposed.connection_hops == current.connection_hops
        && proposed.version == current.version
    {
        return Err(ChannelError::InvalidUpgrade(
            "proposed channel end is identical to the current one".to_string(),
        ));
    }
    Ok(())
}
