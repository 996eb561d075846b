//! # Channel Upgrade Tests
//!
//! Upgrade handshake between two chains: the happy path, crossing hellos,
//! aborts with error receipts, cancellation and timeout.

mod common;

use common::{fee_version, proof, Pair, Side, PORT};
use qc_15_ibc_channel::application::{encode_record, encode_u64};
use qc_15_ibc_channel::apps::MockModule;
use qc_15_ibc_channel::domain::{
    invariant_receipt_not_ahead, ChannelError, ChannelId, ErrorKind, ErrorReceipt, Height,
    MsgChannelUpgradeAck, MsgChannelUpgradeCancel, MsgChannelUpgradeConfirm,
    MsgChannelUpgradeInit, MsgChannelUpgradeTimeout, Order, Path, PortId, State, Timeout,
    Timestamp,
};
use qc_15_ibc_channel::ports::{ChannelApi, KeyValueStore, UpgradeOutcome};

fn success_version(outcome: UpgradeOutcome) -> String {
    match outcome {
        UpgradeOutcome::Success { version, .. } => version,
        UpgradeOutcome::Aborted(receipt) => panic!("upgrade aborted: {}", receipt.message),
    }
}

fn aborted(outcome: UpgradeOutcome) -> ErrorReceipt {
    match outcome {
        UpgradeOutcome::Aborted(receipt) => receipt,
        UpgradeOutcome::Success { version, .. } => panic!("upgrade succeeded with {}", version),
    }
}

fn cancel(pair: &mut Pair, side: Side, channel: &ChannelId, receipt: ErrorReceipt) {
    let proof_height = pair.commit(common::other(side));
    pair.chain_mut(side)
        .keeper
        .chan_upgrade_cancel(MsgChannelUpgradeCancel {
            port_id: PortId::new(PORT),
            channel_id: channel.clone(),
            error_receipt: receipt,
            proof_error_receipt: proof(),
            proof_height,
        })
        .unwrap();
}

/// Start an upgrade on B and let it expire against A's clock. B ends OPEN
/// with its upgrade sequence one step further.
fn expire_upgrade_on_b(pair: &mut Pair, chan_b: &ChannelId, chan_a: &ChannelId) {
    let timeout = Timeout::at_height(Height::new(0, pair.a.height.revision_height + 2));
    pair.b
        .keeper
        .chan_upgrade_init(MsgChannelUpgradeInit {
            port_id: PortId::new(PORT),
            channel_id: chan_b.clone(),
            ordering: Order::Unordered,
            connection_hops: vec![pair.b.connection_id.clone()],
            version: "mock-v2".into(),
            timeout,
        })
        .unwrap();
    pair.advance_to(Side::A, timeout.height);
    let proof_height = pair.commit(Side::A);
    pair.b
        .keeper
        .chan_upgrade_timeout(MsgChannelUpgradeTimeout {
            port_id: PortId::new(PORT),
            channel_id: chan_b.clone(),
            counterparty_channel: pair.a.channel(chan_a),
            proof_channel: proof(),
            proof_height,
        })
        .unwrap();
    assert_eq!(pair.b.channel(chan_b).state, State::Open);
}

// =============================================================================
// HAPPY PATH
// =============================================================================

#[test]
fn test_upgrade_version_end_to_end() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);

    let seq = pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");
    assert_eq!(seq, 1);
    assert_eq!(pair.a.channel(&chan_a).state, State::InitUpgrade);
    assert!(pair.a.keeper.restore_channel(&pair.a.port, &chan_a).unwrap().is_some());

    let previous = success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());
    assert_eq!(previous, "mock-v1");
    assert_eq!(pair.b.channel(&chan_b).state, State::TryUpgrade);
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 1);

    let version = success_version(pair.upgrade_ack(Side::A, &chan_a, &chan_b).unwrap());
    assert_eq!(version, "mock-v2");
    let end_a = pair.a.channel(&chan_a);
    assert_eq!(end_a.state, State::Open);
    assert_eq!(end_a.version, "mock-v2");

    success_version(pair.upgrade_confirm(Side::B, &chan_b, &chan_a).unwrap());
    let end_b = pair.b.channel(&chan_b);
    assert_eq!(end_b.state, State::Open);
    assert_eq!(end_b.version, "mock-v2");

    // Upgrade bookkeeping is gone on both sides; the sequence stays.
    for (chain, chan) in [(&pair.a, &chan_a), (&pair.b, &chan_b)] {
        assert!(chain.keeper.upgrade(&chain.port, chan).unwrap().is_none());
        assert!(chain.keeper.restore_channel(&chain.port, chan).unwrap().is_none());
        assert!(chain.keeper.upgrade_timeout(&chain.port, chan).unwrap().is_none());
        assert_eq!(chain.upgrade_sequence(chan), 1);
    }
    assert_eq!(pair.a.log.count("OnChanUpgradeOpen"), 1);
    assert_eq!(pair.b.log.count("OnChanUpgradeOpen"), 1);
}

#[test]
fn test_upgrade_ordered_to_unordered() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Ordered);

    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v1");
    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());
    success_version(pair.upgrade_ack(Side::A, &chan_a, &chan_b).unwrap());
    success_version(pair.upgrade_confirm(Side::B, &chan_b, &chan_a).unwrap());

    assert_eq!(pair.a.channel(&chan_a).ordering, Order::Unordered);
    assert_eq!(pair.b.channel(&chan_b).ordering, Order::Unordered);
}

#[test]
fn test_init_rejects_unordered_to_ordered() {
    let mut pair = Pair::new();
    let (chan_a, _) = pair.open_channel(Order::Unordered);
    let err = pair
        .a
        .keeper
        .chan_upgrade_init(MsgChannelUpgradeInit {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            ordering: Order::Ordered,
            connection_hops: vec![pair.a.connection_id.clone()],
            version: "mock-v1".into(),
            timeout: pair.upgrade_timeout(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(pair.a.channel(&chan_a).state, State::Open);
}

#[test]
fn test_init_rejects_noop_upgrade() {
    let mut pair = Pair::new();
    let (chan_a, _) = pair.open_channel(Order::Unordered);
    let err = pair
        .a
        .keeper
        .chan_upgrade_init(MsgChannelUpgradeInit {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            ordering: Order::Unordered,
            connection_hops: vec![pair.a.connection_id.clone()],
            version: "mock-v1".into(),
            timeout: pair.upgrade_timeout(),
        })
        .unwrap_err();
    assert!(matches!(err, ChannelError::InvalidUpgrade(_)));
    assert_eq!(pair.a.upgrade_sequence(&chan_a), 0);
}

// =============================================================================
// CROSSING HELLOS
// =============================================================================

#[test]
fn test_crossing_hellos_then_forged_sequence_restores() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);

    assert_eq!(pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2"), 1);
    assert_eq!(pair.upgrade_init(Side::B, &chan_b, Order::Unordered, "mock-v2"), 1);

    // B sees A's proposal: the proposals merge and both sequences stay at 1.
    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());
    assert_eq!(pair.b.channel(&chan_b).state, State::TryUpgrade);
    assert_eq!(pair.a.upgrade_sequence(&chan_a), 1);
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 1);

    // A second try claiming sequence 2, with a counterparty root that
    // really holds 2, is a sequence mismatch: B restores.
    let mut msg = pair.upgrade_try_msg(Side::B, &chan_b, &chan_a);
    let mut forged = pair.a.keeper.store().clone();
    forged
        .put(
            &Path::UpgradeSequence(PortId::new(PORT), chan_a.clone()).to_key(),
            &encode_u64(2),
        )
        .unwrap();
    let forged_height = pair.a.height;
    pair.b
        .light_client
        .update_client(&pair.b.client_id, forged_height, pair.a.timestamp, forged);
    msg.counterparty_upgrade_sequence = 2;
    msg.proof_height = forged_height;

    let outcome = pair.b.keeper.chan_upgrade_try(msg).unwrap();
    let receipt = match outcome {
        UpgradeOutcome::Aborted(receipt) => receipt,
        other => panic!("expected abort, got {:?}", other),
    };
    assert_eq!(receipt.sequence, 1);
    assert!(invariant_receipt_not_ahead(&receipt, pair.b.upgrade_sequence(&chan_b)));

    let end_b = pair.b.channel(&chan_b);
    assert_eq!(end_b.state, State::Open);
    assert_eq!(end_b.version, "mock-v1");
    assert_eq!(
        pair.b.keeper.error_receipt(&pair.b.port, &chan_b).unwrap(),
        Some(receipt)
    );
    assert!(pair.b.keeper.upgrade(&pair.b.port, &chan_b).unwrap().is_none());
}

#[test]
fn test_crossing_hellos_complete() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);

    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");
    pair.upgrade_init(Side::B, &chan_b, Order::Unordered, "mock-v2");

    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());
    success_version(pair.upgrade_ack(Side::A, &chan_a, &chan_b).unwrap());
    success_version(pair.upgrade_confirm(Side::B, &chan_b, &chan_a).unwrap());

    assert_eq!(pair.a.channel(&chan_a).version, "mock-v2");
    assert_eq!(pair.b.channel(&chan_b).version, "mock-v2");
    assert_eq!(pair.a.upgrade_sequence(&chan_a), 1);
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 1);
}

// =============================================================================
// ABORT, CANCEL, TIMEOUT
// =============================================================================

#[test]
fn test_app_veto_aborts_and_counterparty_cancels() {
    let mut pair = Pair::with_modules(
        MockModule::new("mock-v1,mock-v2"),
        MockModule::new("mock-v1,mock-v2").vetoing_upgrades(),
    );
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);
    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");

    // B never left OPEN: it records the receipt at A's sequence and moves
    // its own sequence past it.
    let outcome = pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap();
    assert!(outcome.is_aborted());
    assert_eq!(pair.b.channel(&chan_b).state, State::Open);
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 2);
    let receipt = pair
        .b
        .keeper
        .error_receipt(&pair.b.port, &chan_b)
        .unwrap()
        .expect("error receipt");
    assert_eq!(receipt.sequence, 1);

    // A proves the receipt and restores.
    let proof_height = pair.commit(Side::B);
    pair.a
        .keeper
        .chan_upgrade_cancel(MsgChannelUpgradeCancel {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            error_receipt: receipt,
            proof_error_receipt: proof(),
            proof_height,
        })
        .unwrap();
    let end_a = pair.a.channel(&chan_a);
    assert_eq!(end_a.state, State::Open);
    assert_eq!(end_a.version, "mock-v1");
    assert_eq!(pair.a.upgrade_sequence(&chan_a), 2);
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 2);

    // The next attempt starts past the cancelled one.
    assert_eq!(pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2"), 3);
}

#[test]
fn test_cancel_with_stale_receipt_rejected() {
    let mut pair = Pair::new();
    let (chan_a, _) = pair.open_channel(Order::Unordered);
    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");

    // B has no receipt at all: the proof fails and A keeps upgrading.
    let proof_height = pair.commit(Side::B);
    let err = pair
        .a
        .keeper
        .chan_upgrade_cancel(MsgChannelUpgradeCancel {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            error_receipt: ErrorReceipt::new(0, "stale"),
            proof_error_receipt: proof(),
            proof_height,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Proof);
    assert_eq!(pair.a.channel(&chan_a).state, State::InitUpgrade);
}

#[test]
fn test_ack_from_open_counterparty_is_not_ready() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);
    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");

    // B is still in INITUPGRADE: it never accepted A's proposal.
    pair.upgrade_init(Side::B, &chan_b, Order::Unordered, "mock-v2");
    let err = pair.upgrade_ack(Side::A, &chan_a, &chan_b).unwrap_err();
    assert!(matches!(err, ChannelError::CounterpartyNotReady(_)));
    assert_eq!(pair.a.channel(&chan_a).state, State::InitUpgrade);
}

#[test]
fn test_upgrade_timeout_restores() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);

    let timeout = Timeout::at_height(pair.b.height.increment().increment());
    pair.a
        .keeper
        .chan_upgrade_init(MsgChannelUpgradeInit {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            ordering: Order::Unordered,
            connection_hops: vec![pair.a.connection_id.clone()],
            version: "mock-v2".into(),
            timeout,
        })
        .unwrap();

    // Not yet elapsed on B's clock.
    let early = pair.commit(Side::B);
    let early_msg = MsgChannelUpgradeTimeout {
        port_id: PortId::new(PORT),
        channel_id: chan_a.clone(),
        counterparty_channel: pair.b.channel(&chan_b),
        proof_channel: proof(),
        proof_height: early,
    };
    assert!(matches!(
        pair.a.keeper.chan_upgrade_timeout(early_msg),
        Err(ChannelError::UpgradeTimeoutNotReached { .. })
    ));

    pair.advance_to(Side::B, timeout.height);
    let proof_height = pair.commit(Side::B);
    pair.a
        .keeper
        .chan_upgrade_timeout(MsgChannelUpgradeTimeout {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            counterparty_channel: pair.b.channel(&chan_b),
            proof_channel: proof(),
            proof_height,
        })
        .unwrap();

    let end_a = pair.a.channel(&chan_a);
    assert_eq!(end_a.state, State::Open);
    assert_eq!(end_a.version, "mock-v1");
    let receipt = pair
        .a
        .keeper
        .error_receipt(&pair.a.port, &chan_a)
        .unwrap()
        .expect("error receipt");
    assert_eq!(receipt.sequence, 1);

    assert_eq!(pair.b.channel(&chan_b).state, State::Open);
    assert_eq!(pair.a.log.count("OnChanUpgradeOpen"), 0);
}

#[test]
fn test_try_after_counterparty_timeout_aborts() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);

    let timeout = Timeout::at_timestamp(Timestamp::from_nanos(
        pair.b.timestamp.nanos() + 2 * common::BLOCK_TIME_NANOS,
    ));
    pair.a
        .keeper
        .chan_upgrade_init(MsgChannelUpgradeInit {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            ordering: Order::Unordered,
            connection_hops: vec![pair.a.connection_id.clone()],
            version: "mock-v2".into(),
            timeout,
        })
        .unwrap();
    pair.advance_to(Side::B, Height::new(0, pair.b.height.revision_height + 3));

    let outcome = pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap();
    assert!(outcome.is_aborted());
    assert_eq!(pair.b.channel(&chan_b).state, State::Open);
}

#[test]
fn test_timeout_with_both_bounds_height_elapsed() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);

    let far = Timestamp::from_nanos(pair.b.timestamp.nanos() + 1_000 * common::BLOCK_TIME_NANOS);
    let timeout = Timeout::new(pair.b.height.increment().increment(), far);
    pair.a
        .keeper
        .chan_upgrade_init(MsgChannelUpgradeInit {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            ordering: Order::Unordered,
            connection_hops: vec![pair.a.connection_id.clone()],
            version: "mock-v2".into(),
            timeout,
        })
        .unwrap();

    pair.advance_to(Side::B, timeout.height);
    let proof_height = pair.commit(Side::B);
    assert!(pair.b.timestamp < far);
    pair.a
        .keeper
        .chan_upgrade_timeout(MsgChannelUpgradeTimeout {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            counterparty_channel: pair.b.channel(&chan_b),
            proof_channel: proof(),
            proof_height,
        })
        .unwrap();
    assert_eq!(pair.a.channel(&chan_a).state, State::Open);
    assert_eq!(pair.a.channel(&chan_a).version, "mock-v1");
}

#[test]
fn test_timeout_with_both_bounds_timestamp_elapsed() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);

    let far = Height::new(0, pair.b.height.revision_height + 1_000);
    let deadline = Timestamp::from_nanos(pair.b.timestamp.nanos() + 2 * common::BLOCK_TIME_NANOS);
    let timeout = Timeout::new(far, deadline);
    pair.a
        .keeper
        .chan_upgrade_init(MsgChannelUpgradeInit {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            ordering: Order::Unordered,
            connection_hops: vec![pair.a.connection_id.clone()],
            version: "mock-v2".into(),
            timeout,
        })
        .unwrap();

    // One block in, neither bound has passed.
    let early = pair.commit(Side::B);
    let early_msg = MsgChannelUpgradeTimeout {
        port_id: PortId::new(PORT),
        channel_id: chan_a.clone(),
        counterparty_channel: pair.b.channel(&chan_b),
        proof_channel: proof(),
        proof_height: early,
    };
    assert!(matches!(
        pair.a.keeper.chan_upgrade_timeout(early_msg),
        Err(ChannelError::UpgradeTimeoutNotReached { .. })
    ));

    pair.commit(Side::B);
    let proof_height = pair.commit(Side::B);
    assert!(proof_height < far);
    pair.a
        .keeper
        .chan_upgrade_timeout(MsgChannelUpgradeTimeout {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            counterparty_channel: pair.b.channel(&chan_b),
            proof_channel: proof(),
            proof_height,
        })
        .unwrap();
    assert_eq!(pair.a.channel(&chan_a).state, State::Open);
}

#[test]
fn test_ack_aborts_on_ordering_mismatch() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);
    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");
    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());

    // A's client sees a B root whose accepted proposal is ORDERED.
    let mut cp_upgrade = pair
        .b
        .keeper
        .upgrade(&pair.b.port, &chan_b)
        .unwrap()
        .expect("counterparty upgrade");
    cp_upgrade.proposed.ordering = Order::Ordered;
    let mut forged = pair.b.keeper.store().clone();
    forged
        .put(
            &Path::Upgrades(PortId::new(PORT), chan_b.clone()).to_key(),
            &encode_record(&cp_upgrade).unwrap(),
        )
        .unwrap();
    let forged_height = pair.b.height;
    pair.a
        .light_client
        .update_client(&pair.a.client_id, forged_height, pair.b.timestamp, forged);

    let outcome = pair
        .a
        .keeper
        .chan_upgrade_ack(MsgChannelUpgradeAck {
            port_id: PortId::new(PORT),
            channel_id: chan_a.clone(),
            counterparty_channel: pair.b.channel(&chan_b),
            counterparty_upgrade: cp_upgrade,
            counterparty_upgrade_sequence: pair.b.upgrade_sequence(&chan_b),
            proof_channel: proof(),
            proof_upgrade: proof(),
            proof_upgrade_sequence: proof(),
            proof_height: forged_height,
        })
        .unwrap();
    let receipt = aborted(outcome);
    assert_eq!(receipt.sequence, 1);

    let end_a = pair.a.channel(&chan_a);
    assert_eq!(end_a.state, State::Open);
    assert_eq!(end_a.ordering, Order::Unordered);
    assert_eq!(end_a.version, "mock-v1");
    assert!(pair.a.keeper.upgrade(&pair.a.port, &chan_a).unwrap().is_none());
    assert_eq!(pair.a.log.count("OnChanUpgradeAck"), 0);
}

#[test]
fn test_ack_veto_aborts_and_counterparty_cancels() {
    let mut pair = Pair::with_modules(
        MockModule::new("mock-v1,mock-v2").vetoing_upgrades(),
        MockModule::new("mock-v1,mock-v2"),
    );
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);
    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");
    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());

    let receipt = aborted(pair.upgrade_ack(Side::A, &chan_a, &chan_b).unwrap());
    assert_eq!(receipt.sequence, 1);
    assert_eq!(pair.a.channel(&chan_a).state, State::Open);
    assert_eq!(pair.a.channel(&chan_a).version, "mock-v1");
    assert_eq!(pair.a.log.count("OnChanUpgradeOpen"), 0);

    // B is stuck in TRYUPGRADE until it proves A's receipt.
    assert_eq!(pair.b.channel(&chan_b).state, State::TryUpgrade);
    cancel(&mut pair, Side::B, &chan_b, receipt);
    let end_b = pair.b.channel(&chan_b);
    assert_eq!(end_b.state, State::Open);
    assert_eq!(end_b.version, "mock-v1");
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 2);
}

#[test]
fn test_confirm_against_stale_open_end_rejected() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);
    let stale = pair.commit(Side::A);
    let pre_init = pair.a.channel(&chan_a);

    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2");
    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());

    // A's end from before the upgrade is provable at the stale height, but it
    // says nothing about the upgrade: B keeps waiting.
    let err = pair
        .b
        .keeper
        .chan_upgrade_confirm(MsgChannelUpgradeConfirm {
            port_id: PortId::new(PORT),
            channel_id: chan_b.clone(),
            counterparty_channel: pre_init,
            proof_channel: proof(),
            proof_height: stale,
        })
        .unwrap_err();
    assert!(matches!(err, ChannelError::IncompatibleUpgrade(_)));
    assert_eq!(pair.b.channel(&chan_b).state, State::TryUpgrade);
    assert!(pair.b.keeper.error_receipt(&pair.b.port, &chan_b).unwrap().is_none());

    // The honest path still completes on both ends.
    success_version(pair.upgrade_ack(Side::A, &chan_a, &chan_b).unwrap());
    success_version(pair.upgrade_confirm(Side::B, &chan_b, &chan_a).unwrap());
    assert_eq!(pair.a.channel(&chan_a).version, "mock-v2");
    assert_eq!(pair.b.channel(&chan_b).version, "mock-v2");
}

#[test]
fn test_try_from_open_with_sequence_ahead_writes_receipt() {
    let mut pair = Pair::new();
    let (chan_a, chan_b) = pair.open_channel(Order::Unordered);
    expire_upgrade_on_b(&mut pair, &chan_b, &chan_a);
    expire_upgrade_on_b(&mut pair, &chan_b, &chan_a);
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 2);

    assert_eq!(pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2"), 1);
    let receipt = aborted(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());
    assert_eq!(receipt.sequence, 2);
    assert_eq!(pair.b.channel(&chan_b).state, State::Open);
    assert_eq!(pair.b.upgrade_sequence(&chan_b), 3);
    assert!(pair.b.keeper.upgrade(&pair.b.port, &chan_b).unwrap().is_none());

    // A catches up past the receipt; both ends agree on the next sequence.
    cancel(&mut pair, Side::A, &chan_a, receipt);
    assert_eq!(pair.a.channel(&chan_a).state, State::Open);
    assert_eq!(pair.a.upgrade_sequence(&chan_a), 3);
    assert_eq!(pair.upgrade_init(Side::A, &chan_a, Order::Unordered, "mock-v2"), 4);
    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());
}

#[test]
fn test_fee_crossing_hellos_intersect_app_versions() {
    let (mut pair, fees_a, fees_b) = Pair::with_fee(
        MockModule::new("mock-v1,mock-v2"),
        MockModule::new("mock-v1,mock-v2"),
    );
    let (chan_a, chan_b) = pair.open_fee_channel(Order::Unordered);
    assert!(fees_a.is_fee_enabled(&pair.a.port, &chan_a));

    pair.upgrade_init(Side::A, &chan_a, Order::Unordered, &fee_version("mock-v2"));
    pair.upgrade_init(Side::B, &chan_b, Order::Unordered, &fee_version("mock-v2,mock-v1"));

    success_version(pair.upgrade_try(Side::B, &chan_b, &chan_a).unwrap());
    let accepted = pair
        .b
        .keeper
        .upgrade(&pair.b.port, &chan_b)
        .unwrap()
        .expect("upgrade");
    assert_eq!(accepted.proposed.version, fee_version("mock-v2"));
    success_version(pair.upgrade_ack(Side::A, &chan_a, &chan_b).unwrap());
    success_version(pair.upgrade_confirm(Side::B, &chan_b, &chan_a).unwrap());

    assert_eq!(pair.a.channel(&chan_a).version, fee_version("mock-v2"));
    assert_eq!(pair.b.channel(&chan_b).version, fee_version("mock-v2"));
    assert!(fees_a.is_fee_enabled(&pair.a.port, &chan_a));
    assert!(fees_b.is_fee_enabled(&pair.b.port, &chan_b));
}
