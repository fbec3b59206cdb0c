//! End-to-end settlement runs against the in-process chain.

use alloy::primitives::{TxHash, U256};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

use stake_settlement::config::ApprovalMode;
use stake_settlement::error::{ErrorKind, SettlementError};
use stake_settlement::settlement::{
    FileSettlementStore, SettlementRequest, SettlementStatus, SettlementStore, Stage,
};

mod common;
use common::{expected_tokens, harness, harness_with, test_settlement_config, Op, STAKING};

#[tokio::test]
async fn test_happy_path_swaps_approves_and_stakes() {
    let h = harness();
    let wallet = h.funded_wallet("alice@example.com", "0.05");
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.02")).await.unwrap();
    assert_eq!(request.stage, Stage::Pending);

    let done = h.pipeline.run(request.id).await.unwrap();

    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(done.status(), SettlementStatus::Completed);
    assert!(done.failure.is_none());
    assert!(done.swap_tx.is_some() && done.approve_tx.is_some() && done.stake_tx.is_some());
    assert!(done.pending_tx.is_none());
    assert_eq!(done.token_amount, Some(expected_tokens("0.02")));
    assert_eq!(
        done.stage_sequence(),
        vec![
            Stage::Pending,
            Stage::Swapping,
            Stage::Swapped,
            Stage::Approving,
            Stage::Approved,
            Stage::Staking,
            Stage::Completed,
        ]
    );

    assert_eq!(h.chain.staked(wallet.address), expected_tokens("0.02"));
    assert_eq!(h.chain.token_balance(wallet.address), U256::ZERO);
    // Exact approval is fully consumed by the stake.
    assert_eq!(h.chain.allowance(wallet.address), U256::ZERO);

    assert!(done.ledger_recorded);
    let totals = h.ledger.totals(7).unwrap();
    assert_eq!(totals.raised_usd, Decimal::from(25));
    assert_eq!(totals.donors, 1);

    let stored = h.store.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Completed);
    assert_eq!(stored.stake_tx, done.stake_tx);
}

#[tokio::test]
async fn test_insufficient_native_balance_fails_before_submitting() {
    let h = harness();
    let wallet = h.funded_wallet("bob@example.com", "0.01");
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.02")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();

    assert_eq!(failed.stage, Stage::Failed);
    assert_eq!(failed.failed_stage, Some(Stage::Swapping));
    let failure = failed.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::InsufficientBalance);
    assert!(failure.tx_hash.is_none());
    assert!(h.chain.sent().is_empty());
    assert!(h.ledger.totals(7).is_none());
}

#[tokio::test]
async fn test_swap_revert_records_transaction() {
    let h = harness();
    let wallet = h.funded_wallet("carol@example.com", "1");
    h.chain.revert_on(Some(Op::Swap));
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();

    assert_eq!(failed.stage, Stage::Failed);
    assert_eq!(failed.failed_stage, Some(Stage::Swapping));
    let failure = failed.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::TransactionReverted);
    assert_eq!(failure.tx_hash, Some(h.chain.sent()[0].hash));
    assert!(failed.swap_tx.is_none());
    assert!(failed.pending_tx.is_none());
    assert_eq!(h.chain.token_balance(wallet.address), U256::ZERO);
}

#[tokio::test]
async fn test_gas_ceiling_fails_without_broadcast() {
    let h = harness();
    let wallet = h.funded_wallet("dave@example.com", "1");
    h.chain.set_gas_price(10_000 * 1_000_000_000);
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();

    assert_eq!(failed.failure.unwrap().kind, ErrorKind::GasPriceTooHigh);
    assert!(h.chain.sent().is_empty());
}

#[tokio::test]
async fn test_received_amount_is_measured_not_quoted() {
    let h = harness();
    let wallet = h.funded_wallet("erin@example.com", "1");
    // 0.5% short of the quote, inside the 1% slippage allowance.
    h.chain.deliver_bps(9_950);
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let done = h.pipeline.run(request.id).await.unwrap();

    assert_eq!(done.stage, Stage::Completed);
    let delivered = expected_tokens("0.1") * U256::from(9_950u64) / U256::from(10_000u64);
    assert_eq!(done.token_amount, Some(delivered));
    assert_eq!(done.quote.unwrap().token_out, expected_tokens("0.1"));
    assert_eq!(h.chain.staked(wallet.address), delivered);
}

#[tokio::test]
async fn test_output_below_slippage_floor_fails_swap() {
    let h = harness();
    let wallet = h.funded_wallet("frank@example.com", "1");
    h.chain.deliver_bps(9_000);
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();

    assert_eq!(failed.failed_stage, Some(Stage::Swapping));
    // The router enforces amountOutMin, so the swap itself reverts.
    assert_eq!(failed.failure.unwrap().kind, ErrorKind::TransactionReverted);
    assert_eq!(h.chain.native_balance(wallet.address), alloy::primitives::utils::parse_ether("1").unwrap());
}

#[tokio::test]
async fn test_resume_after_approve_failure_does_not_swap_again() {
    let h = harness();
    let wallet = h.funded_wallet("grace@example.com", "1");
    h.chain.revert_on(Some(Op::Approve));
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();
    assert_eq!(failed.stage, Stage::Failed);
    assert_eq!(failed.failed_stage, Some(Stage::Approving));
    assert!(failed.swap_tx.is_some());
    assert_eq!(failed.token_amount, Some(expected_tokens("0.1")));
    assert_eq!(failed.status(), SettlementStatus::Failed);

    h.chain.revert_on(None);
    let done = h.pipeline.resume(request.id).await.unwrap();

    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(done.swap_tx, failed.swap_tx);
    assert!(done.failure.is_none());
    assert_eq!(h.chain.sent_ops(Op::Swap), 1);
    assert_eq!(h.chain.sent_ops(Op::Approve), 2);
    assert_eq!(h.chain.staked(wallet.address), expected_tokens("0.1"));
}

#[tokio::test]
async fn test_resume_after_stake_failure_keeps_earlier_stages() {
    let h = harness();
    let wallet = h.funded_wallet("heidi@example.com", "1");
    h.chain.revert_on(Some(Op::Stake));
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();
    assert_eq!(failed.failed_stage, Some(Stage::Staking));
    assert!(failed.approve_tx.is_some());
    // Swapped tokens stay in the custodial wallet.
    assert_eq!(h.chain.token_balance(wallet.address), expected_tokens("0.1"));

    h.chain.revert_on(None);
    let done = h.pipeline.resume(request.id).await.unwrap();

    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(done.approve_tx, failed.approve_tx);
    assert_eq!(h.chain.sent_ops(Op::Swap), 1);
    assert_eq!(h.chain.sent_ops(Op::Approve), 1);
    assert_eq!(h.chain.sent_ops(Op::Stake), 2);
}

#[tokio::test]
async fn test_confirmation_timeout_is_reconciled_on_resume() {
    let h = harness();
    let wallet = h.funded_wallet("ivan@example.com", "1");
    h.chain.hold_receipts(true);
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();
    assert_eq!(failed.failed_stage, Some(Stage::Swapping));
    let failure = failed.failure.clone().unwrap();
    assert_eq!(failure.kind, ErrorKind::ConfirmationTimeout);
    let swap_hash = h.chain.sent()[0].hash;
    assert_eq!(failure.tx_hash, Some(swap_hash));
    assert_eq!(failed.pending_tx, Some(swap_hash));

    // The swap confirms late.
    h.chain.hold_receipts(false);
    h.chain.release_receipts();
    let done = h.pipeline.resume(request.id).await.unwrap();

    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(done.swap_tx, Some(swap_hash));
    assert_eq!(done.token_amount, Some(expected_tokens("0.1")));
    assert_eq!(h.chain.sent_ops(Op::Swap), 1);
}

#[tokio::test]
async fn test_completed_settlement_is_not_resumable() {
    let h = harness();
    let wallet = h.funded_wallet("judy@example.com", "1");
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();
    h.pipeline.run(request.id).await.unwrap();

    let err = h.pipeline.resume(request.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotResumable { .. }));
    assert_eq!(h.ledger.totals(7).unwrap().donors, 1);
}

#[tokio::test]
async fn test_duplicate_payment_is_settled_once() {
    let mut h = harness();
    let wallet = h.funded_wallet("mallory@example.com", "1");
    let input = h.new_settlement(&wallet, "0.1");

    let first = h.pipeline.start(input.clone()).await.unwrap();
    let second = h.pipeline.start(input).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.queued.recv().await, Some(first.id));
    assert!(h.queued.try_recv().is_err());
    assert_eq!(h.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_request() {
    let h = harness();
    let id = uuid::Uuid::new_v4();
    assert!(matches!(
        h.pipeline.run(id).await,
        Err(SettlementError::RequestNotFound(missing)) if missing == id
    ));
}

#[tokio::test]
async fn test_recovery_requeues_checkpoints_and_flags_in_flight() {
    let mut h = harness();
    let wallet = h.funded_wallet("niaj@example.com", "1");

    let pending = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();
    let in_flight = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();
    while h.queued.try_recv().is_ok() {}

    let mut stalled = h.store.get(in_flight.id).await.unwrap().unwrap();
    stalled.advance(Stage::Swapping).unwrap();
    stalled.pending_tx = Some(TxHash::repeat_byte(0x42));
    h.store.save(&stalled).await.unwrap();

    let report = h.pipeline.recover().await.unwrap();

    assert_eq!(report.requeued, 1);
    assert_eq!(report.interrupted, 1);
    assert_eq!(h.queued.try_recv().ok(), Some(pending.id));

    let flagged = h.pipeline.get(in_flight.id).await.unwrap();
    assert_eq!(flagged.stage, Stage::Failed);
    assert_eq!(flagged.failed_stage, Some(Stage::Swapping));
    let failure = flagged.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::Interrupted);
    assert_eq!(failure.tx_hash, Some(TxHash::repeat_byte(0x42)));
    assert!(h.chain.sent().is_empty());
}

#[tokio::test]
async fn test_settlements_survive_restart() {
    let path = std::env::temp_dir().join(format!("settlements-{}.json", uuid::Uuid::new_v4()));
    let store = Arc::new(FileSettlementStore::load_from_file(&path).unwrap());
    let h = harness_with(test_settlement_config(), store);
    let wallet = h.funded_wallet("olivia@example.com", "1");
    h.chain.revert_on(Some(Op::Stake));
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();
    h.pipeline.run(request.id).await.unwrap();

    let reloaded = FileSettlementStore::load_from_file(&path).unwrap();
    let stored = reloaded.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Failed);
    assert_eq!(stored.failed_stage, Some(Stage::Staking));
    assert_eq!(stored.staking_contract, STAKING);
    assert!(stored.swap_tx.is_some());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_ledger_outage_is_retried_without_touching_the_chain() {
    let h = harness();
    let wallet = h.funded_wallet("peggy@example.com", "1");
    h.ledger_switch.set_down(true);
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let done = h.pipeline.run(request.id).await.unwrap();
    assert_eq!(done.stage, Stage::Completed);
    assert!(done.failure.is_none());
    assert!(!done.ledger_recorded);
    assert!(h.ledger.totals(7).is_none());
    assert_eq!(h.pipeline.summary().await.unwrap().ledger_pending, 1);

    let report = h.pipeline.recover().await.unwrap();
    assert_eq!(report.ledger_pending, 1);
    assert_eq!(report.requeued, 0);
    assert_eq!(report.interrupted, 0);

    let sent = h.chain.sent().len();
    assert_eq!(sent, 3);

    // Still down: the attempt is recorded as outstanding again.
    let retried = h.pipeline.resume(request.id).await.unwrap();
    assert!(!retried.ledger_recorded);

    h.ledger_switch.set_down(false);
    let recorded = h.pipeline.resume(request.id).await.unwrap();
    assert!(recorded.ledger_recorded);
    assert_eq!(recorded.stake_tx, done.stake_tx);
    let totals = h.ledger.totals(7).unwrap();
    assert_eq!(totals.donors, 1);
    assert_eq!(totals.raised_usd, Decimal::from(25));

    assert!(matches!(
        h.pipeline.resume(request.id).await,
        Err(SettlementError::NotResumable { .. })
    ));
    assert_eq!(h.ledger.totals(7).unwrap().donors, 1);
    assert_eq!(h.chain.sent().len(), sent);
    assert_eq!(h.pipeline.summary().await.unwrap().ledger_pending, 0);
}

#[tokio::test]
async fn test_unlimited_approval_serves_later_settlements() {
    let mut config = test_settlement_config();
    config.approval = ApprovalMode::Unlimited;
    let h = harness_with(config, Arc::new(FileSettlementStore::in_memory()));
    let wallet = h.funded_wallet("rupert@example.com", "1");

    let first = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();
    let done = h.pipeline.run(first.id).await.unwrap();
    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(h.chain.allowance(wallet.address), U256::MAX - expected_tokens("0.1"));

    let second = h.pipeline.start(h.new_settlement(&wallet, "0.2")).await.unwrap();
    let done = h.pipeline.run(second.id).await.unwrap();
    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(h.chain.staked(wallet.address), expected_tokens("0.3"));
    // Each settlement re-grants the maximum before staking.
    assert_eq!(h.chain.allowance(wallet.address), U256::MAX - expected_tokens("0.2"));
    assert_eq!(h.chain.sent_ops(Op::Approve), 2);
}

#[tokio::test]
async fn test_transaction_hash_is_saved_before_broadcast() {
    let path = std::env::temp_dir().join(format!("settlements-{}.json", uuid::Uuid::new_v4()));
    let store = Arc::new(FileSettlementStore::load_from_file(&path).unwrap());
    let h = harness_with(test_settlement_config(), store);
    let wallet = h.funded_wallet("sybil@example.com", "1");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = seen.clone();
    let file = path.clone();
    h.chain.on_send(move |hash| {
        let saved: Vec<SettlementRequest> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        observed
            .lock()
            .unwrap()
            .push(saved.iter().any(|r| r.pending_tx == Some(hash)));
    });

    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();
    let done = h.pipeline.run(request.id).await.unwrap();

    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(*seen.lock().unwrap(), vec![true, true, true]);
    assert!(done.pending_tx.is_none() && done.pending_nonce.is_none());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_rejected_broadcast_leaves_nothing_to_reconcile() {
    let h = harness();
    let wallet = h.funded_wallet("trent@example.com", "1");
    h.chain.reject_sends(true);
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();

    let failed = h.pipeline.run(request.id).await.unwrap();
    assert_eq!(failed.failed_stage, Some(Stage::Swapping));
    let failure = failed.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::ChainUnavailable);
    assert!(failure.tx_hash.is_none());
    assert!(failed.pending_tx.is_none());
    assert!(h.chain.sent().is_empty());

    h.chain.reject_sends(false);
    let done = h.pipeline.resume(request.id).await.unwrap();
    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(h.chain.sent_ops(Op::Swap), 1);
}

#[tokio::test]
async fn test_interruption_before_broadcast_is_resubmitted() {
    let mut h = harness();
    let wallet = h.funded_wallet("victor@example.com", "1");
    let request = h.pipeline.start(h.new_settlement(&wallet, "0.1")).await.unwrap();
    while h.queued.try_recv().is_ok() {}

    // Hash saved, process stopped before the node saw the transaction.
    let mut stalled = h.store.get(request.id).await.unwrap().unwrap();
    stalled.advance(Stage::Swapping).unwrap();
    stalled.pending_tx = Some(TxHash::repeat_byte(0x42));
    stalled.pending_nonce = Some(0);
    h.store.save(&stalled).await.unwrap();

    let report = h.pipeline.recover().await.unwrap();
    assert_eq!(report.interrupted, 1);

    let done = h.pipeline.resume(request.id).await.unwrap();
    assert_eq!(done.stage, Stage::Completed);
    assert!(done.failure.is_none());
    assert_eq!(h.chain.sent_ops(Op::Swap), 1);
    assert_ne!(done.swap_tx, Some(TxHash::repeat_byte(0x42)));
    assert_eq!(h.chain.staked(wallet.address), expected_tokens("0.1"));
}
