//! Draft → Unsigned → Signed integration tests against an in-memory node.

use alloy::primitives::{address, Bytes, U256};

use coldtx::error::{IntegrityError, StateError, ValidationError};
use coldtx::keys::{KeyError, KeySource, WalletId};
use coldtx::tx::{format_summary, CallSpec, Input, Output, TxIdentifier};
use coldtx::units::{min_replacement_fee, FeeSpec, UnitTable};
use coldtx::{ErrorKind, Payload, TxError, TxStatus};

mod common;
use common::*;

fn transfer_draft(engine: &coldtx::TxEngine<std::sync::Arc<MockRpc>>, fee: FeeSpec) -> coldtx::Transaction {
    engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(10))],
            vec![Output::new(ADDR_1, eth(1))],
            fee,
        )
        .unwrap()
}

#[tokio::test]
async fn test_rate_fee_materializes_exactly() {
    let engine = account_engine();
    engine.rpc().set_nonce(ADDR_0, 7);

    let draft = transfer_draft(&engine, FeeSpec::Rate(gwei(50)));
    assert_eq!(draft.status, TxStatus::Draft);

    let unsigned = engine.materialize(&draft).await.unwrap();
    assert_eq!(unsigned.status, TxStatus::Unsigned);
    // 50 Gwei * 21000 gas = 1,050,000 Gwei
    assert_eq!(unsigned.fee, U256::from(1_050_000_000_000_000u64));
    assert_eq!(unsigned.fee_rate, Some(gwei(50)));

    let Some(Payload::Account(p)) = &unsigned.payload else {
        panic!("expected account payload");
    };
    assert_eq!(p.nonce, 7);
    assert_eq!(p.chain_id, CHAIN_ID);
    assert_eq!(p.gas_limit, 21_000);

    let Some(TxIdentifier::Draft(id)) = &unsigned.identifier else {
        panic!("expected draft identifier");
    };
    assert_eq!(id.len(), 6);

    // the draft itself is untouched
    assert_eq!(draft.status, TxStatus::Draft);
    assert!(draft.payload.is_none());
}

#[tokio::test]
async fn test_fee_spec_parsed_from_user_text() {
    let engine = account_engine();
    let spec = FeeSpec::parse("50G", &UnitTable::ETH).unwrap();
    let unsigned = engine.materialize(&transfer_draft(&engine, spec)).await.unwrap();
    assert_eq!(unsigned.fee, U256::from(1_050_000_000_000_000u64));
}

#[tokio::test]
async fn test_network_fee_applies_adjustment() {
    let adapter = account_adapter();
    let rpc = std::sync::Arc::new(MockRpc::new(adapter.clone()));
    rpc.set_fee_rate(gwei(20));
    let options = options().with_adjustment("1.5".parse().unwrap());
    let engine = coldtx::TxEngine::new(adapter, rpc, options);

    let unsigned = engine.materialize(&transfer_draft(&engine, FeeSpec::Network)).await.unwrap();
    assert_eq!(unsigned.fee_rate, Some(gwei(30)));
    assert_eq!(unsigned.fee, gwei(30) * U256::from(21_000u64));
    assert_eq!(engine.rpc().calls("getFeeRateEstimate"), 1);
}

#[tokio::test]
async fn test_empty_inputs_rejected() {
    let engine = account_engine();
    let err = engine
        .create_draft(vec![], vec![Output::new(ADDR_1, eth(1))], FeeSpec::Network)
        .unwrap_err();
    assert!(matches!(
        err,
        TxError::Validation(ValidationError::InvalidInputCount { expected: 1, actual: 0 })
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_account_rejects_two_outputs() {
    let engine = account_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(10))],
            vec![Output::new(ADDR_1, eth(1)), Output::new(ADDR_2, eth(1))],
            FeeSpec::Rate(gwei(1)),
        )
        .unwrap();
    let err = engine.materialize(&draft).await.unwrap_err();
    assert!(matches!(
        err,
        TxError::Validation(ValidationError::InvalidOutputCount { expected: 1, actual: 2 })
    ));
    assert_eq!(engine.rpc().calls("getNextNonce"), 0);
}

#[tokio::test]
async fn test_fee_above_ceiling_rejected() {
    let engine = account_engine();
    // 100,000 Gwei * 21000 = 2.1 ETH against a 1 ETH ceiling
    let draft = transfer_draft(&engine, FeeSpec::Rate(gwei(100_000)));
    let err = engine.materialize(&draft).await.unwrap_err();
    assert!(matches!(err, TxError::Validation(ValidationError::FeeTooLarge(_))));
    assert!(!err.is_retryable());
    assert_eq!(engine.rpc().calls("getNextNonce"), 0);
}

#[tokio::test]
async fn test_disabled_fee_check_allows_large_fee() {
    let adapter = account_adapter();
    let rpc = std::sync::Arc::new(MockRpc::new(adapter.clone()));
    let engine = coldtx::TxEngine::new(adapter, rpc, options().without_fee_check());
    let draft = transfer_draft(&engine, FeeSpec::Rate(gwei(100_000)));
    let unsigned = engine.materialize(&draft).await.unwrap();
    assert_eq!(unsigned.fee, eth(21) / U256::from(10u64));
}

#[tokio::test]
async fn test_insufficient_funds() {
    let engine = account_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(1))],
            vec![Output::new(ADDR_1, eth(1))],
            FeeSpec::Rate(gwei(1)),
        )
        .unwrap();
    let err = engine.materialize(&draft).await.unwrap_err();
    assert!(matches!(err, TxError::Validation(ValidationError::InsufficientFunds { .. })));
}

#[tokio::test]
async fn test_change_output_sweeps_balance() {
    let engine = account_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(2))],
            vec![Output::change(ADDR_1)],
            FeeSpec::Rate(gwei(50)),
        )
        .unwrap();
    let unsigned = engine.materialize(&draft).await.unwrap();
    assert_eq!(unsigned.outputs[0].amount, eth(2) - U256::from(1_050_000_000_000_000u64));
}

#[tokio::test]
async fn test_chain_mismatch_on_materialize() {
    let engine = account_engine();
    engine.rpc().set_chain_id(1);
    let err = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(1))))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TxError::Integrity(IntegrityError::ChainMismatch { expected: CHAIN_ID, actual: 1 })
    ));
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[tokio::test]
async fn test_network_failure_is_retryable() {
    let engine = account_engine();
    engine.rpc().fail("getNextNonce");
    let err = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(1))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("getNextNonce"));
}

#[tokio::test]
async fn test_sign_with_keylist() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();

    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    assert_eq!(signed.status, TxStatus::Signed);
    let Some(TxIdentifier::Coin(txid)) = &signed.identifier else {
        panic!("expected coin identifier");
    };
    // the identifier is the hash of the exact bytes that will be broadcast
    let recomputed = engine.adapter().compute_txid(signed.signed_bytes().unwrap()).unwrap();
    assert_eq!(txid, &recomputed);
    assert_eq!(txid.len(), 64);
}

#[tokio::test]
async fn test_sign_with_wallet_id() {
    let engine = account_engine();
    let id: WalletId = format!("{}:E:1", SEED_ID).parse().unwrap();
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(10)).with_wallet_id(id)],
            vec![Output::new(ADDR_1, eth(1))],
            FeeSpec::Rate(gwei(50)),
        )
        .unwrap();
    let unsigned = engine.materialize(&draft).await.unwrap();

    let file = kafile(&[(1, ADDR_0, KEY_0)]);
    let signed = engine.sign(&unsigned, &[&file as &dyn KeySource]).unwrap();
    assert_eq!(signed.status, TxStatus::Signed);
}

#[tokio::test]
async fn test_mapping_mismatch_rejects_signing() {
    let engine = account_engine();
    let id: WalletId = format!("{}:E:1", SEED_ID).parse().unwrap();
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(10)).with_wallet_id(id)],
            vec![Output::new(ADDR_1, eth(1))],
            FeeSpec::Rate(gwei(50)),
        )
        .unwrap();
    let unsigned = engine.materialize(&draft).await.unwrap();

    // the file claims index 1 controls ADDR_0, but its key derives ADDR_1
    let file = kafile(&[(1, ADDR_0, KEY_1)]);
    let err = engine.sign(&unsigned, &[&file as &dyn KeySource]).unwrap_err();
    assert!(matches!(
        err,
        TxError::Key(KeyError::Integrity(IntegrityError::MappingIntegrity { .. }))
    ));
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[tokio::test]
async fn test_output_mapping_mismatch_rejects_signing() {
    let engine = account_engine();
    let change_id: WalletId = format!("{}:E:2", SEED_ID).parse().unwrap();
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(10))],
            vec![Output::change(ADDR_2).with_wallet_id(change_id)],
            FeeSpec::Rate(gwei(50)),
        )
        .unwrap();
    let unsigned = engine.materialize(&draft).await.unwrap();

    let keys = keylist(account_adapter(), &[KEY_0]);
    // index 2 really derives ADDR_1, not the ADDR_2 the output claims
    let file = kafile(&[(2, ADDR_1, KEY_1)]);
    let err = engine
        .sign(&unsigned, &[&keys as &dyn KeySource, &file as &dyn KeySource])
        .unwrap_err();
    assert!(matches!(
        err,
        TxError::Key(KeyError::Integrity(IntegrityError::MappingIntegrity { .. }))
    ));
}

#[tokio::test]
async fn test_missing_key() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let keys = keylist(account_adapter(), &[KEY_1]);
    let err = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap_err();
    assert!(matches!(err, TxError::Key(KeyError::Missing(_))));
}

#[tokio::test]
async fn test_sign_rejects_altered_payload() {
    let engine = account_engine();
    let mut unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    if let Some(Payload::Account(p)) = unsigned.payload.as_mut() {
        p.amount = eth(5);
    }
    let keys = keylist(account_adapter(), &[KEY_0]);
    let err = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap_err();
    assert!(matches!(err, TxError::Integrity(IntegrityError::IdentifierMismatch { .. })));
}

#[tokio::test]
async fn test_sign_requires_unsigned() {
    let engine = account_engine();
    let draft = transfer_draft(&engine, FeeSpec::Rate(gwei(50)));
    let keys = keylist(account_adapter(), &[KEY_0]);
    let err = engine.sign(&draft, &[&keys as &dyn KeySource]).unwrap_err();
    assert!(matches!(
        err,
        TxError::State(StateError::InvalidTransition { operation: "sign", .. })
    ));
}

#[tokio::test]
async fn test_reopen_signed_record() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    let json = serde_json::to_string(&signed).unwrap();
    let mut stored: coldtx::Transaction = serde_json::from_str(&json).unwrap();
    // display fields are recomputed, not trusted
    stored.fee = U256::ZERO;
    stored.outputs[0].amount = eth(9);

    let reopened = engine.reopen(stored).unwrap();
    assert_eq!(reopened.fee, signed.fee);
    assert_eq!(reopened.outputs[0].amount, eth(1));
    assert_eq!(reopened.id(), signed.id());
}

#[tokio::test]
async fn test_reopen_detects_tampering() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    let mut wrong_id = signed.clone();
    wrong_id.identifier = Some(TxIdentifier::Coin("00".repeat(32)));
    assert!(matches!(
        engine.reopen(wrong_id).unwrap_err(),
        TxError::Integrity(IntegrityError::IdentifierMismatch { .. })
    ));

    let mut wrong_payload = signed.clone();
    if let Some(Payload::Account(p)) = wrong_payload.payload.as_mut() {
        p.to = Some(address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC"));
    }
    assert!(matches!(
        engine.reopen(wrong_payload).unwrap_err(),
        TxError::Integrity(IntegrityError::PayloadMismatch(_))
    ));

    let mut wrong_sender = signed;
    wrong_sender.inputs[0].address = ADDR_1.to_string();
    assert!(matches!(
        engine.reopen(wrong_sender).unwrap_err(),
        TxError::Integrity(IntegrityError::SignatureSenderMismatch { .. })
    ));
}

/// Rewrite the payload to pay `to` and give it a matching checksum, leaving inputs and outputs alone.
fn redirect_payload(
    engine: &coldtx::TxEngine<std::sync::Arc<MockRpc>>,
    tx: &mut coldtx::Transaction,
    to: &str,
    amount: U256,
) {
    if let Some(Payload::Account(p)) = tx.payload.as_mut() {
        p.to = Some(to.parse().unwrap());
        p.amount = amount;
    }
    let unsigned = engine.adapter().serialize_unsigned(tx.payload().unwrap()).unwrap();
    tx.identifier = Some(TxIdentifier::checksum(&unsigned));
}

#[tokio::test]
async fn test_payload_paying_elsewhere_is_rejected() {
    let engine = account_engine();
    let id: WalletId = format!("{}:E:2", SEED_ID).parse().unwrap();
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(10))],
            vec![Output::new(ADDR_2, eth(1)).with_wallet_id(id)],
            FeeSpec::Rate(gwei(50)),
        )
        .unwrap();
    let mut unsigned = engine.materialize(&draft).await.unwrap();
    redirect_payload(&engine, &mut unsigned, ADDR_1, eth(9));

    // the checksum alone no longer vouches for the record
    assert!(matches!(
        engine.reopen(unsigned.clone()).unwrap_err(),
        TxError::Integrity(IntegrityError::PayloadMismatch(_))
    ));

    let keys = keylist(account_adapter(), &[KEY_0]);
    let file = kafile(&[(2, ADDR_2, KEY_2)]);
    let err = engine
        .sign(&unsigned, &[&keys as &dyn KeySource, &file as &dyn KeySource])
        .unwrap_err();
    assert!(matches!(err, TxError::Integrity(IntegrityError::PayloadMismatch(_))));
    assert_eq!(err.kind(), ErrorKind::Integrity);

    // a viewer shows where the payload actually pays
    let summary = format_summary(&unsigned);
    assert_eq!(summary.outputs[0].address, ADDR_1);
    assert_eq!(summary.outputs[0].amount, "9");
}

#[tokio::test]
async fn test_payload_sender_must_match_input() {
    let engine = account_engine();
    let mut unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    unsigned.inputs[0].address = ADDR_2.to_string();

    let keys = keylist(account_adapter(), &[KEY_0, KEY_2]);
    let err = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap_err();
    assert!(matches!(err, TxError::Integrity(IntegrityError::PayloadMismatch(_))));
}

#[tokio::test]
async fn test_token_record_must_match_call_data() {
    let engine = account_engine();
    let contract = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(1))],
            vec![Output::new(ADDR_1, U256::from(1_500_000u64))],
            FeeSpec::Rate(gwei(10)),
        )
        .unwrap()
        .with_call(CallSpec::Token { contract, decimals: 6 });
    let unsigned = engine.materialize(&draft).await.unwrap();

    let mut other_recipient = unsigned.clone();
    other_recipient.outputs[0].address = ADDR_2.to_string();
    assert!(matches!(
        engine.reopen(other_recipient).unwrap_err(),
        TxError::Integrity(IntegrityError::PayloadMismatch(_))
    ));

    let mut other_contract = unsigned;
    other_contract.call = CallSpec::Token {
        contract: address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
        decimals: 6,
    };
    assert!(matches!(
        engine.reopen(other_contract).unwrap_err(),
        TxError::Integrity(IntegrityError::PayloadMismatch(_))
    ));
}

#[tokio::test]
async fn test_reopen_signed_rederives_output_address() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    let mut stored = signed.clone();
    stored.outputs[0].address = ADDR_2.to_string();
    let reopened = engine.reopen(stored).unwrap();
    assert_eq!(reopened.outputs[0].address, ADDR_1);
    assert_eq!(format_summary(&reopened).outputs[0].address, ADDR_1);
}

#[tokio::test]
async fn test_bump_pins_nonce_and_raises_fee() {
    let engine = account_engine();
    engine.rpc().set_nonce(ADDR_0, 7);
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    // the node has moved on; the replacement must not pick up the new nonce
    engine.rpc().set_nonce(ADDR_0, 8);

    let draft = engine.bump(&signed, None).unwrap();
    assert_eq!(draft.status, TxStatus::Draft);
    let replacement = draft.replaces.as_ref().unwrap();
    assert_eq!(replacement.original, signed.id());
    assert_eq!(replacement.nonce, Some(7));

    let bumped = engine.materialize(&draft).await.unwrap();
    let minimum = min_replacement_fee(signed.fee).unwrap();
    assert!(bumped.fee >= minimum);
    // 1.101 * 1,050,000 Gwei
    assert_eq!(minimum, U256::from(1_156_050_000_000_000u64));
    let Some(Payload::Account(p)) = &bumped.payload else {
        panic!("expected account payload");
    };
    assert_eq!(p.nonce, 7);
    assert_eq!(p.chain_id, CHAIN_ID);

    let resigned = engine.sign(&bumped, &[&keys as &dyn KeySource]).unwrap();
    assert_ne!(resigned.id(), signed.id());
}

#[tokio::test]
async fn test_bump_rejects_low_explicit_fee() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    let err = engine.bump(&signed, Some(FeeSpec::Rate(gwei(51)))).unwrap_err();
    assert!(matches!(err, TxError::Validation(ValidationError::FeeTooSmall { .. })));

    let draft = engine.bump(&signed, Some(FeeSpec::Rate(gwei(60)))).unwrap();
    assert_eq!(draft.fee_spec, FeeSpec::Rate(gwei(60)));
}

#[tokio::test]
async fn test_bump_with_low_network_rate_fails_on_materialize() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    engine.rpc().set_fee_rate(gwei(30));
    let draft = engine.bump(&signed, Some(FeeSpec::Network)).unwrap();
    let err = engine.materialize(&draft).await.unwrap_err();
    assert!(matches!(err, TxError::Validation(ValidationError::FeeTooSmall { .. })));
}

#[tokio::test]
async fn test_bump_state_rules() {
    let engine = account_engine();
    let unsigned = engine
        .materialize(&transfer_draft(&engine, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    assert!(matches!(
        engine.bump(&unsigned, None).unwrap_err(),
        TxError::State(StateError::InvalidTransition { operation: "bump", .. })
    ));

    let keys = keylist(account_adapter(), &[KEY_0]);
    let mut confirmed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();
    confirmed.status = TxStatus::Confirmed;
    assert!(matches!(
        engine.bump(&confirmed, None).unwrap_err(),
        TxError::State(StateError::AlreadyConfirmed(_))
    ));
}

#[tokio::test]
async fn test_token_transfer() {
    let engine = account_engine();
    let contract = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(1))],
            vec![Output::new(ADDR_1, U256::from(1_500_000u64))],
            FeeSpec::Rate(gwei(10)),
        )
        .unwrap()
        .with_call(CallSpec::Token { contract, decimals: 6 });

    let unsigned = engine.materialize(&draft).await.unwrap();
    assert_eq!(unsigned.fee, gwei(10) * U256::from(52_000u64));
    let Some(Payload::Account(p)) = &unsigned.payload else {
        panic!("expected account payload");
    };
    assert_eq!(p.to, Some(contract));
    assert_eq!(p.amount, U256::ZERO);

    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();
    let reopened = engine.reopen(signed).unwrap();
    assert_eq!(reopened.outputs[0].amount, U256::from(1_500_000u64));

    let summary = format_summary(&reopened);
    let token = summary.token.unwrap();
    assert_eq!(token.amount, "1.5");
    assert_eq!(token.recipient, ADDR_1);
    assert_eq!(summary.outputs[0].amount, "0");
    assert_eq!(summary.fee_rate.as_deref(), Some("10 Gwei"));
}

#[tokio::test]
async fn test_contract_creation_exempt_from_fee_ceiling() {
    let adapter = account_adapter();
    let rpc = std::sync::Arc::new(MockRpc::new(adapter.clone()));
    let engine = coldtx::TxEngine::new(adapter, rpc, coldtx::TxOptions::new(gwei(1)));
    engine.rpc().set_nonce(ADDR_0, 3);

    let draft = engine
        .create_draft(
            vec![Input::new(ADDR_0, eth(1))],
            vec![Output::new("", U256::ZERO)],
            FeeSpec::Rate(gwei(2)),
        )
        .unwrap()
        .with_call(CallSpec::Data {
            data: Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]),
        });
    let unsigned = engine.materialize(&draft).await.unwrap();
    assert_eq!(unsigned.fee, gwei(2) * U256::from(500_000u64));

    let keys = keylist(account_adapter(), &[KEY_0]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();
    assert!(signed.created_contract.is_some());
    let summary = format_summary(&signed);
    assert_eq!(summary.outputs[0].address, "(contract creation)");
    assert_eq!(summary.data_bytes, 5);
}

#[tokio::test]
async fn test_utxo_round_trip() {
    let engine = utxo_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(BTC_ADDR, U256::from(100_000u64)).with_spend("aa".repeat(32), 1)],
            vec![Output::new(BTC_DEST, U256::from(60_000u64)), Output::change(BTC_ADDR)],
            FeeSpec::Rate(U256::from(10u64)),
        )
        .unwrap();

    let unsigned = engine.materialize(&draft).await.unwrap();
    // 10 + 148 + 2 * 34 bytes at 10 sat/byte
    assert_eq!(unsigned.fee, U256::from(2_260u64));
    assert_eq!(unsigned.outputs[1].amount, U256::from(37_740u64));
    assert_eq!(engine.rpc().calls("getNextNonce"), 0);

    let keys = keylist(utxo_adapter(), &[BTC_KEY]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();
    assert_eq!(signed.status, TxStatus::Signed);

    let reopened = engine.reopen(signed.clone()).unwrap();
    assert_eq!(reopened.fee, U256::from(2_260u64));
    assert_eq!(reopened.id(), signed.id());

    let summary = format_summary(&reopened);
    assert_eq!(summary.fee, "0.0000226");
    assert_eq!(summary.fee_rate.as_deref(), Some("10 satoshi"));
}

#[tokio::test]
async fn test_utxo_absolute_fee_is_exact() {
    let engine = utxo_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(BTC_ADDR, U256::from(100_000u64)).with_spend("bb".repeat(32), 0)],
            vec![Output::new(BTC_DEST, U256::from(60_000u64)), Output::change(BTC_ADDR)],
            FeeSpec::Absolute(U256::from(2_001u64)),
        )
        .unwrap();
    let unsigned = engine.materialize(&draft).await.unwrap();
    assert_eq!(unsigned.fee, U256::from(2_001u64));
    assert_eq!(unsigned.outputs[1].amount, U256::from(37_999u64));
}

#[tokio::test]
async fn test_utxo_leftover_needs_change_output() {
    let engine = utxo_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(BTC_ADDR, U256::from(100_000u64)).with_spend("aa".repeat(32), 1)],
            vec![Output::new(BTC_DEST, U256::from(60_000u64))],
            FeeSpec::Rate(U256::from(10u64)),
        )
        .unwrap();
    let err = engine.materialize(&draft).await.unwrap_err();
    assert!(matches!(err, TxError::Validation(ValidationError::MissingChangeOutput { .. })));
}

#[tokio::test]
async fn test_utxo_bump_takes_fee_from_change() {
    let engine = utxo_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(BTC_ADDR, U256::from(100_000u64)).with_spend("aa".repeat(32), 1)],
            vec![Output::new(BTC_DEST, U256::from(60_000u64)), Output::change(BTC_ADDR)],
            FeeSpec::Rate(U256::from(10u64)),
        )
        .unwrap();
    let unsigned = engine.materialize(&draft).await.unwrap();
    let keys = keylist(utxo_adapter(), &[BTC_KEY]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    let bumped = engine.materialize(&engine.bump(&signed, None).unwrap()).await.unwrap();
    // ceil(2260 * 1.101) = 2489, rounded up to a whole rate of 12 sat/byte
    assert_eq!(bumped.fee, U256::from(2_712u64));
    assert_eq!(bumped.outputs[0].amount, U256::from(60_000u64));
    assert_eq!(bumped.outputs[1].amount, U256::from(37_288u64));
}

#[tokio::test]
async fn test_utxo_exact_spend_drops_change_and_cannot_bump() {
    let engine = utxo_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(BTC_ADDR, U256::from(100_000u64)).with_spend("aa".repeat(32), 1)],
            vec![Output::new(BTC_DEST, U256::from(97_740u64)), Output::change(BTC_ADDR)],
            FeeSpec::Rate(U256::from(10u64)),
        )
        .unwrap();

    // 2260 sat fee leaves nothing for change
    let unsigned = engine.materialize(&draft).await.unwrap();
    assert_eq!(unsigned.fee, U256::from(2_260u64));
    assert_eq!(unsigned.outputs.len(), 1);
    assert!(!unsigned.outputs[0].is_change);

    let keys = keylist(utxo_adapter(), &[BTC_KEY]);
    let signed = engine.sign(&unsigned, &[&keys as &dyn KeySource]).unwrap();

    // no change output can absorb the higher fee
    let bump = engine.bump(&signed, None).unwrap();
    let err = engine.materialize(&bump).await.unwrap_err();
    assert!(matches!(err, TxError::Validation(ValidationError::InsufficientFunds { .. })));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_utxo_record_must_match_payload() {
    let engine = utxo_engine();
    let draft = engine
        .create_draft(
            vec![Input::new(BTC_ADDR, U256::from(100_000u64)).with_spend("aa".repeat(32), 1)],
            vec![Output::new(BTC_DEST, U256::from(60_000u64)), Output::change(BTC_ADDR)],
            FeeSpec::Rate(U256::from(10u64)),
        )
        .unwrap();
    let unsigned = engine.materialize(&draft).await.unwrap();

    let mut shown_less = unsigned.clone();
    shown_less.outputs[0].amount = U256::from(6_000u64);
    assert!(matches!(
        engine.reopen(shown_less).unwrap_err(),
        TxError::Integrity(IntegrityError::PayloadMismatch(_))
    ));

    let mut hidden_input = unsigned;
    hidden_input.inputs[0].amount = U256::from(90_000u64);
    let keys = keylist(utxo_adapter(), &[BTC_KEY]);
    assert!(matches!(
        engine.sign(&hidden_input, &[&keys as &dyn KeySource]).unwrap_err(),
        TxError::Integrity(IntegrityError::PayloadMismatch(_))
    ));
}

#[tokio::test]
async fn test_wrong_family_rejected() {
    let account = account_engine();
    let utxo = utxo_engine();
    let unsigned = account
        .materialize(&transfer_draft(&account, FeeSpec::Rate(gwei(50))))
        .await
        .unwrap();
    let err = utxo.reopen(unsigned).unwrap_err();
    assert!(matches!(err, TxError::Integrity(IntegrityError::Malformed(_))));
}
