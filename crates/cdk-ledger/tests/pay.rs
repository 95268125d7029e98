//! Paying invoices through the ledger

mod common;

use cdk_ledger::nuts::{CurrencyUnit, MeltQuoteState};
use cdk_ledger::{Amount, Database, Error, RecordUpdate, TokenRecord, WalletId};
use cdk_ledger_fake_mint::{FakeInvoice, FakeMint};
use common::{amounts, mint_url, record_amounts, setup, setup_single};
use futures::stream;

#[tokio::test]
async fn test_pay_replaces_consumed_record() {
    let (test, url, mint) = setup_single().await;
    let funded = test.fund(&url, &mint, &[1, 2, 4, 8]).await;

    let invoice = FakeInvoice::new(5).with_change(vec![1]);
    let result = test
        .ledger
        .pay(test.wallet_id(), &invoice.to_string(), Amount::from(5))
        .await
        .unwrap();

    assert_eq!(result.mint_url, url);
    assert_eq!(result.amount, Amount::from(5));
    assert_eq!(result.change, Amount::from(1));
    assert_eq!(result.fee_paid, Amount::from(1));
    assert!(result.preimage.is_some());
    assert_eq!(result.consumed_token_ids, vec![funded.id.clone()]);

    // The untouched 8 is moved next to the change
    assert_eq!(record_amounts(&test.ledger, test.wallet_id()), vec![vec![8, 1]]);
    assert_eq!(test.balance(), 9);
    assert!(test.ledger.token_record(&funded.id).is_none());

    let replacement_id = result.replacement_token_id.clone().unwrap();
    assert_eq!(test.db.stored_ids(test.wallet_id()).await, vec![replacement_id]);

    for proof in &funded.proofs {
        let spent = mint.is_spent(proof).await;
        assert_eq!(spent, proof.amount != Amount::from(8));
    }

    let payments = test.ledger.payments(test.wallet_id()).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].id, result.payment_id);
    assert_eq!(payments[0].invoice, invoice.to_string());
    assert_eq!(payments[0].consumed_token_ids, vec![funded.id]);
    assert_eq!(payments[0].replacement_token_id, result.replacement_token_id);
}

#[tokio::test]
async fn test_pay_leaves_untouched_records() {
    let (test, url, mint) = setup_single().await;
    let first = test.fund(&url, &mint, &[1, 2]).await;
    let second = test.fund(&url, &mint, &[4]).await;
    let third = test.fund(&url, &mint, &[16]).await;

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(2).to_string(),
            Amount::from(2),
        )
        .await
        .unwrap();

    // 1 and 2 are both spent, nothing is left to replace the record with
    assert_eq!(result.consumed_token_ids, vec![first.id.clone()]);
    assert_eq!(result.replacement_token_id, None);
    assert_eq!(result.fee_paid, Amount::from(1));

    let live: Vec<_> = test
        .ledger
        .token_records(test.wallet_id())
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(live, vec![second.id, third.id]);
    assert_eq!(test.balance(), 20);
}

#[tokio::test]
async fn test_pay_covers_fee_reserve() {
    let url = mint_url("mint");
    let mint = FakeMint::new(Amount::from(1));
    let test = setup(&[(url.clone(), mint.clone())]).await;
    test.fund(&url, &mint, &[4, 2, 1]).await;

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(4).with_change(vec![1]).to_string(),
            Amount::from(4),
        )
        .await
        .unwrap();

    assert_eq!(result.fee_paid, Amount::from(1));
    assert_eq!(record_amounts(&test.ledger, test.wallet_id()), vec![vec![1, 1]]);
    assert_eq!(test.balance(), 2);
}

#[tokio::test]
async fn test_pay_fails_over_to_next_mint() {
    let (url_a, url_b) = (mint_url("a"), mint_url("b"));
    let (mint_a, mint_b) = (FakeMint::default(), FakeMint::default());
    let test = setup(&[(url_a.clone(), mint_a.clone()), (url_b.clone(), mint_b.clone())]).await;
    test.fund(&url_a, &mint_a, &[8]).await;
    test.fund(&url_b, &mint_b, &[8]).await;

    mint_a.set_unreachable(true);

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(5).to_string(),
            Amount::from(5),
        )
        .await
        .unwrap();

    assert_eq!(result.mint_url, url_b);
    assert_eq!(mint_a.melt_calls(), 0);

    let balances = test.ledger.mint_balances(test.wallet_id());
    assert_eq!(balances.get(&url_a), Some(&Amount::from(8)));
    assert_eq!(balances.get(&url_b), None);
}

#[tokio::test]
async fn test_pay_skips_mint_without_enough_proofs() {
    let (url_a, url_b) = (mint_url("a"), mint_url("b"));
    let (mint_a, mint_b) = (FakeMint::default(), FakeMint::default());
    let test = setup(&[(url_a.clone(), mint_a.clone()), (url_b.clone(), mint_b.clone())]).await;
    test.fund(&url_a, &mint_a, &[2]).await;
    test.fund(&url_b, &mint_b, &[8]).await;

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(5).to_string(),
            Amount::from(5),
        )
        .await
        .unwrap();

    assert_eq!(result.mint_url, url_b);
    assert_eq!(mint_a.quote_calls(), 1);
    assert_eq!(mint_a.melt_calls(), 0);
    assert_eq!(test.balance(), 2);
}

#[tokio::test]
async fn test_pay_rejects_quote_for_other_amount() {
    let (test, url, mint) = setup_single().await;
    test.fund(&url, &mint, &[8]).await;

    let invoice = FakeInvoice::new(5).with_quote_amount(6);
    let result = test
        .ledger
        .pay(test.wallet_id(), &invoice.to_string(), Amount::from(5))
        .await;

    match result {
        Err(Error::IncorrectQuoteAmount { requested, quoted }) => {
            assert_eq!(requested, Amount::from(5));
            assert_eq!(quoted, Amount::from(6));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(mint.melt_calls(), 0);
    assert_eq!(test.balance(), 8);
}

#[tokio::test]
async fn test_pay_without_reachable_mint() {
    let (url_a, url_b) = (mint_url("a"), mint_url("b"));
    let (mint_a, mint_b) = (FakeMint::default(), FakeMint::default());
    let test = setup(&[(url_a.clone(), mint_a.clone()), (url_b.clone(), mint_b.clone())]).await;
    test.fund(&url_a, &mint_a, &[8]).await;

    mint_a.set_unreachable(true);
    mint_b.set_unreachable(true);

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(5).to_string(),
            Amount::from(5),
        )
        .await;
    assert!(matches!(result, Err(Error::NoMintAvailable)));

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(5).quote_err().to_string(),
            Amount::from(5),
        )
        .await;
    assert!(matches!(result, Err(Error::NoMintAvailable)));
}

#[tokio::test]
async fn test_pay_wallet_without_mints() {
    let test = setup(&[]).await;

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(5).to_string(),
            Amount::from(5),
        )
        .await;
    assert!(matches!(result, Err(Error::NoMintAvailable)));
}

#[tokio::test]
async fn test_pay_insufficient_proofs_leaves_records() {
    let (test, url, mint) = setup_single().await;
    test.fund(&url, &mint, &[1, 2]).await;
    let before = test.ledger.token_records(test.wallet_id());

    let result = test
        .ledger
        .pay(
            test.wallet_id(),
            &FakeInvoice::new(5).to_string(),
            Amount::from(5),
        )
        .await;

    assert!(matches!(result, Err(Error::InsufficientProofs)));
    assert_eq!(test.ledger.token_records(test.wallet_id()), before);
    assert_eq!(mint.melt_calls(), 0);
    assert_eq!(mint.quote_calls(), 1);
}

#[tokio::test]
async fn test_unpaid_payment_keeps_records() {
    let (test, url, mint) = setup_single().await;
    let funded = test.fund(&url, &mint, &[1, 2, 4, 8]).await;

    let invoice = FakeInvoice::new(5).with_state(MeltQuoteState::Unpaid);
    let result = test
        .ledger
        .pay(test.wallet_id(), &invoice.to_string(), Amount::from(5))
        .await;

    assert!(matches!(result, Err(Error::PaymentFailed)));
    assert_eq!(mint.check_state_calls(), 1);
    assert_eq!(test.ledger.token_record(&funded.id), Some(funded));
    assert_eq!(test.balance(), 15);
    assert!(test.ledger.outstanding(test.wallet_id()).is_empty());
    assert!(test.ledger.payments(test.wallet_id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pay_argument_errors() {
    let (test, url, mint) = setup_single().await;
    test.fund(&url, &mint, &[8]).await;
    let invoice = FakeInvoice::new(5).to_string();

    let result = test.ledger.pay(test.wallet_id(), &invoice, Amount::ZERO).await;
    assert!(matches!(result, Err(Error::AmountZero)));

    let result = test
        .ledger
        .pay(&WalletId::generate(), &invoice, Amount::from(5))
        .await;
    assert!(matches!(result, Err(Error::UnknownWallet(_))));

    assert_eq!(mint.quote_calls(), 0);
}

#[tokio::test]
async fn test_receive_rejects_duplicates() {
    let (test, url, mint) = setup_single().await;
    let proofs = mint.issue(&[1, 2]);

    test.ledger
        .receive(test.wallet_id(), url.clone(), proofs.clone())
        .await
        .unwrap();

    let result = test
        .ledger
        .receive(test.wallet_id(), url.clone(), proofs[1..].to_vec())
        .await;
    assert!(matches!(result, Err(Error::DuplicateProof)));

    let result = test
        .ledger
        .receive(test.wallet_id(), url.clone(), vec![])
        .await;
    assert!(matches!(result, Err(Error::EmptyTokenRecord)));

    assert_eq!(test.balance(), 3);
    assert_eq!(test.db.stored_ids(test.wallet_id()).await.len(), 1);
}

#[tokio::test]
async fn test_receive_adds_new_mint() {
    let (test, _, _) = setup_single().await;
    let other_url = mint_url("other");
    let other = FakeMint::default();

    test.fund(&other_url, &other, &[4]).await;

    let wallet = test.ledger.wallet(test.wallet_id()).unwrap();
    assert!(wallet.mint_urls.contains(&other_url));

    let stored = test.db.get_wallet(test.wallet_id()).await.unwrap().unwrap();
    assert_eq!(stored.mint_urls, wallet.mint_urls);
}

#[tokio::test]
async fn test_load_wallet_restores_records() {
    let (test, url, mint) = setup_single().await;
    let first = test.fund(&url, &mint, &[1, 2]).await;
    let second = test.fund(&url, &mint, &[4]).await;

    // Written by another session for a mint the wallet does not list yet
    let other_url = mint_url("other");
    let foreign = TokenRecord::new(
        test.wallet_id().clone(),
        other_url.clone(),
        FakeMint::default().issue(&[8]),
    );
    test.db.inner.publish_token_record(foreign.clone()).await.unwrap();
    test.db.set_corrupt_records(true);

    let restored = common::builder(&test.db, &[(url.clone(), mint.clone())])
        .build()
        .unwrap();
    let wallet = restored.load_wallet(test.wallet_id()).await.unwrap();

    assert_eq!(wallet.mint_urls, vec![url, other_url]);
    assert_eq!(
        restored.token_records(test.wallet_id()),
        vec![first, second, foreign]
    );
    assert_eq!(restored.balance(test.wallet_id()), Amount::from(15));

    let wallets = restored.load_wallets().await.unwrap();
    assert_eq!(wallets.len(), 1);
    assert_eq!(restored.token_records(test.wallet_id()).len(), 3);
}

#[tokio::test]
async fn test_apply_updates_from_other_session() {
    let (test, url, mint) = setup_single().await;
    let local = test.fund(&url, &mint, &[1]).await;

    let other_url = mint_url("other");
    let remote = TokenRecord::new(
        test.wallet_id().clone(),
        other_url.clone(),
        FakeMint::default().issue(&[2, 4]),
    );

    test.ledger
        .apply_updates(stream::iter(vec![
            RecordUpdate::Published(remote.clone()),
            RecordUpdate::Retired(local.id.clone()),
        ]))
        .await
        .unwrap();

    assert_eq!(test.ledger.token_records(test.wallet_id()), vec![remote]);
    assert_eq!(test.balance(), 6);
    assert!(test
        .ledger
        .wallet(test.wallet_id())
        .unwrap()
        .mint_urls
        .contains(&other_url));

    let stranger = TokenRecord::new(WalletId::generate(), url.clone(), mint.issue(&[1]));
    let result = test
        .ledger
        .apply_update(RecordUpdate::Published(stranger))
        .await;
    assert!(matches!(result, Err(Error::UnknownWallet(_))));

    let empty = TokenRecord::new(test.wallet_id().clone(), url, vec![]);
    let result = test.ledger.apply_update(RecordUpdate::Published(empty)).await;
    assert!(matches!(result, Err(Error::EmptyTokenRecord)));
    assert_eq!(test.balance(), 6);
}

#[tokio::test]
async fn test_wallets_are_isolated() {
    let (test, url, mint) = setup_single().await;
    test.fund(&url, &mint, &[8]).await;

    let other = test
        .ledger
        .create_wallet("other", CurrencyUnit::Sat, vec![url.clone()], vec![])
        .await
        .unwrap();

    let result = test
        .ledger
        .pay(&other.id, &FakeInvoice::new(5).to_string(), Amount::from(5))
        .await;
    assert!(matches!(result, Err(Error::InsufficientProofs)));
    assert_eq!(test.balance(), 8);
    assert_eq!(test.ledger.wallets().len(), 2);
    assert_eq!(amounts(&test.ledger.token_records(test.wallet_id())[0].proofs), vec![8]);
}
