//! Airdrop rounds and claim reconciliation integration tests

mod common;

use anyhow::Result;
use chrono::Utc;
use common::{account, followers, Harness};
use launchpad_keeper::airdrop::{verify_proof, SkipReason};
use launchpad_keeper::webhook::{Claimed, RewardOpened};
use launchpad_keeper::testing::FakeGateway;
use launchpad_keeper::{JobOutcome, KeeperConfig, ReconcileOutcome, RoundOutcome, WebhookEvent};
use launchpad_types::*;

fn opened(token: Address, max_amount: u64, index: u64) -> WebhookEvent {
    WebhookEvent::RewardOpened(RewardOpened {
        token,
        max_amount: U256::from(max_amount),
        index,
    })
}

fn claimed(user: Address, amount: u64, index: u64, tx: u8, token: Option<Address>) -> WebhookEvent {
    WebhookEvent::Claimed(Claimed {
        user_address: user,
        amount: U256::from(amount),
        index,
        transaction_hash: B256::repeat_byte(tx),
        token,
    })
}

/// A deployed token whose creator has four followers
async fn token_with_followers(harness: &Harness) -> Address {
    let token = harness.deployed_sale(1, Utc::now()).await;
    harness.social.set_followers(account(1), followers(4));
    token
}

#[tokio::test]
async fn test_round_splits_amount_and_submits_root() -> Result<()> {
    let harness = Harness::new();
    let token = token_with_followers(&harness).await;
    let reconciler = harness.keeper.reconciler();

    let outcome = reconciler.handle(opened(token, 1000, 1), Utc::now()).await?;
    let root = match outcome {
        ReconcileOutcome::RoundOpened(RoundOutcome::Submitted { root, recipients, .. }) => {
            assert_eq!(recipients, 4);
            root
        }
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(harness.gateway.root_of(&token, 1), Some(root));

    let round = harness.store.get_round(&token, 1).await?.unwrap();
    assert!(round.processed);
    assert_eq!(round.round_type, RoundType::Initial);
    assert_eq!(round.merkle_root, Some(root));

    let allocations = harness.store.allocations_for_round(&token, 1).await?;
    assert_eq!(allocations.len(), 4);
    for allocation in &allocations {
        assert_eq!(allocation.amount, U256::from(250));
        assert_eq!(allocation.proof.len(), 2);
        assert!(!allocation.claimed);
        assert!(verify_proof(&allocation.leaf, &allocation.proof, &root));
    }
    Ok(())
}

#[tokio::test]
async fn test_duplicate_notification_is_ignored() -> Result<()> {
    let harness = Harness::new();
    let token = token_with_followers(&harness).await;
    let reconciler = harness.keeper.reconciler();

    reconciler.handle(opened(token, 1000, 1), Utc::now()).await?;
    let outcome = reconciler.handle(opened(token, 1000, 1), Utc::now()).await?;
    assert_eq!(outcome, ReconcileOutcome::DuplicateRound);
    assert_eq!(harness.gateway.root_calls(), 1);

    // Later rounds of the same token are engagement rounds
    reconciler.handle(opened(token, 400, 2), Utc::now()).await?;
    let round = harness.store.get_round(&token, 2).await?.unwrap();
    assert_eq!(round.round_type, RoundType::Engagement);
    assert_eq!(harness.store.count_rounds(&token).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_round_opened_before_deployment_is_distributed_by_sweep() -> Result<()> {
    let harness = Harness::new();
    let now = Utc::now();
    harness.ended_sale(1, now).await;
    harness.social.set_followers(account(1), followers(4));
    let token = FakeGateway::token_for(1);

    // The notification overtakes the deployment bookkeeping
    let outcome = harness.keeper.reconciler().handle(opened(token, 1000, 0), now).await?;
    assert_eq!(
        outcome,
        ReconcileOutcome::RoundOpened(RoundOutcome::Skipped(SkipReason::TokenNotDeployed))
    );
    let round = harness.store.get_round(&token, 0).await?.unwrap();
    assert_eq!(round.round_type, RoundType::Initial);
    assert!(!round.processed);
    assert_eq!(harness.gateway.root_calls(), 0);

    let report = harness.keeper.engine().process_pending_rounds(now).await?;
    assert_eq!(report.skipped, 1);

    let queue = harness.keeper.queue();
    queue.enqueue(1, now).await?;
    assert_eq!(queue.process_next(now).await?, JobOutcome::Deployed { fair_launch_id: 1, token });

    let report = harness.keeper.engine().process_pending_rounds(Utc::now()).await?;
    assert_eq!(report.processed, 1);
    let round = harness.store.get_round(&token, 0).await?.unwrap();
    assert!(round.processed);
    assert_eq!(harness.gateway.root_of(&token, 0), round.merkle_root);
    assert_eq!(harness.store.allocations_for_round(&token, 0).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_round_for_unknown_token_is_kept_unprocessed() -> Result<()> {
    let harness = Harness::new();
    let token = Address::repeat_byte(0x99);
    let reconciler = harness.keeper.reconciler();

    reconciler.handle(opened(token, 1000, 1), Utc::now()).await?;
    assert_eq!(harness.store.count_rounds(&token).await?, 1);
    assert_eq!(harness.store.list_unprocessed_rounds().await?.len(), 1);
    assert_eq!(
        reconciler.handle(opened(token, 1000, 1), Utc::now()).await?,
        ReconcileOutcome::DuplicateRound
    );
    Ok(())
}

#[tokio::test]
async fn test_claim_before_round_opened_is_dropped() -> Result<()> {
    let harness = Harness::new();
    let token = token_with_followers(&harness).await;
    let reconciler = harness.keeper.reconciler();
    let user = Address::repeat_byte(2);

    // Out-of-order delivery: the claim has nothing to match yet
    assert_eq!(
        reconciler.handle(claimed(user, 250, 1, 0xaa, Some(token)), Utc::now()).await?,
        ReconcileOutcome::NoMatch
    );

    reconciler.handle(opened(token, 1000, 1), Utc::now()).await?;
    let allocations = harness.store.allocations_for_round(&token, 1).await?;
    assert_eq!(allocations.len(), 4);
    assert!(allocations.iter().all(|a| !a.claimed && a.transaction_hash.is_none()));
    assert!(harness.keeper.engine().claim_for(&token, &user, 1).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_root_already_on_chain_marks_round_processed() -> Result<()> {
    let harness = Harness::new();
    let token = token_with_followers(&harness).await;
    let existing = B256::repeat_byte(0x42);
    harness.gateway.preset_root(token, 1, existing);

    let outcome = harness.keeper.reconciler().handle(opened(token, 1000, 1), Utc::now()).await?;
    assert!(matches!(outcome, ReconcileOutcome::RoundOpened(RoundOutcome::AlreadySet { .. })));
    assert!(harness.store.get_round(&token, 1).await?.unwrap().processed);
    assert_eq!(harness.gateway.root_of(&token, 1), Some(existing));
    Ok(())
}

#[tokio::test]
async fn test_rejected_submission_is_retried_with_same_root() -> Result<()> {
    let harness = Harness::new();
    let token = token_with_followers(&harness).await;
    harness.gateway.fail_roots(1);

    assert_eq!(
        harness.keeper.reconciler().handle(opened(token, 1000, 1), Utc::now()).await?,
        ReconcileOutcome::RoundDeferred
    );
    let round = harness.store.get_round(&token, 1).await?.unwrap();
    assert!(round.is_staged());
    let staged = round.merkle_root.unwrap();
    let allocations = harness.store.allocations_for_round(&token, 1).await?;

    // New followers must not change a staged round
    harness.social.set_followers(account(1), followers(8));

    let report = harness.keeper.engine().process_pending_rounds(Utc::now()).await?;
    assert_eq!(report.processed, 1);
    assert_eq!(harness.gateway.root_calls(), 2);
    assert_eq!(harness.gateway.root_of(&token, 1), Some(staged));
    assert_eq!(harness.store.allocations_for_round(&token, 1).await?, allocations);
    assert!(harness.store.list_unprocessed_rounds().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_round_below_follower_minimum_is_skipped() -> Result<()> {
    let mut config = KeeperConfig::default();
    config.airdrop.min_followers = 5;
    let harness = Harness::with_config(config);
    let token = token_with_followers(&harness).await;

    let outcome = harness.keeper.reconciler().handle(opened(token, 1000, 1), Utc::now()).await?;
    assert_eq!(
        outcome,
        ReconcileOutcome::RoundOpened(RoundOutcome::Skipped(SkipReason::InsufficientFollowers {
            followers: 4,
            required: 5,
        }))
    );
    assert_eq!(harness.gateway.root_calls(), 0);

    let round = harness.store.get_round(&token, 1).await?.unwrap();
    assert_eq!(round.merkle_root, None);
    assert!(!round.processed);

    // The sweep distributes once the audience has grown
    harness.social.set_followers(account(1), followers(5));
    let report = harness.keeper.engine().process_pending_rounds(Utc::now()).await?;
    assert_eq!(report.processed, 1);
    assert_eq!(harness.store.allocations_for_round(&token, 1).await?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_round_limit_caps_recipients() -> Result<()> {
    let mut config = KeeperConfig::default();
    config.airdrop.round_limit = 3;
    let harness = Harness::with_config(config);
    let token = harness.deployed_sale(1, Utc::now()).await;
    harness.social.set_followers(account(1), followers(10));

    harness.keeper.reconciler().handle(opened(token, 900, 1), Utc::now()).await?;
    let allocations = harness.store.allocations_for_round(&token, 1).await?;
    assert_eq!(allocations.len(), 3);
    assert!(allocations.iter().all(|a| a.amount == U256::from(300)));

    let mut recipients: Vec<Address> = allocations.iter().map(|a| a.recipient).collect();
    recipients.sort();
    recipients.dedup();
    assert_eq!(recipients.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_claim_is_applied_once() -> Result<()> {
    let harness = Harness::new();
    let token = token_with_followers(&harness).await;
    let reconciler = harness.keeper.reconciler();
    reconciler.handle(opened(token, 1000, 1), Utc::now()).await?;

    let user = Address::repeat_byte(2);
    let proof = harness.keeper.engine().claim_for(&token, &user, 1).await?.unwrap();
    assert_eq!(proof.recipient, user);

    let outcome = reconciler.handle(claimed(user, 250, 1, 0xaa, Some(token)), Utc::now()).await?;
    let key = match outcome {
        ReconcileOutcome::Claimed(key) => key,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(key, proof.key());

    // Redelivery of the same transaction
    let outcome = reconciler.handle(claimed(user, 250, 1, 0xaa, Some(token)), Utc::now()).await?;
    assert_eq!(outcome, ReconcileOutcome::ClaimAlreadyApplied);

    // A different transaction for an allocation already claimed
    let outcome = reconciler.handle(claimed(user, 250, 1, 0xab, None), Utc::now()).await?;
    assert_eq!(outcome, ReconcileOutcome::NoMatch);

    let rewards = harness.keeper.engine().rewards_for(&user).await?;
    assert_eq!(rewards.len(), 1);
    assert!(rewards[0].claimed);
    assert_eq!(rewards[0].transaction_hash, Some(B256::repeat_byte(0xaa)));
    assert!(harness.keeper.engine().claim_for(&token, &user, 1).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_claim_with_wrong_amount_or_index_matches_nothing() -> Result<()> {
    let harness = Harness::new();
    let token = token_with_followers(&harness).await;
    let reconciler = harness.keeper.reconciler();
    reconciler.handle(opened(token, 1000, 1), Utc::now()).await?;

    let user = Address::repeat_byte(3);
    assert_eq!(
        reconciler.handle(claimed(user, 251, 1, 0x01, None), Utc::now()).await?,
        ReconcileOutcome::NoMatch
    );
    assert_eq!(
        reconciler.handle(claimed(user, 250, 2, 0x02, None), Utc::now()).await?,
        ReconcileOutcome::NoMatch
    );
    assert_eq!(
        reconciler.handle(claimed(Address::repeat_byte(0x77), 250, 1, 0x03, None), Utc::now()).await?,
        ReconcileOutcome::NoMatch
    );
    assert!(harness
        .store
        .allocations_for_round(&token, 1)
        .await?
        .iter()
        .all(|a| !a.claimed));
    Ok(())
}

#[tokio::test]
async fn test_ambiguous_claim_goes_to_oldest_allocation() -> Result<()> {
    let harness = Harness::new();
    let first = harness.deployed_sale(1, Utc::now()).await;
    let second = harness.deployed_sale(2, Utc::now()).await;
    let user = Address::repeat_byte(0x31);
    harness.social.set_followers(account(1), vec![user]);
    harness.social.set_followers(account(2), vec![user]);

    let reconciler = harness.keeper.reconciler();
    reconciler.handle(opened(first, 100, 1), Utc::now()).await?;
    reconciler.handle(opened(second, 100, 1), Utc::now()).await?;

    let outcome = reconciler.handle(claimed(user, 100, 1, 0x10, None), Utc::now()).await?;
    match outcome {
        ReconcileOutcome::Claimed(key) => assert_eq!(key.token, first),
        other => panic!("unexpected outcome {:?}", other),
    }

    let outcome = reconciler.handle(claimed(user, 100, 1, 0x11, None), Utc::now()).await?;
    match outcome {
        ReconcileOutcome::Claimed(key) => assert_eq!(key.token, second),
        other => panic!("unexpected outcome {:?}", other),
    }
    Ok(())
}
