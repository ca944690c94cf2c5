//! Store contract tests run against both backends

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use launchpad_keeper::store::{ClaimOutcome, ClaimQuery, EnqueueOutcome};
use launchpad_keeper::{MemoryStore, SledStore, Store};
use launchpad_types::*;
use tempfile::TempDir;

/// Create a sled store in a temporary directory
fn create_test_store() -> Result<(SledStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let store = SledStore::open(temp_dir.path().join("keeper"))?;
    Ok((store, temp_dir))
}

fn allocation(token: Address, index: u64, position: u32, recipient: Address) -> RewardAllocation {
    RewardAllocation {
        token,
        round_index: index,
        position,
        recipient,
        amount: U256::from(100),
        leaf: B256::repeat_byte(position as u8 + 1),
        proof: vec![B256::repeat_byte(0xee)],
        claimed: false,
        transaction_hash: None,
        created_at: Utc::now(),
    }
}

async fn exercise_launches(store: &dyn Store) -> Result<()> {
    let now = Utc::now();
    let launch = FairLaunch::new(1, Address::repeat_byte(0xc0), "Heat", "HEAT", now);
    assert!(store.insert_fair_launch(&launch).await?);
    assert!(!store.insert_fair_launch(&launch).await?);

    let token = Address::repeat_byte(0xde);
    assert!(!store
        .transition_fair_launch(1, &[FairLaunchStatus::Completable], FairLaunchStatus::Deploying, None)
        .await?);
    assert!(store
        .transition_fair_launch(1, &[FairLaunchStatus::Pending], FairLaunchStatus::Deploying, None)
        .await?);
    assert!(store
        .transition_fair_launch(1, &[FairLaunchStatus::Deploying], FairLaunchStatus::Deployed, Some(token))
        .await?);
    assert!(!store
        .transition_fair_launch(2, &[FairLaunchStatus::Pending], FairLaunchStatus::Failed, None)
        .await?);

    let found = store.find_fair_launch_by_token(&token).await?.unwrap();
    assert_eq!(found.id, 1);
    assert!(found.is_consistent());
    assert_eq!(store.list_fair_launches(FairLaunchStatus::Deployed).await?.len(), 1);
    assert!(store.list_fair_launches(FairLaunchStatus::Pending).await?.is_empty());
    Ok(())
}

async fn exercise_jobs(store: &dyn Store) -> Result<()> {
    let now = Utc::now();
    assert_eq!(store.enqueue_job(1, now).await?, EnqueueOutcome::Enqueued);
    assert_eq!(store.enqueue_job(1, now).await?, EnqueueOutcome::AlreadyQueued);
    assert_eq!(store.enqueue_job(2, now - Duration::seconds(1)).await?, EnqueueOutcome::Enqueued);

    // Earliest run_at first
    let first = store.claim_next_job(now).await?.unwrap();
    assert_eq!(first.fair_launch_id, 2);
    assert_eq!(first.state, JobState::Active);
    assert_eq!(store.enqueue_job(2, now).await?, EnqueueOutcome::AlreadyQueued);

    let second = store.claim_next_job(now).await?.unwrap();
    assert_eq!(second.fair_launch_id, 1);
    assert!(store.claim_next_job(now).await?.is_none());

    let mut failed = second.clone();
    failed.state = JobState::Failed;
    failed.attempts = 3;
    store.save_job(&failed).await?;
    assert_eq!(store.list_jobs(JobState::Failed).await?.len(), 1);

    // Claimed at `now`, so only a cutoff past it reclaims
    assert_eq!(store.reclaim_stale_jobs(now, now).await?, 0);
    assert_eq!(store.get_job(2).await?.unwrap().state, JobState::Active);
    assert_eq!(store.reclaim_stale_jobs(now + Duration::seconds(1), now).await?, 1);
    assert_eq!(store.get_job(2).await?.unwrap().state, JobState::Waiting);
    assert_eq!(store.claim_next_job(now).await?.unwrap().fair_launch_id, 2);

    assert!(store.requeue_failed_job(1, now).await?);
    assert!(!store.requeue_failed_job(1, now).await?);
    let requeued = store.get_job(1).await?.unwrap();
    assert_eq!(requeued.attempts, 0);
    assert_eq!(requeued.state, JobState::Waiting);
    Ok(())
}

async fn exercise_rounds(store: &dyn Store) -> Result<()> {
    let now = Utc::now();
    let token = Address::repeat_byte(0xde);
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb2);

    let round = AirdropRound::new(token, 1, RoundType::Initial, 10, U256::from(200), now);
    assert!(store.insert_round(&round).await?);
    assert!(!store.insert_round(&round).await?);
    assert_eq!(store.count_rounds(&token).await?, 1);
    assert_eq!(store.list_unprocessed_rounds().await?.len(), 1);

    let root = B256::repeat_byte(0x77);
    let allocations = vec![allocation(token, 1, 0, alice), allocation(token, 1, 1, bob)];
    assert!(store.stage_round(&token, 1, root, allocations.clone()).await?);
    assert!(!store.stage_round(&token, 1, B256::repeat_byte(0x78), Vec::new()).await?);
    assert_eq!(store.get_round(&token, 1).await?.unwrap().merkle_root, Some(root));
    assert_eq!(store.allocations_for_round(&token, 1).await?, allocations);

    assert!(store.mark_round_processed(&token, 1).await?);
    assert!(!store.mark_round_processed(&token, 1).await?);
    assert!(store.list_unprocessed_rounds().await?.is_empty());

    let query = ClaimQuery {
        recipient: bob,
        amount: U256::from(100),
        round_index: 1,
        token: None,
    };
    let candidates = store.find_unclaimed(&query).await?;
    assert_eq!(candidates.len(), 1);
    let key = candidates[0].key();

    let tx = B256::repeat_byte(0x01);
    assert_eq!(store.claimed_by_transaction(&tx).await?, None);
    assert_eq!(store.claim_allocation(&key, tx).await?, ClaimOutcome::Claimed);
    assert_eq!(store.claimed_by_transaction(&tx).await?, Some(key));
    assert_eq!(store.claim_allocation(&key, tx).await?, ClaimOutcome::TransactionAlreadyApplied);
    assert_eq!(store.claim_allocation(&key, B256::repeat_byte(0x02)).await?, ClaimOutcome::AlreadyClaimed);

    let missing = AllocationKey {
        token,
        round_index: 1,
        position: 9,
    };
    assert_eq!(store.claim_allocation(&missing, B256::repeat_byte(0x03)).await?, ClaimOutcome::NotFound);
    assert!(store.find_unclaimed(&query).await?.is_empty());

    let held = store.allocations_for_recipient(&bob).await?;
    assert_eq!(held.len(), 1);
    assert!(held[0].claimed);
    assert_eq!(held[0].transaction_hash, Some(tx));

    assert!(store.stage_round(&Address::repeat_byte(0x01), 1, root, Vec::new()).await.is_err());
    Ok(())
}

async fn exercise_watermarks(store: &dyn Store) -> Result<()> {
    let token = Address::repeat_byte(0xde);
    let watermark = HeatWatermark {
        token,
        heat: 42,
        last_heat_update: Utc::now(),
        last_engagement_boost: 7,
    };
    assert!(store.get_watermark(&token).await?.is_none());
    store.put_watermark(&watermark).await?;
    assert_eq!(store.get_watermark(&token).await?, Some(watermark));
    store.remove_watermark(&token).await?;
    assert!(store.get_watermark(&token).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_memory_store_contract() -> Result<()> {
    let store = MemoryStore::new();
    exercise_launches(&store).await?;
    exercise_jobs(&store).await?;
    exercise_rounds(&store).await?;
    exercise_watermarks(&store).await?;
    Ok(())
}

#[tokio::test]
async fn test_sled_store_contract() -> Result<()> {
    let (store, _temp_dir) = create_test_store()?;
    exercise_launches(&store).await?;
    exercise_jobs(&store).await?;
    exercise_rounds(&store).await?;
    exercise_watermarks(&store).await?;
    Ok(())
}

#[tokio::test]
async fn test_sled_store_survives_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("keeper");
    let token = Address::repeat_byte(0xde);
    let now = Utc::now();

    {
        let store = SledStore::open(&path)?;
        let launch = FairLaunch::new(5, Address::repeat_byte(0xc0), "Heat", "HEAT", now);
        store.insert_fair_launch(&launch).await?;
        store
            .transition_fair_launch(5, &[FairLaunchStatus::Pending], FairLaunchStatus::Deployed, Some(token))
            .await?;
        store.enqueue_job(6, now).await?;
        store.claim_next_job(now).await?;
        store.flush().await?;
    }

    let store = SledStore::open(&path)?;
    assert_eq!(store.find_fair_launch_by_token(&token).await?.unwrap().id, 5);
    assert_eq!(store.get_job(6).await?.unwrap().state, JobState::Active);
    assert_eq!(store.reclaim_stale_jobs(now + Duration::seconds(1), now).await?, 1);
    assert_eq!(store.claim_next_job(now).await?.unwrap().fair_launch_id, 6);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_enqueue_creates_one_job() -> Result<()> {
    let (store, _temp_dir) = create_test_store()?;
    let store: Arc<dyn Store> = Arc::new(store);
    let now = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.enqueue_job(1, now).await })
        })
        .collect();

    let mut enqueued = 0;
    for handle in handles {
        if handle.await?? == EnqueueOutcome::Enqueued {
            enqueued += 1;
        }
    }
    assert_eq!(enqueued, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_claims_apply_once() -> Result<()> {
    let (store, _temp_dir) = create_test_store()?;
    let store: Arc<dyn Store> = Arc::new(store);
    let token = Address::repeat_byte(0xde);
    let round = AirdropRound::new(token, 1, RoundType::Initial, 10, U256::from(100), Utc::now());
    store.insert_round(&round).await?;
    store
        .stage_round(&token, 1, B256::repeat_byte(0x77), vec![allocation(token, 1, 0, Address::repeat_byte(0xa1))])
        .await?;

    let key = AllocationKey {
        token,
        round_index: 1,
        position: 0,
    };
    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.claim_allocation(&key, B256::repeat_byte(i + 1)).await })
        })
        .collect();

    let mut claimed = 0;
    for handle in handles {
        if handle.await?? == ClaimOutcome::Claimed {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);
    Ok(())
}
