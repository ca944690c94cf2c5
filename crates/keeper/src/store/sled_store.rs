//! Durable store on sled.
//!
//! Every record kind has its own tree, and allocations are keyed one per leaf
//! (`token ‖ index ‖ position`) so a claim touches a single small value.
//! Secondary trees index allocations by recipient and Waiting jobs by
//! `run_at`; each is written in the same transaction as the record it
//! points at. Values are JSON.
//!
//! sled holds an exclusive lock on its directory, so one keeper process owns
//! a store at a time. Its workers share the queue through the conditional
//! operations below.

use std::path::Path;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult, TransactionalTree};
use sled::{Db, Transactional, Tree};
use tracing::debug;

use super::{apply_transition, sort_oldest_first, ClaimOutcome, ClaimQuery, EnqueueOutcome, Store};

const LAUNCHES: &str = "launches";
const TOKEN_INDEX: &str = "launches_by_token";
const JOBS: &str = "jobs";
const READY_JOBS: &str = "jobs_by_run_at";
const WATERMARKS: &str = "watermarks";
const ROUNDS: &str = "rounds";
const ALLOCATIONS: &str = "allocations";
const RECIPIENT_INDEX: &str = "allocations_by_recipient";
const CLAIMS: &str = "claims";

const ADDRESS_LEN: usize = 20;

type TxError = ConflictableTransactionError<LaunchpadError>;

/// Store persisted to a sled database directory
pub struct SledStore {
    db: Db,
    launches: Tree,
    token_index: Tree,
    jobs: Tree,
    ready_jobs: Tree,
    watermarks: Tree,
    rounds: Tree,
    allocations: Tree,
    recipient_index: Tree,
    claims: Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> LaunchpadResult<Self> {
        let path = path.as_ref();
        debug!("Opening sled store at {}", path.display());
        let db = sled::open(path).map_err(storage_err)?;
        Ok(Self {
            launches: db.open_tree(LAUNCHES).map_err(storage_err)?,
            token_index: db.open_tree(TOKEN_INDEX).map_err(storage_err)?,
            jobs: db.open_tree(JOBS).map_err(storage_err)?,
            ready_jobs: db.open_tree(READY_JOBS).map_err(storage_err)?,
            watermarks: db.open_tree(WATERMARKS).map_err(storage_err)?,
            rounds: db.open_tree(ROUNDS).map_err(storage_err)?,
            allocations: db.open_tree(ALLOCATIONS).map_err(storage_err)?,
            recipient_index: db.open_tree(RECIPIENT_INDEX).map_err(storage_err)?,
            claims: db.open_tree(CLAIMS).map_err(storage_err)?,
            db,
        })
    }

    fn values<T: DeserializeOwned>(tree: &Tree) -> LaunchpadResult<Vec<T>> {
        tree.iter()
            .map(|entry| {
                let (_, value) = entry.map_err(storage_err)?;
                decode(&value)
            })
            .collect()
    }

    fn get<T: DeserializeOwned>(tree: &Tree, key: impl AsRef<[u8]>) -> LaunchpadResult<Option<T>> {
        match tree.get(key).map_err(storage_err)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write a job together with its ready-index entry.
    /// `f` returns the replacement job (or `None` to leave it) and a result.
    fn update_job<R, F>(&self, id: FairLaunchId, f: F) -> LaunchpadResult<R>
    where
        F: Fn(Option<&DeploymentJob>) -> (Option<DeploymentJob>, R),
    {
        let key = id_key(id);
        let trees = (&self.jobs, &self.ready_jobs);
        let result: TransactionResult<R, LaunchpadError> = trees.transaction(|(jobs, ready)| {
            let current: Option<DeploymentJob> = match jobs.get(key)? {
                Some(raw) => Some(decode(&raw).map_err(abort)?),
                None => None,
            };
            let (next, result) = f(current.as_ref());
            if let Some(next) = next {
                write_job(jobs, ready, current.as_ref(), &next)?;
            }
            Ok(result)
        });
        result.map_err(tx_err)
    }

    /// Allocations named by recipient-index keys under `recipient`
    fn recipient_allocations(&self, recipient: &Address) -> LaunchpadResult<Vec<RewardAllocation>> {
        let mut allocations = Vec::new();
        for entry in self.recipient_index.scan_prefix(recipient.as_slice()) {
            let (key, _) = entry.map_err(storage_err)?;
            if let Some(allocation) = Self::get(&self.allocations, &key[ADDRESS_LEN..])? {
                allocations.push(allocation);
            }
        }
        Ok(allocations)
    }
}

fn storage_err(err: sled::Error) -> LaunchpadError {
    LaunchpadError::storage(&err.to_string())
}

fn tx_err(err: TransactionError<LaunchpadError>) -> LaunchpadError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => storage_err(err),
    }
}

fn abort(err: LaunchpadError) -> TxError {
    ConflictableTransactionError::Abort(err)
}

fn encode<T: Serialize>(value: &T) -> LaunchpadResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LaunchpadResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn id_key(id: FairLaunchId) -> [u8; 8] {
    id.to_be_bytes()
}

/// Big-endian millis with the sign bit flipped, so byte order is time order
fn time_key(at: DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_millis() as u64) ^ (1 << 63)).to_be_bytes()
}

fn ready_key(job: &DeploymentJob) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&time_key(job.run_at));
    key.extend_from_slice(&id_key(job.fair_launch_id));
    key
}

fn round_key(token: &Address, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(28);
    key.extend_from_slice(token.as_slice());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn allocation_key(key: &AllocationKey) -> Vec<u8> {
    let mut bytes = round_key(&key.token, key.round_index);
    bytes.extend_from_slice(&key.position.to_be_bytes());
    bytes
}

fn recipient_key(recipient: &Address, key: &AllocationKey) -> Vec<u8> {
    let mut bytes = recipient.as_slice().to_vec();
    bytes.extend_from_slice(&allocation_key(key));
    bytes
}

/// Write a job and keep the ready index in step: only Waiting jobs are indexed
fn write_job(
    jobs: &TransactionalTree,
    ready: &TransactionalTree,
    previous: Option<&DeploymentJob>,
    job: &DeploymentJob,
) -> Result<(), TxError> {
    if let Some(previous) = previous.filter(|p| p.state == JobState::Waiting) {
        ready.remove(ready_key(previous))?;
    }
    if job.state == JobState::Waiting {
        ready.insert(ready_key(job), Vec::<u8>::new())?;
    }
    jobs.insert(&id_key(job.fair_launch_id)[..], encode(job).map_err(abort)?)?;
    Ok(())
}

/// Read-modify-write one record until the swap lands. `f` returns the new
/// value (or `None` to leave the record alone) and the caller's result.
fn modify<T, R, F>(tree: &Tree, key: &[u8], mut f: F) -> LaunchpadResult<R>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> LaunchpadResult<(Option<T>, R)>,
{
    loop {
        let current = tree.get(key).map_err(storage_err)?;
        let decoded = current.as_deref().map(decode::<T>).transpose()?;
        let (next, result) = f(decoded)?;
        let Some(next) = next else {
            return Ok(result);
        };
        let swapped = tree
            .compare_and_swap(key, current.as_deref(), Some(encode(&next)?))
            .map_err(storage_err)?;
        if swapped.is_ok() {
            return Ok(result);
        }
    }
}

#[async_trait]
impl Store for SledStore {
    async fn insert_fair_launch(&self, launch: &FairLaunch) -> LaunchpadResult<bool> {
        let key = id_key(launch.id);
        let value = encode(launch)?;
        let trees = (&self.launches, &self.token_index);
        let result: TransactionResult<bool, LaunchpadError> = trees.transaction(|(launches, index)| {
            if launches.get(key)?.is_some() {
                return Ok(false);
            }
            launches.insert(&key[..], value.clone())?;
            if let Some(token) = launch.token_address {
                index.insert(token.as_slice(), &key[..])?;
            }
            Ok(true)
        });
        result.map_err(tx_err)
    }

    async fn get_fair_launch(&self, id: FairLaunchId) -> LaunchpadResult<Option<FairLaunch>> {
        Self::get(&self.launches, id_key(id))
    }

    async fn find_fair_launch_by_token(&self, token: &Address) -> LaunchpadResult<Option<FairLaunch>> {
        let Some(id) = self.token_index.get(token.as_slice()).map_err(storage_err)? else {
            return Ok(None);
        };
        Self::get(&self.launches, id)
    }

    async fn list_fair_launches(&self, status: FairLaunchStatus) -> LaunchpadResult<Vec<FairLaunch>> {
        let launches: Vec<FairLaunch> = Self::values(&self.launches)?;
        Ok(launches.into_iter().filter(|launch| launch.status == status).collect())
    }

    async fn transition_fair_launch(
        &self,
        id: FairLaunchId,
        from: &[FairLaunchStatus],
        to: FairLaunchStatus,
        token_address: Option<Address>,
    ) -> LaunchpadResult<bool> {
        let key = id_key(id);
        let trees = (&self.launches, &self.token_index);
        let result: TransactionResult<bool, LaunchpadError> = trees.transaction(|(launches, index)| {
            let Some(raw) = launches.get(key)? else {
                return Ok(false);
            };
            let mut launch: FairLaunch = decode(&raw).map_err(abort)?;
            let previous = launch.token_address;
            if !apply_transition(&mut launch, from, to, token_address).map_err(abort)? {
                return Ok(false);
            }
            if let Some(old) = previous {
                index.remove(old.as_slice())?;
            }
            if let Some(token) = launch.token_address {
                index.insert(token.as_slice(), &key[..])?;
            }
            launches.insert(&key[..], encode(&launch).map_err(abort)?)?;
            Ok(true)
        });
        result.map_err(tx_err)
    }

    async fn enqueue_job(&self, id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<EnqueueOutcome> {
        self.update_job(id, |current| match current {
            Some(job) if job.state.is_live() => (None, EnqueueOutcome::AlreadyQueued),
            _ => (Some(DeploymentJob::new(id, now)), EnqueueOutcome::Enqueued),
        })
    }

    async fn get_job(&self, id: FairLaunchId) -> LaunchpadResult<Option<DeploymentJob>> {
        Self::get(&self.jobs, id_key(id))
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> LaunchpadResult<Option<DeploymentJob>> {
        let horizon = time_key(now);

        for entry in self.ready_jobs.iter() {
            let (key, _) = entry.map_err(storage_err)?;
            if key[..8] > horizon[..] {
                break;
            }
            let id_bytes: [u8; 8] = key[8..]
                .try_into()
                .map_err(|_| LaunchpadError::storage("malformed ready-job key"))?;

            // Another worker may take the same entry; move on to the next if so
            let claimed = self.update_job(FairLaunchId::from_be_bytes(id_bytes), |current| match current {
                Some(job) if job.is_ready(now) => {
                    let mut job = job.clone();
                    job.state = JobState::Active;
                    job.updated_at = now;
                    (Some(job.clone()), Some(job))
                }
                _ => (None, None),
            })?;
            if claimed.is_some() {
                return Ok(claimed);
            }
        }

        Ok(None)
    }

    async fn save_job(&self, job: &DeploymentJob) -> LaunchpadResult<()> {
        self.update_job(job.fair_launch_id, |_| (Some(job.clone()), ()))
    }

    async fn list_jobs(&self, state: JobState) -> LaunchpadResult<Vec<DeploymentJob>> {
        let jobs: Vec<DeploymentJob> = Self::values(&self.jobs)?;
        Ok(jobs.into_iter().filter(|job| job.state == state).collect())
    }

    async fn reclaim_stale_jobs(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> LaunchpadResult<usize> {
        let stale = self
            .list_jobs(JobState::Active)
            .await?
            .into_iter()
            .filter(|job| job.updated_at < stale_before);

        let mut reclaimed = 0;
        for job in stale {
            let moved = self.update_job(job.fair_launch_id, |current| match current {
                Some(job) if job.state == JobState::Active && job.updated_at < stale_before => {
                    let mut job = job.clone();
                    job.state = JobState::Waiting;
                    job.run_at = now;
                    job.updated_at = now;
                    (Some(job), true)
                }
                _ => (None, false),
            })?;
            if moved {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn requeue_failed_job(&self, id: FairLaunchId, now: DateTime<Utc>) -> LaunchpadResult<bool> {
        self.update_job(id, |current| match current {
            Some(job) if job.state == JobState::Failed => {
                let mut job = job.clone();
                job.state = JobState::Waiting;
                job.attempts = 0;
                job.failure = None;
                job.run_at = now;
                job.updated_at = now;
                (Some(job), true)
            }
            _ => (None, false),
        })
    }

    async fn get_watermark(&self, token: &Address) -> LaunchpadResult<Option<HeatWatermark>> {
        Self::get(&self.watermarks, token.as_slice())
    }

    async fn put_watermark(&self, watermark: &HeatWatermark) -> LaunchpadResult<()> {
        self.watermarks
            .insert(watermark.token.as_slice(), encode(watermark)?)
            .map_err(storage_err)?;
        Ok(())
    }

    async fn remove_watermark(&self, token: &Address) -> LaunchpadResult<()> {
        self.watermarks.remove(token.as_slice()).map_err(storage_err)?;
        Ok(())
    }

    async fn insert_round(&self, round: &AirdropRound) -> LaunchpadResult<bool> {
        let key = round_key(&round.token, round.index);
        let swapped = self
            .rounds
            .compare_and_swap(key, None::<&[u8]>, Some(encode(round)?))
            .map_err(storage_err)?;
        Ok(swapped.is_ok())
    }

    async fn get_round(&self, token: &Address, index: u64) -> LaunchpadResult<Option<AirdropRound>> {
        Self::get(&self.rounds, round_key(token, index))
    }

    async fn count_rounds(&self, token: &Address) -> LaunchpadResult<usize> {
        let mut count = 0;
        for entry in self.rounds.scan_prefix(token.as_slice()) {
            entry.map_err(storage_err)?;
            count += 1;
        }
        Ok(count)
    }

    async fn list_unprocessed_rounds(&self) -> LaunchpadResult<Vec<AirdropRound>> {
        let mut rounds: Vec<AirdropRound> = Self::values::<AirdropRound>(&self.rounds)?
            .into_iter()
            .filter(|round| !round.processed)
            .collect();
        rounds.sort_by_key(|round| (round.created_at, round.index));
        Ok(rounds)
    }

    async fn stage_round(
        &self,
        token: &Address,
        index: u64,
        root: B256,
        allocations: Vec<RewardAllocation>,
    ) -> LaunchpadResult<bool> {
        let key = round_key(token, index);
        let trees = (&self.rounds, &self.allocations, &self.recipient_index);
        let result: TransactionResult<bool, LaunchpadError> = trees.transaction(|(rounds, leaves, recipients)| {
            let Some(raw) = rounds.get(&key[..])? else {
                return Err(abort(LaunchpadError::not_found("airdrop round", &format!("{}#{}", token, index))));
            };
            let mut round: AirdropRound = decode(&raw).map_err(abort)?;
            if round.merkle_root.is_some() {
                return Ok(false);
            }
            round.merkle_root = Some(root);

            for allocation in &allocations {
                let allocation_id = allocation.key();
                leaves.insert(allocation_key(&allocation_id), encode(allocation).map_err(abort)?)?;
                recipients.insert(recipient_key(&allocation.recipient, &allocation_id), Vec::<u8>::new())?;
            }
            rounds.insert(&key[..], encode(&round).map_err(abort)?)?;
            Ok(true)
        });
        result.map_err(tx_err)
    }

    async fn mark_round_processed(&self, token: &Address, index: u64) -> LaunchpadResult<bool> {
        modify::<AirdropRound, _, _>(&self.rounds, &round_key(token, index), |current| match current {
            Some(round) if round.processed => Ok((None, false)),
            Some(mut round) => {
                round.processed = true;
                Ok((Some(round), true))
            }
            None => Err(LaunchpadError::not_found("airdrop round", &format!("{}#{}", token, index))),
        })
    }

    async fn allocations_for_round(&self, token: &Address, index: u64) -> LaunchpadResult<Vec<RewardAllocation>> {
        self.allocations
            .scan_prefix(round_key(token, index))
            .map(|entry| {
                let (_, value) = entry.map_err(storage_err)?;
                decode(&value)
            })
            .collect()
    }

    async fn allocations_for_recipient(&self, recipient: &Address) -> LaunchpadResult<Vec<RewardAllocation>> {
        let mut allocations = self.recipient_allocations(recipient)?;
        sort_oldest_first(&mut allocations);
        Ok(allocations)
    }

    async fn find_unclaimed(&self, query: &ClaimQuery) -> LaunchpadResult<Vec<RewardAllocation>> {
        let mut matches: Vec<RewardAllocation> = self
            .recipient_allocations(&query.recipient)?
            .into_iter()
            .filter(|allocation| query.matches(allocation))
            .collect();
        sort_oldest_first(&mut matches);
        Ok(matches)
    }

    async fn claimed_by_transaction(&self, tx_hash: &B256) -> LaunchpadResult<Option<AllocationKey>> {
        Self::get(&self.claims, tx_hash.as_slice())
    }

    async fn claim_allocation(&self, key: &AllocationKey, tx_hash: B256) -> LaunchpadResult<ClaimOutcome> {
        let leaf_key = allocation_key(key);
        let applied = encode(key)?;
        let trees = (&self.allocations, &self.claims);
        let result: TransactionResult<ClaimOutcome, LaunchpadError> = trees.transaction(|(leaves, claims)| {
            if claims.get(tx_hash.as_slice())?.is_some() {
                return Ok(ClaimOutcome::TransactionAlreadyApplied);
            }
            let Some(raw) = leaves.get(&leaf_key[..])? else {
                return Ok(ClaimOutcome::NotFound);
            };
            let mut allocation: RewardAllocation = decode(&raw).map_err(abort)?;
            if allocation.claimed {
                return Ok(ClaimOutcome::AlreadyClaimed);
            }
            allocation.claimed = true;
            allocation.transaction_hash = Some(tx_hash);

            leaves.insert(&leaf_key[..], encode(&allocation).map_err(abort)?)?;
            claims.insert(tx_hash.as_slice(), applied.clone())?;
            Ok(ClaimOutcome::Claimed)
        });
        result.map_err(tx_err)
    }

    async fn flush(&self) -> LaunchpadResult<()> {
        self.db.flush_async().await.map_err(storage_err)?;
        Ok(())
    }
}
