use std::sync::Arc;

use chrono::{DateTime, Utc};
use launchpad_types::*;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::{Claimed, RewardOpened, WebhookEvent};
use crate::airdrop::{AirdropEngine, RoundOutcome};
use crate::config::AirdropConfig;
use crate::store::{ClaimOutcome, ClaimQuery, Store};

/// What applying one notification did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    RoundOpened(RoundOutcome),
    /// A round with the same `(token, index)` was already recorded
    DuplicateRound,
    /// Round recorded but its root submission failed; the reward sweep retries it
    RoundDeferred,
    Claimed(AllocationKey),
    /// The claim transaction was applied by an earlier delivery
    ClaimAlreadyApplied,
    /// No unclaimed allocation matches the notification
    NoMatch,
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::RoundOpened(_) => "round_opened",
            ReconcileOutcome::DuplicateRound => "duplicate_round",
            ReconcileOutcome::RoundDeferred => "round_deferred",
            ReconcileOutcome::Claimed(_) => "claimed",
            ReconcileOutcome::ClaimAlreadyApplied => "claim_already_applied",
            ReconcileOutcome::NoMatch => "no_match",
        }
    }
}

/// A notification and the channel its result is reported on
#[derive(Debug)]
pub struct Delivery {
    pub event: WebhookEvent,
    pub reply: oneshot::Sender<LaunchpadResult<ReconcileOutcome>>,
}

/// Applies contract notifications to rounds and allocations
pub struct WebhookReconciler {
    store: Arc<dyn Store>,
    engine: Arc<AirdropEngine>,
    config: AirdropConfig,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn Store>, engine: Arc<AirdropEngine>, config: AirdropConfig) -> Self {
        Self { store, engine, config }
    }

    pub async fn handle(&self, event: WebhookEvent, now: DateTime<Utc>) -> LaunchpadResult<ReconcileOutcome> {
        match event {
            WebhookEvent::RewardOpened(opened) => self.reward_opened(opened, now).await,
            WebhookEvent::Claimed(claimed) => self.claimed(claimed).await,
        }
    }

    /// Record the round, then try to open it. A round that cannot be opened
    /// yet stays unprocessed for the reward sweep.
    async fn reward_opened(&self, opened: RewardOpened, now: DateTime<Utc>) -> LaunchpadResult<ReconcileOutcome> {
        let round_type = if self.store.count_rounds(&opened.token).await? == 0 {
            RoundType::Initial
        } else {
            RoundType::Engagement
        };
        let round = AirdropRound::new(
            opened.token,
            opened.index,
            round_type,
            self.config.round_limit,
            opened.max_amount,
            now,
        );

        if !self.store.insert_round(&round).await? {
            debug!(token = %opened.token, index = opened.index, "Duplicate RewardOpened ignored");
            return Ok(ReconcileOutcome::DuplicateRound);
        }

        info!(token = %opened.token, index = opened.index, round_type = %round_type, max_amount = %opened.max_amount, "Airdrop round opened");

        match self.engine.open_round(&opened.token, opened.index, now).await {
            Ok(outcome) => Ok(ReconcileOutcome::RoundOpened(outcome)),
            Err(e) => {
                warn!(token = %opened.token, index = opened.index, "Round recorded, left for the reward sweep: {}", e);
                Ok(ReconcileOutcome::RoundDeferred)
            }
        }
    }

    /// Match on recipient, amount and round index (plus token when given).
    /// Several matches resolve to the oldest; a lost race re-reads the
    /// candidates rather than claiming two allocations.
    async fn claimed(&self, claimed: Claimed) -> LaunchpadResult<ReconcileOutcome> {
        let query = ClaimQuery {
            recipient: claimed.user_address,
            amount: claimed.amount,
            round_index: claimed.index,
            token: claimed.token,
        };

        if self.store.claimed_by_transaction(&claimed.transaction_hash).await?.is_some() {
            debug!(tx = %claimed.transaction_hash, "Claim transaction already applied");
            return Ok(ReconcileOutcome::ClaimAlreadyApplied);
        }

        loop {
            let candidates = self.store.find_unclaimed(&query).await?;
            let Some(first) = candidates.first() else {
                info!(
                    user = %claimed.user_address,
                    index = claimed.index,
                    tx = %claimed.transaction_hash,
                    "No unclaimed allocation matches claim, dropping"
                );
                return Ok(ReconcileOutcome::NoMatch);
            };

            if candidates.len() > 1 {
                warn!(
                    user = %claimed.user_address,
                    index = claimed.index,
                    matches = candidates.len(),
                    "Ambiguous claim, applying to oldest allocation"
                );
            }

            let key = first.key();
            match self.store.claim_allocation(&key, claimed.transaction_hash).await? {
                ClaimOutcome::Claimed => {
                    info!(allocation = %key, tx = %claimed.transaction_hash, "Allocation claimed");
                    return Ok(ReconcileOutcome::Claimed(key));
                }
                ClaimOutcome::TransactionAlreadyApplied => {
                    debug!(tx = %claimed.transaction_hash, "Claim transaction already applied");
                    return Ok(ReconcileOutcome::ClaimAlreadyApplied);
                }
                ClaimOutcome::AlreadyClaimed | ClaimOutcome::NotFound => {
                    debug!(allocation = %key, "Allocation changed under claim, re-reading candidates");
                }
            }
        }
    }

    /// Apply notifications in arrival order until the channel closes or
    /// shutdown is signalled. Each result goes back to the sender, which
    /// acknowledges the delivery only once it has been applied.
    pub async fn run(self: Arc<Self>, mut deliveries: mpsc::Receiver<Delivery>, mut shutdown: watch::Receiver<bool>) {
        info!("Webhook reconciler started");

        loop {
            tokio::select! {
                delivery = deliveries.recv() => {
                    let Some(Delivery { event, reply }) = delivery else { break };
                    let kind = event.kind();
                    let result = self.handle(event, Utc::now()).await;
                    match &result {
                        Ok(outcome) => debug!(kind, ?outcome, "Notification reconciled"),
                        Err(e) => error!(kind, "Failed to reconcile notification: {}", e),
                    }
                    if reply.send(result).is_err() {
                        debug!(kind, "Sender went away before the result was reported");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Webhook reconciler stopped");
    }
}
