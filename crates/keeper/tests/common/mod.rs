//! Shared fixtures for keeper integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use launchpad_keeper::gateway::TokenMeta;
use launchpad_keeper::testing::{FakeGateway, FakeSocialSource};
use launchpad_keeper::{Keeper, KeeperConfig, MemoryStore, Store};
use launchpad_types::*;

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<FakeGateway>,
    pub social: Arc<FakeSocialSource>,
    pub keeper: Keeper,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KeeperConfig::default())
    }

    pub fn with_config(config: KeeperConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: KeeperConfig, store: Arc<dyn Store>) -> Self {
        let gateway = Arc::new(FakeGateway::new());
        let social = Arc::new(FakeSocialSource::new());
        let keeper = Keeper::new(config, store.clone(), gateway.clone(), social.clone());
        Self {
            store,
            gateway,
            social,
            keeper,
        }
    }

    /// Register a sale that ended an hour before `now`, with factory metadata
    pub async fn ended_sale(&self, id: FairLaunchId, now: DateTime<Utc>) -> FairLaunch {
        let launch = FairLaunch::new(id, creator(), &format!("Token {}", id), &format!("TK{}", id), now - Duration::hours(1))
            .with_social(account(id));
        assert!(self.store.insert_fair_launch(&launch).await.unwrap());
        self.gateway.set_meta(TokenMeta {
            fair_launch_id: id,
            name: launch.name.clone(),
            ticker: launch.ticker.clone(),
            creator: launch.creator,
        });
        launch
    }

    /// Register a sale and move it straight to Deployed; returns its token
    pub async fn deployed_sale(&self, id: FairLaunchId, now: DateTime<Utc>) -> Address {
        self.ended_sale(id, now).await;
        let token = FakeGateway::token_for(id);
        assert!(self
            .store
            .transition_fair_launch(id, &[FairLaunchStatus::Pending], FairLaunchStatus::Deployed, Some(token))
            .await
            .unwrap());
        token
    }

    pub async fn status(&self, id: FairLaunchId) -> FairLaunchStatus {
        self.store.get_fair_launch(id).await.unwrap().unwrap().status
    }
}

pub fn creator() -> Address {
    Address::repeat_byte(0xc0)
}

/// The Lens account linked to a fair launch
pub fn account(id: FairLaunchId) -> SocialAccount {
    SocialAccount::new(Platform::Lens, &format!("creator{}", id))
}

pub fn followers(count: u8) -> Vec<Address> {
    (1..=count).map(Address::repeat_byte).collect()
}
