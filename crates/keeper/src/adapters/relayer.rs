//! Contract gateway over a transaction relayer.
//!
//! The relayer owns signing keys and node connections and exposes the
//! factory and airdrop contracts as JSON endpoints.

use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use launchpad_types::*;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gateway::{ContractGateway, HeatReading, HeatUpdate, SaleState, TokenMeta, TxReceipt};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployResponse {
    token_address: Address,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BattlesResponse {
    battle_ids: Vec<BattleId>,
}

#[derive(Serialize)]
struct HeatBatchRequest<'a> {
    updates: &'a [HeatUpdate],
}

#[derive(Serialize)]
struct RootRequest {
    root: B256,
}

pub struct RelayerGateway {
    client: Client,
    base_url: String,
}

fn rpc_err(err: reqwest::Error) -> LaunchpadError {
    LaunchpadError::rpc_error(&err.to_string(), err.status().map(|s| s.as_u16()))
}

impl RelayerGateway {
    pub fn new(base_url: &str, timeout: Duration) -> LaunchpadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LaunchpadError::invalid_config("relayer", &e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send and decode; `None` on 404
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> LaunchpadResult<Option<T>> {
        let response = request.send().await.map_err(rpc_err)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LaunchpadError::rpc_error(&format!("relayer returned {}: {}", status, body), Some(status.as_u16())));
        }
        Ok(Some(response.json::<T>().await.map_err(rpc_err)?))
    }

    async fn require<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> LaunchpadResult<T> {
        self.send(request)
            .await?
            .ok_or_else(|| LaunchpadError::not_found("relayer resource", path))
    }
}

#[async_trait]
impl ContractGateway for RelayerGateway {
    async fn get_sale_state(&self, id: FairLaunchId) -> LaunchpadResult<SaleState> {
        let path = format!("/sales/{}", id);
        self.require(&path, self.client.get(self.url(&path))).await
    }

    async fn get_token_meta(&self, id: FairLaunchId) -> LaunchpadResult<Option<TokenMeta>> {
        let path = format!("/launches/{}/token", id);
        self.send(self.client.get(self.url(&path))).await
    }

    async fn deploy(&self, meta: &TokenMeta) -> LaunchpadResult<Address> {
        debug!(fair_launch_id = meta.fair_launch_id, ticker = %meta.ticker, "Requesting deployment from relayer");
        let response: DeployResponse = self
            .require("/deployments", self.client.post(self.url("/deployments")).json(meta))
            .await?;
        Ok(response.token_address)
    }

    async fn submit_heat_batch(&self, updates: &[HeatUpdate]) -> LaunchpadResult<TxReceipt> {
        let request = self.client.post(self.url("/heat")).json(&HeatBatchRequest { updates });
        self.require("/heat", request).await
    }

    async fn get_heat(&self, token: &Address) -> LaunchpadResult<HeatReading> {
        let path = format!("/tokens/{}/heat", token);
        self.require(&path, self.client.get(self.url(&path))).await
    }

    async fn submit_merkle_root(&self, token: &Address, root: B256, index: u64) -> LaunchpadResult<TxReceipt> {
        let path = format!("/airdrops/{}/{}/root", token, index);
        let response = self
            .client
            .post(self.url(&path))
            .json(&RootRequest { root })
            .send()
            .await
            .map_err(rpc_err)?;

        match response.status() {
            StatusCode::CONFLICT => Err(LaunchpadError::RootAlreadySet { token: *token, index }),
            status if status.is_success() => response.json::<TxReceipt>().await.map_err(rpc_err),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(LaunchpadError::transaction_failed(&format!("relayer returned {}: {}", status, body), None))
            }
        }
    }

    async fn get_battles_to_resolve(&self) -> LaunchpadResult<Vec<BattleId>> {
        let response: BattlesResponse = self
            .require("/battles/resolvable", self.client.get(self.url("/battles/resolvable")))
            .await?;
        Ok(response.battle_ids)
    }

    async fn resolve_battle(&self, id: BattleId) -> LaunchpadResult<TxReceipt> {
        let path = format!("/battles/{}/resolve", id);
        self.require(&path, self.client.post(self.url(&path))).await
    }
}
