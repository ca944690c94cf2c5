use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use launchpad_types::*;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::social::{EngagementCounters, SocialMetricsSource};

#[derive(Deserialize)]
struct FollowersResponse {
    followers: Vec<Address>,
}

/// Social metrics service reached over HTTP, one route tree per platform
pub struct HttpSocialSource {
    client: Client,
    base_url: Url,
}

impl HttpSocialSource {
    pub fn new(base_url: &str, timeout: Duration) -> LaunchpadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LaunchpadError::invalid_config("social", &e.to_string()))?;
        let base_url = Url::parse(base_url).map_err(|e| LaunchpadError::invalid_config("social_url", &e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(LaunchpadError::invalid_config("social_url", "not a base URL"));
        }
        Ok(Self { client, base_url })
    }

    /// `{base}/{platform}/{handle}/{resource}` with the handle escaped as one segment
    fn account_url(&self, account: &SocialAccount, resource: &str) -> LaunchpadResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LaunchpadError::invalid_config("social_url", "not a base URL"))?
            .pop_if_empty()
            .push(&account.platform.to_string())
            .push(&account.handle)
            .push(resource);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, account: &SocialAccount, url: Url, query: &[(&str, String)]) -> LaunchpadResult<T> {
        let platform = account.platform.to_string();
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| LaunchpadError::social(&platform, &e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LaunchpadError::social(&platform, &format!("{} returned {}", account, status)));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| LaunchpadError::social(&platform, &e.to_string()))
    }
}

#[async_trait]
impl SocialMetricsSource for HttpSocialSource {
    async fn get_followers(&self, account: &SocialAccount) -> LaunchpadResult<Vec<Address>> {
        let url = self.account_url(account, "followers")?;
        let response: FollowersResponse = self.fetch(account, url, &[]).await?;
        Ok(response.followers)
    }

    async fn get_engagement_since(
        &self,
        account: &SocialAccount,
        since: DateTime<Utc>,
    ) -> LaunchpadResult<EngagementCounters> {
        let url = self.account_url(account, "engagement")?;
        let query = [("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))];
        self.fetch(account, url, &query).await
    }
}
