//! The real community rule feed transport (spec §1 external
//! collaborator: "a community rule feed HTTPS endpoint").
//!
//! This is the only place in the crate that knows the feed is HTTP —
//! everything else talks to `CommunityRuleSource`, so tests exercise
//! `RuleManager::refresh_community` against an in-memory fake instead.

use async_trait::async_trait;
use waf_common::error::WafError;

use crate::load::RawRule;
use crate::manager::CommunityRuleSource;

pub struct HttpCommunityRuleSource {
    client: reqwest::Client,
    feed_url: String,
}

impl HttpCommunityRuleSource {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            feed_url: feed_url.into(),
        }
    }
}

#[async_trait]
impl CommunityRuleSource for HttpCommunityRuleSource {
    async fn fetch(&self) -> Result<Vec<RawRule>, WafError> {
        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .map_err(|e| WafError::CommunityFetch(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| WafError::CommunityFetch(e.to_string()))?;

        response
            .json::<Vec<RawRule>>()
            .await
            .map_err(|e| WafError::CommunityFetch(e.to_string()))
    }
}
