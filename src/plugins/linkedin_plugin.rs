//! LinkedIn Plugin - versioned REST API organization posts
//!
//! Posts are identified by URNs (`urn:li:share:123`, `urn:li:ugcPost:123`).
//! Users frequently paste the bare numeric part, which the resolver turns
//! back into a share URN through [`IdScheme`].

use crate::core::config::LinkedInConfig;
use crate::core::error::PublishError;
use crate::core::model::{Channel, MediaKind, Platform, Post};
use crate::core::traits::{
    AccountInfo, DeleteOutcome, FieldSet, IdScheme, PlatformObject, ProviderAdapter,
    ProviderAnalytics, ProviderCapabilities, PublishOutcome,
};
use crate::plugins::http::{self, Access};
use crate::plugins::metrics::{LinkedInStatistics, PlatformMetrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const PLATFORM: Platform = Platform::LinkedIn;

const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const RESTLI_ID_HEADER: &str = "x-restli-id";
const SHARE_URN_PREFIX: &str = "urn:li:share";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestPost {
    id: String,
    #[serde(default)]
    commentary: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    lifecycle_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Elements<T> {
    #[serde(default = "Vec::new")]
    elements: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareStatisticsElement {
    total_share_statistics: ShareStatistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareStatistics {
    impression_count: Option<u64>,
    unique_impressions_count: Option<u64>,
    click_count: Option<u64>,
    like_count: Option<u64>,
    comment_count: Option<u64>,
    share_count: Option<u64>,
    engagement: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocialActions {
    #[serde(default)]
    likes_summary: Option<LikesSummary>,
    #[serde(default)]
    comments_summary: Option<CommentsSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LikesSummary {
    total_likes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentsSummary {
    aggregated_total_comments: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    id: u64,
    #[serde(default)]
    localized_name: Option<String>,
}

fn post_url(urn: &str) -> String {
    format!("https://www.linkedin.com/feed/update/{}", urn)
}

impl From<RestPost> for PlatformObject {
    fn from(post: RestPost) -> Self {
        let mut extra = HashMap::new();
        if let Some(state) = post.lifecycle_state {
            extra.insert("lifecycleState".to_string(), json!(state));
        }

        PlatformObject {
            url: Some(post_url(&post.id)),
            id: post.id,
            text: post.commentary,
            created_at: post.created_at.and_then(DateTime::from_timestamp_millis),
            extra,
        }
    }
}

/// Percent-encode the characters Rest.li reserves inside query values
fn encode_urn(urn: &str) -> String {
    let mut encoded = String::with_capacity(urn.len() + 8);
    for c in urn.chars() {
        match c {
            ':' => encoded.push_str("%3A"),
            ',' => encoded.push_str("%2C"),
            '(' => encoded.push_str("%28"),
            ')' => encoded.push_str("%29"),
            _ => encoded.push(c),
        }
    }
    encoded
}

fn organization_urn(channel: &Channel) -> String {
    format!("urn:li:organization:{}", channel.account_id)
}

/// LinkedIn REST API adapter
pub struct LinkedInPlugin {
    client: Client,
    base_url: String,
    api_version: String,
}

impl LinkedInPlugin {
    pub fn new(config: &LinkedInConfig, timeout: Duration) -> Result<Self, PublishError> {
        Ok(Self {
            client: http::build_client(PLATFORM, timeout)?,
            base_url: config.base_url.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PublishError> {
        let mut path = vec!["rest"];
        path.extend_from_slice(segments);
        http::endpoint(PLATFORM, &self.base_url, &path)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        channel: &Channel,
        id: &str,
        access: Access,
    ) -> Result<Response, PublishError> {
        let token = channel.bearer(Utc::now())?;
        let response = request
            .bearer_auth(token)
            .header("LinkedIn-Version", &self.api_version)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
            .send()
            .await
            .map_err(|e| http::transport_error(PLATFORM, e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| http::truncate(&body, 200));

        let error = http::classify_status(PLATFORM, status, &headers, message, id, access);
        debug!(platform = %PLATFORM, id, status = status.as_u16(), error = %error, "rest request failed");
        Err(error)
    }

    async fn share_statistics(
        &self,
        urn: &str,
        channel: &Channel,
    ) -> Result<Option<ShareStatistics>, PublishError> {
        let mut url = self.url(&["organizationalEntityShareStatistics"])?;
        let entity = if urn.contains(":ugcPost:") { "ugcPosts" } else { "shares" };
        url.set_query(Some(&format!(
            "q=organizationalEntity&organizationalEntity={}&{}=List({})",
            encode_urn(&organization_urn(channel)),
            entity,
            encode_urn(urn)
        )));

        let response = self
            .send(self.client.get(url), channel, urn, Access::Read)
            .await?;
        let stats: Elements<ShareStatisticsElement> = http::decode(PLATFORM, response).await?;
        Ok(stats
            .elements
            .into_iter()
            .next()
            .map(|e| e.total_share_statistics))
    }

    async fn social_actions(
        &self,
        urn: &str,
        channel: &Channel,
    ) -> Result<SocialActions, PublishError> {
        let url = self.url(&["socialActions", urn])?;
        let response = self
            .send(self.client.get(url), channel, urn, Access::Read)
            .await?;
        http::decode(PLATFORM, response).await
    }
}

#[async_trait]
impl ProviderAdapter for LinkedInPlugin {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_content_length: 3_000,
            max_attachments: 1,
            media_kinds: vec![MediaKind::Image, MediaKind::Video, MediaKind::Document],
            supports_delete: true,
        }
    }

    fn id_scheme(&self, _channel: &Channel) -> Option<IdScheme> {
        Some(IdScheme::new(SHARE_URN_PREFIX, ":"))
    }

    async fn authenticate(&self, channel: &Channel) -> Result<AccountInfo, PublishError> {
        let url = self.url(&["organizations", channel.account_id.as_str()])?;
        let response = self
            .send(self.client.get(url), channel, &channel.account_id, Access::Read)
            .await?;
        let organization: Organization = http::decode(PLATFORM, response).await?;

        Ok(AccountInfo {
            account_id: organization.id.to_string(),
            name: organization.localized_name,
        })
    }

    async fn publish(
        &self,
        post: &Post,
        channel: &Channel,
    ) -> Result<PublishOutcome, PublishError> {
        let content = &post.content;
        let mut body = json!({
            "author": organization_urn(channel),
            "commentary": content.text,
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": []
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false
        });

        // Media must already be uploaded; attachments carry the asset URN
        let post_type = if let Some(media) = content.media.first() {
            if !media.url.starts_with("urn:li:") {
                return Err(PublishError::Validation {
                    platform: PLATFORM.to_string(),
                    message: format!(
                        "media {} must be an uploaded asset URN (urn:li:image:..)",
                        media.url
                    ),
                });
            }
            body["content"] = json!({
                "media": { "id": media.url, "altText": media.alt_text }
            });
            media.kind.as_str()
        } else if let Some(link) = &content.link {
            body["content"] = json!({ "article": { "source": link, "title": link } });
            "article"
        } else {
            "text"
        };

        let url = self.url(&["posts"])?;
        let response = self
            .send(
                self.client.post(url).json(&body),
                channel,
                &channel.account_id,
                Access::Write,
            )
            .await?;

        let canonical_id = response
            .headers()
            .get(RESTLI_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::InvalidResponse {
                platform: PLATFORM.to_string(),
                message: format!("post created without {} header", RESTLI_ID_HEADER),
            })?;

        Ok(PublishOutcome {
            success: true,
            url: Some(post_url(&canonical_id)),
            canonical_id,
            post_type: post_type.to_string(),
        })
    }

    async fn fetch_by_id(
        &self,
        id: &str,
        channel: &Channel,
        _fields: FieldSet,
    ) -> Result<PlatformObject, PublishError> {
        let url = self.url(&["posts", id])?;
        let response = self
            .send(self.client.get(url), channel, id, Access::Read)
            .await?;
        let post: RestPost = http::decode(PLATFORM, response).await?;
        Ok(post.into())
    }

    async fn delete_by_id(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<DeleteOutcome, PublishError> {
        let url = self.url(&["posts", id])?;

        match self
            .send(self.client.delete(url), channel, id, Access::Delete)
            .await
        {
            Ok(_) => Ok(DeleteOutcome {
                deleted: true,
                already_absent: false,
            }),
            Err(PublishError::NotFound { .. }) => Ok(DeleteOutcome {
                deleted: true,
                already_absent: true,
            }),
            Err(e) => Err(e),
        }
    }

    async fn get_analytics(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<ProviderAnalytics, PublishError> {
        // Share statistics are organization-only; member posts answer 403
        let stats = match self.share_statistics(id, channel).await {
            Ok(stats) => stats,
            Err(PublishError::AmbiguousState { .. }) => None,
            Err(e) => return Err(e),
        };

        let mut raw = LinkedInStatistics::default();
        match stats {
            Some(stats) => {
                raw.impression_count = stats.impression_count;
                raw.unique_impressions_count = stats.unique_impressions_count;
                raw.click_count = stats.click_count;
                raw.like_count = stats.like_count;
                raw.comment_count = stats.comment_count;
                raw.share_count = stats.share_count;
                raw.engagement = stats.engagement;
            }
            None => {
                let actions = self.social_actions(id, channel).await?;
                raw.social_likes = actions.likes_summary.map(|l| l.total_likes);
                raw.social_comments = actions
                    .comments_summary
                    .map(|c| c.aggregated_total_comments);
            }
        }

        Ok(ProviderAnalytics {
            metrics: PlatformMetrics::LinkedIn(raw).normalize(),
            demographics: None,
        })
    }

    async fn list_recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<PlatformObject>, PublishError> {
        let mut url = self.url(&["posts"])?;
        url.set_query(Some(&format!(
            "q=author&author={}&count={}&sortBy=LAST_MODIFIED",
            encode_urn(&organization_urn(channel)),
            limit
        )));

        let response = self
            .send(self.client.get(url), channel, &channel.account_id, Access::Read)
            .await?;
        let posts: Elements<RestPost> = http::decode(PLATFORM, response).await?;
        Ok(posts.elements.into_iter().map(PlatformObject::from).collect())
    }
}
