//! Facebook Plugin - Graph API page publishing
//!
//! Page posts are addressed both as `POSTID` and `PAGEID_POSTID`; the Graph
//! API returns the compound form from `/feed`, so that is the canonical id.

use crate::core::config::FacebookConfig;
use crate::core::error::PublishError;
use crate::core::model::{Channel, MediaAttachment, MediaKind, Platform, Post};
use crate::core::traits::{
    AccountInfo, DeleteOutcome, FieldSet, IdScheme, PlatformObject, ProviderAdapter,
    ProviderAnalytics, ProviderCapabilities, PublishOutcome,
};
use crate::plugins::http::{self, Access};
use crate::plugins::metrics::{FacebookInsights, PlatformMetrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const PLATFORM: Platform = Platform::Facebook;

const STANDARD_FIELDS: &str = "id,message,permalink_url,created_time";

const INSIGHT_METRICS: &str = "post_impressions,post_impressions_unique,post_clicks";

const ENGAGEMENT_FIELDS: &str =
    "shares,reactions.summary(total_count).limit(0),comments.summary(total_count).limit(0)";

// Graph API error codes
const CODE_API_UNKNOWN: i64 = 1;
const CODE_API_SERVICE: i64 = 2;
const CODE_TOO_MANY_CALLS: i64 = 4;
const CODE_USER_TOO_MANY_CALLS: i64 = 17;
const CODE_PAGE_TOO_MANY_CALLS: i64 = 32;
const CODE_INVALID_PARAMETER: i64 = 100;
const CODE_SESSION_KEY_INVALID: i64 = 102;
const CODE_ACCESS_TOKEN: i64 = 190;
const CODE_RATE_LIMIT_EXCEEDED: i64 = 613;
const SUBCODE_OBJECT_MISSING_OR_DENIED: i64 = 33;

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    code: i64,
    #[serde(default)]
    error_subcode: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
    #[serde(default)]
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphPost {
    id: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    permalink_url: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Insight {
    name: String,
    #[serde(default)]
    values: Vec<InsightValue>,
}

#[derive(Debug, Deserialize)]
struct InsightValue {
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct EngagementSummary {
    #[serde(default)]
    shares: Option<ShareCount>,
    #[serde(default)]
    reactions: Option<SummaryEdge>,
    #[serde(default)]
    comments: Option<SummaryEdge>,
}

#[derive(Debug, Deserialize)]
struct ShareCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct SummaryEdge {
    summary: TotalCount,
}

#[derive(Debug, Deserialize)]
struct TotalCount {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    success: bool,
}

impl From<GraphPost> for PlatformObject {
    fn from(post: GraphPost) -> Self {
        PlatformObject {
            id: post.id,
            text: post.message,
            url: post.permalink_url,
            created_at: post.created_time.as_deref().and_then(parse_graph_time),
            extra: HashMap::new(),
        }
    }
}

/// Graph timestamps use `+0000` offsets
fn parse_graph_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Facebook Graph API adapter
pub struct FacebookPlugin {
    client: Client,
    base_url: String,
    api_version: String,
}

impl FacebookPlugin {
    pub fn new(config: &FacebookConfig, timeout: Duration) -> Result<Self, PublishError> {
        Ok(Self {
            client: http::build_client(PLATFORM, timeout)?,
            base_url: config.base_url.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PublishError> {
        let mut path = vec![self.api_version.as_str()];
        path.extend_from_slice(segments);
        http::endpoint(PLATFORM, &self.base_url, &path)
    }

    /// Send a request and classify any failure
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
            .send()
            .await
            .map_err(|e| http::transport_error(PLATFORM, e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();

        let error = match serde_json::from_str::<GraphErrorEnvelope>(&body) {
            Ok(envelope) => classify_graph_error(envelope.error, &headers, id, access)
                .unwrap_or_else(|message| {
                    http::classify_status(PLATFORM, status, &headers, message, id, access)
                }),
            Err(_) => http::classify_status(
                PLATFORM,
                status,
                &headers,
                http::truncate(&body, 200),
                id,
                access,
            ),
        };

        debug!(platform = %PLATFORM, id, status = status.as_u16(), error = %error, "graph request failed");
        Err(error)
    }

    async fn post_form(
        &self,
        channel: &Channel,
        edge: &str,
        body: serde_json::Value,
    ) -> Result<CreatedObject, PublishError> {
        let url = self.url(&[channel.account_id.as_str(), edge])?;
        let response = self
            .send(
                self.client.post(url).json(&body),
                channel,
                &channel.account_id,
                Access::Write,
            )
            .await?;
        http::decode(PLATFORM, response).await
    }

    /// Upload photos unpublished so they can be attached to one feed post
    async fn upload_unpublished(
        &self,
        channel: &Channel,
        media: &[MediaAttachment],
    ) -> Result<Vec<String>, PublishError> {
        let mut ids = Vec::with_capacity(media.len());
        for attachment in media {
            let created = self
                .post_form(
                    channel,
                    "photos",
                    json!({ "url": attachment.url, "published": false }),
                )
                .await?;
            ids.push(created.id);
        }
        Ok(ids)
    }

    async fn fetch_engagement(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<EngagementSummary, PublishError> {
        let mut url = self.url(&[id])?;
        url.query_pairs_mut().append_pair("fields", ENGAGEMENT_FIELDS);

        let response = self
            .send(self.client.get(url), channel, id, Access::Read)
            .await?;
        http::decode(PLATFORM, response).await
    }

    async fn fetch_insights(&self, id: &str, channel: &Channel) -> Result<Vec<Insight>, PublishError> {
        let mut url = self.url(&[id, "insights"])?;
        url.query_pairs_mut().append_pair("metric", INSIGHT_METRICS);

        let response = self
            .send(self.client.get(url), channel, id, Access::Read)
            .await?;
        let list: GraphList<Insight> = http::decode(PLATFORM, response).await?;
        Ok(list.data)
    }
}

/// Map a Graph error object to an error kind
///
/// Returns the message back when the code carries no classification of its
/// own, so the HTTP status decides.
fn classify_graph_error(
    error: GraphError,
    headers: &reqwest::header::HeaderMap,
    id: &str,
    access: Access,
) -> Result<PublishError, String> {
    let platform = PLATFORM.to_string();
    let message = format!("{} (code {})", error.message, error.code);

    let classified = match (error.code, error.error_subcode) {
        (CODE_ACCESS_TOKEN | CODE_SESSION_KEY_INVALID, _) => PublishError::Authentication {
            platform,
            message,
        },
        (
            CODE_TOO_MANY_CALLS
            | CODE_USER_TOO_MANY_CALLS
            | CODE_PAGE_TOO_MANY_CALLS
            | CODE_RATE_LIMIT_EXCEEDED,
            _,
        ) => PublishError::RateLimited {
            platform,
            message,
            retry_after: http::retry_after(headers),
        },
        (CODE_API_UNKNOWN | CODE_API_SERVICE, _) => {
            PublishError::TransientNetwork { platform, message }
        }
        // Missing, deleted or hidden by permissions; Graph does not say which
        (CODE_INVALID_PARAMETER, Some(SUBCODE_OBJECT_MISSING_OR_DENIED)) => match access {
            Access::Delete => PublishError::NotFound {
                platform,
                id: id.to_string(),
                attempted: Vec::new(),
            },
            _ => PublishError::AmbiguousState {
                platform,
                id: id.to_string(),
                message,
            },
        },
        // Deprecated or inaccessible fields look identical to permission loss
        (CODE_INVALID_PARAMETER, _) if access == Access::Read => PublishError::AmbiguousState {
            platform,
            id: id.to_string(),
            message,
        },
        (CODE_INVALID_PARAMETER, _) => PublishError::Rejected { platform, message },
        _ => return Err(message),
    };

    Ok(classified)
}

fn insight_value(insights: &[Insight], name: &str) -> u64 {
    insights
        .iter()
        .find(|i| i.name == name)
        .and_then(|i| i.values.last())
        .and_then(|v| v.value.as_u64())
        .unwrap_or(0)
}

#[async_trait]
impl ProviderAdapter for FacebookPlugin {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_content_length: 63_206,
            max_attachments: 10,
            media_kinds: vec![MediaKind::Image, MediaKind::Gif, MediaKind::Video],
            supports_delete: true,
        }
    }

    fn id_scheme(&self, channel: &Channel) -> Option<IdScheme> {
        Some(IdScheme::new(channel.account_id.clone(), "_"))
    }

    async fn authenticate(&self, channel: &Channel) -> Result<AccountInfo, PublishError> {
        let mut url = self.url(&["me"])?;
        url.query_pairs_mut().append_pair("fields", "id,name");

        let response = self
            .send(self.client.get(url), channel, "me", Access::Read)
            .await?;
        let me: Me = http::decode(PLATFORM, response).await?;

        Ok(AccountInfo {
            account_id: me.id,
            name: me.name,
        })
    }

    async fn publish(
        &self,
        post: &Post,
        channel: &Channel,
    ) -> Result<PublishOutcome, PublishError> {
        let content = &post.content;
        let video = content.media.iter().find(|m| m.kind == MediaKind::Video);

        let (created, post_type) = if let Some(video) = video {
            let created = self
                .post_form(
                    channel,
                    "videos",
                    json!({ "file_url": video.url, "description": content.text }),
                )
                .await?;
            (created, "video")
        } else if content.media.len() == 1 {
            let created = self
                .post_form(
                    channel,
                    "photos",
                    json!({ "url": content.media[0].url, "caption": content.text }),
                )
                .await?;
            (created, "photo")
        } else if !content.media.is_empty() {
            let media_ids = self.upload_unpublished(channel, &content.media).await?;
            let attached: Vec<_> = media_ids
                .iter()
                .map(|id| json!({ "media_fbid": id }))
                .collect();
            let created = self
                .post_form(
                    channel,
                    "feed",
                    json!({ "message": content.text, "attached_media": attached }),
                )
                .await?;
            (created, "album")
        } else {
            let mut body = json!({ "message": content.text });
            if let Some(link) = &content.link {
                body["link"] = json!(link);
            }
            let created = self.post_form(channel, "feed", body).await?;
            let post_type = if content.link.is_some() { "link" } else { "status" };
            (created, post_type)
        };

        let canonical_id = created.post_id.unwrap_or(created.id);
        let url = format!("https://www.facebook.com/{}", canonical_id);

        Ok(PublishOutcome {
            success: true,
            canonical_id,
            url: Some(url),
            post_type: post_type.to_string(),
        })
    }

    async fn fetch_by_id(
        &self,
        id: &str,
        channel: &Channel,
        fields: FieldSet,
    ) -> Result<PlatformObject, PublishError> {
        let mut url = self.url(&[id])?;
        let field_list = match fields {
            FieldSet::Minimal => "id",
            FieldSet::Standard => STANDARD_FIELDS,
        };
        url.query_pairs_mut().append_pair("fields", field_list);

        let response = self
            .send(self.client.get(url), channel, id, Access::Read)
            .await?;
        let post: GraphPost = http::decode(PLATFORM, response).await?;
        Ok(post.into())
    }

    async fn delete_by_id(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<DeleteOutcome, PublishError> {
        let url = self.url(&[id])?;

        match self
            .send(self.client.delete(url), channel, id, Access::Delete)
            .await
        {
            Ok(response) => {
                let result: DeleteResponse = http::decode(PLATFORM, response).await?;
                if !result.success {
                    return Err(PublishError::Rejected {
                        platform: PLATFORM.to_string(),
                        message: format!("Graph API refused to delete {}", id),
                    });
                }
                Ok(DeleteOutcome {
                    deleted: true,
                    already_absent: false,
                })
            }
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
        let insights = self.fetch_insights(id, channel).await?;
        let engagement = self.fetch_engagement(id, channel).await?;

        let raw = PlatformMetrics::Facebook(FacebookInsights {
            post_impressions: insight_value(&insights, "post_impressions"),
            post_impressions_unique: insight_value(&insights, "post_impressions_unique"),
            post_clicks: insight_value(&insights, "post_clicks"),
            reactions: engagement
                .reactions
                .map(|r| r.summary.total_count)
                .unwrap_or(0),
            comments: engagement
                .comments
                .map(|c| c.summary.total_count)
                .unwrap_or(0),
            shares: engagement.shares.map(|s| s.count).unwrap_or(0),
        });

        Ok(ProviderAnalytics {
            metrics: raw.normalize(),
            demographics: None,
        })
    }

    async fn list_recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<PlatformObject>, PublishError> {
        let mut url = self.url(&[channel.account_id.as_str(), "posts"])?;
        url.query_pairs_mut()
            .append_pair("fields", STANDARD_FIELDS)
            .append_pair("limit", &limit.to_string());

        let response = self
            .send(self.client.get(url), channel, &channel.account_id, Access::Read)
            .await?;
        let list: GraphList<GraphPost> = http::decode(PLATFORM, response).await?;
        Ok(list.data.into_iter().map(PlatformObject::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use reqwest::header::HeaderMap;

    fn graph_error(code: i64, subcode: Option<i64>) -> GraphError {
        GraphError {
            message: "graph says no".to_string(),
            code,
            error_subcode: subcode,
        }
    }

    fn kind(code: i64, subcode: Option<i64>, access: Access) -> Option<ErrorKind> {
        classify_graph_error(graph_error(code, subcode), &HeaderMap::new(), "42_1", access)
            .ok()
            .map(|e| e.kind())
    }

    #[test]
    fn test_graph_error_codes() {
        assert_eq!(kind(190, None, Access::Read), Some(ErrorKind::Auth));
        assert_eq!(kind(102, None, Access::Write), Some(ErrorKind::Auth));
        assert_eq!(kind(4, None, Access::Read), Some(ErrorKind::RateLimit));
        assert_eq!(kind(613, None, Access::Write), Some(ErrorKind::RateLimit));
        assert_eq!(kind(2, None, Access::Write), Some(ErrorKind::TransientNetwork));
        assert_eq!(kind(9999, None, Access::Read), None);
    }

    #[test]
    fn test_missing_or_denied_object() {
        assert_eq!(
            kind(100, Some(33), Access::Read),
            Some(ErrorKind::AmbiguousState)
        );
        assert_eq!(kind(100, Some(33), Access::Delete), Some(ErrorKind::NotFound));
        assert_eq!(kind(100, None, Access::Write), Some(ErrorKind::Rejected));
    }

    #[test]
    fn test_parse_graph_time() {
        let parsed = parse_graph_time("2024-03-01T12:30:00+0000").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T12:30:00+00:00");
        assert!(parse_graph_time("yesterday").is_none());
    }

    #[test]
    fn test_id_scheme_uses_page_id() {
        let plugin = FacebookPlugin::new(&FacebookConfig::default(), Duration::from_secs(5)).unwrap();
        let channel = Channel::new("ch-1", Platform::Facebook, "PAGE42", "token");

        let scheme = plugin.id_scheme(&channel).unwrap();
        assert_eq!(scheme.compound("123"), Some("PAGE42_123".to_string()));
        assert!(plugin.capabilities().supports_delete);
    }
}
