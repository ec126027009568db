//! Outbound HTTP: platform metric sync and the AI caption client.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ccp_core::{AccountStats, ContentRecord, PlatformAccount};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "ccp-sync";

const TIKTOK_API_BASE: &str = "https://open.tiktokapis.com";
const INSTAGRAM_API_BASE: &str = "https://graph.instagram.com";
const AI_API_BASE: &str = "https://api.anthropic.com";
const AI_MODEL: &str = "claude-sonnet-4-5";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub tiktok_access_token: Option<String>,
    pub instagram_access_token: Option<String>,
    pub ai_api_key: Option<String>,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            tiktok_access_token: std::env::var("TIKTOK_ACCESS_TOKEN").ok(),
            instagram_access_token: std::env::var("INSTAGRAM_ACCESS_TOKEN").ok(),
            ai_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            http_timeout_secs: std::env::var("CCP_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            user_agent: std::env::var("CCP_USER_AGENT")
                .unwrap_or_else(|_| "ccp-bot/0.1".to_string()),
        }
    }

    pub fn build_http_client(&self) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(std::time::Duration::from_secs(self.http_timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()
            .context("building reqwest client")
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected {platform} response: {detail}")]
    UnexpectedResponse {
        platform: &'static str,
        detail: String,
    },
}

/// Engagement metrics for one piece of media, as reported by a platform.
/// `None` fields were not supplied by the API and must preserve stored
/// values, same rule as the CSV import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaMetrics {
    pub media_id: String,
    pub url: String,
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> &'static str;
    async fn fetch_account(&self) -> Result<PlatformAccount, SyncError>;
    async fn fetch_media(&self) -> Result<Vec<MediaMetrics>, SyncError>;
    /// Fold fetched media metrics into the stored records using this
    /// platform's matching rule; returns how many records matched.
    fn apply(
        &self,
        records: &mut [ContentRecord],
        media: &[MediaMetrics],
        now: DateTime<Utc>,
    ) -> usize;
}

pub struct TikTokClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl TikTokClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self {
            http,
            token,
            base_url: TIKTOK_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl PlatformClient for TikTokClient {
    fn platform(&self) -> &'static str {
        "tiktok"
    }

    async fn fetch_account(&self) -> Result<PlatformAccount, SyncError> {
        let url = format!(
            "{}/v2/user/info/?fields=open_id,display_name,follower_count,following_count,likes_count,video_count",
            self.base_url
        );
        let body: JsonValue = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let user = body
            .get("data")
            .and_then(|d| d.get("user"))
            .ok_or_else(|| SyncError::UnexpectedResponse {
                platform: "tiktok",
                detail: "missing data.user".to_string(),
            })?;
        Ok(PlatformAccount {
            username: json_str(user, "display_name"),
            followers: json_u64(user, "follower_count").unwrap_or(0),
            following: json_u64(user, "following_count").unwrap_or(0),
            media_count: json_u64(user, "video_count").unwrap_or(0),
            synced_at: Utc::now(),
        })
    }

    async fn fetch_media(&self) -> Result<Vec<MediaMetrics>, SyncError> {
        let url = format!(
            "{}/v2/video/list/?fields=id,like_count,comment_count,share_count,view_count,share_url",
            self.base_url
        );
        let body: JsonValue = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "max_count": 20 }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let videos = body
            .get("data")
            .and_then(|d| d.get("videos"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(videos
            .iter()
            .map(|v| MediaMetrics {
                media_id: json_str(v, "id"),
                url: json_str(v, "share_url"),
                views: json_u64(v, "view_count"),
                likes: json_u64(v, "like_count"),
                comments: json_u64(v, "comment_count"),
                shares: json_u64(v, "share_count"),
            })
            .collect())
    }

    fn apply(
        &self,
        records: &mut [ContentRecord],
        media: &[MediaMetrics],
        now: DateTime<Utc>,
    ) -> usize {
        apply_tiktok_metrics(records, media, now)
    }
}

pub struct InstagramClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl InstagramClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self {
            http,
            token,
            base_url: INSTAGRAM_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
    fn platform(&self) -> &'static str {
        "instagram"
    }

    async fn fetch_account(&self) -> Result<PlatformAccount, SyncError> {
        let url = format!(
            "{}/me?fields=id,username,followers_count,follows_count,media_count&access_token={}",
            self.base_url, self.token
        );
        let body: JsonValue = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(PlatformAccount {
            username: json_str(&body, "username"),
            followers: json_u64(&body, "followers_count").unwrap_or(0),
            following: json_u64(&body, "follows_count").unwrap_or(0),
            media_count: json_u64(&body, "media_count").unwrap_or(0),
            synced_at: Utc::now(),
        })
    }

    async fn fetch_media(&self) -> Result<Vec<MediaMetrics>, SyncError> {
        let url = format!(
            "{}/me/media?fields=id,caption,like_count,comments_count,timestamp,permalink&limit=20&access_token={}",
            self.base_url, self.token
        );
        let body: JsonValue = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let posts = body
            .get("data")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(posts
            .iter()
            .map(|p| MediaMetrics {
                media_id: json_str(p, "id"),
                url: json_str(p, "permalink"),
                views: None,
                likes: json_u64(p, "like_count"),
                comments: json_u64(p, "comments_count"),
                shares: None,
            })
            .collect())
    }

    fn apply(
        &self,
        records: &mut [ContentRecord],
        media: &[MediaMetrics],
        now: DateTime<Utc>,
    ) -> usize {
        apply_instagram_metrics(records, media, now)
    }
}

fn json_str(value: &JsonValue, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn json_u64(value: &JsonValue, key: &str) -> Option<u64> {
    value.get(key).and_then(|v| v.as_u64())
}

/// Pull the numeric id out of a `.../video/{id}` TikTok URL.
pub fn extract_tiktok_video_id(url: &str) -> Option<&str> {
    let rest = &url[url.find("/video/")? + "/video/".len()..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Patch stored records with TikTok video metrics, matching by the video id
/// embedded in the stored `tiktok_url`. Returns how many records matched.
pub fn apply_tiktok_metrics(
    records: &mut [ContentRecord],
    videos: &[MediaMetrics],
    now: DateTime<Utc>,
) -> usize {
    let mut matched = 0;
    for video in videos {
        let hit = records.iter_mut().find(|record| {
            extract_tiktok_video_id(&record.tiktok_url)
                .is_some_and(|stored_id| stored_id == video.media_id)
        });
        if let Some(record) = hit {
            if let Some(views) = video.views {
                record.views = views;
            }
            if let Some(likes) = video.likes {
                record.likes = likes;
            }
            if let Some(comments) = video.comments {
                record.comments = comments;
            }
            if let Some(shares) = video.shares {
                record.shares = shares;
            }
            record.last_synced = Some(now);
            matched += 1;
        }
    }
    matched
}

/// Patch stored records with Instagram media metrics, matching by exact
/// permalink. Instagram reports likes and comments only.
pub fn apply_instagram_metrics(
    records: &mut [ContentRecord],
    posts: &[MediaMetrics],
    now: DateTime<Utc>,
) -> usize {
    let mut matched = 0;
    for post in posts {
        if post.url.is_empty() {
            continue;
        }
        let hit = records
            .iter_mut()
            .find(|record| record.instagram_url == post.url);
        if let Some(record) = hit {
            if let Some(likes) = post.likes {
                record.likes = likes;
            }
            if let Some(comments) = post.comments {
                record.comments = comments;
            }
            record.last_synced = Some(now);
            matched += 1;
        }
    }
    matched
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSyncSummary {
    pub fetched: usize,
    pub matched: usize,
}

/// Outcome of one metrics sync. Per-platform failures are collected as
/// advisory strings so one platform never blocks the other.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub updated: usize,
    pub tiktok: Option<PlatformSyncSummary>,
    pub instagram: Option<PlatformSyncSummary>,
    pub errors: Vec<String>,
}

pub struct MetricsSyncer {
    tiktok: Option<TikTokClient>,
    instagram: Option<InstagramClient>,
}

impl MetricsSyncer {
    pub fn from_config(config: &SyncConfig) -> anyhow::Result<Self> {
        let http = config.build_http_client()?;
        Ok(Self {
            tiktok: config
                .tiktok_access_token
                .clone()
                .map(|token| TikTokClient::new(http.clone(), token)),
            instagram: config
                .instagram_access_token
                .clone()
                .map(|token| InstagramClient::new(http.clone(), token)),
        })
    }

    pub fn with_clients(tiktok: Option<TikTokClient>, instagram: Option<InstagramClient>) -> Self {
        Self { tiktok, instagram }
    }

    /// Fetch fresh metrics and fold them into the in-memory collection.
    /// The caller persists both the records and the account stats in one
    /// batch afterwards.
    pub async fn sync_once(
        &self,
        records: &mut [ContentRecord],
        accounts: &mut AccountStats,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        match &self.tiktok {
            Some(client) => match self.sync_platform(client, records, now).await {
                Ok((account, summary)) => {
                    accounts.tiktok = Some(account);
                    outcome.updated += summary.matched;
                    outcome.tiktok = Some(summary);
                }
                Err(err) => {
                    warn!(%err, "tiktok sync failed");
                    outcome.errors.push(format!("TikTok: {err}"));
                }
            },
            None => outcome
                .errors
                .push("TikTok: set TIKTOK_ACCESS_TOKEN to enable sync".to_string()),
        }

        match &self.instagram {
            Some(client) => match self.sync_platform(client, records, now).await {
                Ok((account, summary)) => {
                    accounts.instagram = Some(account);
                    outcome.updated += summary.matched;
                    outcome.instagram = Some(summary);
                }
                Err(err) => {
                    warn!(%err, "instagram sync failed");
                    outcome.errors.push(format!("Instagram: {err}"));
                }
            },
            None => outcome
                .errors
                .push("Instagram: set INSTAGRAM_ACCESS_TOKEN to enable sync".to_string()),
        }

        accounts.last_synced = Some(now);
        info!(updated = outcome.updated, errors = outcome.errors.len(), "metrics sync finished");
        outcome
    }

    async fn sync_platform(
        &self,
        client: &dyn PlatformClient,
        records: &mut [ContentRecord],
        now: DateTime<Utc>,
    ) -> Result<(PlatformAccount, PlatformSyncSummary), SyncError> {
        let account = client.fetch_account().await?;
        let media = client.fetch_media().await?;
        let matched = client.apply(records, &media, now);
        Ok((
            account,
            PlatformSyncSummary {
                fetched: media.len(),
                matched,
            },
        ))
    }
}

/// Caption + insight generation against the Anthropic messages API.
pub struct AiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("ANTHROPIC_API_KEY not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to parse AI response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCaption {
    pub header: String,
    pub caption: String,
    pub hashtags: Vec<String>,
}

impl AiClient {
    pub fn from_config(config: &SyncConfig) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.ai_api_key.clone() else {
            return Ok(None);
        };
        Ok(Some(Self {
            http: config.build_http_client()?,
            api_key,
            base_url: AI_API_BASE.to_string(),
            model: AI_MODEL.to_string(),
        }))
    }

    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: AI_API_BASE.to_string(),
            model: AI_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn complete(&self, prompt: String, max_tokens: u32) -> Result<String, AiError> {
        let body: JsonValue = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| AiError::Malformed("missing content[0].text".to_string()))
    }

    /// Generate a header, caption, and hashtags for a content summary in
    /// the creator's voice.
    pub async fn generate_caption(&self, summary: &str) -> Result<GeneratedCaption, AiError> {
        let prompt = caption_prompt(summary);
        let text = self.complete(prompt, 1024).await?;
        let json = strip_code_fences(&text);
        let parsed: GeneratedCaption =
            serde_json::from_str(json).map_err(|e| AiError::Malformed(e.to_string()))?;
        Ok(parsed)
    }

    /// Free-form bullet-point insights over posted-content stats.
    pub async fn analytics_insights(&self, stats: &JsonValue) -> Result<String, AiError> {
        let prompt = format!(
            "You're analyzing TikTok/Instagram content performance for a lifestyle \
             and gardening creator. Here's their posted content data:\n\n{}\n\n\
             Give 3-4 specific, actionable insights. Be direct and reference actual \
             numbers. Cover:\n\
             - What's performing best and what's driving it\n\
             - What's underperforming and a likely reason\n\
             - One clear recommendation for their next post\n\
             - Any hashtag or content theme worth doubling down on\n\n\
             Format as short bullet points. No fluff.",
            serde_json::to_string_pretty(stats).unwrap_or_default()
        );
        self.complete(prompt, 600).await
    }
}

fn caption_prompt(summary: &str) -> String {
    format!(
        "You are helping write TikTok captions in a specific voice. The voice is:\n\
         - Warm, personal, and genuine\n\
         - NOT hype-y, NOT \"influencer-speak\"\n\
         - Uses emojis sparingly (0-2 max)\n\
         - Normal capitalization\n\n\
         STRICT LENGTH RULES:\n\
         - Caption must be 30 words MAX total\n\
         - Each sentence must be 12 words MAX\n\n\
         Summary: {summary}\n\n\
         Please provide:\n\
         1. A short header (max 50 characters)\n\
         2. A caption (MAX 30 words total, each sentence MAX 12 words)\n\
         3. 5-8 relevant hashtags\n\n\
         Respond in JSON format only:\n\
         {{\"header\": \"...\", \"caption\": \"...\", \"hashtags\": [\"tag1\", \"tag2\"]}}"
    )
}

/// Drop an optional markdown code fence wrapper from a model reply.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Join hashtags into a display string, prefixing `#` where missing.
pub fn format_hashtags(hashtags: &[String]) -> String {
    hashtags
        .iter()
        .map(|tag| {
            let tag = tag.trim();
            if tag.starts_with('#') {
                tag.to_string()
            } else {
                format!("#{tag}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a space- or comma-separated hashtag string into prefixed tags.
pub fn parse_hashtags(text: &str) -> Vec<String> {
    text.split([' ', ',', '\t', '\n'])
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            if tag.starts_with('#') {
                tag.to_string()
            } else {
                format!("#{tag}")
            }
        })
        .collect()
}
