//! HTTP implementation of [`KnowledgeBaseClient`] over the service's v2 JSON API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use kbsync_shared::{
    AppConfig, ArticleId, ArticleStatus, CategoryCounts, CategoryId, KbSyncError, MediaUpload,
    NewArticle, NewCategory, RemoteArticle, RemoteCategory, Result, UpdateArticle,
};

use crate::KnowledgeBaseClient;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("kbsync/", env!("CARGO_PKG_VERSION"));

/// Page size for article listings. The service caps it at 500.
const ARTICLE_PAGE_LIMIT: u32 = 500;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Connection settings for [`HttpKnowledgeBaseClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API root, e.g. `https://community.example.com/api/v2`.
    pub base_url: Url,
    /// Bearer token.
    pub token: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Pause before every mutating request.
    pub request_delay_ms: u64,
}

impl ClientOptions {
    /// Build options from the loaded config and a resolved token.
    pub fn from_config(config: &AppConfig, token: String) -> Result<Self> {
        let base_url = Url::parse(&config.remote.base_url).map_err(|e| {
            KbSyncError::config(format!(
                "invalid remote.base_url '{}': {e}",
                config.remote.base_url
            ))
        })?;
        Ok(Self {
            base_url,
            token,
            timeout_secs: config.remote.timeout_secs,
            request_delay_ms: config.remote.request_delay_ms,
        })
    }
}

/// Error body returned by the service alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// reqwest-backed knowledge-base client.
pub struct HttpKnowledgeBaseClient {
    client: Client,
    base: String,
    token: String,
    request_delay: Duration,
}

impl HttpKnowledgeBaseClient {
    /// Create a client with the given options.
    pub fn new(opts: ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| KbSyncError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: opts.base_url.as_str().trim_end_matches('/').to_string(),
            token: opts.token,
            request_delay: Duration::from_millis(opts.request_delay_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Slow down writes when the service rate-limits mutations.
    async fn throttle(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// Send a request and decode a JSON response body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> Result<T> {
        let (status, body) = self.send(request, url).await?;

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            KbSyncError::validation(format!("{url}: response is not JSON ({status}): {e}"))
        })?;

        // Some failures come back 200 with an error envelope.
        if let Some(err) = as_error_payload(&value) {
            return Err(KbSyncError::remote(err.status.unwrap_or(status.as_u16()), err.message));
        }

        serde_json::from_value(value).map_err(|e| {
            KbSyncError::validation(format!("{url}: unexpected response shape: {e}"))
        })
    }

    /// Send a request, mapping transport failures and non-2xx statuses.
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<(StatusCode, String)> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| KbSyncError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KbSyncError::Transport(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorPayload>(&body)
                .map(|p| p.message)
                .unwrap_or_else(|_| format!("{url}: HTTP {status}"));
            return Err(KbSyncError::remote(status.as_u16(), message));
        }

        debug!(%url, %status, len = body.len(), "response received");
        Ok((status, body))
    }
}

/// A top-level `message` string marks an error envelope; `status` is optional.
fn as_error_payload(value: &serde_json::Value) -> Option<ErrorPayload> {
    let obj = value.as_object()?;
    if obj.get("message").is_some_and(serde_json::Value::is_string) {
        serde_json::from_value(value.clone()).ok()
    } else {
        None
    }
}

#[async_trait]
impl KnowledgeBaseClient for HttpKnowledgeBaseClient {
    #[instrument(skip_all)]
    async fn list_categories(&self) -> Result<Vec<RemoteCategory>> {
        let url = self.url("knowledge-categories");
        self.send_json(self.client.get(&url), &url).await
    }

    #[instrument(skip(self))]
    async fn get_category(&self, id: CategoryId) -> Result<CategoryCounts> {
        let url = self.url(&format!("knowledge-categories/{id}"));
        self.send_json(self.client.get(&url), &url).await
    }

    #[instrument(skip_all, fields(name = %body.name))]
    async fn create_category(&self, body: &NewCategory) -> Result<RemoteCategory> {
        self.throttle().await;
        let url = self.url("knowledge-categories");
        self.send_json(self.client.post(&url).json(body), &url).await
    }

    #[instrument(skip(self))]
    async fn list_articles(&self, category: CategoryId) -> Result<Vec<RemoteArticle>> {
        let url = self.url("articles");
        let request = self.client.get(&url).query(&[
            ("limit", ARTICLE_PAGE_LIMIT.to_string()),
            ("knowledgeCategoryID", category.to_string()),
        ]);
        match self.send_json(request, &url).await {
            Err(KbSyncError::Remote { status: 404, .. }) => Ok(Vec::new()),
            other => other,
        }
    }

    #[instrument(skip_all, fields(name = %body.name))]
    async fn create_article(&self, body: &NewArticle) -> Result<RemoteArticle> {
        self.throttle().await;
        let url = self.url("articles");
        self.send_json(self.client.post(&url).json(body), &url).await
    }

    #[instrument(skip(self, body))]
    async fn update_article(&self, id: ArticleId, body: &UpdateArticle) -> Result<RemoteArticle> {
        self.throttle().await;
        let url = self.url(&format!("articles/{id}"));
        self.send_json(self.client.patch(&url).json(body), &url).await
    }

    #[instrument(skip(self))]
    async fn set_article_status(
        &self,
        id: ArticleId,
        status: ArticleStatus,
    ) -> Result<RemoteArticle> {
        self.throttle().await;
        let url = self.url(&format!("articles/{id}/status"));
        let body = serde_json::json!({ "articleID": id, "status": status });
        self.send_json(self.client.patch(&url).json(&body), &url).await
    }

    #[instrument(skip(self))]
    async fn delete_category(&self, id: CategoryId) -> Result<()> {
        self.throttle().await;
        let url = self.url(&format!("knowledge-categories/{id}"));
        self.send(self.client.delete(&url), &url).await.map(|_| ())
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_media(&self, file_name: &str, bytes: Vec<u8>) -> Result<MediaUpload> {
        self.throttle().await;
        let url = self.url("media");
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send_json(self.client.post(&url).multipart(form), &url).await
    }
}
