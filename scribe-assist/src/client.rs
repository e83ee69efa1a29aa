//! Analyzer backend client.
//!
//! Endpoints (bearer-authenticated JSON):
//!
//! ```text
//! POST /api/ai/grammar-check {text, language}  -> {errors: [finding…]}
//! POST /api/ai/autocomplete  {context, max_words} -> {suggestion}
//! POST /api/ai/enhance       {text, action}    -> {enhanced_text, original_text}
//! ```
//!
//! HTTP 429 is not an error: it means "no result this round".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::AssistConfig;
use crate::finding::{Finding, RawFinding};

/// Outcome of a request that reached the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerReply<T> {
    Ready(T),
    RateLimited,
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("invalid analyzer url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("analyzer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analyzer returned status {0}")]
    Status(u16),
}

/// Rewrite actions offered by the enhance endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceAction {
    Improve,
    Shorten,
    Expand,
    Formal,
    Casual,
    Fix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enhancement {
    pub enhanced_text: String,
    #[serde(default)]
    pub original_text: String,
}

/// The analyzer seam. [`HttpAnalyzer`] talks to the real backend; tests and
/// offline setups can supply their own.
#[async_trait]
pub trait AnalyzerClient: Send + Sync {
    async fn check_grammar(&self, text: &str) -> Result<AnalyzerReply<Vec<Finding>>, AnalyzerError>;

    /// An empty string means the analyzer had nothing to offer.
    async fn complete(
        &self,
        context: &str,
        max_words: u32,
    ) -> Result<AnalyzerReply<String>, AnalyzerError>;

    async fn enhance(
        &self,
        text: &str,
        action: EnhanceAction,
    ) -> Result<AnalyzerReply<Enhancement>, AnalyzerError>;
}

#[derive(Serialize)]
struct GrammarRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(Deserialize)]
struct GrammarResponse {
    #[serde(default)]
    errors: Vec<RawFinding>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    context: &'a str,
    max_words: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    suggestion: Option<String>,
}

#[derive(Serialize)]
struct EnhanceRequest<'a> {
    text: &'a str,
    action: EnhanceAction,
}

/// HTTP analyzer client.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    language: String,
}

impl HttpAnalyzer {
    pub fn new(config: &AssistConfig, token: impl Into<String>) -> Result<Self, AnalyzerError> {
        let mut base_url = Url::parse(&config.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: token.into(),
            language: config.language.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<AnalyzerReply<R>, AnalyzerError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.base_url.join(endpoint)?;
        let request_id = Uuid::new_v4();
        log::debug!("POST {} ({})", url, request_id);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("X-Request-Id", request_id.to_string())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            log::info!("analyzer rate limited ({})", request_id);
            return Ok(AnalyzerReply::RateLimited);
        }
        if !status.is_success() {
            return Err(AnalyzerError::Status(status.as_u16()));
        }
        Ok(AnalyzerReply::Ready(response.json::<R>().await?))
    }
}

#[async_trait]
impl AnalyzerClient for HttpAnalyzer {
    async fn check_grammar(&self, text: &str) -> Result<AnalyzerReply<Vec<Finding>>, AnalyzerError> {
        let body = GrammarRequest {
            text,
            language: &self.language,
        };
        let reply: AnalyzerReply<GrammarResponse> = self.post("api/ai/grammar-check", &body).await?;
        Ok(match reply {
            AnalyzerReply::Ready(response) => {
                let total = response.errors.len();
                let findings: Vec<Finding> = response
                    .errors
                    .into_iter()
                    .filter_map(RawFinding::into_finding)
                    .collect();
                if findings.len() < total {
                    log::debug!("dropped {} finding(s) with negative offsets", total - findings.len());
                }
                AnalyzerReply::Ready(findings)
            }
            AnalyzerReply::RateLimited => AnalyzerReply::RateLimited,
        })
    }

    async fn complete(
        &self,
        context: &str,
        max_words: u32,
    ) -> Result<AnalyzerReply<String>, AnalyzerError> {
        let body = CompletionRequest { context, max_words };
        let reply: AnalyzerReply<CompletionResponse> = self.post("api/ai/autocomplete", &body).await?;
        Ok(match reply {
            AnalyzerReply::Ready(response) => {
                AnalyzerReply::Ready(response.suggestion.unwrap_or_default())
            }
            AnalyzerReply::RateLimited => AnalyzerReply::RateLimited,
        })
    }

    async fn enhance(
        &self,
        text: &str,
        action: EnhanceAction,
    ) -> Result<AnalyzerReply<Enhancement>, AnalyzerError> {
        self.post("api/ai/enhance", &EnhanceRequest { text, action }).await
    }
}
