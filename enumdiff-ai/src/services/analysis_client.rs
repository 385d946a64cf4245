//! Analysis service client (OpenAI-compatible chat completions)
//!
//! The [`AnalysisService`] trait is the seam between the analyzer and the
//! network: production uses [`DeepSeekClient`], tests plug in scripted
//! services. Implementations return the raw message content; validation
//! happens in [`super::response_parser`].

use crate::error::{MalformedResponse, ServiceError};
use crate::models::ModelTier;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;

/// Default chat-completions endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.deepseek.com/chat/completions";

/// Default fast-tier model
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";

/// Default escalation-tier model
pub const DEFAULT_REASONER_MODEL: &str = "deepseek-reasoner";

/// Longest error body kept in diagnostics
const MAX_ERROR_BODY: usize = 500;

/// One analysis request
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub tier: ModelTier,
    pub system_prompt: String,
    pub user_content: String,
}

/// External text-analysis service
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Send one request; returns the message content on HTTP success
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, ServiceError>;

    /// Model identity used for `tier` (part of the cache fingerprint)
    fn model_for(&self, tier: ModelTier) -> &str;
}

/// Per-tier request settings
#[derive(Debug, Clone, PartialEq)]
pub struct TierSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl TierSettings {
    pub fn chat(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.2,
            max_tokens: 1500,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn reasoner(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.1,
            max_tokens: 1500,
            timeout: Duration::from_secs(90),
        }
    }
}

/// Connection settings for [`DeepSeekClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub api_key: String,
    pub chat: TierSettings,
    pub reasoner: TierSettings,
    /// Client-side rate limit; `None` disables it
    pub requests_per_second: Option<u32>,
}

/// DeepSeek chat-completions client
pub struct DeepSeekClient {
    client: Client,
    endpoint: String,
    api_key: String,
    chat: TierSettings,
    reasoner: TierSettings,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl DeepSeekClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = settings
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            endpoint: settings.endpoint,
            api_key: settings.api_key,
            chat: settings.chat,
            reasoner: settings.reasoner,
            rate_limiter,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn settings(&self, tier: ModelTier) -> &TierSettings {
        match tier {
            ModelTier::Chat => &self.chat,
            ModelTier::Reasoner => &self.reasoner,
        }
    }

    async fn post(&self, tier: &TierSettings, payload: &Value) -> Result<String, ServiceError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(tier.timeout)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status, retry_after, &body));
        }

        extract_content(&body)
    }

    /// Minimal JSON-mode request against the chat model.
    ///
    /// Validates endpoint, credentials and model name before a run. Returns
    /// the model that answered.
    pub async fn check_connectivity(&self) -> Result<String, ServiceError> {
        let payload = json!({
            "model": self.chat.model,
            "messages": [
                {"role": "system", "content": "You are a connectivity check. Answer in JSON."},
                {"role": "user", "content": "Return {\"ok\": true} as JSON."}
            ],
            "temperature": 0.0,
            "max_tokens": 16,
            "response_format": {"type": "json_object"}
        });

        tracing::info!(endpoint = %self.endpoint, model = %self.chat.model, "Checking analysis service connectivity");
        self.post(&self.chat, &payload).await?;
        Ok(self.chat.model.clone())
    }
}

#[async_trait]
impl AnalysisService for DeepSeekClient {
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, ServiceError> {
        let tier = self.settings(request.tier);
        let payload = json!({
            "model": tier.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_content}
            ],
            "temperature": tier.temperature,
            "max_tokens": tier.max_tokens,
            "response_format": {"type": "json_object"}
        });

        tracing::trace!(tier = %request.tier, model = %tier.model, "Sending analysis request");
        self.post(tier, &payload).await
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        &self.settings(tier).model
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Network(err.to_string())
    }
}

/// Map a non-success HTTP status to a classified [`ServiceError`]
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ServiceError {
    let code = status.as_u16();
    let message = truncate(body.trim(), MAX_ERROR_BODY);

    match code {
        401 | 403 => ServiceError::Unauthorized { status: code, message },
        402 => ServiceError::QuotaExceeded { status: code, message },
        429 => ServiceError::RateLimited { retry_after },
        408 => ServiceError::Server { status: code, message },
        _ if status.is_server_error() => ServiceError::Server { status: code, message },
        _ => ServiceError::Rejected { status: code, message },
    }
}

/// `Retry-After` as delta-seconds or HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Pull `choices[0].message.content` out of a chat-completions body
pub fn extract_content(body: &str) -> Result<String, ServiceError> {
    if body.trim().is_empty() {
        return Err(MalformedResponse::Empty.into());
    }

    let root: Value = serde_json::from_str(body)
        .map_err(|e| MalformedResponse::InvalidJson(e.to_string()))?;

    let message = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or(MalformedResponse::MissingField("choices"))?
        .get("message")
        .ok_or(MalformedResponse::MissingField("message"))?;

    match message.get("content").and_then(Value::as_str) {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(MalformedResponse::Empty.into()),
    }
}

/// Operator-facing explanation of a failed connectivity check
pub fn describe_probe_failure(err: &ServiceError) -> String {
    match err {
        ServiceError::Unauthorized { status: 401, .. } => {
            "API key rejected (401): check DEEPSEEK_API_KEY".to_string()
        }
        ServiceError::Unauthorized { status, .. } => {
            format!("API key not permitted for this endpoint or model ({})", status)
        }
        ServiceError::Rejected { status: 404, .. } => {
            "Endpoint or model not found (404): check DEEPSEEK_ENDPOINT and model names".to_string()
        }
        ServiceError::QuotaExceeded { .. } => "Account balance or quota exhausted (402)".to_string(),
        other => format!("Connectivity check failed: {}", other),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let s = |code: u16| StatusCode::from_u16(code).unwrap();

        assert!(matches!(classify_status(s(401), None, ""), ServiceError::Unauthorized { status: 401, .. }));
        assert!(matches!(classify_status(s(403), None, ""), ServiceError::Unauthorized { status: 403, .. }));
        assert!(matches!(classify_status(s(402), None, ""), ServiceError::QuotaExceeded { .. }));
        assert_eq!(
            classify_status(s(429), Some(Duration::from_secs(2)), ""),
            ServiceError::RateLimited { retry_after: Some(Duration::from_secs(2)) }
        );
        assert!(matches!(classify_status(s(503), None, ""), ServiceError::Server { status: 503, .. }));
        assert!(matches!(classify_status(s(408), None, ""), ServiceError::Server { .. }));
        assert!(matches!(classify_status(s(400), None, "bad"), ServiceError::Rejected { status: 400, .. }));
        assert!(matches!(classify_status(s(404), None, ""), ServiceError::Rejected { status: 404, .. }));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        // Past date clamps to zero
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"proposals\": []}"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), r#"{"proposals": []}"#);

        assert_eq!(
            extract_content(r#"{"choices": [{"message": {"content": ""}}]}"#),
            Err(ServiceError::Malformed(MalformedResponse::Empty))
        );
        assert_eq!(
            extract_content(r#"{"choices": []}"#),
            Err(ServiceError::Malformed(MalformedResponse::MissingField("choices")))
        );
        assert!(matches!(
            extract_content("<html>"),
            Err(ServiceError::Malformed(MalformedResponse::InvalidJson(_)))
        ));
    }

    #[test]
    fn test_error_body_truncated() {
        let long = "x".repeat(2000);
        match classify_status(StatusCode::BAD_REQUEST, None, &long) {
            ServiceError::Rejected { message, .. } => assert!(message.len() < 600),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_model_for_tier() {
        let client = DeepSeekClient::new(ClientSettings {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: "sk-test".to_string(),
            chat: TierSettings::chat(DEFAULT_CHAT_MODEL),
            reasoner: TierSettings::reasoner(DEFAULT_REASONER_MODEL),
            requests_per_second: Some(5),
        })
        .unwrap();

        assert_eq!(client.model_for(ModelTier::Chat), "deepseek-chat");
        assert_eq!(client.model_for(ModelTier::Reasoner), "deepseek-reasoner");
        assert_eq!(client.settings(ModelTier::Reasoner).timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_describe_probe_failure() {
        let msg = describe_probe_failure(&ServiceError::Rejected { status: 404, message: String::new() });
        assert!(msg.contains("404"));
        let msg = describe_probe_failure(&ServiceError::Unauthorized { status: 401, message: String::new() });
        assert!(msg.contains("DEEPSEEK_API_KEY"));
    }
}
