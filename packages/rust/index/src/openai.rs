//! Minimal client for the OpenAI-compatible embeddings and chat APIs.

use std::time::Duration;

use bcorag_shared::{BcoRagError, IndexSettings, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("bcorag/", env!("CARGO_PKG_VERSION"));

/// Sampling temperature for domain answers.
const TEMPERATURE: f64 = 0.1;

/// Maximum characters of an error body echoed into error messages.
const MAX_ERROR_BODY: usize = 300;

/// System prompt sent with every completion.
const SYSTEM_PROMPT: &str = "You are an expert curator of computational workflow metadata. \
Answer strictly from the context provided from the paper and follow the requested output format exactly.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Public results
// ---------------------------------------------------------------------------

/// Embeddings for a batch of inputs, in input order.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub embeddings: Vec<Vec<f32>>,
    /// Tokens billed for the whole batch.
    pub tokens: u64,
}

/// A chat completion and its token usage.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for one backend, one chat model and one embedding model.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    llm: String,
    embedding_model: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    /// Build a client from index settings.
    pub fn new(settings: &IndexSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| BcoRagError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            llm: settings.llm.clone(),
            embedding_model: settings.embedding_model.clone(),
            timeout_secs: settings.request_timeout_secs,
        })
    }

    /// The embedding model this client uses.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Embed a batch of inputs.
    #[instrument(skip_all, fields(model = %self.embedding_model, inputs = inputs.len()))]
    pub async fn embed(&self, inputs: &[String]) -> Result<EmbeddingBatch> {
        if inputs.is_empty() {
            return Ok(EmbeddingBatch {
                embeddings: Vec::new(),
                tokens: 0,
            });
        }

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: inputs,
        };
        let body: EmbeddingResponse = self.post("embeddings", &request).await?;

        if body.data.len() != inputs.len() {
            return Err(BcoRagError::Service(format!(
                "embeddings response has {} vectors for {} inputs",
                body.data.len(),
                inputs.len()
            )));
        }

        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        let tokens = body.usage.map(|u| u.total_tokens).unwrap_or(0);

        debug!(tokens, "embedded batch");

        Ok(EmbeddingBatch {
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
            tokens,
        })
    }

    /// Ask the chat model a single-turn question.
    #[instrument(skip_all, fields(model = %self.llm, prompt_chars = prompt.len()))]
    pub async fn complete(&self, prompt: &str) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.llm,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
        };
        let body: ChatResponse = self.post("chat/completions", &request).await?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BcoRagError::Service("completion has no choices".into()))?;
        let text = choice
            .message
            .content
            .ok_or_else(|| BcoRagError::Service("completion has no message content".into()))?;
        let usage = body.usage.unwrap_or_default();

        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion received"
        );

        Ok(Completion {
            text,
            model: body.model.unwrap_or_else(|| self.llm.clone()),
            finish_reason: choice.finish_reason,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
    }

    /// POST a JSON body to `{base_url}/{path}` and decode the JSON answer.
    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status.as_u16(), &text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(&url, e))?;

        serde_json::from_str(&text).map_err(|e| {
            BcoRagError::Service(format!(
                "{url}: malformed response: {e} (got: {})",
                truncate(&text, MAX_ERROR_BODY)
            ))
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    fn map_transport_error(&self, url: &str, e: reqwest::Error) -> BcoRagError {
        if e.is_timeout() {
            BcoRagError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            BcoRagError::Network(format!("{url}: {e}"))
        }
    }
}

/// Map a non-success HTTP status to a service error.
fn map_status_error(status: u16, body: &str) -> BcoRagError {
    let body = truncate(body, MAX_ERROR_BODY);
    match status {
        401 | 403 => BcoRagError::Service(format!("authentication failed (HTTP {status}): {body}")),
        429 => BcoRagError::Service(format!("rate limited (HTTP 429): {body}")),
        _ => BcoRagError::Service(format!("HTTP {status}: {body}")),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base: &str) -> IndexSettings {
        IndexSettings {
            api_key: "sk-test".into(),
            base_url: Url::parse(base).unwrap(),
            llm: "gpt-test".into(),
            embedding_model: "embed-test".into(),
            request_timeout_secs: 5,
            chunk_size: 1_000,
            chunk_overlap: 100,
            top_k: 2,
            embed_batch_size: 8,
        }
    }

    #[test]
    fn endpoint_joins_paths() {
        let client = OpenAiClient::new(&settings("https://api.example.com/v1/")).unwrap();
        assert_eq!(
            client.endpoint("embeddings"),
            "https://api.example.com/v1/embeddings"
        );
    }

    #[test]
    fn status_errors_are_classified() {
        assert!(map_status_error(401, "bad key").to_string().contains("authentication"));
        assert!(map_status_error(429, "").to_string().contains("rate limited"));
        assert!(map_status_error(500, "boom").to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn embed_orders_by_index() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "embed-test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ],
                "usage": {"prompt_tokens": 7, "total_tokens": 7}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&settings(&server.uri())).unwrap();
        let batch = client
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(batch.embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(batch.tokens, 7);
    }

    #[tokio::test]
    async fn embed_rejects_short_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&settings(&server.uri())).unwrap();
        let err = client
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, BcoRagError::Service(_)));
    }

    #[tokio::test]
    async fn complete_returns_text_and_usage() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-test-0125",
                "choices": [{
                    "message": {"role": "assistant", "content": "[\"a\"]"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&settings(&server.uri())).unwrap();
        let completion = client.complete("give me a domain").await.unwrap();

        assert_eq!(completion.text, "[\"a\"]");
        assert_eq!(completion.model, "gpt-test-0125");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.prompt_tokens, 120);
        assert_eq!(completion.completion_tokens, 8);
        assert_eq!(completion.total_tokens, 128);
    }

    #[tokio::test]
    async fn complete_maps_http_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&settings(&server.uri())).unwrap();
        let err = client.complete("q").await.unwrap_err();
        assert!(err.is_service_failure());
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn complete_rejects_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&settings(&server.uri())).unwrap();
        let err = client.complete("q").await.unwrap_err();
        assert!(err.to_string().contains("malformed response"));
    }
}
