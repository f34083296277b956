//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{FeedbackError, Result};
use crate::prompts;
use crate::vision::{VisionClient, VisionRequest};

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Upper bound on how much of an error body ends up in an error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    response_format: ResponseFormat,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlContent },
}

#[derive(Debug, Serialize)]
struct ImageUrlContent {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// [`VisionClient`] backed by `POST {base_url}/chat/completions`.
pub struct OpenAiVisionClient {
    config: OpenAiConfig,
    auth_header: String,
    http_client: reqwest::Client,
}

impl OpenAiVisionClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(FeedbackError::Config("OpenAI API key is empty".to_string()));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("snapfeedback/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| FeedbackError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            auth_header: format!("Bearer {}", config.api_key),
            config,
            http_client,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request<'a>(&'a self, request: &VisionRequest) -> ChatRequest<'a> {
        let mut parts = Vec::with_capacity(request.images.len() + 3);
        parts.push(ContentPart::Text {
            text: request.prompt.clone(),
        });
        if let Some(context) = request.context.as_deref() {
            parts.push(ContentPart::Text {
                text: prompts::activity_context(context),
            });
        }
        if let Some(instruction) = prompts::multi_image_instruction(request.images.len()) {
            parts.push(ContentPart::Text { text: instruction });
        }
        parts.extend(request.images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrlContent {
                url: image.to_data_url(),
                detail: "low",
            },
        }));

        ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content: parts,
            }],
            response_format: ResponseFormat {
                r#type: "json_object",
            },
            max_tokens: request.max_output_tokens,
        }
    }
}

#[async_trait]
impl VisionClient for OpenAiVisionClient {
    #[instrument(
        skip_all,
        fields(kind = request.kind.as_str(), subject = %request.subject, images = request.images.len())
    )]
    async fn call(&self, request: VisionRequest) -> Result<String> {
        let body = self.build_request(&request);
        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await
            .map_err(|e| FeedbackError::Service(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(FeedbackError::Service(format!(
                "vision model returned {status}: {snippet}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| FeedbackError::Service(format!("malformed completion envelope: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!(bytes = content.len(), "vision model responded");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{EncodedImage, RequestKind};
    use serde_json::{json, Value};
    use snapfeedback_state::Subject;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiVisionClient {
        OpenAiVisionClient::new(OpenAiConfig::new("sk-test").with_base_url(server.uri())).unwrap()
    }

    fn request(images: usize, context: Option<&str>) -> VisionRequest {
        VisionRequest {
            kind: RequestKind::Evaluation,
            subject: Subject::Playground,
            prompt: "Rate the room".to_string(),
            context: context.map(str::to_string),
            images: (0..images)
                .map(|i| EncodedImage::from_bytes("image/png", format!("img{i}").as_bytes()))
                .collect(),
            max_output_tokens: 1500,
        }
    }

    fn completion(content: &str) -> Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    async fn sent_body(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        serde_json::from_slice(&requests[0].body).unwrap()
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(matches!(
            OpenAiVisionClient::new(OpenAiConfig::new("  ")),
            Err(FeedbackError::Config(_))
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = OpenAiConfig::new("k").with_base_url("http://localhost:9000/v1/");
        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn sends_parts_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
            .mount(&server)
            .await;

        let raw = client_for(&server)
            .call(request(2, Some("Block area")))
            .await
            .unwrap();
        assert_eq!(raw, "{}");

        let body = sent_body(&server).await;
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 1500);
        assert_eq!(body["response_format"]["type"], "json_object");

        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0]["text"], "Rate the room");
        assert_eq!(parts[1]["text"], "Activity Description: Block area");
        assert!(parts[2]["text"].as_str().unwrap().contains("shown 2 images"));
        assert_eq!(parts[3]["type"], "image_url");
        assert_eq!(parts[3]["image_url"]["detail"], "low");
        assert_eq!(
            parts[3]["image_url"]["url"],
            EncodedImage::from_bytes("image/png", b"img0").to_data_url()
        );
        assert_eq!(
            parts[4]["image_url"]["url"],
            EncodedImage::from_bytes("image/png", b"img1").to_data_url()
        );
    }

    #[tokio::test]
    async fn single_image_without_context_sends_two_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
            .mount(&server)
            .await;

        client_for(&server).call(request(1, None)).await.unwrap();

        let body = sent_body(&server).await;
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
    }

    #[tokio::test]
    async fn non_success_status_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server).call(request(1, None)).await.unwrap_err();
        match err {
            FeedbackError::Service(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("rate limited"));
            }
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_service_error() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        drop(server);

        let err = client.call(request(1, None)).await.unwrap_err();
        assert!(matches!(err, FeedbackError::Service(_)));
    }

    #[tokio::test]
    async fn missing_content_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "choices": [{ "message": { "content": null } }] })),
            )
            .mount(&server)
            .await;

        let raw = client_for(&server).call(request(1, None)).await.unwrap();
        assert_eq!(raw, "");
        assert!(crate::validation::validate_evaluation(&raw).is_err());
    }
}
