//! Vision model client
//!
//! Speaks the OpenAI-compatible chat completions protocol: one user message
//! carrying the instruction text and the image as a base64 data URL, JSON
//! object output requested, temperature 0. A call is bounded by the
//! configured timeout and is never retried.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::template::InstructionTemplate;
use super::ExtractionError;
use crate::config::ExtractionConfig;
use crate::vision::ImageFormat;

/// Image handed to the model
#[derive(Debug, Clone, Copy)]
pub struct ImagePayload<'a> {
    pub data: &'a [u8],
    pub format: ImageFormat,
}

impl ImagePayload<'_> {
    /// `data:` URL embedding the image
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), STANDARD.encode(self.data))
    }
}

/// JSON object the model replied with, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelResponse {
    pub content: Map<String, Value>,
}

/// Something that can read document fields out of an image
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Send one image with the instruction template and return the parsed reply
    async fn extract(
        &self,
        image: ImagePayload<'_>,
        template: &InstructionTemplate,
    ) -> Result<RawModelResponse, ExtractionError>;

    /// Model identifier reported in results
    fn model(&self) -> &str;

    /// Image detail hint reported in results
    fn detail(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: String,
    detail: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible vision model
#[derive(Debug, Clone)]
pub struct VisionModelClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    detail: String,
    max_tokens: u32,
}

impl VisionModelClient {
    /// Build a client, reading the credential from the environment
    /// variable named by `api_key_env`
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        Self::new(config, api_key)
    }

    /// Build a client with an explicit credential
    pub fn new(config: &ExtractionConfig, api_key: impl Into<String>) -> Result<Self, ExtractionError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ExtractionError::Initialization(format!(
                "{} is not set",
                config.api_key_env
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ExtractionError::Initialization(format!("HTTP client: {}", e)))?;

        let endpoint = format!("{}/chat/completions", config.api_base_url.trim_end_matches('/'));
        info!("Vision model client ready: {} via {}", config.model, endpoint);

        Ok(Self {
            http,
            endpoint,
            api_key,
            model: config.model.clone(),
            detail: config.detail.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn request_body<'a>(&'a self, image: &ImagePayload<'_>, template: &'a InstructionTemplate) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: template.text() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url(),
                            detail: &self.detail,
                        },
                    },
                ],
            }],
            temperature: 0.0,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        }
    }
}

#[async_trait]
impl ExtractionClient for VisionModelClient {
    async fn extract(
        &self,
        image: ImagePayload<'_>,
        template: &InstructionTemplate,
    ) -> Result<RawModelResponse, ExtractionError> {
        debug!(
            "Sending {} byte {} image to {} (template {})",
            image.data.len(),
            image.format.mime_type(),
            self.model,
            template.version()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&image, template))
            .send()
            .await
            .map_err(|e| ExtractionError::ExternalService(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::ExternalService(format!(
                "vision API returned {}",
                status
            )));
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::ExternalService(format!("unreadable API response: {}", e)))?;

        let content = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::JsonParse("model returned no content".to_string()))?;

        parse_model_content(&content).map(|content| RawModelResponse { content })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn detail(&self) -> &str {
        &self.detail
    }
}

/// Parse the model's text reply as a JSON object. The raw text is not
/// carried into the error.
pub fn parse_model_content(content: &str) -> Result<Map<String, Value>, ExtractionError> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ExtractionError::JsonParse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ExtractionError::JsonParse(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "vision API request timed out".to_string()
    } else if e.is_connect() {
        format!("cannot reach vision API: {}", e)
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn test_config(base_url: String) -> ExtractionConfig {
        ExtractionConfig {
            api_base_url: base_url,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn completion(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    fn payload(data: &[u8]) -> ImagePayload<'_> {
        ImagePayload { data, format: ImageFormat::Jpeg }
    }

    #[test]
    fn test_missing_key_is_initialization_error() {
        let config = ExtractionConfig {
            api_key_env: "IDSCAN_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let err = VisionModelClient::from_config(&config).unwrap_err();
        assert!(matches!(err, ExtractionError::Initialization(_)));
        assert!(err.to_string().contains("IDSCAN_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_data_url() {
        let url = ImagePayload { data: b"abc", format: ImageFormat::Png }.data_url();
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_parse_model_content() {
        let map = parse_model_content(r#"{"name": "A"}"#).unwrap();
        assert_eq!(map["name"], "A");

        assert!(matches!(
            parse_model_content("Sure! Here is the data"),
            Err(ExtractionError::JsonParse(_))
        ));
        assert!(matches!(parse_model_content("[1, 2]"), Err(ExtractionError::JsonParse(_))));
    }

    #[tokio::test]
    async fn test_request_shape_and_success() {
        let captured: Arc<Mutex<Option<(HeaderMap, Value)>>> = Arc::default();
        let sink = captured.clone();
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some((headers, body));
                    Json(completion(r#"{"document_type": "pan", "name": "Priya"}"#))
                }
            }),
        );
        let base = spawn_stub(router).await;
        let client = VisionModelClient::new(&test_config(base), "sk-test").unwrap();

        let response = client
            .extract(payload(b"jpeg-bytes"), &InstructionTemplate::builtin())
            .await
            .unwrap();
        assert_eq!(response.content["document_type"], "pan");

        let (headers, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 1500);
        assert_eq!(body["response_format"]["type"], "json_object");

        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], InstructionTemplate::builtin().text());
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["detail"], "high");
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_parse_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(completion("I cannot read this document.")) }),
        );
        let client = VisionModelClient::new(&test_config(spawn_stub(router).await), "k").unwrap();

        let err = client
            .extract(payload(b"x"), &InstructionTemplate::builtin())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::JsonParse(_)));
        assert!(!err.to_string().contains("cannot read this document"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_external_service_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"}))) }),
        );
        let client = VisionModelClient::new(&test_config(spawn_stub(router).await), "k").unwrap();

        let err = client
            .extract(payload(b"x"), &InstructionTemplate::builtin())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ExternalService(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_unreachable_is_external_service_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = test_config(format!("http://{}/v1", addr));
        let client = VisionModelClient::new(&config, "k").unwrap();
        let err = client
            .extract(payload(b"x"), &InstructionTemplate::builtin())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), crate::extraction::ErrorType::ExternalServiceError);
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let client = VisionModelClient::new(&test_config(spawn_stub(router).await), "k").unwrap();

        let err = client
            .extract(payload(b"x"), &InstructionTemplate::builtin())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::JsonParse(_)));
    }
}
