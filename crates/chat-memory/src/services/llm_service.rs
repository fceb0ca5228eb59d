use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::chat::Message;
use crate::services::conversation::manager::GenerationInvoker;
use crate::services::conversation::SessionContext;

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WireMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client used as the generation invoker.
///
/// Frames each request as: configured system prompt, then the window.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
    system_prompt: String,
}

impl LlmService {
    pub fn new(config: LlmConfig, system_prompt: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            system_prompt,
        })
    }

    pub fn frame<'a>(&'a self, window: &'a [Message]) -> Vec<WireMessage<'a>> {
        let mut messages = Vec::with_capacity(window.len() + 1);
        if !self.system_prompt.trim().is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: &self.system_prompt,
            });
        }
        messages.extend(window.iter().map(|m| WireMessage {
            role: m.role().wire_name(),
            content: m.content(),
        }));
        messages
    }

    /// Generate completion without streaming (wait for full response)
    pub async fn generate_chat(&self, window: &[Message]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: self.frame(window),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };
        debug!(
            "Starting chat generation with {} messages",
            request.messages.len()
        );

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = self.config.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to call LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error: {} - {}", status, body);
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No choices returned from LLM"))
    }
}

#[async_trait::async_trait]
impl GenerationInvoker for LlmService {
    async fn generate(&self, window: &[Message], context: &SessionContext) -> Result<String> {
        debug!(
            "Generating for session {} (window cost {}, history {})",
            context.session_id, context.window_cost, context.history_len
        );
        self.generate_chat(window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{Role, SessionId};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            base_url,
            model: "gpt-4".to_string(),
            api_key: api_key.map(str::to_string),
            timeout_seconds: 5,
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    fn context() -> SessionContext {
        SessionContext {
            session_id: SessionId::parse("user_session_1").unwrap(),
            history_len: 3,
            window_cost: 3,
        }
    }

    fn window() -> Vec<Message> {
        vec![
            Message::new(0, Role::Human, "Hello"),
            Message::new(1, Role::Assistant, "Hello how are you"),
            Message::new(2, Role::Human, "Hello world"),
        ]
    }

    #[test]
    fn test_frame_prepends_system_prompt() {
        let service = LlmService::new(
            config("http://localhost".into(), None),
            "You are a helpful assistant".into(),
        )
        .unwrap();
        let window = window();

        let framed = service.frame(&window);

        assert_eq!(framed.len(), 4);
        assert_eq!(
            framed[0],
            WireMessage { role: "system", content: "You are a helpful assistant" }
        );
        assert_eq!(framed[2], WireMessage { role: "assistant", content: "Hello how are you" });
        assert_eq!(framed[3], WireMessage { role: "user", content: "Hello world" });
    }

    #[test]
    fn test_frame_without_system_prompt() {
        let service = LlmService::new(config("http://localhost".into(), None), String::new()).unwrap();
        let window = window();
        assert_eq!(service.frame(&window).len(), 3);
    }

    #[tokio::test]
    async fn test_generate_posts_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "Be brief"},
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hello how are you"},
                    {"role": "user", "content": "Hello world"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hi there!"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service =
            LlmService::new(config(server.uri(), Some("sk-test")), "Be brief".into()).unwrap();

        let reply = service.generate(&window(), &context()).await.unwrap();
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn test_generate_reports_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let service = LlmService::new(config(server.uri(), None), String::new()).unwrap();

        let err = service.generate(&window(), &context()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("503"), "{text}");
        assert!(text.contains("overloaded"), "{text}");
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let service = LlmService::new(config(server.uri(), None), String::new()).unwrap();

        let err = service.generate(&window(), &context()).await.unwrap_err();
        assert!(err.to_string().contains("No choices"));
    }
}
