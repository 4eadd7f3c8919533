//! Text-completion client for the chat endpoint.
//!
//! The completion API is an opaque collaborator with a fixed token
//! budget. The chat route deliberately soft-fails on upstream errors
//! (see the handler); this client only reports them.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Reply served when the completion provider is unavailable, so a
/// transient outage does not break the chat flow.
pub const FALLBACK_REPLY: &str =
    "I seem to have lost my train of thought. Give me a moment and ask again.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl CompletionClient {
    pub fn new(url: &str, api_key: &str, model: &str, max_tokens: u32) -> Result<Self> {
        assert!(!url.is_empty(), "Completion URL must be provided");
        assert!(!model.is_empty(), "Completion model must be provided");
        assert!(max_tokens >= 16, "Token budget too small to be useful");
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build completion HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
        })
    }

    pub async fn complete(
        &self,
        system_prompt: Option<&str>,
        history: &[ChatTurn],
        prompt: &str,
    ) -> Result<String> {
        assert!(!prompt.is_empty(), "Prompt must not be empty");
        assert!(
            history.len() <= 100,
            "Conversation history exceeds defensive limit"
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = system_prompt {
            messages.push(ChatTurn {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.extend_from_slice(history);
        messages.push(ChatTurn {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "max_tokens": self.max_tokens,
            }))
            .send()
            .await
            .context("Completion request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Completion provider answered status {}",
                response.status()
            ));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .context("Completion response was not valid JSON")?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Completion response had no choices"))?;
        Ok(reply)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_response_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello there"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello there");
    }

    #[test]
    fn empty_choices_is_an_error_shape() {
        let raw = r#"{"choices":[]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
