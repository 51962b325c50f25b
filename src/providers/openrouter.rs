use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use serde_json::{Value, json};
use std::env;

use crate::config::LlmConfig;
use crate::llm_manager::LLMProvider;

#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Build from config, reading the key from `OPENROUTER_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable not set")?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build OpenRouter HTTP client")?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            endpoint: config.endpoint.clone(),
            api_key,
            client,
        })
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": self.max_tokens,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

/// `choices[0].message.content`, or an error for any other shape.
fn reply_text(json: &Value) -> Result<String> {
    if let Some(err) = json.get("error") {
        return Err(anyhow!("OpenRouter returned an error: {}", err));
    }
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No content in OpenRouter response"))
}

#[async_trait]
impl LLMProvider for OpenRouterProvider {
    fn name(&self) -> &str { "openrouter" }
    fn model_name(&self) -> &str { &self.model }

    async fn send_prompt(&self, system: &str, prompt: &str) -> Result<String> {
        let req_body = self.request_body(system, prompt);
        let resp = self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "http://localhost:8081")
            .header("X-Title", "smart_life")
            .json(&req_body)
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("OpenRouter API error {}: {}", status, text));
        }
        let json: Value = resp.json().await.context("Failed to parse OpenRouter response")?;
        debug!("OpenRouter response: {}", json);
        reply_text(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(temperature: Option<f32>) -> OpenRouterProvider {
        let config = LlmConfig { temperature, ..LlmConfig::default() };
        OpenRouterProvider::with_key(&config, "test_key".to_string()).unwrap()
    }

    #[test]
    fn test_request_carries_system_and_single_utterance() {
        let body = provider(None).request_body("be brief", "hello");
        assert_eq!(body["model"], "anthropic/claude-3-haiku");
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_temperature_is_optional() {
        let body = provider(Some(0.5)).request_body("s", "p");
        assert_eq!(body["temperature"], 0.5);
    }

    #[test]
    fn test_reply_text_shapes() {
        let ok = json!({"choices": [{"message": {"content": "Sure!"}}]});
        assert_eq!(reply_text(&ok).unwrap(), "Sure!");
        assert!(reply_text(&json!({"error": {"message": "rate limited"}})).is_err());
        assert!(reply_text(&json!({"choices": []})).is_err());
    }
}
