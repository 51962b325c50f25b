use crate::event_bus::{Event, EventBus, EventEmitter};
use crate::impl_event_emitter;
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

/// Reply used whenever the conversational model cannot answer.
pub const APOLOGY: &str = "Sorry, I couldn't get a good answer right now.";

/// Trait representing an LLM provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Send one utterance with the fixed system preamble and return the reply.
    async fn send_prompt(&self, system: &str, prompt: &str) -> Result<String>;

    /// Model name of the provider.
    fn model_name(&self) -> &str {
        "Unknown"
    }
}

/// Offline provider used when no remote model is configured.
pub struct LocalProvider {
    assistant_name: String,
}

impl LocalProvider {
    pub fn new(assistant_name: &str) -> Self {
        Self { assistant_name: assistant_name.to_string() }
    }
}

#[async_trait]
impl LLMProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn send_prompt(&self, _system: &str, _prompt: &str) -> Result<String> {
        Ok(format!(
            "{} can help with tasks, notes, reminders and weather. Try \"add task milk\" or \"weather Bangalore\".",
            self.assistant_name
        ))
    }
}

/// System preamble sent with every fallback call.
pub fn system_prompt(assistant_name: &str) -> String {
    format!(
        "You are {name}, AI Smart Assistant for Smart Life Manager.\n\
         Always respond as {name} and never reveal service identity.\n\
         You assist with Tasks, Notes, Reminders, Weather, Clear operations.\n\n\
         Confirm actions with ✅ or ❌.\n\
         Give friendly, helpful, concise responses.",
        name = assistant_name
    )
}

/// Forwards unmatched utterances to the first provider. Stateless per call.
pub struct LLMManager {
    providers: Vec<Box<dyn LLMProvider>>,
    system_prompt: String,
    event_bus: Option<Arc<EventBus>>,
}

impl LLMManager {
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, system_prompt: String) -> Self {
        Self {
            providers,
            system_prompt,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Name and model of the active provider.
    pub fn describe(&self) -> String {
        match self.providers.first() {
            Some(p) => format!("{} ({})", p.name(), p.model_name()),
            None => "none".to_string(),
        }
    }

    /// Send a prompt to the first available provider.
    pub async fn send_prompt(&self, prompt: &str) -> Result<String> {
        let provider = self
            .providers
            .first()
            .ok_or_else(|| anyhow::anyhow!("No providers available"))?;

        let _ = self
            .emit_event(Event::APICallStarted {
                provider: provider.name().to_string(),
                model: provider.model_name().to_string(),
            })
            .await;

        let result = provider.send_prompt(&self.system_prompt, prompt).await;

        match &result {
            Ok(response) => {
                let _ = self
                    .emit_event(Event::APICallCompleted {
                        provider: provider.name().to_string(),
                        chars: response.len(),
                    })
                    .await;
            }
            Err(e) => {
                let _ = self
                    .emit_event(Event::APIError {
                        provider: provider.name().to_string(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        result
    }

    /// Reply to free-form conversation; any failure becomes [`APOLOGY`].
    pub async fn converse(&self, utterance: &str) -> String {
        match self.send_prompt(utterance).await {
            Ok(reply) if !reply.trim().is_empty() => {
                info!("Fallback answered via {}", self.describe());
                reply.trim().to_string()
            }
            Ok(_) => {
                warn!("Fallback returned an empty reply");
                APOLOGY.to_string()
            }
            Err(e) => {
                warn!("Fallback failed: {:#}", e);
                APOLOGY.to_string()
            }
        }
    }
}

impl_event_emitter!(LLMManager);

#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Scripted provider that records what it was sent.
    pub struct FakeProvider {
        pub reply: Option<String>,
        pub seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeProvider {
        pub fn replying(reply: &str) -> Self {
            Self { reply: Some(reply.to_string()), seen: Arc::new(Mutex::new(Vec::new())) }
        }

        pub fn failing() -> Self {
            Self { reply: None, seen: Arc::new(Mutex::new(Vec::new())) }
        }
    }

    #[async_trait]
    impl LLMProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send_prompt(&self, system: &str, prompt: &str) -> Result<String> {
            self.seen.lock().await.push((system.to_string(), prompt.to_string()));
            self.reply.clone().ok_or_else(|| anyhow::anyhow!("HTTP 503"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;

    #[tokio::test]
    async fn test_converse_relays_reply_with_preamble() {
        let provider = FakeProvider::replying("Hi there!");
        let seen = provider.seen.clone();
        let manager = LLMManager::new(vec![Box::new(provider)], system_prompt("Sara"));

        assert_eq!(manager.converse("tell me a joke").await, "Hi there!");

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with("You are Sara"));
        assert_eq!(seen[0].1, "tell me a joke");
    }

    #[tokio::test]
    async fn test_failure_becomes_apology_and_is_counted() {
        let bus = Arc::new(EventBus::new(16));
        let manager = LLMManager::new(vec![Box::new(FakeProvider::failing())], system_prompt("Sara"))
            .with_event_bus(bus.clone());

        assert_eq!(manager.converse("anything").await, APOLOGY);

        let metrics = bus.get_metrics().await;
        assert_eq!(metrics.api_calls, 1);
        assert_eq!(metrics.api_failures, 1);
    }

    #[tokio::test]
    async fn test_no_provider_is_an_apology() {
        let manager = LLMManager::new(Vec::new(), system_prompt("Sara"));
        assert_eq!(manager.converse("hello?").await, APOLOGY);
    }

    #[tokio::test]
    async fn test_local_provider_names_the_assistant() {
        let manager = LLMManager::new(vec![Box::new(LocalProvider::new("Ada"))], system_prompt("Ada"));
        assert!(manager.converse("what can you do").await.starts_with("Ada can help"));
    }
}
