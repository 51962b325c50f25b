use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDate};
use log::{debug, info};
use tokio::sync::Mutex;

use crate::backend::ResourceKind;
use crate::config::AssistantConfig;
use crate::dispatcher::{Action, Dispatcher};
use crate::event_bus::{Event, EventBus, EventEmitter};
use crate::extract::extract;
use crate::impl_event_emitter;
use crate::intent::{self, Intent};
use crate::llm_manager::LLMManager;
use crate::transcript::{Section, Speaker, Transcript, TranscriptEntry};
use crate::wizard::{Advance, Start, Wizard};

/// Where a turn is. Every turn ends back at `Idle` before its reply is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Classifying,
    Dispatching,
    WizardCollecting,
    Conversing,
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

struct SessionState {
    section: Section,
    transcript: Transcript,
    wizard: Option<Wizard>,
    phase: TurnPhase,
}

/// Clears the processing flag when a turn ends, however it ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-turn dialogue engine: one submission is processed to completion
/// before the next is accepted.
pub struct Assistant {
    name: String,
    default_city: String,
    dispatcher: Dispatcher,
    llm: LLMManager,
    state: Mutex<SessionState>,
    processing: AtomicBool,
    clock: Clock,
    event_bus: Option<Arc<EventBus>>,
}

impl Assistant {
    pub fn new(config: &AssistantConfig, dispatcher: Dispatcher, llm: LLMManager) -> Self {
        Self {
            name: config.name.clone(),
            default_city: config.default_city.clone(),
            dispatcher,
            llm,
            state: Mutex::new(SessionState {
                section: Section::Tasks,
                transcript: Transcript::new(),
                wizard: None,
                phase: TurnPhase::Idle,
            }),
            processing: AtomicBool::new(false),
            clock: Arc::new(|| Local::now().date_naive()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Replace the source of "today" used for date defaults.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub async fn section(&self) -> Section {
        self.state.lock().await.section
    }

    pub async fn phase(&self) -> TurnPhase {
        self.state.lock().await.phase
    }

    pub async fn has_open_form(&self) -> bool {
        self.state.lock().await.wizard.is_some()
    }

    pub async fn history(&self, section: Section) -> Vec<TranscriptEntry> {
        self.state.lock().await.transcript.entries(section).to_vec()
    }

    pub async fn message_count(&self) -> usize {
        self.state.lock().await.transcript.len()
    }

    /// Forget every section's history and any open form.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.transcript.reset();
        state.wizard = None;
        info!("Session reset");
    }

    /// Process one user submission and return the appended reply.
    ///
    /// Returns `None` without side effects when the input is blank or when
    /// another turn is still in flight.
    pub async fn submit(&self, raw: &str) -> Option<TranscriptEntry> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Dropping submission while a turn is in flight: {}", text);
            let _ = self.emit_event(Event::TurnDropped { text: text.to_string() }).await;
            return None;
        }
        let _guard = ProcessingGuard(&self.processing);

        let mut state = self.state.lock().await;
        let origin = state.section;
        let greeted = state.transcript.last_reply_contains(origin, &self.introduction());
        state.transcript.append(origin, Speaker::User, text);
        let _ = self
            .emit_event(Event::TurnStarted { section: origin.to_string(), text: text.to_string() })
            .await;

        let reply = self.handle(&mut state, text, greeted).await;

        state.phase = TurnPhase::Idle;
        let section = state.section;
        let entry = state.transcript.append(section, Speaker::Assistant, reply);
        let _ = self
            .emit_event(Event::ReplyAppended { section: section.to_string(), text: entry.text.clone() })
            .await;
        Some(entry)
    }

    /// First line of the greeting; its presence means the assistant already introduced itself.
    fn introduction(&self) -> String {
        format!("👋 Hey! I'm {}, your AI Smart Assistant.", self.name)
    }

    async fn handle(&self, state: &mut SessionState, text: &str, greeted: bool) -> String {
        state.phase = TurnPhase::Classifying;
        let normalized = intent::normalize(text);

        if intent::is_cancel(&normalized) {
            return match state.wizard.take() {
                Some(_) => "🚫 Form cancelled.".to_string(),
                None => "Nothing to cancel right now.".to_string(),
            };
        }

        let classified = intent::classify(&normalized);

        if state.wizard.is_some() {
            match classified {
                Some(intent) if intent.is_direct_command() => {
                    info!("{:?} replaces the open form", intent);
                    state.wizard = None;
                }
                _ => return self.advance_form(state, text).await,
            }
        }

        match classified {
            Some(intent) => self.run_intent(state, intent, text, greeted).await,
            None => {
                state.phase = TurnPhase::Conversing;
                self.llm.converse(text).await
            }
        }
    }

    async fn run_intent(&self, state: &mut SessionState, intent: Intent, text: &str, greeted: bool) -> String {
        debug!("Classified {:?} as {:?}", text, intent);
        let today = (self.clock)();
        match intent {
            Intent::Greeting if greeted => {
                "What can I help you with? Try \"Add task milk\" or \"Weather Bangalore\".".to_string()
            }
            Intent::Greeting => format!("{}\nHow can I help you today?", self.introduction()),
            Intent::Navigate(section) => {
                let from = state.section;
                state.section = section;
                state.wizard = None;
                let _ = self
                    .emit_event(Event::SectionChanged { from: from.to_string(), to: section.to_string() })
                    .await;
                format!("✅ Switched to {} section", section.label())
            }
            Intent::Clear(kind) => self.dispatch(state, &Action::DeleteAll(kind)).await,
            Intent::ClearAll => self.start(state, Wizard::start_clear_all()).await,
            Intent::SortTasks(key) => self.dispatch(state, &Action::SortTasks(key)).await,
            Intent::List(listing) => self.dispatch(state, &Action::List(listing)).await,
            Intent::Add(kind) => {
                let start = Wizard::start_add(kind, &extract(intent, text), today);
                self.start(state, start).await
            }
            Intent::QuickTask => {
                let start = Wizard::start_add(ResourceKind::Task, &extract(intent, text), today);
                self.start(state, start).await
            }
            Intent::Edit(kind) => self.start(state, Wizard::start_edit(kind, &extract(intent, text))).await,
            Intent::Delete(kind) => self.start(state, Wizard::start_delete(kind, &extract(intent, text))).await,
            Intent::Weather => self.start(state, Wizard::start_weather(&extract(intent, text))).await,
            Intent::Unrecognized => {
                "⚠️ Command not recognized. Try: add task, edit task, weather [city], clear all tasks".to_string()
            }
        }
    }

    async fn start(&self, state: &mut SessionState, start: Start) -> String {
        match start {
            Start::Open(wizard, prompt) => {
                state.phase = TurnPhase::WizardCollecting;
                state.wizard = Some(wizard);
                prompt
            }
            Start::Ready(action) => self.dispatch(state, &action).await,
        }
    }

    async fn advance_form(&self, state: &mut SessionState, text: &str) -> String {
        state.phase = TurnPhase::WizardCollecting;
        let Some(mut wizard) = state.wizard.take() else {
            return "Nothing to fill in right now.".to_string();
        };
        match wizard.advance(text, (self.clock)(), &self.default_city) {
            Advance::Next(prompt) => {
                state.wizard = Some(wizard);
                prompt
            }
            Advance::Reprompt(message) => {
                state.wizard = Some(wizard);
                message
            }
            Advance::Complete(action) => self.dispatch(state, &action).await,
        }
    }

    async fn dispatch(&self, state: &mut SessionState, action: &Action) -> String {
        state.phase = TurnPhase::Dispatching;
        self.dispatcher.dispatch(action).await.message
    }
}

impl_event_emitter!(Assistant);

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use crate::backend::Method;
    use crate::backend::testing::FakeBackend;
    use crate::llm_manager::testing::FakeProvider;
    use crate::llm_manager::{APOLOGY, LocalProvider, system_prompt};
    use serde_json::json;
    use tokio::sync::Notify;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn assistant_with(backend: Arc<FakeBackend>, provider: FakeProvider) -> Assistant {
        let llm = LLMManager::new(vec![Box::new(provider)], system_prompt("Sara"));
        Assistant::new(&AssistantConfig::default(), Dispatcher::new(backend), llm).with_clock(today)
    }

    fn assistant(backend: Arc<FakeBackend>) -> Assistant {
        assistant_with(backend, FakeProvider::replying("model says hi"))
    }

    async fn say(assistant: &Assistant, text: &str) -> String {
        assistant.submit(text).await.expect("turn accepted").text
    }

    #[tokio::test]
    async fn test_add_task_wizard_submits_once() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());

        assert!(say(&sara, "add task").await.contains("Step 1/4"));
        say(&sara, "Buy milk").await;
        assert!(sara.submit("   ").await.is_none());
        assert!(sara.has_open_form().await);
        assert!(say(&sara, "skip").await.contains("Step 3/4"));
        say(&sara, "2025-12-01").await;
        let reply = say(&sara, "3").await;

        assert_eq!(reply, "✅ Task \"Buy milk\" added successfully!");
        let calls = backend.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(
            calls[0].body,
            Some(json!({"title": "Buy milk", "description": "", "due_date": "2025-12-01", "priority": 3}))
        );
        assert!(!sara.has_open_form().await);
        assert_eq!(sara.phase().await, TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_submission_while_processing_is_dropped() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(FakeBackend::new().gated(gate.clone()));
        let sara = Arc::new(assistant(backend.clone()));

        let first = {
            let sara = sara.clone();
            tokio::spawn(async move { sara.submit("clear all tasks").await })
        };
        while backend.calls().await.is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(sara.is_processing());
        assert!(sara.submit("clear all notes").await.is_none());

        gate.notify_one();
        let reply = first.await.unwrap().expect("first turn accepted");
        assert_eq!(reply.text, "✅ All tasks cleared.");
        assert_eq!(backend.call_keys().await, vec!["DELETE /tasks/clear_all"]);
        assert!(!sara.is_processing());
    }

    #[tokio::test]
    async fn test_clear_all_form() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());

        say(&sara, "clear all").await;
        let reprompt = say(&sara, "groceries").await;
        assert!(reprompt.contains("Unknown clear option"));
        assert!(backend.calls().await.is_empty());
        assert!(sara.has_open_form().await);

        assert_eq!(say(&sara, "weather").await, "✅ Weather history reset.");
        assert_eq!(backend.call_keys().await, vec!["DELETE /weather/history/reset"]);
        assert!(!sara.has_open_form().await);
    }

    #[tokio::test]
    async fn test_delete_task_with_id_dispatches_directly() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());
        assert_eq!(say(&sara, "delete task 5").await, "✅ Task 5 deleted!");
        assert_eq!(backend.call_keys().await, vec!["DELETE /tasks/5"]);
    }

    #[tokio::test]
    async fn test_quick_task_with_date() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());
        let opened = say(&sara, "task gym date: 03/12/2025").await;
        assert!(opened.contains("Step 2/4"));
        assert!(say(&sara, "none").await.contains("Step 4/4"));
        say(&sara, "2").await;
        let calls = backend.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body.as_ref().unwrap()["due_date"], "2025-03-12");
        assert_eq!(calls[0].body.as_ref().unwrap()["title"], "gym");
    }

    #[tokio::test]
    async fn test_greeting_twice() {
        let sara = assistant(Arc::new(FakeBackend::new()));
        assert!(say(&sara, "hi sara").await.contains("I'm Sara"));
        assert!(say(&sara, "hello").await.starts_with("What can I help you with?"));
    }

    #[tokio::test]
    async fn test_offline_reply_does_not_count_as_introduction() {
        let llm = LLMManager::new(vec![Box::new(LocalProvider::new("Sara"))], system_prompt("Sara"));
        let sara = Assistant::new(&AssistantConfig::default(), Dispatcher::new(Arc::new(FakeBackend::new())), llm)
            .with_clock(today);

        say(&sara, "tell me a joke").await;
        assert!(say(&sara, "hello").await.starts_with("👋 Hey! I'm Sara"));
        assert!(say(&sara, "hello").await.starts_with("What can I help you with?"));
    }

    #[tokio::test]
    async fn test_plural_tasks_does_not_open_a_form() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());
        for text in ["show me my tasks", "what tasks do I have"] {
            assert_eq!(
                say(&sara, text).await,
                "⚠️ Command not recognized. Try: add task, edit task, weather [city], clear all tasks"
            );
            assert!(!sara.has_open_form().await);
        }
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_id_dispatches_nothing() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());
        say(&sara, "delete task").await;
        assert!(say(&sara, "skip").await.contains("An ID is required"));
        assert!(sara.has_open_form().await);
        assert!(backend.calls().await.is_empty());

        assert_eq!(say(&sara, "5").await, "✅ Task 5 deleted!");
        assert_eq!(backend.call_keys().await, vec!["DELETE /tasks/5"]);
    }

    #[tokio::test]
    async fn test_unmatched_input_goes_to_model() {
        let provider = FakeProvider::replying("Why did the chicken...");
        let seen = provider.seen.clone();
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant_with(backend.clone(), provider);

        assert_eq!(say(&sara, "tell me a joke").await, "Why did the chicken...");
        assert_eq!(seen.lock().await[0].1, "tell me a joke");
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_apology() {
        let sara = assistant_with(Arc::new(FakeBackend::new()), FakeProvider::failing());
        assert_eq!(say(&sara, "tell me a joke").await, APOLOGY);
        assert_eq!(sara.phase().await, TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_backend_failure_returns_to_idle() {
        let backend = Arc::new(FakeBackend::new().fail("GET /notes"));
        let sara = assistant(backend);
        assert_eq!(say(&sara, "show notes").await, "❌ Failed to fetch notes.");
        assert_eq!(sara.phase().await, TurnPhase::Idle);
        assert!(!sara.is_processing());
    }

    #[tokio::test]
    async fn test_empty_collection_is_quiet() {
        let backend = Arc::new(FakeBackend::new().respond("GET /tasks", json!({"message": "No tasks found."})));
        let sara = assistant(backend);
        assert_eq!(say(&sara, "show tasks").await, "📋 No tasks found.");
    }

    #[tokio::test]
    async fn test_direct_command_replaces_open_form() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());

        say(&sara, "add task").await;
        say(&sara, "delete note 2").await;
        assert!(!sara.has_open_form().await);
        assert_eq!(backend.call_keys().await, vec!["DELETE /notes/2"]);
    }

    #[tokio::test]
    async fn test_non_command_input_feeds_open_form() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());

        say(&sara, "add note").await;
        let reply = say(&sara, "hello weather fans").await;
        assert_eq!(reply, "✅ Note \"hello weather fans\" added!");
        assert_eq!(backend.calls().await[0].body, Some(json!({"content": "hello weather fans"})));
    }

    #[tokio::test]
    async fn test_cancel_clears_form() {
        let backend = Arc::new(FakeBackend::new());
        let sara = assistant(backend.clone());
        say(&sara, "edit task").await;
        assert_eq!(say(&sara, "cancel").await, "🚫 Form cancelled.");
        assert!(!sara.has_open_form().await);
        assert_eq!(say(&sara, "cancel").await, "Nothing to cancel right now.");
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_navigation_partitions_history() {
        let sara = assistant(Arc::new(FakeBackend::new()));
        say(&sara, "add reminder").await;
        assert_eq!(say(&sara, "go to notes").await, "✅ Switched to Notes section");
        assert_eq!(sara.section().await, Section::Notes);
        assert!(!sara.has_open_form().await);

        let tasks = sara.history(Section::Tasks).await;
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[2].text, "go to notes");
        let notes = sara.history(Section::Notes).await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].speaker, Speaker::Assistant);
    }

    #[tokio::test]
    async fn test_weather_query_and_form() {
        let backend = Arc::new(
            FakeBackend::new()
                .respond("GET /weather/Paris", json!({"weather": "Paris: 21°C"}))
                .respond("GET /weather/Bangalore", json!({"weather": "Bangalore: 27°C"})),
        );
        let sara = assistant(backend);
        assert_eq!(say(&sara, "weather in Paris").await, "🌤️ Paris: 21°C");
        assert!(say(&sara, "weather").await.contains("Enter city name"));
        assert_eq!(say(&sara, "Bangalore").await, "🌤️ Bangalore: 27°C");
        assert!(!sara.has_open_form().await);
    }

    #[tokio::test]
    async fn test_events_and_metrics() {
        let bus = Arc::new(EventBus::new(64));
        let backend = Arc::new(FakeBackend::new());
        let llm = LLMManager::new(vec![Box::new(FakeProvider::replying("ok"))], system_prompt("Sara"))
            .with_event_bus(bus.clone());
        let dispatcher = Dispatcher::new(backend).with_event_bus(bus.clone());
        let sara = Assistant::new(&AssistantConfig::default(), dispatcher, llm)
            .with_clock(today)
            .with_event_bus(bus.clone());

        say(&sara, "clear tasks").await;
        say(&sara, "what is the meaning of life").await;

        let metrics = bus.get_metrics().await;
        assert_eq!(metrics.turns, 2);
        assert_eq!(metrics.backend_calls, 1);
        assert_eq!(metrics.api_calls, 1);
    }

    #[tokio::test]
    async fn test_reset_forgets_history() -> Result<()> {
        let sara = assistant(Arc::new(FakeBackend::new()));
        say(&sara, "add task").await;
        sara.reset().await;
        assert!(sara.history(Section::Tasks).await.is_empty());
        assert!(!sara.has_open_form().await);
        Ok(())
    }
}
