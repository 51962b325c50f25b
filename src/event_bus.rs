use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Events that can be emitted by components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Turn events
    TurnStarted {
        section: String,
        text: String,
    },
    TurnDropped {
        text: String,
    },
    ReplyAppended {
        section: String,
        text: String,
    },
    SectionChanged {
        from: String,
        to: String,
    },

    // Backend events
    BackendRequest {
        method: String,
        path: String,
    },
    BackendFailed {
        path: String,
        error: String,
    },

    // API events
    APICallStarted {
        provider: String,
        model: String,
    },
    APICallCompleted {
        provider: String,
        chars: usize,
    },
    APIError {
        provider: String,
        error: String,
    },
}

/// Event bus for component communication
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    metrics: Arc<RwLock<Metrics>>,
}

/// Accumulated metrics from events
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metrics {
    pub turns: usize,
    pub dropped_turns: usize,
    pub backend_calls: usize,
    pub backend_failures: usize,
    pub api_calls: usize,
    pub api_failures: usize,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            metrics: Arc::new(RwLock::new(Metrics::default())),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub async fn emit(&self, event: Event) -> Result<()> {
        self.update_metrics(&event).await;

        // No receivers is fine
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Get current metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.read().await.clone()
    }

    async fn update_metrics(&self, event: &Event) {
        let mut metrics = self.metrics.write().await;

        match event {
            Event::TurnStarted { .. } => metrics.turns += 1,
            Event::TurnDropped { .. } => metrics.dropped_turns += 1,
            Event::BackendRequest { .. } => metrics.backend_calls += 1,
            Event::BackendFailed { .. } => metrics.backend_failures += 1,
            Event::APICallStarted { .. } => metrics.api_calls += 1,
            Event::APIError { .. } => metrics.api_failures += 1,
            _ => {}
        }
    }
}

/// Trait for components that can emit events
#[async_trait::async_trait]
pub trait EventEmitter {
    fn set_event_bus(&mut self, bus: Arc<EventBus>);

    async fn emit_event(&self, event: Event) -> Result<()>;
}

/// Helper macro to implement EventEmitter trait for a type with an
/// `event_bus: Option<Arc<EventBus>>` field
#[macro_export]
macro_rules! impl_event_emitter {
    ($type:ty) => {
        #[::async_trait::async_trait]
        impl $crate::event_bus::EventEmitter for $type {
            fn set_event_bus(&mut self, bus: ::std::sync::Arc<$crate::event_bus::EventBus>) {
                self.event_bus = Some(bus);
            }

            async fn emit_event(&self, event: $crate::event_bus::Event) -> ::anyhow::Result<()> {
                if let Some(bus) = &self.event_bus {
                    bus.emit(event).await
                } else {
                    Ok(())
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission() {
        let bus = EventBus::new(100);
        let mut receiver = bus.subscribe();

        let event = Event::TurnStarted {
            section: "tasks".to_string(),
            text: "show tasks".to_string(),
        };

        bus.emit(event.clone()).await.unwrap();

        let received = receiver.recv().await.unwrap();
        match received {
            Event::TurnStarted { text, .. } => {
                assert_eq!(text, "show tasks");
            }
            _ => panic!("Wrong event type"),
        }
    }

    mod plain_component {
        pub struct Recorder {
            pub event_bus: Option<std::sync::Arc<crate::event_bus::EventBus>>,
        }

        crate::impl_event_emitter!(Recorder);
    }

    #[tokio::test]
    async fn test_macro_needs_no_imports_at_call_site() {
        let bus = Arc::new(EventBus::new(8));
        let mut recorder = plain_component::Recorder { event_bus: None };
        recorder.emit_event(Event::TurnDropped { text: "early".to_string() }).await.unwrap();

        recorder.set_event_bus(bus.clone());
        recorder.emit_event(Event::TurnDropped { text: "late".to_string() }).await.unwrap();
        assert_eq!(bus.get_metrics().await.dropped_turns, 1);
    }

    #[tokio::test]
    async fn test_metrics_update() {
        let bus = EventBus::new(100);

        bus.emit(Event::BackendRequest {
            method: "DELETE".to_string(),
            path: "/tasks/clear_all".to_string(),
        })
        .await
        .unwrap();
        bus.emit(Event::BackendFailed {
            path: "/tasks/clear_all".to_string(),
            error: "HTTP 500".to_string(),
        })
        .await
        .unwrap();
        bus.emit(Event::TurnDropped { text: "again".to_string() })
            .await
            .unwrap();

        let metrics = bus.get_metrics().await;
        assert_eq!(metrics.backend_calls, 1);
        assert_eq!(metrics.backend_failures, 1);
        assert_eq!(metrics.dropped_turns, 1);
        assert_eq!(metrics.turns, 0);
    }
}
