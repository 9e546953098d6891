//! Generation event system for observability.
//!
//! Emits [`GenerationEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! callers (the CLI, tests, progress displays) can follow a run stage by stage
//! without coupling to the orchestrator internals.

use serde::{Deserialize, Serialize};

/// Events emitted while a document is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GenerationEvent {
    GenerationStarted {
        taxa: usize,
        partitions: usize,
    },
    StageStarted {
        stage: String,
    },
    StageCompleted {
        stage: String,
        duration_ms: u64,
    },
    StageFailed {
        stage: String,
        error: String,
    },
    ExtensionInvoked {
        extension: String,
        point: String,
    },
    GenerationCompleted {
        bytes: usize,
        duration_ms: u64,
    },
    GenerationFailed {
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<GenerationEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: GenerationEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GenerationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
