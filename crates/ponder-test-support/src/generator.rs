//! Scripted, failing and slow `CandidateGenerator` implementations for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ponder_core::generation::{CandidateGenerator, GenerationError, GenerationRequest};

#[derive(Debug)]
enum Script {
    Sequence(VecDeque<Result<String, GenerationError>>),
    Numbered(String),
}

/// A generator that answers from a script and records every request.
///
/// A sequence script returns its responses in order and reports
/// `Unavailable` once exhausted. A numbered script returns a new text on
/// every call.
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Mutex<Script>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Returns `responses` in order.
    #[must_use]
    pub fn sequence(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self::with_script(Script::Sequence(responses.into()))
    }

    /// Returns `text` on every call.
    #[must_use]
    pub fn always(text: &str) -> Self {
        let responses = (0..64).map(|_| Ok(text.to_owned())).collect();
        Self::sequence(responses)
    }

    /// Returns "`prefix` number N?" with N counting up from 1.
    #[must_use]
    pub fn numbered(prefix: &str) -> Self {
        Self::with_script(Script::Numbered(prefix.to_owned()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all requests received.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of `generate` calls so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let call_number = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        tokio::task::yield_now().await;

        match &mut *self.script.lock().unwrap() {
            Script::Sequence(responses) => responses
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Unavailable("script exhausted".into()))),
            Script::Numbered(prefix) => Ok(format!("{prefix} number {call_number}?")),
        }
    }
}

/// A generator that always fails with the configured error.
#[derive(Debug)]
pub struct FailingGenerator {
    error: GenerationError,
    calls: AtomicUsize,
}

impl FailingGenerator {
    /// Fails with `GenerationError::Unavailable`.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(GenerationError::Unavailable("no completion credential configured".into()))
    }

    /// Fails with `GenerationError::Invalid`.
    #[must_use]
    pub fn invalid() -> Self {
        Self::new(GenerationError::Invalid("candidate too short".into()))
    }

    fn new(error: GenerationError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateGenerator for FailingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A generator that answers only after `delay`, for exercising timeouts.
#[derive(Debug)]
pub struct SlowGenerator {
    delay: Duration,
    text: String,
}

impl SlowGenerator {
    /// Answers `text` after `delay`.
    #[must_use]
    pub fn new(delay: Duration, text: &str) -> Self {
        Self {
            delay,
            text: text.to_owned(),
        }
    }
}

#[async_trait]
impl CandidateGenerator for SlowGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.text.clone())
    }
}
