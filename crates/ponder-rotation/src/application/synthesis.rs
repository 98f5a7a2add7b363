//! Generate-or-fallback synthesis of a new item text.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ponder_core::generation::{CandidateGenerator, GenerationRequest};
use ponder_core::item::validate_text;
use ponder_core::repository::ItemRepository;
use ponder_core::rng::DeterministicRng;
use ponder_core::window::WindowClock;
use ponder_generation::fallback::{FallbackPool, PickStrategy};
use ponder_generation::prompt::PromptSelection;
use tracing::{debug, info, warn};

/// Which caller is asking for a text. Decides retries, temperature and how
/// the fallback entry is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPath {
    /// A request is waiting: no retries, deterministic fallback so every
    /// instance lands on the same entry.
    Interactive,
    /// Staging ahead of a boundary: one retry on a duplicate, random
    /// fallback since the store arbitrates between instances.
    Advance,
}

impl SynthesisPath {
    fn retries(self) -> u32 {
        match self {
            Self::Interactive => 0,
            Self::Advance => 1,
        }
    }

    fn temperature(self) -> f32 {
        match self {
            Self::Interactive => 0.9,
            Self::Advance => 0.95,
        }
    }
}

/// Where a synthesized text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// The candidate generator.
    Generated,
    /// The fallback pool, or the last-resort literal.
    Fallback,
}

/// A synthesized item text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    /// The validated text.
    pub text: String,
    /// Where it came from.
    pub source: TextSource,
}

/// Produces new item texts that are not already in the history.
pub struct Synthesizer {
    generator: Arc<dyn CandidateGenerator>,
    repo: Arc<dyn ItemRepository>,
    pool: FallbackPool,
    // Never held across an await.
    rng: Mutex<Box<dyn DeterministicRng>>,
    window_clock: WindowClock,
    call_timeout: Duration,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("pool_size", &self.pool.entries().len())
            .field("window_clock", &self.window_clock)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl Synthesizer {
    /// Creates a synthesizer.
    #[must_use]
    pub fn new(
        generator: Arc<dyn CandidateGenerator>,
        repo: Arc<dyn ItemRepository>,
        pool: FallbackPool,
        rng: Box<dyn DeterministicRng>,
        window_clock: WindowClock,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            repo,
            pool,
            rng: Mutex::new(rng),
            window_clock,
            call_timeout,
        }
    }

    /// The fallback pool in use.
    #[must_use]
    pub fn pool(&self) -> &FallbackPool {
        &self.pool
    }

    /// Produces a text for the window starting at `window_start`.
    ///
    /// Never fails: generation errors, timeouts and duplicates of used texts
    /// all end in a fallback pool pick.
    pub async fn synthesize(&self, window_start: DateTime<Utc>, path: SynthesisPath) -> Synthesis {
        let used = match tokio::time::timeout(self.call_timeout, self.repo.list_used_texts()).await
        {
            Ok(Ok(used)) => used,
            Ok(Err(e)) => {
                warn!(error = %e, "could not load used texts; generating without avoid-list");
                Vec::new()
            }
            Err(_) => {
                warn!("loading used texts timed out; generating without avoid-list");
                Vec::new()
            }
        };

        let seed = self.window_clock.window_seed(window_start);
        let selection = PromptSelection::for_seed(seed);

        for attempt in 0..=path.retries() {
            let request = GenerationRequest::new(
                selection.style,
                selection.topic,
                &used,
                path.temperature(),
                Some(seed.wrapping_add(i64::from(attempt))),
            );
            let candidate =
                match tokio::time::timeout(self.call_timeout, self.generator.generate(&request))
                    .await
                {
                    Ok(Ok(candidate)) => candidate,
                    Ok(Err(e)) => {
                        info!(error = %e, attempt, "generation failed; using fallback pool");
                        break;
                    }
                    Err(_) => {
                        warn!(attempt, timeout = ?self.call_timeout, "generation timed out; using fallback pool");
                        break;
                    }
                };

            let text = match validate_text(&candidate) {
                Ok(text) => text,
                Err(e) => {
                    info!(error = %e, attempt, "generated text rejected; using fallback pool");
                    break;
                }
            };
            if used.contains(&text) {
                warn!(attempt, text = %text, "generated text duplicates history");
                continue;
            }
            debug!(attempt, style = selection.style, topic = selection.topic, "generated new text");
            return Synthesis {
                text,
                source: TextSource::Generated,
            };
        }

        Synthesis {
            text: self.fallback(&used, window_start, path),
            source: TextSource::Fallback,
        }
    }

    /// Deterministic pool pick for `window_start` with no history, for
    /// paths that cannot reach the store.
    #[must_use]
    pub fn fallback_for_window(&self, window_start: DateTime<Utc>) -> String {
        self.pool
            .pick_or_last_resort(&[], PickStrategy::ByWindow(window_start))
    }

    fn fallback(&self, used: &[String], window_start: DateTime<Utc>, path: SynthesisPath) -> String {
        match path {
            SynthesisPath::Interactive => self
                .pool
                .pick_or_last_resort(used, PickStrategy::ByWindow(window_start)),
            SynthesisPath::Advance => {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                self.pool
                    .pick_or_last_resort(used, PickStrategy::Random(rng.as_mut()))
            }
        }
    }
}
