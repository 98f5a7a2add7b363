//! Candidate generator abstraction.

use async_trait::async_trait;
use thiserror::Error;

/// Most recent used texts sent to the generator as negative examples.
pub const MAX_AVOID_ENTRIES: usize = 20;

/// Why a generation attempt produced no usable candidate. Callers recover
/// from both variants the same way, by falling back to the fallback pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// No credential is configured, or the capability could not be reached
    /// in time.
    #[error("generation unavailable: {0}")]
    Unavailable(String),

    /// The capability answered, but with unusable text.
    #[error("generation returned invalid output: {0}")]
    Invalid(String),
}

/// One request to the text-completion capability.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Register of the question, e.g. "philosophical".
    pub style: String,
    /// Subject of the question, e.g. "time and mortality".
    pub topic: String,
    /// Recently used texts to steer away from, oldest first.
    pub avoid_list: Vec<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional deterministic seed.
    pub seed: Option<i64>,
}

impl GenerationRequest {
    /// Builds a request, keeping only the `MAX_AVOID_ENTRIES` most recent
    /// entries of `used_texts`.
    #[must_use]
    pub fn new(
        style: &str,
        topic: &str,
        used_texts: &[String],
        temperature: f32,
        seed: Option<i64>,
    ) -> Self {
        let skip = used_texts.len().saturating_sub(MAX_AVOID_ENTRIES);
        Self {
            style: style.to_owned(),
            topic: topic.to_owned(),
            avoid_list: used_texts[skip..].to_vec(),
            temperature,
            seed,
        }
    }
}

/// Produces one candidate text per call.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Generates a normalized candidate for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_keeps_most_recent_avoid_entries() {
        let used: Vec<String> = (0..30).map(|i| format!("question {i}")).collect();

        let request = GenerationRequest::new("ethical", "society and culture", &used, 0.9, None);

        assert_eq!(request.avoid_list.len(), MAX_AVOID_ENTRIES);
        assert_eq!(request.avoid_list.first().unwrap(), "question 10");
        assert_eq!(request.avoid_list.last().unwrap(), "question 29");
    }

    #[test]
    fn test_request_with_short_history_keeps_everything() {
        let used = vec!["only one".to_owned()];

        let request = GenerationRequest::new("abstract", "time and mortality", &used, 0.95, Some(3));

        assert_eq!(request.avoid_list, used);
        assert_eq!(request.seed, Some(3));
    }
}
