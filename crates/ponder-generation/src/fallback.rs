//! Fallback pool of pre-written questions.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use ponder_core::rng::DeterministicRng;
use sha2::{Digest, Sha256};

/// Shown when nothing else is available, including an empty pool.
pub const LAST_RESORT_TEXT: &str = "What question would you most like someone to ask you today?";

const DEFAULT_QUESTIONS: [&str; 20] = [
    "What assumptions about the world do you hold that you've never questioned?",
    "If you could know the exact date of your death, would you want to?",
    "Is it possible to be truly objective about anything you personally experience?",
    "What would happen to your sense of self if all your memories were gradually replaced?",
    "Do you think free will exists, or are we just very complex biological machines?",
    "If consciousness could be transferred to a machine, would it still be you?",
    "What makes something morally right or wrong beyond cultural agreement?",
    "Is there a difference between existing and being perceived to exist?",
    "What would you do if you discovered your entire life was a simulation?",
    "Can you ever truly know another person, or only your interpretation of them?",
    "What if the universe ended the moment you stopped observing it?",
    "How do you know your memories are real and not implanted five minutes ago?",
    "Why do we find beauty in things that serve no evolutionary purpose?",
    "If everyone forgot you existed, would you still be the same person?",
    "What's the difference between a very sophisticated chatbot and consciousness?",
    "Could you be happy if you knew it was artificially induced?",
    "Is mathematics discovered or invented by humans?",
    "What would change if you found out everyone else was a philosophical zombie?",
    "How many of your beliefs would survive if you had to prove them from scratch?",
    "If you could eliminate all suffering, but also all joy, would you?",
];

/// How to choose among eligible entries.
pub enum PickStrategy<'a> {
    /// Hash of the window boundary; every instance picks the same entry for
    /// the same window and history.
    ByWindow(DateTime<Utc>),
    /// Uniform choice from the given RNG.
    Random(&'a mut dyn DeterministicRng),
}

/// An ordered list of pre-written items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPool {
    entries: Vec<String>,
}

impl Default for FallbackPool {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTIONS.iter().map(|q| (*q).to_owned()).collect())
    }
}

impl FallbackPool {
    /// Creates a pool from `entries`, in order.
    #[must_use]
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// The pool entries, in order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Picks an entry not in `avoid`; when every entry is in `avoid`, the
    /// whole pool is eligible again. Returns `None` only for an empty pool.
    #[must_use]
    pub fn pick(&self, avoid: &[String], strategy: PickStrategy<'_>) -> Option<&str> {
        let avoided: HashSet<&str> = avoid.iter().map(String::as_str).collect();
        let mut eligible: Vec<&str> = self
            .entries
            .iter()
            .map(String::as_str)
            .filter(|entry| !avoided.contains(entry))
            .collect();
        if eligible.is_empty() {
            eligible = self.entries.iter().map(String::as_str).collect();
        }
        if eligible.is_empty() {
            return None;
        }

        let len = eligible.len();
        let index = match strategy {
            PickStrategy::ByWindow(window_start) => window_index(window_start, len),
            PickStrategy::Random(rng) => {
                let max = u32::try_from(len - 1).unwrap_or(u32::MAX);
                usize::try_from(rng.next_u32_range(0, max)).unwrap_or_default() % len
            }
        };
        Some(eligible[index])
    }

    /// Like `pick`, but never empty-handed.
    #[must_use]
    pub fn pick_or_last_resort(&self, avoid: &[String], strategy: PickStrategy<'_>) -> String {
        self.pick(avoid, strategy)
            .unwrap_or(LAST_RESORT_TEXT)
            .to_owned()
    }
}

fn window_index(window_start: DateTime<Utc>, len: usize) -> usize {
    let digest = Sha256::digest(
        window_start
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .as_bytes(),
    );
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(prefix);
    let len = u64::try_from(len).unwrap_or(u64::MAX);
    usize::try_from(hash % len).unwrap_or_default()
}
