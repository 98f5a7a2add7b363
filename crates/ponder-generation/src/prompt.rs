//! Style/topic catalogue and prompt rendering.

use std::fmt::Write as _;

use ponder_core::generation::{GenerationRequest, MAX_AVOID_ENTRIES};

/// Registers a question can be asked in.
pub const STYLES: [&str; 10] = [
    "philosophical",
    "ethical",
    "scientific",
    "psychological",
    "existential",
    "social",
    "technological",
    "personal",
    "abstract",
    "practical",
];

/// Subjects a question can be about.
pub const TOPICS: [&str; 10] = [
    "consciousness and identity",
    "morality and ethics",
    "reality and perception",
    "time and mortality",
    "knowledge and truth",
    "society and culture",
    "technology and humanity",
    "purpose and meaning",
    "free will and determinism",
    "love and relationships",
];

const EXEMPLARS: [&str; 5] = [
    "If all your memories were fiction, would your identity still be real?",
    "Why do we trust our future selves to honor our current decisions?",
    "Does a thought exist before you think it, or only while thinking?",
    "What separates a deeply held belief from a comfortable delusion?",
    "If nobody remembered your kindness, would it still have happened?",
];

/// Multiplier that decorrelates the topic index from the style index.
const TOPIC_STRIDE: i64 = 7;

/// A style and topic chosen for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSelection {
    /// Entry of `STYLES`.
    pub style: &'static str,
    /// Entry of `TOPICS`.
    pub topic: &'static str,
}

impl PromptSelection {
    /// Deterministic selection for a window seed, so every instance asks
    /// for the same kind of question in the same window.
    #[must_use]
    pub fn for_seed(seed: i64) -> Self {
        Self {
            style: pick(&STYLES, seed),
            topic: pick(&TOPICS, seed.wrapping_mul(TOPIC_STRIDE)),
        }
    }
}

fn pick(entries: &[&'static str; 10], value: i64) -> &'static str {
    let index = usize::try_from(value.rem_euclid(10)).unwrap_or_default();
    entries[index]
}

/// Renders the completion prompt for `request`.
#[must_use]
pub fn render_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Generate a single {} thought-provoking question about {}.\n\n\
         The question should:\n\
         - Be unique and not commonly asked\n\
         - Challenge assumptions or spark deep reflection\n\
         - Be between 10-30 words\n\
         - Not be a yes/no question\n\
         - Feel fresh and unexpected\n\
         - Be DIFFERENT from these recently used questions:\n",
        request.style, request.topic
    );

    let skip = request.avoid_list.len().saturating_sub(MAX_AVOID_ENTRIES);
    if request.avoid_list.is_empty() {
        prompt.push_str("(no previous questions)\n");
    }
    for used in &request.avoid_list[skip..] {
        let _ = writeln!(prompt, "- {used}");
    }

    prompt.push_str("\nExamples of good questions:\n");
    for exemplar in EXEMPLARS {
        let _ = writeln!(prompt, "- \"{exemplar}\"");
    }
    prompt.push_str("\nReturn only the question text, no quotes or extra formatting.");
    prompt
}
