//! Response storage and answer normalization.
//!
//! The store is the single writable answer surface: the rendering layer calls
//! in through `set_answer`, gating logic reads back through `get` and
//! `is_required_satisfied`. Raw widget values are normalized into the tagged
//! `Response` union; incomplete multi-part answers (a partially filled word,
//! a partial phrase ordering) are never stored as non-empty values, so
//! "required but empty" stays observable.

use crate::module::{Blank, Bundle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pointer to an uploaded recording, substituted for the raw audio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioReference {
    pub bucket: String,
    pub key: String,
}

/// A stored answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Response {
    Choice(usize),
    Choices(Vec<usize>),
    Text(String),
    AudioReference(AudioReference),
}

/// Raw value handed over by the rendering layer before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAnswer {
    /// Clears the stored answer.
    None,
    Choice(usize),
    /// Phrase ordering for sentence-build, one index per blank.
    Choices(Vec<usize>),
    Text(String),
    /// Fill-in letter slots, one entry per missing letter ("" for empty).
    Letters(Vec<String>),
    Audio(AudioReference),
}

/// How `set_answer` interprets the raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantTag {
    Choice,
    Text,
    /// Sentence-build: an ordering is complete only with every blank filled.
    Ordering { blank_count: usize },
    /// Fill-in: the stored answer is the reconstructed full word.
    FillIn {
        provided_prefix: String,
        missing_letters: usize,
    },
    Audio,
}

/// Reconstructs the full word for a fill-in blank, or `None` while any slot
/// is still empty. An incomplete word is indistinguishable from no answer.
pub fn assemble_word(provided_prefix: &str, slots: &[String], missing_letters: usize) -> Option<String> {
    if slots.len() != missing_letters {
        return None;
    }
    if slots.iter().any(|s| s.trim().is_empty()) {
        return None;
    }
    let mut word = provided_prefix.to_string();
    for slot in slots {
        word.push_str(slot.trim());
    }
    Some(word)
}

/// question-id → Response map for one module attempt.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ResponseStore {
    responses: HashMap<String, Response>,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes and stores an answer, or deletes the entry when the value
    /// is empty or incomplete for its variant.
    pub fn set_answer(&mut self, question_id: &str, raw: RawAnswer, tag: VariantTag) {
        let normalized = match (&tag, raw) {
            (VariantTag::Choice, RawAnswer::Choice(index)) => Some(Response::Choice(index)),
            (VariantTag::Text, RawAnswer::Text(text)) => {
                if text.trim().is_empty() {
                    None
                } else {
                    Some(Response::Text(text))
                }
            }
            (VariantTag::Ordering { blank_count }, RawAnswer::Choices(order)) => {
                if order.len() == *blank_count {
                    Some(Response::Choices(order))
                } else {
                    None
                }
            }
            (
                VariantTag::FillIn {
                    provided_prefix,
                    missing_letters,
                },
                RawAnswer::Letters(slots),
            ) => assemble_word(provided_prefix, &slots, *missing_letters).map(Response::Text),
            (VariantTag::Audio, RawAnswer::Audio(reference)) => {
                Some(Response::AudioReference(reference))
            }
            (_, RawAnswer::None) => None,
            (tag, raw) => {
                tracing::warn!("Answer for {question_id} does not match variant {tag:?}: {raw:?}");
                None
            }
        };

        match normalized {
            Some(response) => {
                tracing::debug!("Answer stored for {question_id}");
                self.responses.insert(question_id.to_string(), response);
            }
            None => {
                if self.responses.remove(question_id).is_some() {
                    tracing::debug!("Answer cleared for {question_id}");
                }
            }
        }
    }

    pub fn get(&self, question_id: &str) -> Option<&Response> {
        self.responses.get(question_id)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.responses.contains_key(question_id)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// The single predicate behind `can_go_next`: whether the step at
    /// `offset` within `bundle` has all its required answers.
    ///
    /// Fill-in requires every required blank's reconstructed word, so a
    /// partially filled word gates exactly like no answer. Speaking steps
    /// are never gated here; their advancement is pipeline-driven.
    pub fn is_required_satisfied(&self, bundle: &Bundle, offset: usize) -> bool {
        match bundle {
            Bundle::Simple(b) => b
                .questions
                .get(offset)
                .map(|q| !q.required || self.contains(&q.id))
                .unwrap_or(true),
            Bundle::FillIn(b) => b
                .blanks
                .iter()
                .all(|blank| !blank.required || self.contains(&blank.id)),
            Bundle::TimedWriting(b) => !b.required || self.contains(&b.question_id),
            Bundle::SentenceBuild(b) => !b.required || self.contains(&b.question_id),
            Bundle::SpeakingSequence(_) => true,
        }
    }

    /// Convenience for fill-in editing: stores the reconstructed word for a
    /// blank, or clears it while the word is incomplete.
    pub fn set_blank_letters(&mut self, blank: &Blank, slots: Vec<String>) {
        self.set_answer(
            &blank.id,
            RawAnswer::Letters(slots),
            VariantTag::FillIn {
                provided_prefix: blank.provided_prefix.clone(),
                missing_letters: blank.missing_letters,
            },
        );
    }
}
