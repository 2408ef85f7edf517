//! One-way session trackers.
//!
//! Both sets only ever grow for the lifetime of a module attempt: questions
//! left under time pressure stay left, dismissed intros stay dismissed. They
//! are owned by the navigator so the gating rules can be tested without any
//! rendering layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Questions the candidate has irrevocably exited after an expiry-warning
/// confirmation. Membership permanently blocks backward navigation to any
/// step at or before the question's position.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LeftQuestions {
    ids: BTreeSet<String>,
}

impl LeftQuestions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, question_id: &str) {
        if self.ids.insert(question_id.to_string()) {
            tracing::info!("Question left under time pressure: {question_id}");
        }
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.ids.contains(question_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Bundle/question ids whose one-time instructional screen has been
/// dismissed, preventing re-display on revisit.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SeenIntro {
    ids: BTreeSet<String>,
}

impl SeenIntro {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: &str) {
        if self.ids.insert(id.to_string()) {
            tracing::debug!("Intro dismissed for {id}");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_set_only_grows() {
        let mut left = LeftQuestions::new();
        assert!(left.is_empty());
        left.mark("q1");
        left.mark("q1");
        assert!(left.contains("q1"));
        assert_eq!(left.iter().count(), 1);
    }

    #[test]
    fn seen_intro_is_sticky() {
        let mut seen = SeenIntro::new();
        assert!(!seen.contains("b1"));
        seen.mark("b1");
        assert!(seen.contains("b1"));
    }
}
