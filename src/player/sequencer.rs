//! Step flattening.
//!
//! Bundles occupy a variable number of navigation steps: one per sub-question
//! for simple bundles, exactly one for fill-in, timed-writing and
//! sentence-build, and one parent step plus one per child for speaking
//! sequences. The step table flattens a module into that linear space once;
//! every later lookup is an index read, never a recomputation.

use crate::module::{Bundle, Module};
use std::sync::Arc;

/// Location of one step inside its bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRef {
    pub bundle_index: usize,
    pub offset_in_bundle: usize,
}

/// Display numbering for a step: either a single question number or the
/// range a fill-in bundle spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionRange {
    /// "Question n of total"
    Single { number: usize, total: usize },
    /// "Questions first-last"
    Span { first: usize, last: usize },
    /// Non-answerable step (speaking parent).
    None,
}

impl std::fmt::Display for QuestionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestionRange::Single { number, total } => write!(f, "Question {number} of {total}"),
            QuestionRange::Span { first, last } => write!(f, "Questions {first}-{last}"),
            QuestionRange::None => Ok(()),
        }
    }
}

/// Flat step index space over a module, derived purely from the module.
#[derive(Debug, Clone)]
pub struct StepTable {
    module: Arc<Module>,
    steps: Vec<StepRef>,
    /// Cumulative step offset of each bundle.
    offsets: Vec<usize>,
    /// 1-based number of the first question of each bundle, for display.
    first_numbers: Vec<usize>,
    total_questions: usize,
}

/// Steps a bundle occupies in the flat space.
pub fn step_count(bundle: &Bundle) -> usize {
    match bundle {
        Bundle::Simple(b) => b.questions.len(),
        Bundle::FillIn(_) | Bundle::TimedWriting(_) | Bundle::SentenceBuild(_) => 1,
        Bundle::SpeakingSequence(b) => 1 + b.children.len(),
    }
}

/// Question numbers a bundle contributes to the display sequence.
fn question_count(bundle: &Bundle) -> usize {
    match bundle {
        Bundle::Simple(b) => b.questions.len(),
        Bundle::FillIn(b) => b.blanks.len(),
        Bundle::TimedWriting(_) | Bundle::SentenceBuild(_) => 1,
        Bundle::SpeakingSequence(b) => b.children.len(),
    }
}

impl StepTable {
    pub fn new(module: Arc<Module>) -> Self {
        let mut steps = Vec::new();
        let mut offsets = Vec::with_capacity(module.bundles.len());
        let mut first_numbers = Vec::with_capacity(module.bundles.len());
        let mut number = 1;
        for (bundle_index, bundle) in module.bundles.iter().enumerate() {
            offsets.push(steps.len());
            first_numbers.push(number);
            for offset_in_bundle in 0..step_count(bundle) {
                steps.push(StepRef {
                    bundle_index,
                    offset_in_bundle,
                });
            }
            number += question_count(bundle);
        }
        Self {
            module,
            steps,
            offsets,
            first_numbers,
            total_questions: number - 1,
        }
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    /// The bundle owning `position` and the step's offset within it.
    pub fn bundle_at(&self, position: usize) -> Option<(&Bundle, usize)> {
        let step = self.steps.get(position)?;
        Some((
            &self.module.bundles[step.bundle_index],
            step.offset_in_bundle,
        ))
    }

    pub fn step_ref(&self, position: usize) -> Option<StepRef> {
        self.steps.get(position).copied()
    }

    /// The id of the single sub-question answered at `position`, or `None`
    /// for steps answered as a unit (fill-in) or not answerable directly
    /// (speaking sequences).
    pub fn sub_question_at(&self, position: usize) -> Option<&str> {
        let (bundle, offset) = self.bundle_at(position)?;
        match bundle {
            Bundle::Simple(b) => Some(b.questions[offset].id.as_str()),
            Bundle::TimedWriting(b) => Some(b.question_id.as_str()),
            Bundle::SentenceBuild(b) => Some(b.question_id.as_str()),
            Bundle::FillIn(_) | Bundle::SpeakingSequence(_) => None,
        }
    }

    /// First step position of the bundle at `bundle_index`.
    pub fn bundle_offset(&self, bundle_index: usize) -> Option<usize> {
        self.offsets.get(bundle_index).copied()
    }

    /// Position of the step that answers `question_id`, if any. For fill-in
    /// blanks this is the bundle's single step; speaking children map to
    /// their own child step.
    pub fn position_of_question(&self, question_id: &str) -> Option<usize> {
        for (bundle_index, bundle) in self.module.bundles.iter().enumerate() {
            let base = self.offsets[bundle_index];
            match bundle {
                Bundle::Simple(b) => {
                    if let Some(i) = b.questions.iter().position(|q| q.id == question_id) {
                        return Some(base + i);
                    }
                }
                Bundle::FillIn(b) => {
                    if b.blanks.iter().any(|bl| bl.id == question_id) {
                        return Some(base);
                    }
                }
                Bundle::TimedWriting(b) => {
                    if b.question_id == question_id {
                        return Some(base);
                    }
                }
                Bundle::SentenceBuild(b) => {
                    if b.question_id == question_id {
                        return Some(base);
                    }
                }
                Bundle::SpeakingSequence(b) => {
                    if let Some(i) = b.children.iter().position(|c| c.id == question_id) {
                        return Some(base + 1 + i);
                    }
                }
            }
        }
        None
    }

    /// Display numbering for the step at `position`.
    pub fn question_range(&self, position: usize) -> QuestionRange {
        let Some(step) = self.steps.get(position) else {
            return QuestionRange::None;
        };
        let bundle = &self.module.bundles[step.bundle_index];
        let first = self.first_numbers[step.bundle_index];
        match bundle {
            Bundle::Simple(_) => QuestionRange::Single {
                number: first + step.offset_in_bundle,
                total: self.total_questions,
            },
            Bundle::FillIn(b) => QuestionRange::Span {
                first,
                last: first + b.blanks.len() - 1,
            },
            Bundle::TimedWriting(_) | Bundle::SentenceBuild(_) => QuestionRange::Single {
                number: first,
                total: self.total_questions,
            },
            Bundle::SpeakingSequence(_) => {
                if step.offset_in_bundle == 0 {
                    QuestionRange::None
                } else {
                    QuestionRange::Single {
                        number: first + step.offset_in_bundle - 1,
                        total: self.total_questions,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::test_fixtures::{fill_in, module_of, simple, speaking};

    #[test]
    fn step_counts_sum_to_total() {
        let module = Arc::new(module_of(vec![
            simple("b1", 2),
            fill_in("b2", 3),
            simple("b3", 1),
        ]));
        let table = StepTable::new(module);
        // simple(2) + fill_in(1) + simple(1)
        assert_eq!(table.total_steps(), 4);
        let counted: usize = table
            .module()
            .bundles
            .iter()
            .map(super::step_count)
            .sum();
        assert_eq!(counted, table.total_steps());
    }

    #[test]
    fn every_position_maps_to_one_bundle_step() {
        let module = Arc::new(module_of(vec![
            simple("b1", 2),
            fill_in("b2", 3),
            speaking("b3", 2),
        ]));
        let table = StepTable::new(module);
        assert_eq!(table.total_steps(), 2 + 1 + 3);
        let mut seen = Vec::new();
        for pos in 0..table.total_steps() {
            let (bundle, offset) = table.bundle_at(pos).unwrap();
            seen.push((bundle.id().to_string(), offset));
        }
        seen.dedup();
        assert_eq!(seen.len(), table.total_steps());
        assert!(table.bundle_at(table.total_steps()).is_none());
    }

    #[test]
    fn fill_in_is_one_step_regardless_of_blanks() {
        let module = Arc::new(module_of(vec![
            simple("b1", 2),
            fill_in("b2", 3),
            simple("b3", 1),
        ]));
        let table = StepTable::new(module);
        let (bundle, offset) = table.bundle_at(2).unwrap();
        assert_eq!(bundle.id(), "b2");
        assert_eq!(offset, 0);
        assert_eq!(table.sub_question_at(2), None);
        // The simple step after the fill-in.
        assert_eq!(table.sub_question_at(3), Some("b3-q0"));
    }

    #[test]
    fn question_ranges_follow_blank_counts() {
        let module = Arc::new(module_of(vec![
            simple("b1", 2),
            fill_in("b2", 3),
            simple("b3", 1),
        ]));
        let table = StepTable::new(module);
        assert_eq!(
            table.question_range(0),
            QuestionRange::Single { number: 1, total: 6 }
        );
        assert_eq!(table.question_range(2), QuestionRange::Span { first: 3, last: 5 });
        assert_eq!(
            table.question_range(3),
            QuestionRange::Single { number: 6, total: 6 }
        );
    }

    #[test]
    fn speaking_children_have_positions_after_parent() {
        let module = Arc::new(module_of(vec![simple("b1", 1), speaking("b2", 2)]));
        let table = StepTable::new(module);
        assert_eq!(table.total_steps(), 4);
        // Parent step is non-answerable.
        assert_eq!(table.sub_question_at(1), None);
        assert_eq!(table.question_range(1), QuestionRange::None);
        assert_eq!(table.position_of_question("b2-c0"), Some(2));
        assert_eq!(table.position_of_question("b2-c1"), Some(3));
    }
}
