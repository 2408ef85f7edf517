//! Navigation control.
//!
//! The navigator owns the current position in the flattened step space and
//! composes the response store, timer manager and session trackers to decide
//! which transitions are permitted. Disallowed transitions are no-ops, never
//! errors: callers can observe the refusal through `can_go_next` /
//! `can_go_previous` before attempting one.
//!
//! Position `-1` denotes the pre-module instruction screen shown for
//! task-producing sections; `total_steps` is never reached (advancing past
//! the last step commits module completion instead).

use crate::module::{Bundle, Module};
use crate::player::responses::{AudioReference, RawAnswer, Response, ResponseStore, VariantTag};
use crate::player::sequencer::{QuestionRange, StepTable};
use crate::player::timers::{TimerManager, TimerState};
use crate::player::trackers::{LeftQuestions, SeenIntro};
use std::sync::Arc;

/// Result of a `next()` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextOutcome {
    Advanced,
    /// The active step's countdown is still running; an expiry warning was
    /// raised and must be resolved with `warning_back` or `warning_continue`.
    WarningRaised,
    /// `next()` at the final step: the module attempt is complete.
    Completed,
    /// The transition was declined; state is unchanged.
    Blocked,
}

/// What a dismissed intro unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroAction {
    /// Nothing to trigger (already seen, or no intro-gated behavior).
    None,
    /// A timed-writing countdown was armed by the dismissal.
    TimerArmed,
    /// The speaking parent's prompt-playback phase may start now.
    StartParentPhase,
}

/// Read-only snapshot for the rendering layer.
#[derive(Debug, Clone)]
pub struct NavState {
    pub position: i64,
    pub total_steps: usize,
    pub can_go_next: bool,
    pub can_go_previous: bool,
    pub completed: bool,
    pub warning: Option<ExpiryWarning>,
    pub question_range: QuestionRange,
}

/// An unresolved expiry warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryWarning {
    pub question_id: String,
    pub remaining_secs: u64,
}

/// State machine over the module's step space.
pub struct Navigator {
    table: StepTable,
    responses: ResponseStore,
    timers: TimerManager,
    left: LeftQuestions,
    seen: SeenIntro,
    position: i64,
    warning: Option<String>,
    completed: bool,
    default_writing_secs: u64,
}

impl Navigator {
    pub fn new(module: Arc<Module>, default_writing_secs: u64) -> Self {
        let position = if module.section.has_preamble() { -1 } else { 0 };
        let mut navigator = Self {
            table: StepTable::new(module),
            responses: ResponseStore::new(),
            timers: TimerManager::new(),
            left: LeftQuestions::new(),
            seen: SeenIntro::new(),
            position,
            warning: None,
            completed: false,
            default_writing_secs,
        };
        if position == 0 {
            navigator.on_enter_step();
        }
        navigator
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn total_steps(&self) -> usize {
        self.table.total_steps()
    }

    pub fn table(&self) -> &StepTable {
        &self.table
    }

    pub fn module(&self) -> &Arc<Module> {
        self.table.module()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The bundle and in-bundle offset of the current step, or `None` on the
    /// pre-module screen and after completion.
    pub fn current_bundle(&self) -> Option<(&Bundle, usize)> {
        if self.position < 0 || self.completed {
            return None;
        }
        self.table.bundle_at(self.position as usize)
    }

    /// The bundle id whose intro must still be dismissed before the current
    /// step becomes interactive, if any.
    pub fn intro_pending(&self) -> Option<&str> {
        let (bundle, offset) = self.current_bundle()?;
        if offset == 0 && bundle.has_intro() && !self.seen.contains(bundle.id()) {
            Some(bundle.id())
        } else {
            None
        }
    }

    pub fn can_go_next(&self) -> bool {
        if self.completed || self.warning.is_some() {
            return false;
        }
        if self.position < 0 {
            return true;
        }
        let Some((bundle, offset)) = self.current_bundle() else {
            return false;
        };
        // The speaking parent only advances automatically, and not before
        // its intro is gone.
        if let Bundle::SpeakingSequence(_) = bundle {
            if offset == 0 && self.intro_pending().is_some() {
                return false;
            }
        }
        self.responses.is_required_satisfied(bundle, offset)
    }

    /// Advances by one step, or raises an expiry warning when the active
    /// step's countdown is still running. At the last step this commits
    /// module completion.
    pub fn next(&mut self) -> NextOutcome {
        if !self.can_go_next() {
            tracing::debug!("next() declined at position {}", self.position);
            return NextOutcome::Blocked;
        }
        if let Some(question_id) = self.armed_running_timer() {
            tracing::info!("Expiry warning raised for {question_id}");
            self.warning = Some(question_id);
            return NextOutcome::WarningRaised;
        }
        self.advance_unchecked()
    }

    /// Returns to the warned question; the countdown was never paused.
    pub fn warning_back(&mut self) {
        if self.warning.take().is_some() {
            tracing::debug!("Expiry warning dismissed, staying on question");
        }
    }

    /// Confirms leaving the warned question: marks it left (irrevocably
    /// excluding it from backward navigation) and performs the deferred
    /// advance.
    pub fn warning_continue(&mut self) -> NextOutcome {
        let Some(question_id) = self.warning.take() else {
            return NextOutcome::Blocked;
        };
        self.left.mark(&question_id);
        self.advance_unchecked()
    }

    pub fn can_go_previous(&self) -> bool {
        if self.completed || self.warning.is_some() || self.position <= 0 {
            return false;
        }
        let Some((bundle, _)) = self.current_bundle() else {
            return false;
        };
        if !bundle.allow_back() {
            return false;
        }
        let target = (self.position - 1) as usize;
        let Some((target_bundle, _)) = self.table.bundle_at(target) else {
            return false;
        };
        // Speaking sequences are irrevocable by design.
        if let Bundle::SpeakingSequence(_) = target_bundle {
            return false;
        }
        // Once a question is left, nothing at or before it is reachable.
        if target < self.min_allowed_position() {
            return false;
        }
        match target_bundle {
            Bundle::FillIn(b) => !b.blanks.iter().any(|blank| self.left.contains(&blank.id)),
            _ => self
                .table
                .sub_question_at(target)
                .map(|qid| !self.left.contains(qid))
                .unwrap_or(true),
        }
    }

    pub fn previous(&mut self) -> bool {
        if !self.can_go_previous() {
            tracing::debug!("previous() declined at position {}", self.position);
            return false;
        }
        self.position -= 1;
        self.on_enter_step();
        true
    }

    /// Marks a one-time instructional screen dismissed. For timed-writing
    /// bundles this arms the countdown; for speaking parents it signals that
    /// the parent prompt-playback phase may start.
    pub fn dismiss_intro(&mut self, id: &str) -> IntroAction {
        if self.seen.contains(id) {
            return IntroAction::None;
        }
        self.seen.mark(id);
        let pending_timer = match self.current_bundle() {
            Some((Bundle::TimedWriting(b), _)) if b.id == id => Some((
                b.question_id.clone(),
                b.duration_secs.unwrap_or(self.default_writing_secs),
            )),
            Some((Bundle::SpeakingSequence(b), 0)) if b.id == id => {
                return IntroAction::StartParentPhase;
            }
            _ => None,
        };
        match pending_timer {
            Some((question_id, secs)) => {
                self.timers.arm(&question_id, secs);
                IntroAction::TimerArmed
            }
            None => IntroAction::None,
        }
    }

    /// One shared one-second tick for every armed countdown.
    pub fn tick(&mut self) -> Vec<String> {
        self.timers.tick()
    }

    /// Countdown state of the active step's question, if it has one.
    pub fn active_timer(&self) -> Option<TimerState> {
        let (bundle, _) = self.current_bundle()?;
        match bundle {
            Bundle::TimedWriting(b) => self.timers.state(&b.question_id),
            _ => None,
        }
    }

    /// Entry point for the rendering layer's answer changes. Writes to an
    /// expired timed-writing question are refused (the response is read-only
    /// once the countdown hits zero).
    pub fn on_answer_change(&mut self, question_id: &str, raw: RawAnswer) {
        let Some(tag) = self.variant_tag_for(question_id) else {
            tracing::warn!("Answer for unknown question ignored: {question_id}");
            return;
        };
        if matches!(tag, VariantTag::Text) && self.timers.is_expired(question_id) {
            tracing::debug!("Answer for {question_id} refused: countdown expired");
            return;
        }
        self.responses.set_answer(question_id, raw, tag);
    }

    pub fn get_answer(&self, question_id: &str) -> Option<&Response> {
        self.responses.get(question_id)
    }

    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

    pub fn left_questions(&self) -> &LeftQuestions {
        &self.left
    }

    pub fn has_seen_intro(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Stores the uploaded audio reference for a speaking child. Called by
    /// the capture pipeline on upload success, never by the rendering layer.
    pub fn store_audio_reference(&mut self, child_id: &str, reference: AudioReference) {
        self.responses
            .set_answer(child_id, RawAnswer::Audio(reference), VariantTag::Audio);
    }

    /// Pipeline-driven advancement out of a speaking step (parent phase done
    /// or child upload succeeded). Bypasses the gating that applies to
    /// candidate-driven `next()`.
    pub fn advance_for_speaking(&mut self) -> NextOutcome {
        match self.current_bundle() {
            Some((Bundle::SpeakingSequence(_), _)) => self.advance_unchecked(),
            _ => NextOutcome::Blocked,
        }
    }

    pub fn navigation_state(&self) -> NavState {
        NavState {
            position: self.position,
            total_steps: self.table.total_steps(),
            can_go_next: self.can_go_next(),
            can_go_previous: self.can_go_previous(),
            completed: self.completed,
            warning: self.warning.as_ref().map(|question_id| ExpiryWarning {
                question_id: question_id.clone(),
                remaining_secs: self.timers.remaining(question_id).unwrap_or(0),
            }),
            question_range: if self.position >= 0 {
                self.table.question_range(self.position as usize)
            } else {
                QuestionRange::None
            },
        }
    }

    fn advance_unchecked(&mut self) -> NextOutcome {
        if self.position + 1 >= self.table.total_steps() as i64 {
            tracing::info!("Module complete");
            self.completed = true;
            return NextOutcome::Completed;
        }
        self.position += 1;
        self.on_enter_step();
        NextOutcome::Advanced
    }

    /// The active step's countdown, if armed and still running. No warning
    /// is raised once the timer has expired.
    fn armed_running_timer(&self) -> Option<String> {
        let (bundle, _) = self.current_bundle()?;
        let Bundle::TimedWriting(b) = bundle else {
            return None;
        };
        let state = self.timers.state(&b.question_id)?;
        if !state.expired && state.remaining_secs > 0 && !self.left.contains(&b.question_id) {
            Some(b.question_id.clone())
        } else {
            None
        }
    }

    // Intro-less timed-writing steps arm on entry; intro-gated ones arm on
    // dismissal. Revisits hit the arm() no-op.
    fn on_enter_step(&mut self) {
        let pending_timer = match self.current_bundle() {
            Some((Bundle::TimedWriting(b), _)) if !b.intro || self.seen.contains(&b.id) => Some((
                b.question_id.clone(),
                b.duration_secs.unwrap_or(self.default_writing_secs),
            )),
            _ => None,
        };
        if let Some((question_id, secs)) = pending_timer {
            self.timers.arm(&question_id, secs);
        }
    }

    fn variant_tag_for(&self, question_id: &str) -> Option<VariantTag> {
        for bundle in &self.table.module().bundles {
            match bundle {
                Bundle::Simple(b) => {
                    if b.questions.iter().any(|q| q.id == question_id) {
                        return Some(VariantTag::Choice);
                    }
                }
                Bundle::FillIn(b) => {
                    if let Some(blank) = b.blanks.iter().find(|bl| bl.id == question_id) {
                        return Some(VariantTag::FillIn {
                            provided_prefix: blank.provided_prefix.clone(),
                            missing_letters: blank.missing_letters,
                        });
                    }
                }
                Bundle::TimedWriting(b) => {
                    if b.question_id == question_id {
                        return Some(VariantTag::Text);
                    }
                }
                Bundle::SentenceBuild(b) => {
                    if b.question_id == question_id {
                        return Some(VariantTag::Ordering {
                            blank_count: b.blank_count,
                        });
                    }
                }
                Bundle::SpeakingSequence(b) => {
                    if b.children.iter().any(|c| c.id == question_id) {
                        return Some(VariantTag::Audio);
                    }
                }
            }
        }
        None
    }

    /// First position still reachable backwards: one past the furthest left
    /// question.
    fn min_allowed_position(&self) -> usize {
        self.left
            .iter()
            .filter_map(|qid| self.table.position_of_question(qid))
            .map(|pos| pos + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::test_fixtures::*;
    use crate::module::Section;

    fn navigator(bundles: Vec<Bundle>) -> Navigator {
        Navigator::new(Arc::new(module_of(bundles)), 420)
    }

    fn answer_choice(nav: &mut Navigator, qid: &str) {
        nav.on_answer_change(qid, RawAnswer::Choice(0));
    }

    #[test]
    fn required_answer_gates_next() {
        let mut nav = navigator(vec![simple("b1", 2)]);
        assert!(!nav.can_go_next());
        answer_choice(&mut nav, "b1-q0");
        assert!(nav.can_go_next());
        nav.on_answer_change("b1-q0", RawAnswer::None);
        assert!(!nav.can_go_next());
        answer_choice(&mut nav, "b1-q0");
        assert_eq!(nav.next(), NextOutcome::Advanced);
        assert_eq!(nav.position(), 1);
    }

    #[test]
    fn next_at_final_step_completes_module() {
        let mut nav = navigator(vec![simple("b1", 1)]);
        answer_choice(&mut nav, "b1-q0");
        assert!(nav.can_go_next());
        assert_eq!(nav.next(), NextOutcome::Completed);
        assert!(nav.is_completed());
        assert_eq!(nav.next(), NextOutcome::Blocked);
    }

    #[test]
    fn fill_in_gates_until_all_required_blanks_complete() {
        let mut nav = navigator(vec![simple("b1", 2), fill_in("b2", 3), simple("b3", 1)]);
        assert_eq!(nav.total_steps(), 4);
        answer_choice(&mut nav, "b1-q0");
        nav.next();
        answer_choice(&mut nav, "b1-q1");
        nav.next();
        // Position 2 is the fill-in step regardless of blank count.
        assert_eq!(nav.position(), 2);
        let complete = vec!["a".to_string(), "t".to_string()];
        nav.on_answer_change("b2-q0", RawAnswer::Letters(complete.clone()));
        nav.on_answer_change("b2-q1", RawAnswer::Letters(complete.clone()));
        assert!(!nav.can_go_next());
        nav.on_answer_change("b2-q2", RawAnswer::Letters(complete));
        assert!(nav.can_go_next());
    }

    #[test]
    fn preamble_position_for_task_sections() {
        let mut module = module_of(vec![timed_writing("b1", 420)]);
        module.section = Section::Writing;
        let mut nav = Navigator::new(Arc::new(module), 420);
        assert_eq!(nav.position(), -1);
        assert!(nav.can_go_next());
        assert!(!nav.can_go_previous());
        assert_eq!(nav.next(), NextOutcome::Advanced);
        assert_eq!(nav.position(), 0);
        // No way back onto the pre-module screen.
        assert!(!nav.can_go_previous());
    }

    #[test]
    fn warning_flow_marks_left_and_blocks_backwards() {
        let mut nav = navigator(vec![timed_writing("b1", 420), simple("b2", 1)]);
        nav.on_answer_change("b1-q", RawAnswer::Text("draft".to_string()));
        // Countdown runs to 200 remaining.
        for _ in 0..220 {
            nav.tick();
        }
        assert_eq!(nav.active_timer().unwrap().remaining_secs, 200);
        assert_eq!(nav.next(), NextOutcome::WarningRaised);
        let state = nav.navigation_state();
        assert_eq!(state.warning.as_ref().unwrap().remaining_secs, 200);

        // Back returns to the question; the countdown was never paused.
        nav.warning_back();
        assert_eq!(nav.active_timer().unwrap().remaining_secs, 200);
        for _ in 0..50 {
            nav.tick();
        }
        assert_eq!(nav.next(), NextOutcome::WarningRaised);
        assert_eq!(nav.warning_continue(), NextOutcome::Advanced);
        assert_eq!(nav.position(), 1);

        // The left question is permanently unreachable.
        assert!(nav.left_questions().contains("b1-q"));
        assert!(!nav.can_go_previous());
        assert!(!nav.previous());
        assert_eq!(nav.position(), 1);
    }

    #[test]
    fn no_warning_once_expired_and_text_becomes_read_only() {
        let mut nav = navigator(vec![timed_writing("b1", 3), simple("b2", 1)]);
        nav.on_answer_change("b1-q", RawAnswer::Text("final".to_string()));
        for _ in 0..3 {
            nav.tick();
        }
        assert!(nav.active_timer().unwrap().expired);
        // Writes after expiry are refused.
        nav.on_answer_change("b1-q", RawAnswer::Text("late edit".to_string()));
        assert_eq!(
            nav.get_answer("b1-q"),
            Some(&Response::Text("final".to_string()))
        );
        // next() proceeds immediately, no warning.
        assert_eq!(nav.next(), NextOutcome::Advanced);
    }

    #[test]
    fn previous_respects_allow_back_and_speaking() {
        let mut nav = navigator(vec![simple("b1", 1), speaking("b2", 1), simple("b3", 1)]);
        answer_choice(&mut nav, "b1-q0");
        nav.next();
        // Inside the speaking bundle: irrevocable.
        assert!(!nav.can_go_previous());
        nav.advance_for_speaking();
        assert!(!nav.can_go_previous());
        nav.advance_for_speaking();
        assert_eq!(nav.position(), 3);
        // b3 allows back, but the previous step is a speaking child.
        assert!(!nav.can_go_previous());
    }

    #[test]
    fn speaking_parent_gated_on_intro_dismissal() {
        let mut nav = navigator(vec![speaking_with_intro("b1", 1)]);
        assert_eq!(nav.intro_pending(), Some("b1"));
        assert!(!nav.can_go_next());
        assert_eq!(nav.dismiss_intro("b1"), IntroAction::StartParentPhase);
        assert_eq!(nav.intro_pending(), None);
        // Dismissing twice has no further effect.
        assert_eq!(nav.dismiss_intro("b1"), IntroAction::None);
    }

    #[test]
    fn timed_writing_intro_arms_timer_on_dismissal() {
        let mut bundle = timed_writing("b1", 300);
        if let Bundle::TimedWriting(b) = &mut bundle {
            b.intro = true;
        }
        let mut nav = navigator(vec![bundle]);
        // Before dismissal there is no countdown to warn about.
        assert!(nav.active_timer().is_none());
        assert_eq!(nav.dismiss_intro("b1"), IntroAction::TimerArmed);
        assert_eq!(nav.active_timer().unwrap().remaining_secs, 300);
    }

    #[test]
    fn ticks_keep_flowing_after_leaving_a_question() {
        let mut nav = navigator(vec![timed_writing("b1", 100), simple("b2", 1)]);
        nav.on_answer_change("b1-q", RawAnswer::Text("x".to_string()));
        for _ in 0..10 {
            nav.tick();
        }
        assert_eq!(nav.next(), NextOutcome::WarningRaised);
        assert_eq!(nav.warning_continue(), NextOutcome::Advanced);
        // Ticks keep flowing to the left question's timer too.
        for _ in 0..10 {
            nav.tick();
        }
        answer_choice(&mut nav, "b2-q0");
        assert_eq!(nav.position(), 1);
    }

    #[test]
    fn audio_reference_stored_by_pipeline_path() {
        let mut nav = navigator(vec![speaking("b1", 1)]);
        nav.store_audio_reference(
            "b1-c0",
            AudioReference {
                bucket: "responses".to_string(),
                key: "user/b1-c0.wav".to_string(),
            },
        );
        assert!(matches!(
            nav.get_answer("b1-c0"),
            Some(Response::AudioReference(_))
        ));
    }
}
