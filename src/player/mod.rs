//! The session player engine.
//!
//! Flattens a module's bundles into one linear step space, gates navigation
//! on answer completeness and irreversible time's-up commitments, runs the
//! per-question countdowns and stores normalized responses. The rendering
//! layer only ever talks to the [`Navigator`]; it never mutates position,
//! responses or timers directly.

pub mod navigator;
pub mod responses;
pub mod sequencer;
pub mod timers;
pub mod trackers;

pub use navigator::{ExpiryWarning, IntroAction, NavState, Navigator, NextOutcome};
pub use responses::{AudioReference, RawAnswer, Response, ResponseStore, VariantTag};
pub use sequencer::{QuestionRange, StepTable};
pub use timers::{format_secs, TimerManager, TimerState};
pub use trackers::{LeftQuestions, SeenIntro};
