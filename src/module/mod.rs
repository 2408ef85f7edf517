//! Test module data model.
//!
//! A module is the immutable unit of delivery: an ordered list of bundles,
//! each bundle a group of sub-questions under one task variant. Modules are
//! loaded once per attempt from a JSON definition and never mutated.

pub mod assets;
pub mod model;
#[cfg(test)]
pub mod test_fixtures;

pub use assets::AssetResolver;
pub use model::{
    Blank, Bundle, ChildPrompt, FillInBundle, Module, QuestionPayload, Section, SentenceBuildBundle,
    SimpleBundle, SimpleKind, SpeakingBundle, SpeakingKind, SubQuestion, TimedWritingBundle,
    UploadPolicy,
};
