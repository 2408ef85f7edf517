//! Module, bundle and sub-question definitions.
//!
//! The JSON shape mirrors the test-definition files produced by the authoring
//! backend: a module identifies its section and carries an ordered list of
//! bundles tagged by variant. All types here are plain data; behavior lives
//! in the `player` and `speaking` modules.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Test section a module belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Reading,
    Listening,
    Writing,
    Speaking,
}

impl Section {
    /// Sections whose modules open with a pre-module instruction screen
    /// (position -1) before the first interactive step.
    pub fn has_preamble(self) -> bool {
        matches!(self, Section::Writing | Section::Speaking)
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Reading => write!(f, "reading"),
            Section::Listening => write!(f, "listening"),
            Section::Writing => write!(f, "writing"),
            Section::Speaking => write!(f, "speaking"),
        }
    }
}

/// A resolved asset reference shipped with the module definition.
///
/// Unresolved ids degrade to "no media" at lookup time rather than failing
/// the attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAsset {
    pub id: String,
    /// Only "url" is currently produced by the backend.
    pub kind: String,
    pub reference: String,
}

/// One test module: ordered bundles plus the assets they reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub section: Section,
    #[serde(default)]
    pub section_name: String,
    pub bundles: Vec<Bundle>,
    #[serde(default)]
    pub assets: Vec<ResolvedAsset>,
}

impl Module {
    /// Loads and validates a module definition from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read module file: {}", path.display()))?;
        let module: Module = serde_json::from_str(&content)
            .with_context(|| format!("Malformed module definition: {}", path.display()))?;
        module.validate()?;
        Ok(module)
    }

    /// Checks structural invariants of the definition.
    ///
    /// # Errors
    /// - If any question or bundle id appears twice
    /// - If a bundle is empty where its variant requires sub-questions
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for bundle in &self.bundles {
            if !seen.insert(bundle.id().to_string()) {
                return Err(anyhow!("Duplicate bundle id: {}", bundle.id()));
            }
            for qid in bundle.question_ids() {
                if !seen.insert(qid.to_string()) {
                    return Err(anyhow!("Duplicate question id: {qid}"));
                }
            }
            match bundle {
                Bundle::Simple(b) if b.questions.is_empty() => {
                    return Err(anyhow!("Simple bundle {} has no sub-questions", b.id));
                }
                Bundle::FillIn(b) if b.blanks.is_empty() => {
                    return Err(anyhow!("Fill-in bundle {} has no blanks", b.id));
                }
                Bundle::FillIn(b) => {
                    for blank in &b.blanks {
                        if blank.missing_letters == 0 {
                            return Err(anyhow!("Blank {} has no missing letters", blank.id));
                        }
                    }
                }
                Bundle::SpeakingSequence(b) if b.children.is_empty() => {
                    return Err(anyhow!("Speaking bundle {} has no child prompts", b.id));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Asset reference ids used anywhere in the module.
    pub fn referenced_assets(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        for bundle in &self.bundles {
            if let Bundle::SpeakingSequence(b) = bundle {
                if let Some(prompt) = &b.parent_prompt {
                    refs.push(prompt.as_str());
                }
                if let Some(image) = &b.parent_image {
                    refs.push(image.as_str());
                }
                for child in &b.children {
                    if let Some(prompt) = &child.prompt_audio {
                        refs.push(prompt.as_str());
                    }
                    if let Some(image) = &child.image {
                        refs.push(image.as_str());
                    }
                }
            }
        }
        refs
    }
}

/// A task group. The variant tag decides how many navigation steps the
/// bundle occupies and how its answers are normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bundle {
    Simple(SimpleBundle),
    FillIn(FillInBundle),
    TimedWriting(TimedWritingBundle),
    SentenceBuild(SentenceBuildBundle),
    SpeakingSequence(SpeakingBundle),
}

impl Bundle {
    pub fn id(&self) -> &str {
        match self {
            Bundle::Simple(b) => &b.id,
            Bundle::FillIn(b) => &b.id,
            Bundle::TimedWriting(b) => &b.id,
            Bundle::SentenceBuild(b) => &b.id,
            Bundle::SpeakingSequence(b) => &b.id,
        }
    }

    /// Whether backward navigation out of this bundle is permitted at all.
    /// Speaking sequences are irrevocable regardless of the flag.
    pub fn allow_back(&self) -> bool {
        match self {
            Bundle::Simple(b) => b.allow_back,
            Bundle::FillIn(b) => b.allow_back,
            Bundle::TimedWriting(b) => b.allow_back,
            Bundle::SentenceBuild(b) => b.allow_back,
            Bundle::SpeakingSequence(_) => false,
        }
    }

    /// Whether the bundle opens with a one-time instructional screen.
    pub fn has_intro(&self) -> bool {
        match self {
            Bundle::TimedWriting(b) => b.intro,
            Bundle::SpeakingSequence(b) => b.intro,
            _ => false,
        }
    }

    /// Ids of every answerable question in the bundle, in order.
    pub fn question_ids(&self) -> Vec<&str> {
        match self {
            Bundle::Simple(b) => b.questions.iter().map(|q| q.id.as_str()).collect(),
            Bundle::FillIn(b) => b.blanks.iter().map(|bl| bl.id.as_str()).collect(),
            Bundle::TimedWriting(b) => vec![b.question_id.as_str()],
            Bundle::SentenceBuild(b) => vec![b.question_id.as_str()],
            Bundle::SpeakingSequence(b) => b.children.iter().map(|c| c.id.as_str()).collect(),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Bundle::Simple(_) => "simple",
            Bundle::FillIn(_) => "fill_in",
            Bundle::TimedWriting(_) => "timed_writing",
            Bundle::SentenceBuild(_) => "sentence_build",
            Bundle::SpeakingSequence(_) => "speaking_sequence",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Reading/listening task flavors that share the simple one-step-per-question
/// shape. The flavor only matters to the rendering layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimpleKind {
    Passage,
    Notice,
    Post,
    Email,
    BestResponse,
    ListenPassage,
}

/// One or more sub-questions answered independently; each occupies one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleBundle {
    pub id: String,
    pub kind: SimpleKind,
    #[serde(default)]
    pub content: Option<String>,
    pub questions: Vec<SubQuestion>,
    #[serde(default = "default_true")]
    pub allow_back: bool,
}

/// A paragraph with several blanks, answered together as one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillInBundle {
    pub id: String,
    pub paragraph: String,
    pub blanks: Vec<Blank>,
    #[serde(default = "default_true")]
    pub allow_back: bool,
}

/// One blank of a fill-in paragraph. The candidate types the missing letters;
/// a stored answer is always the reconstructed full word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blank {
    pub id: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub provided_prefix: String,
    pub missing_letters: usize,
}

/// A single free-text response under a countdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedWritingBundle {
    pub id: String,
    pub question_id: String,
    pub prompt: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Countdown seconds. Falls back to the configured default (420) if absent.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub intro: bool,
    #[serde(default = "default_true")]
    pub allow_back: bool,
}

/// Drag-to-order phrases into the blanks of a two-line sentence; one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceBuildBundle {
    pub id: String,
    pub question_id: String,
    pub line_one: String,
    #[serde(default)]
    pub line_two: String,
    pub phrases: Vec<String>,
    pub blank_count: usize,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default = "default_true")]
    pub allow_back: bool,
}

/// Speaking task flavor. Decides the recording window and the default parent
/// behavior (the repeat flavor plays a parent prompt, the interview flavor
/// goes straight from the parent display to its first child).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeakingKind {
    ListenRepeat,
    Interview,
}

impl SpeakingKind {
    pub fn default_record_secs(self) -> u64 {
        match self {
            SpeakingKind::ListenRepeat => 8,
            SpeakingKind::Interview => 10,
        }
    }
}

/// Whether a captured recording is uploaded or discarded after the success
/// banner. Persisting is the default; sampler-style bundles may opt out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadPolicy {
    #[default]
    Persist,
    Discard,
}

/// A non-answerable parent step followed by N child prompt steps, each
/// producing one audio response. Never revisitable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakingBundle {
    pub id: String,
    pub kind: SpeakingKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_true")]
    pub intro: bool,
    /// Asset reference for the parent prompt audio. Absent for flavors that
    /// begin directly at the first child.
    #[serde(default)]
    pub parent_prompt: Option<String>,
    #[serde(default)]
    pub parent_image: Option<String>,
    pub children: Vec<ChildPrompt>,
    /// Recording window override; defaults per flavor (8s repeat, 10s interview).
    #[serde(default)]
    pub record_secs: Option<u64>,
    #[serde(default)]
    pub upload_policy: UploadPolicy,
}

impl SpeakingBundle {
    pub fn record_secs(&self) -> u64 {
        self.record_secs.unwrap_or(self.kind.default_record_secs())
    }
}

/// One child prompt of a speaking sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildPrompt {
    pub id: String,
    #[serde(default)]
    pub prompt_audio: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// An answerable sub-question of a simple bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuestion {
    pub id: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(flatten)]
    pub payload: QuestionPayload,
}

/// Variant-specific payload of a sub-question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionPayload {
    /// Single selection among fixed options.
    Choice { prompt: String, options: Vec<String> },
    /// Informational step with nothing to answer.
    None { prompt: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(id: &str) -> SubQuestion {
        SubQuestion {
            id: id.to_string(),
            required: true,
            payload: QuestionPayload::Choice {
                prompt: "?".to_string(),
                options: vec!["a".to_string(), "b".to_string()],
            },
        }
    }

    #[test]
    fn duplicate_question_ids_rejected() {
        let module = Module {
            id: "m1".to_string(),
            section: Section::Reading,
            section_name: String::new(),
            bundles: vec![Bundle::Simple(SimpleBundle {
                id: "b1".to_string(),
                kind: SimpleKind::Passage,
                content: None,
                questions: vec![choice("q1"), choice("q1")],
                allow_back: true,
            })],
            assets: vec![],
        };
        assert!(module.validate().is_err());
    }

    #[test]
    fn speaking_bundle_never_allows_back() {
        let bundle = Bundle::SpeakingSequence(SpeakingBundle {
            id: "s1".to_string(),
            kind: SpeakingKind::Interview,
            content: None,
            intro: false,
            parent_prompt: None,
            parent_image: None,
            children: vec![ChildPrompt {
                id: "c1".to_string(),
                prompt_audio: None,
                image: None,
            }],
            record_secs: None,
            upload_policy: UploadPolicy::Persist,
        });
        assert!(!bundle.allow_back());
    }

    #[test]
    fn record_secs_defaults_per_flavor() {
        assert_eq!(SpeakingKind::ListenRepeat.default_record_secs(), 8);
        assert_eq!(SpeakingKind::Interview.default_record_secs(), 10);
    }

    #[test]
    fn module_json_round_trips() {
        let json = r#"{
            "id": "m1",
            "section": "reading",
            "section_name": "Reading",
            "bundles": [
                {
                    "type": "fill_in",
                    "id": "b1",
                    "paragraph": "The c_t sat.",
                    "blanks": [
                        {"id": "q1", "provided_prefix": "c", "missing_letters": 2}
                    ]
                }
            ]
        }"#;
        let module: Module = serde_json::from_str(json).unwrap();
        module.validate().unwrap();
        assert_eq!(module.bundles.len(), 1);
        assert_eq!(module.bundles[0].question_ids(), vec!["q1"]);
    }
}
