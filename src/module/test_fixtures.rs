//! Shared constructors for unit tests.

use crate::module::model::*;

pub fn module_of(bundles: Vec<Bundle>) -> Module {
    Module {
        id: "m-test".to_string(),
        section: Section::Reading,
        section_name: "Test Section".to_string(),
        bundles,
        assets: vec![],
    }
}

/// Simple bundle `id` with `n` required choice sub-questions `id-q0..`.
pub fn simple(id: &str, n: usize) -> Bundle {
    Bundle::Simple(SimpleBundle {
        id: id.to_string(),
        kind: SimpleKind::Passage,
        content: None,
        questions: (0..n)
            .map(|i| SubQuestion {
                id: format!("{id}-q{i}"),
                required: true,
                payload: QuestionPayload::Choice {
                    prompt: format!("prompt {i}"),
                    options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                },
            })
            .collect(),
        allow_back: true,
    })
}

/// Fill-in bundle `id` with `n` required blanks `id-q0..`, each one provided
/// letter plus two missing.
pub fn fill_in(id: &str, n: usize) -> Bundle {
    Bundle::FillIn(FillInBundle {
        id: id.to_string(),
        paragraph: "The ___ sat on the ___.".to_string(),
        blanks: (0..n)
            .map(|i| Blank {
                id: format!("{id}-q{i}"),
                required: true,
                provided_prefix: "c".to_string(),
                missing_letters: 2,
            })
            .collect(),
        allow_back: true,
    })
}

/// Timed-writing bundle `id` answering question `id-q` with the given
/// countdown and no intro screen.
pub fn timed_writing(id: &str, duration_secs: u64) -> Bundle {
    Bundle::TimedWriting(TimedWritingBundle {
        id: id.to_string(),
        question_id: format!("{id}-q"),
        prompt: "Write a reply.".to_string(),
        required: true,
        duration_secs: Some(duration_secs),
        intro: false,
        allow_back: true,
    })
}

pub fn sentence_build(id: &str) -> Bundle {
    Bundle::SentenceBuild(SentenceBuildBundle {
        id: id.to_string(),
        question_id: format!("{id}-q"),
        line_one: "___ the ___".to_string(),
        line_two: String::new(),
        phrases: vec!["over".to_string(), "fence".to_string(), "jumped".to_string()],
        blank_count: 2,
        required: true,
        allow_back: true,
    })
}

/// Interview-flavor speaking bundle `id` with `n` children `id-c0..`, no
/// intro and no parent prompt.
pub fn speaking(id: &str, n: usize) -> Bundle {
    Bundle::SpeakingSequence(SpeakingBundle {
        id: id.to_string(),
        kind: SpeakingKind::Interview,
        content: None,
        intro: false,
        parent_prompt: None,
        parent_image: None,
        children: (0..n)
            .map(|i| ChildPrompt {
                id: format!("{id}-c{i}"),
                prompt_audio: None,
                image: None,
            })
            .collect(),
        record_secs: None,
        upload_policy: UploadPolicy::Persist,
    })
}

/// Listen-repeat speaking bundle with intro and a parent prompt asset.
pub fn speaking_with_intro(id: &str, n: usize) -> Bundle {
    let mut bundle = speaking(id, n);
    if let Bundle::SpeakingSequence(b) = &mut bundle {
        b.kind = SpeakingKind::ListenRepeat;
        b.intro = true;
        b.parent_prompt = Some(format!("{id}-parent-audio"));
    }
    bundle
}
