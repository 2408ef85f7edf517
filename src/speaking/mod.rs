//! Spoken-response capture.
//!
//! A speaking-sequence bundle is driven by a dedicated pipeline: prompt
//! playback, cue tone, fixed-duration recording, packaging, upload with
//! manual retry, and only then advancement. Playback, capture and upload sit
//! behind traits so the pipeline's ordering guarantees can be tested without
//! a microphone or a network.

pub mod capture;
pub mod pipeline;
pub mod playback;
pub mod upload;

pub use capture::MicRecorder;
pub use pipeline::{ChildOutcome, ParentOutcome, SpeakingPipeline};
pub use playback::SystemPlayer;
pub use upload::HttpUploader;

use crate::player::AudioReference;
use std::time::Duration;

/// Seconds shown between phases: display → prompt and prompt → cue.
pub const PHASE_DELAY: Duration = Duration::from_secs(2);
/// How long the "response saved" banner stays up before advancing.
pub const BANNER_DELAY: Duration = Duration::from_secs(2);
/// Breathing room between the cue tone and the recording window.
pub const CUE_LEAD: Duration = Duration::from_millis(100);

/// A packaged recording held in memory until its upload resolves. May be
/// empty: a capture-device fault fails open to a zero-length recording so a
/// single device fault cannot strand the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    /// WAV-packaged PCM, ready for a binary PUT.
    pub wav: Vec<u8>,
    pub duration: Duration,
}

impl RecordedAudio {
    pub fn empty() -> Self {
        Self {
            wav: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wav.is_empty()
    }
}

/// Playback never blocks the pipeline: failures are absorbed and treated as
/// completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed,
}

/// Plays prompt and cue audio. Implementations read the session volume on
/// every element they open, so a level change reaches the next playback
/// without re-constructing the player.
pub trait MediaPlayer {
    async fn play(&mut self, url: &str) -> PlaybackOutcome;
}

/// Captures the microphone for a fixed window. The device is requested per
/// attempt and released as soon as the window ends or the future is dropped.
pub trait Recorder {
    async fn record(&mut self, duration: Duration) -> RecordedAudio;
}

/// Packages and uploads one recording, returning the stored reference.
/// Failures are surfaced to the candidate as a blocking retry prompt; this
/// is the only error kind the pipeline does not absorb.
pub trait ResponseUploader {
    async fn upload(
        &mut self,
        question_id: &str,
        audio: &RecordedAudio,
    ) -> anyhow::Result<AudioReference>;
}

/// Phase of a speaking-sequence instance, published for the navigator and
/// rendering layer to read synchronously (no polling of child widgets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeakingPhase {
    #[default]
    Idle,
    ParentDelay,
    ParentPrompt,
    ChildDisplay(usize),
    ChildPrompt(usize),
    CueTone(usize),
    Recording(usize),
    Packaging(usize),
    Uploading(usize),
    Banner(usize),
    Failed(usize),
}
