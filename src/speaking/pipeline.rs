//! The capture pipeline state machine.
//!
//! One pipeline instance drives one speaking-sequence bundle. Phases run
//! strictly in sequence; the pipeline never reports a child as done until an
//! upload attempt for that child has returned success. Upload failure parks
//! the instance in a blocking failed phase from which only a manual retry
//! (re-using the captured recording, never re-recording) can exit.
//!
//! Cancellation contract: the driver drops the in-flight future and then
//! calls [`SpeakingPipeline::cancel`], which releases the retained recording,
//! bumps the epoch so any straggling completion is discarded, and clears the
//! in-flight guard.

use crate::module::{AssetResolver, SpeakingBundle, UploadPolicy};
use crate::player::AudioReference;
use crate::speaking::{
    MediaPlayer, PlaybackOutcome, RecordedAudio, Recorder, ResponseUploader, SpeakingPhase,
    BANNER_DELAY, CUE_LEAD, PHASE_DELAY,
};
use std::time::Duration;
use tokio::time::sleep;

/// How a parent phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentOutcome {
    /// Advance to child 0.
    Completed,
    Cancelled,
}

/// How one child capture/upload cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildOutcome {
    /// Upload resolved successfully (or the bundle's policy discards audio);
    /// the caller may now advance past this child. `reference` is `None`
    /// under the discard policy.
    Uploaded {
        child: usize,
        reference: Option<AudioReference>,
    },
    /// Upload failed; the recording is retained and `retry` may be called.
    Failed { child: usize },
    /// The instance was cancelled while the cycle was resolving.
    Cancelled,
    /// A cycle is already resolving; the request was refused.
    Busy,
}

struct PendingUpload {
    child: usize,
    audio: RecordedAudio,
}

/// Per-bundle capture pipeline over pluggable playback, capture and upload.
pub struct SpeakingPipeline<P, R, U> {
    bundle: SpeakingBundle,
    assets: AssetResolver,
    player: P,
    recorder: R,
    uploader: U,
    phase: SpeakingPhase,
    pending: Option<PendingUpload>,
    in_flight: bool,
    epoch: u64,
}

impl<P: MediaPlayer, R: Recorder, U: ResponseUploader> SpeakingPipeline<P, R, U> {
    pub fn new(
        bundle: SpeakingBundle,
        assets: AssetResolver,
        player: P,
        recorder: R,
        uploader: U,
    ) -> Self {
        Self {
            bundle,
            assets,
            player,
            recorder,
            uploader,
            phase: SpeakingPhase::Idle,
            pending: None,
            in_flight: false,
            epoch: 0,
        }
    }

    /// The published phase slot; readable at any time without polling.
    pub fn phase(&self) -> SpeakingPhase {
        self.phase
    }

    pub fn bundle(&self) -> &SpeakingBundle {
        &self.bundle
    }

    /// Tears down the instance: discards the retained recording, invalidates
    /// any straggling completion and clears the in-flight guard. Must be
    /// called after dropping an unresolved pipeline future.
    pub fn cancel(&mut self) {
        self.epoch += 1;
        self.pending = None;
        self.in_flight = false;
        self.set_phase(SpeakingPhase::Idle);
        tracing::debug!("Speaking pipeline cancelled for bundle {}", self.bundle.id);
    }

    /// Runs the parent phase: delay, parent prompt playback (when the flavor
    /// has one), delay. The intro, if any, must already be dismissed. On
    /// `Completed` the caller advances to child 0.
    pub async fn run_parent(&mut self) -> ParentOutcome {
        let epoch = self.epoch;
        self.set_phase(SpeakingPhase::ParentDelay);
        sleep(PHASE_DELAY).await;
        if self.stale(epoch) {
            return ParentOutcome::Cancelled;
        }
        // The interview flavor carries no parent prompt and goes straight
        // from the display delay to its first child.
        if let Some(prompt) = self.bundle.parent_prompt.clone() {
            self.set_phase(SpeakingPhase::ParentPrompt);
            self.play_asset(&prompt).await;
            if self.stale(epoch) {
                return ParentOutcome::Cancelled;
            }
            sleep(PHASE_DELAY).await;
            if self.stale(epoch) {
                return ParentOutcome::Cancelled;
            }
        }
        self.set_phase(SpeakingPhase::Idle);
        ParentOutcome::Completed
    }

    /// Runs one full child cycle: display, prompt, cue tone, fixed-duration
    /// recording, packaging, upload. Refused while another cycle is still
    /// resolving.
    pub async fn run_child(&mut self, child: usize) -> ChildOutcome {
        if self.in_flight {
            tracing::warn!("Capture cycle refused: another cycle is still resolving");
            return ChildOutcome::Busy;
        }
        self.in_flight = true;
        let outcome = self.child_cycle(child).await;
        self.in_flight = false;
        outcome
    }

    /// Re-attempts packaging and upload of the retained recording. Never
    /// re-records.
    pub async fn retry(&mut self) -> ChildOutcome {
        if self.in_flight {
            tracing::warn!("Retry refused: a cycle is still resolving");
            return ChildOutcome::Busy;
        }
        if self.pending.is_none() {
            tracing::warn!("Retry requested with no retained recording");
            return ChildOutcome::Cancelled;
        }
        self.in_flight = true;
        let epoch = self.epoch;
        let outcome = self.resolve_upload(epoch).await;
        self.in_flight = false;
        outcome
    }

    async fn child_cycle(&mut self, child: usize) -> ChildOutcome {
        let epoch = self.epoch;
        self.set_phase(SpeakingPhase::ChildDisplay(child));
        sleep(PHASE_DELAY).await;
        if self.stale(epoch) {
            return ChildOutcome::Cancelled;
        }

        if let Some(prompt) = self
            .bundle
            .children
            .get(child)
            .and_then(|c| c.prompt_audio.clone())
        {
            self.set_phase(SpeakingPhase::ChildPrompt(child));
            self.play_asset(&prompt).await;
            if self.stale(epoch) {
                return ChildOutcome::Cancelled;
            }
        }
        sleep(PHASE_DELAY).await;
        if self.stale(epoch) {
            return ChildOutcome::Cancelled;
        }

        self.set_phase(SpeakingPhase::CueTone(child));
        if let Some(url) = self.assets.cue_tone().map(str::to_string) {
            if self.player.play(&url).await == PlaybackOutcome::Failed {
                tracing::warn!("Cue tone playback failed, continuing");
            }
        }
        sleep(CUE_LEAD).await;
        if self.stale(epoch) {
            return ChildOutcome::Cancelled;
        }

        self.set_phase(SpeakingPhase::Recording(child));
        let window = Duration::from_secs(self.bundle.record_secs());
        let audio = self.recorder.record(window).await;
        if self.stale(epoch) {
            return ChildOutcome::Cancelled;
        }
        if audio.is_empty() {
            tracing::warn!("Empty recording for child {child}, proceeding");
        }

        self.set_phase(SpeakingPhase::Packaging(child));
        self.pending = Some(PendingUpload { child, audio });
        self.resolve_upload(epoch).await
    }

    async fn resolve_upload(&mut self, epoch: u64) -> ChildOutcome {
        let Some(child) = self.pending.as_ref().map(|p| p.child) else {
            return ChildOutcome::Cancelled;
        };

        if self.bundle.upload_policy == UploadPolicy::Discard {
            // Sampler-style bundles run the success path without persisting.
            self.pending = None;
            return self.success(epoch, child, None).await;
        }

        self.set_phase(SpeakingPhase::Uploading(child));
        let question_id = self.bundle.children[child].id.clone();
        let result = match self.pending.as_ref() {
            Some(pending) => self.uploader.upload(&question_id, &pending.audio).await,
            None => return ChildOutcome::Cancelled,
        };
        match result {
            Ok(reference) => {
                if self.stale(epoch) {
                    return ChildOutcome::Cancelled;
                }
                self.pending = None;
                self.success(epoch, child, Some(reference)).await
            }
            Err(err) => {
                if self.stale(epoch) {
                    return ChildOutcome::Cancelled;
                }
                tracing::error!("Upload failed for {question_id}: {err}");
                self.set_phase(SpeakingPhase::Failed(child));
                ChildOutcome::Failed { child }
            }
        }
    }

    async fn success(
        &mut self,
        epoch: u64,
        child: usize,
        reference: Option<AudioReference>,
    ) -> ChildOutcome {
        self.set_phase(SpeakingPhase::Banner(child));
        sleep(BANNER_DELAY).await;
        if self.stale(epoch) {
            return ChildOutcome::Cancelled;
        }
        self.set_phase(SpeakingPhase::Idle);
        ChildOutcome::Uploaded { child, reference }
    }

    /// Prompt playback fails open: load/play errors count as completion.
    async fn play_asset(&mut self, asset_id: &str) {
        match self.assets.resolve(asset_id).map(str::to_string) {
            Some(url) => {
                if self.player.play(&url).await == PlaybackOutcome::Failed {
                    tracing::warn!("Playback failed for {asset_id}, treating as completed");
                }
            }
            None => {
                // Unresolved reference degrades to no media.
                tracing::debug!("No media for asset {asset_id}");
            }
        }
    }

    fn set_phase(&mut self, phase: SpeakingPhase) {
        tracing::debug!("Speaking phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn stale(&self, epoch: u64) -> bool {
        self.epoch != epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::test_fixtures::{speaking, speaking_with_intro};
    use crate::module::Bundle;
    use std::cell::RefCell;
    use std::future::Future;
    use std::rc::Rc;

    struct FakePlayer {
        played: Rc<RefCell<Vec<String>>>,
    }

    impl MediaPlayer for FakePlayer {
        async fn play(&mut self, url: &str) -> PlaybackOutcome {
            self.played.borrow_mut().push(url.to_string());
            PlaybackOutcome::Completed
        }
    }

    struct FakeRecorder {
        captures: Rc<RefCell<usize>>,
    }

    impl Recorder for FakeRecorder {
        async fn record(&mut self, _duration: Duration) -> RecordedAudio {
            *self.captures.borrow_mut() += 1;
            RecordedAudio {
                wav: vec![0u8; 64],
                duration: Duration::from_secs(8),
            }
        }
    }

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyUploader {
        failures: usize,
        attempts: Rc<RefCell<usize>>,
    }

    impl ResponseUploader for FlakyUploader {
        async fn upload(
            &mut self,
            question_id: &str,
            _audio: &RecordedAudio,
        ) -> anyhow::Result<AudioReference> {
            let mut attempts = self.attempts.borrow_mut();
            *attempts += 1;
            if *attempts <= self.failures {
                anyhow::bail!("server unavailable");
            }
            Ok(AudioReference {
                bucket: "responses".to_string(),
                key: format!("user/{question_id}.wav"),
            })
        }
    }

    fn speaking_bundle(id: &str, children: usize) -> SpeakingBundle {
        match speaking(id, children) {
            Bundle::SpeakingSequence(b) => b,
            _ => unreachable!(),
        }
    }

    fn pipeline(
        bundle: SpeakingBundle,
        failures: usize,
    ) -> (
        SpeakingPipeline<FakePlayer, FakeRecorder, FlakyUploader>,
        Rc<RefCell<usize>>,
        Rc<RefCell<usize>>,
    ) {
        let attempts = Rc::new(RefCell::new(0));
        let captures = Rc::new(RefCell::new(0));
        let p = SpeakingPipeline::new(
            bundle,
            AssetResolver::default(),
            FakePlayer {
                played: Rc::new(RefCell::new(Vec::new())),
            },
            FakeRecorder {
                captures: Rc::clone(&captures),
            },
            FlakyUploader {
                failures,
                attempts: Rc::clone(&attempts),
            },
        );
        (p, attempts, captures)
    }

    #[tokio::test(start_paused = true)]
    async fn child_uploads_before_reporting_done() {
        let (mut pipeline, attempts, captures) = pipeline(speaking_bundle("b1", 2), 0);
        let outcome = pipeline.run_child(0).await;
        assert_eq!(
            outcome,
            ChildOutcome::Uploaded {
                child: 0,
                reference: Some(AudioReference {
                    bucket: "responses".to_string(),
                    key: "user/b1-c0.wav".to_string(),
                }),
            }
        );
        assert_eq!(*attempts.borrow(), 1);
        assert_eq!(*captures.borrow(), 1);
        assert_eq!(pipeline.phase(), SpeakingPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn upload_failures_block_until_manual_retry_succeeds() {
        // Fails twice, succeeds on the third (second manual retry) attempt.
        let (mut pipeline, attempts, captures) = pipeline(speaking_bundle("b1", 2), 2);

        let outcome = pipeline.run_child(0).await;
        assert_eq!(outcome, ChildOutcome::Failed { child: 0 });
        assert_eq!(pipeline.phase(), SpeakingPhase::Failed(0));

        assert_eq!(pipeline.retry().await, ChildOutcome::Failed { child: 0 });
        let outcome = pipeline.retry().await;
        assert!(matches!(outcome, ChildOutcome::Uploaded { child: 0, .. }));

        // Three upload attempts, exactly one capture: retries never re-record.
        assert_eq!(*attempts.borrow(), 3);
        assert_eq!(*captures.borrow(), 1);

        // Nothing left to retry once the upload resolved.
        assert_eq!(pipeline.retry().await, ChildOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_policy_skips_upload_but_runs_success_path() {
        let mut bundle = speaking_bundle("b1", 1);
        bundle.upload_policy = UploadPolicy::Discard;
        let (mut pipeline, attempts, _) = pipeline(bundle, 0);
        let outcome = pipeline.run_child(0).await;
        assert_eq!(
            outcome,
            ChildOutcome::Uploaded {
                child: 0,
                reference: None,
            }
        );
        assert_eq!(*attempts.borrow(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_recording_and_clears_guard() {
        let (mut pipeline, _, _) = pipeline(speaking_bundle("b1", 1), 1);
        assert_eq!(pipeline.run_child(0).await, ChildOutcome::Failed { child: 0 });
        pipeline.cancel();
        assert_eq!(pipeline.phase(), SpeakingPhase::Idle);
        // The retained recording is gone; retry has nothing to resolve.
        assert_eq!(pipeline.retry().await, ChildOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_cycle_discards_the_interrupted_attempt() {
        let (mut pipeline, attempts, captures) = pipeline(speaking_bundle("b1", 1), 0);

        // Drive the cycle to its first suspension point, then drop it, the
        // way the driver abandons an unresolved cycle.
        {
            let mut cycle = std::pin::pin!(pipeline.run_child(0));
            let mut cx = std::task::Context::from_waker(std::task::Waker::noop());
            assert!(cycle.as_mut().poll(&mut cx).is_pending());
        }

        pipeline.cancel();
        assert_eq!(pipeline.phase(), SpeakingPhase::Idle);

        // The interrupted cycle captured and uploaded nothing, and left no
        // recording behind for retry.
        assert_eq!(*captures.borrow(), 0);
        assert_eq!(*attempts.borrow(), 0);
        assert_eq!(pipeline.retry().await, ChildOutcome::Cancelled);

        // cancel released the in-flight guard; a fresh cycle runs clean.
        let outcome = pipeline.run_child(0).await;
        assert!(matches!(outcome, ChildOutcome::Uploaded { child: 0, .. }));
        assert_eq!(*captures.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_without_prompt_advances_after_display_delay() {
        let bundle = speaking_bundle("b1", 1);
        assert!(bundle.parent_prompt.is_none());
        let (mut pipeline, _, _) = pipeline(bundle, 0);
        assert_eq!(pipeline.run_parent().await, ParentOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_prompt_plays_when_resolvable() {
        let bundle = match speaking_with_intro("b1", 1) {
            Bundle::SpeakingSequence(b) => b,
            _ => unreachable!(),
        };
        let played = Rc::new(RefCell::new(Vec::new()));
        let resolver = AssetResolver::new(&[crate::module::model::ResolvedAsset {
            id: "b1-parent-audio".to_string(),
            kind: "url".to_string(),
            reference: "https://cdn.example/parent.mp3".to_string(),
        }]);
        let mut pipeline = SpeakingPipeline::new(
            bundle,
            resolver,
            FakePlayer {
                played: Rc::clone(&played),
            },
            FakeRecorder {
                captures: Rc::new(RefCell::new(0)),
            },
            FlakyUploader {
                failures: 0,
                attempts: Rc::new(RefCell::new(0)),
            },
        );
        assert_eq!(pipeline.run_parent().await, ParentOutcome::Completed);
        assert_eq!(
            played.borrow().as_slice(),
            ["https://cdn.example/parent.mp3"]
        );
    }
}
