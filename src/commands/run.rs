//! Interactive module attempt.
//!
//! Runs one module end to end as a line-oriented session: the current step is
//! rendered to stdout, commands are read from stdin, and a shared one-second
//! tick drives every armed countdown. Speaking sequences hand control to the
//! capture pipeline; everything else goes through the navigator.
//!
//! The whole session runs on the current task. Capture streams are not
//! sendable, so pipeline futures are awaited inline (racing the tick) rather
//! than spawned.

use crate::config::{TessioConfig, VolumeHandle};
use crate::module::{AssetResolver, Bundle, Module, QuestionPayload, SpeakingBundle};
use crate::player::{
    format_secs, IntroAction, Navigator, NextOutcome, QuestionRange, RawAnswer, Response,
};
use crate::speaking::{
    ChildOutcome, HttpUploader, MicRecorder, ParentOutcome, SpeakingPipeline, SystemPlayer,
};
use anyhow::Result;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// Runs an interactive attempt of the module at `file`.
pub async fn handle_run(file: PathBuf) -> Result<()> {
    let config = TessioConfig::load()?;
    let module = Arc::new(Module::from_path(&file)?);
    tracing::info!(
        "Starting attempt of module {} ({} bundles)",
        module.id,
        module.bundles.len()
    );

    let volume = VolumeHandle::new(config.playback.volume);
    let mut session = Session::new(module, &config, volume);
    session.run().await
}

struct Session {
    navigator: Navigator,
    assets: AssetResolver,
    config: TessioConfig,
    volume: VolumeHandle,
}

impl Session {
    fn new(module: Arc<Module>, config: &TessioConfig, volume: VolumeHandle) -> Self {
        let assets = AssetResolver::new(&module.assets);
        let navigator = Navigator::new(module, config.writing.default_duration_secs);
        Self {
            navigator,
            assets,
            config: config.clone(),
            volume,
        }
    }

    async fn run(&mut self) -> Result<()> {
        self.run_with_input(tokio::io::stdin()).await
    }

    async fn run_with_input<I: AsyncRead + Unpin>(&mut self, input: I) -> Result<()> {
        let mut lines = BufReader::new(input).lines();
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.render();

        while !self.navigator.is_completed() {
            // Speaking steps are pipeline-driven; all other steps wait for a
            // candidate command.
            if let Some((bundle, offset)) = self.active_speaking_bundle() {
                if self
                    .drive_speaking(bundle, offset, &mut lines, &mut tick)
                    .await?
                {
                    tracing::info!("Attempt abandoned during speaking sequence");
                    return Ok(());
                }
                continue;
            }

            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        tracing::info!("Input closed, ending attempt");
                        return Ok(());
                    };
                    if self.dispatch(&line) {
                        return Ok(());
                    }
                }
                _ = tick.tick() => {
                    self.on_tick();
                }
            }
        }

        self.finish();
        Ok(())
    }

    /// The speaking bundle owning the current step and the step's offset in
    /// it, if the step is ready to be pipeline-driven (intro dismissed).
    fn active_speaking_bundle(&self) -> Option<(SpeakingBundle, usize)> {
        if self.navigator.intro_pending().is_some() {
            return None;
        }
        match self.navigator.current_bundle() {
            Some((Bundle::SpeakingSequence(b), offset)) => Some((b.clone(), offset)),
            _ => None,
        }
    }

    /// Offset of the current step within its speaking bundle, if any.
    fn speaking_offset(&self) -> Option<usize> {
        match self.navigator.current_bundle() {
            Some((Bundle::SpeakingSequence(_), offset)) => Some(offset),
            _ => None,
        }
    }

    /// Runs the speaking steps of `bundle` from `offset` to the bundle's end.
    /// The parent phase and each child cycle advance the navigator
    /// themselves; candidate input is only consulted on upload failure
    /// (retry or quit). Returns true when the candidate abandoned the
    /// attempt, which ends the whole session.
    async fn drive_speaking<I: AsyncRead + Unpin>(
        &mut self,
        bundle: SpeakingBundle,
        offset: usize,
        lines: &mut Lines<BufReader<I>>,
        tick: &mut tokio::time::Interval,
    ) -> Result<bool> {
        let player = SystemPlayer::new(self.volume.subscribe());
        let recorder = MicRecorder::new(
            self.config.capture.sample_rate,
            self.config.capture.device.clone(),
        );
        let uploader = HttpUploader::new(
            self.config.upload.api_base_url.clone(),
            self.config.upload.auth_token.clone(),
            self.config.upload.user_email.clone(),
            self.config.upload.session_id.clone(),
        )?;
        let mut pipeline =
            SpeakingPipeline::new(bundle.clone(), self.assets.clone(), player, recorder, uploader);

        // Offset 0 is the parent step; offset k >= 1 is child k - 1.
        let first_child = if offset == 0 {
            println!("(speaking) {}", bundle.id);
            match self.with_ticks(pipeline.run_parent(), tick).await {
                ParentOutcome::Completed => {
                    if self.speaking_offset() == Some(0) {
                        self.navigator.advance_for_speaking();
                    }
                    self.render();
                    0
                }
                ParentOutcome::Cancelled => return Ok(true),
            }
        } else {
            offset - 1
        };

        for child in first_child..bundle.children.len() {
            loop {
                let outcome = self.with_ticks(pipeline.run_child(child), tick).await;
                let outcome = match outcome {
                    ChildOutcome::Failed { child } => {
                        self.await_retry(&mut pipeline, child, lines, tick).await?
                    }
                    other => other,
                };
                match outcome {
                    ChildOutcome::Uploaded { reference, .. } => {
                        if let Some(reference) = reference {
                            self.navigator
                                .store_audio_reference(&bundle.children[child].id, reference);
                        }
                        // Advance only while still on this child's step.
                        if self.speaking_offset() == Some(child + 1) {
                            self.navigator.advance_for_speaking();
                        }
                        self.render();
                        break;
                    }
                    ChildOutcome::Cancelled => {
                        tracing::info!("Speaking sequence cancelled");
                        return Ok(true);
                    }
                    ChildOutcome::Busy | ChildOutcome::Failed { .. } => {
                        // Failed only reappears here if a retry failed again;
                        // loop back into await_retry via run.
                        continue;
                    }
                }
            }
        }
        Ok(false)
    }

    /// Blocks on candidate input after an upload failure. Only `retry` and
    /// `quit` act; the countdown tick keeps running for unrelated timers.
    async fn await_retry<I: AsyncRead + Unpin>(
        &mut self,
        pipeline: &mut SpeakingPipeline<SystemPlayer, MicRecorder, HttpUploader>,
        child: usize,
        lines: &mut Lines<BufReader<I>>,
        tick: &mut tokio::time::Interval,
    ) -> Result<ChildOutcome> {
        println!("Upload failed. Type 'retry' to try again.");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        pipeline.cancel();
                        return Ok(ChildOutcome::Cancelled);
                    };
                    match line.trim() {
                        "retry" => {
                            let outcome = self.with_ticks(pipeline.retry(), tick).await;
                            if matches!(outcome, ChildOutcome::Failed { .. }) {
                                println!("Upload failed. Type 'retry' to try again.");
                                continue;
                            }
                            return Ok(outcome);
                        }
                        "quit" => {
                            pipeline.cancel();
                            return Ok(ChildOutcome::Cancelled);
                        }
                        other => {
                            if !other.is_empty() {
                                println!("Waiting on upload for child {child}; 'retry' or 'quit'.");
                            }
                        }
                    }
                }
                _ = tick.tick() => {
                    self.on_tick();
                }
            }
        }
    }

    /// Awaits `fut` while keeping armed countdowns ticking, so a writing
    /// timer keeps counting down during a long playback or upload.
    async fn with_ticks<F: Future>(
        &mut self,
        fut: F,
        tick: &mut tokio::time::Interval,
    ) -> F::Output {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return out,
                _ = tick.tick() => self.on_tick(),
            }
        }
    }

    /// Handles one command line. Returns true to quit the session.
    fn dispatch(&mut self, line: &str) -> bool {
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };
        match command {
            "" => {}
            "next" | "n" => match self.navigator.next() {
                NextOutcome::Advanced | NextOutcome::Completed => self.render(),
                NextOutcome::WarningRaised => self.render_warning(),
                NextOutcome::Blocked => println!("Cannot advance from here."),
            },
            "back" | "b" => {
                if self.navigator.previous() {
                    self.render();
                } else {
                    println!("Cannot go back from here.");
                }
            }
            "dismiss" | "d" => self.dismiss(),
            "continue" => match self.navigator.warning_continue() {
                NextOutcome::Advanced | NextOutcome::Completed => self.render(),
                _ => println!("No warning to resolve."),
            },
            "return" => {
                self.navigator.warning_back();
                self.render();
            }
            "answer" | "a" => self.answer_choice(rest),
            "text" | "t" => self.answer_text(rest),
            "fill" | "f" => self.answer_fill(rest),
            "order" | "o" => self.answer_order(rest),
            "clear" => self.answer_clear(),
            "volume" | "v" => self.set_volume(rest),
            "status" => self.render(),
            "quit" | "q" => {
                tracing::info!("Attempt abandoned by candidate");
                return true;
            }
            other => println!("Unknown command: {other}"),
        }
        false
    }

    fn dismiss(&mut self) {
        let Some(id) = self.navigator.intro_pending().map(str::to_string) else {
            println!("No instructions to dismiss.");
            return;
        };
        match self.navigator.dismiss_intro(&id) {
            IntroAction::TimerArmed => {
                println!("Countdown started.");
                self.render();
            }
            // The pipeline takes over from the main loop on the next pass.
            IntroAction::StartParentPhase | IntroAction::None => self.render(),
        }
    }

    fn answer_choice(&mut self, rest: &str) {
        let Some(question_id) = self.current_question() else {
            println!("Nothing to answer on this step.");
            return;
        };
        match rest.parse::<usize>() {
            Ok(index) => {
                self.navigator
                    .on_answer_change(&question_id, RawAnswer::Choice(index));
                self.render();
            }
            Err(_) => println!("Usage: answer <option-index>"),
        }
    }

    fn answer_text(&mut self, rest: &str) {
        let Some(question_id) = self.current_question() else {
            println!("Nothing to answer on this step.");
            return;
        };
        self.navigator
            .on_answer_change(&question_id, RawAnswer::Text(rest.to_string()));
        self.render();
    }

    /// `fill <blank-index> <letters...>` sets one blank's letter slots.
    fn answer_fill(&mut self, rest: &str) {
        let Some((Bundle::FillIn(bundle), _)) = self.navigator.current_bundle() else {
            println!("This step has no blanks.");
            return;
        };
        let mut parts = rest.split_whitespace();
        let Some(index) = parts.next().and_then(|p| p.parse::<usize>().ok()) else {
            println!("Usage: fill <blank-index> <letter> <letter> ...");
            return;
        };
        let Some(blank) = bundle.blanks.get(index) else {
            println!("No blank at index {index}.");
            return;
        };
        let blank_id = blank.id.clone();
        let mut slots: Vec<String> = parts.map(|p| p.to_string()).collect();
        slots.resize(blank.missing_letters, String::new());
        self.navigator
            .on_answer_change(&blank_id, RawAnswer::Letters(slots));
        self.render();
    }

    /// `order <phrase-index> <phrase-index> ...` fills the sentence blanks.
    fn answer_order(&mut self, rest: &str) {
        let Some(question_id) = self.current_question() else {
            println!("Nothing to answer on this step.");
            return;
        };
        let choices: Result<Vec<usize>, _> =
            rest.split_whitespace().map(|p| p.parse::<usize>()).collect();
        match choices {
            Ok(choices) => {
                self.navigator
                    .on_answer_change(&question_id, RawAnswer::Choices(choices));
                self.render();
            }
            Err(_) => println!("Usage: order <phrase-index> <phrase-index> ..."),
        }
    }

    fn answer_clear(&mut self) {
        if let Some(question_id) = self.current_question() {
            self.navigator.on_answer_change(&question_id, RawAnswer::None);
            self.render();
        }
    }

    fn set_volume(&mut self, rest: &str) {
        match rest.parse::<u8>() {
            Ok(level) => {
                self.volume.set(level);
                println!("Volume: {}", self.volume.get());
            }
            Err(_) => println!("Usage: volume <0-100>"),
        }
    }

    /// The answerable question id of the current step, if it has exactly one.
    fn current_question(&self) -> Option<String> {
        let position = self.navigator.position();
        if position < 0 {
            return None;
        }
        match self.navigator.current_bundle() {
            Some((Bundle::TimedWriting(b), _)) => Some(b.question_id.clone()),
            Some((Bundle::SentenceBuild(b), _)) => Some(b.question_id.clone()),
            _ => self
                .navigator
                .table()
                .sub_question_at(position as usize)
                .map(str::to_string),
        }
    }

    fn on_tick(&mut self) {
        for question_id in self.navigator.tick() {
            println!("Time is up for {question_id}. The response is now read-only.");
        }
    }

    fn render(&self) {
        let state = self.navigator.navigation_state();
        if state.completed {
            return;
        }
        println!();
        if state.position < 0 {
            println!(
                "[{}] {}",
                self.navigator.module().section,
                self.navigator.module().section_name
            );
            println!("Read the instructions, then type 'next' to begin.");
            return;
        }

        let position = state.position as usize;
        print!("Step {}/{}", position + 1, state.total_steps);
        match state.question_range {
            QuestionRange::None => println!(),
            range => println!("  ({range})"),
        }

        if let Some(id) = self.navigator.intro_pending() {
            println!("Instructions for {id}. Type 'dismiss' to continue.");
            return;
        }

        match self.navigator.current_bundle() {
            Some((Bundle::Simple(b), offset)) => {
                if let Some(question) = b.questions.get(offset) {
                    match &question.payload {
                        QuestionPayload::Choice { prompt, options } => {
                            println!("{prompt}");
                            for (i, option) in options.iter().enumerate() {
                                let marker = match self.navigator.get_answer(&question.id) {
                                    Some(Response::Choice(c)) if *c == i => "*",
                                    _ => " ",
                                };
                                println!("  [{marker}] {i}: {option}");
                            }
                        }
                        QuestionPayload::None { prompt } => println!("{prompt}"),
                    }
                }
            }
            Some((Bundle::FillIn(b), _)) => {
                println!("{}", b.paragraph);
                for (i, blank) in b.blanks.iter().enumerate() {
                    let answer = match self.navigator.get_answer(&blank.id) {
                        Some(Response::Text(word)) => word.clone(),
                        _ => format!("{}{}", blank.provided_prefix, "_".repeat(blank.missing_letters)),
                    };
                    println!("  blank {i}: {answer}");
                }
            }
            Some((Bundle::TimedWriting(b), _)) => {
                println!("{}", b.prompt);
                if let Some(timer) = self.navigator.active_timer() {
                    if timer.expired {
                        println!("Time is up. The response is read-only.");
                    } else {
                        println!("Time remaining: {}", format_secs(timer.remaining_secs));
                    }
                }
            }
            Some((Bundle::SentenceBuild(b), _)) => {
                println!("{}", b.line_one);
                if !b.line_two.is_empty() {
                    println!("{}", b.line_two);
                }
                for (i, phrase) in b.phrases.iter().enumerate() {
                    println!("  {i}: {phrase}");
                }
            }
            Some((Bundle::SpeakingSequence(_), _)) | None => {}
        }

        let mut hints = Vec::new();
        if state.can_go_next {
            hints.push("next");
        }
        if state.can_go_previous {
            hints.push("back");
        }
        if !hints.is_empty() {
            println!("({})", hints.join(", "));
        }
    }

    fn render_warning(&self) {
        let state = self.navigator.navigation_state();
        if let Some(warning) = state.warning {
            println!(
                "Time remains on {} ({}). Leaving makes it unreachable.",
                warning.question_id,
                format_secs(warning.remaining_secs)
            );
            println!("Type 'continue' to leave anyway, or 'return' to keep writing.");
        }
    }

    fn finish(&self) {
        let responses = self.navigator.responses();
        println!();
        println!("Module complete. {} response(s) recorded.", responses.len());
        tracing::info!(
            "Attempt of module {} finished with {} responses",
            self.navigator.module().id,
            responses.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::test_fixtures::{module_of, speaking, timed_writing};

    fn session(bundles: Vec<Bundle>) -> Session {
        let mut config = TessioConfig::default();
        // A closed local port, so every upload fails with a network error.
        config.upload.api_base_url = "http://127.0.0.1:9".to_string();
        config.upload.user_email = "taker@example.com".to_string();
        config.upload.session_id = "attempt-1".to_string();
        Session::new(Arc::new(module_of(bundles)), &config, VolumeHandle::new(75))
    }

    #[tokio::test(start_paused = true)]
    async fn quitting_a_failed_upload_ends_the_attempt_without_advancing() {
        let mut session = session(vec![speaking("sp1", 2)]);
        session.run_with_input(&b"quit\n"[..]).await.unwrap();

        // The parent step completed, but the child whose upload never
        // resolved was not skipped and nothing was stored for it.
        assert!(!session.navigator.is_completed());
        assert_eq!(session.navigator.position(), 1);
        assert!(session.navigator.responses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn input_eof_during_failed_upload_ends_the_attempt() {
        let mut session = session(vec![speaking("sp1", 2)]);
        session.run_with_input(&b""[..]).await.unwrap();

        assert!(!session.navigator.is_completed());
        assert!(session.navigator.responses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn countdowns_keep_ticking_during_pipeline_waits() {
        let mut session = session(vec![timed_writing("w1", 100)]);
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        session
            .with_ticks(tokio::time::sleep(Duration::from_secs(5)), &mut tick)
            .await;

        let timer = session.navigator.active_timer().unwrap();
        assert!(timer.remaining_secs <= 95);
    }
}
