//! Prompt and cue playback through a system audio player.
//!
//! Playback shells out to whatever command-line player the platform ships
//! (`afplay` on macOS, `ffplay`/`mpv`/`paplay` on Linux). The session volume
//! arrives over a watch channel and is read per invocation, so a `volume`
//! command mid-sequence affects the next prompt. A missing player or a
//! failed exit reports [`PlaybackOutcome::Failed`]; the pipeline absorbs
//! that and moves on.

use crate::speaking::{MediaPlayer, PlaybackOutcome};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::process::Command;
use tokio::sync::watch;

/// The platform players we know how to drive, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerKind {
    Afplay,
    Ffplay,
    Mpv,
    Paplay,
}

impl PlayerKind {
    fn binary(self) -> &'static str {
        match self {
            PlayerKind::Afplay => "afplay",
            PlayerKind::Ffplay => "ffplay",
            PlayerKind::Mpv => "mpv",
            PlayerKind::Paplay => "paplay",
        }
    }
}

/// Plays audio by URL or path via an external player process.
pub struct SystemPlayer {
    player: Option<(PlayerKind, PathBuf)>,
    /// Live session volume level (0..=100).
    volume: watch::Receiver<u8>,
}

impl SystemPlayer {
    pub fn new(volume: watch::Receiver<u8>) -> Self {
        let player = detect_player();
        match &player {
            Some((kind, path)) => {
                tracing::info!("Audio player: {} ({})", kind.binary(), path.display());
            }
            None => {
                tracing::warn!("No audio player found; prompts will be silent");
            }
        }
        Self { player, volume }
    }

    /// Current volume as a 0.0..=1.0 scalar, read fresh from the channel.
    fn current_volume(&self) -> f32 {
        f32::from(*self.volume.borrow()) / 100.0
    }

    fn command(&self, kind: PlayerKind, path: &PathBuf, url: &str) -> Command {
        let volume = self.current_volume();
        let mut cmd = Command::new(path);
        match kind {
            PlayerKind::Afplay => {
                cmd.arg("-v").arg(format!("{volume:.2}")).arg(url);
            }
            PlayerKind::Ffplay => {
                cmd.arg("-nodisp")
                    .arg("-autoexit")
                    .arg("-loglevel")
                    .arg("error")
                    .arg("-volume")
                    .arg(format!("{}", (volume * 100.0).round() as u32))
                    .arg(url);
            }
            PlayerKind::Mpv => {
                cmd.arg("--no-video")
                    .arg("--really-quiet")
                    .arg(format!("--volume={}", (volume * 100.0).round() as u32))
                    .arg(url);
            }
            PlayerKind::Paplay => {
                // paplay volume is linear 0..=65536
                let vol = (volume * 65536.0).round() as u32;
                cmd.arg(format!("--volume={vol}")).arg(url);
            }
        }
        cmd
    }
}

impl MediaPlayer for SystemPlayer {
    async fn play(&mut self, url: &str) -> PlaybackOutcome {
        let Some((kind, path)) = self.player.clone() else {
            return PlaybackOutcome::Failed;
        };

        tracing::debug!("Playing {url} at volume {:.2}", self.current_volume());
        let status = self.command(kind, &path, url).status().await;
        match status {
            Ok(status) if status.success() => PlaybackOutcome::Completed,
            Ok(status) => {
                tracing::warn!("Player exited with {status} for {url}");
                PlaybackOutcome::Failed
            }
            Err(e) => {
                tracing::warn!("Failed to spawn player: {e}");
                PlaybackOutcome::Failed
            }
        }
    }
}

/// Locates a usable player binary.
///
/// Checks common installation locations first, then falls back to a PATH
/// search, so playback works even under a limited PATH.
fn detect_player() -> Option<(PlayerKind, PathBuf)> {
    let candidates: &[PlayerKind] = if cfg!(target_os = "macos") {
        &[PlayerKind::Afplay, PlayerKind::Ffplay, PlayerKind::Mpv]
    } else {
        &[PlayerKind::Ffplay, PlayerKind::Mpv, PlayerKind::Paplay]
    };

    for &kind in candidates {
        let known = if cfg!(target_os = "macos") {
            vec![
                PathBuf::from(format!("/usr/bin/{}", kind.binary())),
                PathBuf::from(format!("/opt/homebrew/bin/{}", kind.binary())),
                PathBuf::from(format!("/usr/local/bin/{}", kind.binary())),
            ]
        } else {
            vec![
                PathBuf::from(format!("/usr/bin/{}", kind.binary())),
                PathBuf::from(format!("/usr/local/bin/{}", kind.binary())),
                PathBuf::from(format!("/snap/bin/{}", kind.binary())),
            ]
        };
        for path in known {
            if path.exists() {
                return Some((kind, path));
            }
        }
        if let Ok(path) = find_in_path(kind.binary()) {
            return Some((kind, path));
        }
    }
    None
}

/// Searches for a binary in the system PATH via `which`/`where`.
fn find_in_path(binary_name: &str) -> Result<PathBuf> {
    let search_cmd = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    let output = std::process::Command::new(search_cmd)
        .arg(binary_name)
        .output()
        .map_err(|e| anyhow!("Failed to search PATH for {binary_name}: {e}"))?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        let path = PathBuf::from(path_str.trim());
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }

    Err(anyhow!("{binary_name} not found in PATH"))
}
