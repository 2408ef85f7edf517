//! Shared playback volume.
//!
//! Volume is a session-global 0-100 level adjustable at any time, including
//! mid-playback. A watch channel makes the current value readable from
//! anywhere and lets long-lived players observe changes.

use tokio::sync::watch;

/// Cloneable handle on the session volume level.
#[derive(Debug, Clone)]
pub struct VolumeHandle {
    tx: watch::Sender<u8>,
}

impl VolumeHandle {
    pub fn new(level: u8) -> Self {
        let (tx, _) = watch::channel(level.min(100));
        Self { tx }
    }

    /// Current level, 0-100.
    pub fn get(&self) -> u8 {
        *self.tx.borrow()
    }

    /// Sets the level, clamped to 0-100. Takes effect on the next playback
    /// element opened and on subscribers immediately.
    pub fn set(&self, level: u8) {
        let level = level.min(100);
        // send_replace stores even when no receiver is subscribed
        self.tx.send_replace(level);
        tracing::debug!("Volume set to {level}");
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.tx.subscribe()
    }
}

impl Default for VolumeHandle {
    fn default() -> Self {
        Self::new(75)
    }
}
