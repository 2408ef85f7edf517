//! Microphone capture for the recording window.
//!
//! The device is opened per attempt: the stream is built when the window
//! starts and dropped when it ends (or when the attempt is cancelled), so no
//! capture handle outlives its recording phase. Samples are downmixed to
//! mono and packaged as an in-memory WAV ready for upload.

use crate::speaking::{RecordedAudio, Recorder};
use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::WavWriter;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Records from a configured or default input device for a fixed window.
///
/// A device fault fails open: the candidate's session must not strand on a
/// missing microphone, so errors log and yield an empty recording.
pub struct MicRecorder {
    /// Desired sample rate in Hz; the device's native rate wins.
    sample_rate: u32,
    /// Device name, numeric index, or "default".
    device_name: String,
}

impl MicRecorder {
    pub fn new(sample_rate: u32, device_name: String) -> Self {
        Self {
            sample_rate,
            device_name,
        }
    }

    async fn capture(&self, window: Duration) -> Result<RecordedAudio> {
        // Get device while suppressing ALSA library warnings
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();

            if self.device_name == "default" {
                host.default_input_device()
                    .ok_or_else(|| anyhow!("No audio input device available"))
            } else {
                find_device_by_name(&host, &self.device_name)
            }
        })?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let device_config = device.default_input_config()?;
        let device_sample_rate = device_config.sample_rate().0;
        let num_channels = device_config.channels() as usize;

        if device_sample_rate != self.sample_rate {
            tracing::warn!(
                "Requested sample rate {}Hz but device uses {}Hz. Recording at device rate.",
                self.sample_rate,
                device_sample_rate
            );
        }

        tracing::debug!(
            "Device configuration: {}Hz, {} channels",
            device_sample_rate,
            num_channels
        );

        let samples: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
        let samples_arc = Arc::clone(&samples);

        let stream = device.build_input_stream(
            &device_config.into(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                downmix_to_mono(data, &samples_arc, num_channels);
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        tracing::debug!("Audio stream started for a {:?} window", window);

        // Holding the stream across this await pins the capture to the
        // current task; dropping the future drops the stream and releases
        // the device.
        tokio::time::sleep(window).await;
        drop(stream);

        let samples = match samples.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if samples.is_empty() {
            tracing::warn!("Recording window ended with no samples captured");
            return Ok(RecordedAudio::empty());
        }

        let duration_secs = samples.len() as f32 / device_sample_rate as f32;
        tracing::info!(
            "Recording window ended: {:.2}s ({} samples at {}Hz)",
            duration_secs,
            samples.len(),
            device_sample_rate
        );

        Ok(RecordedAudio {
            wav: package_wav(&samples, device_sample_rate)?,
            duration: Duration::from_secs_f32(duration_secs),
        })
    }
}

impl Recorder for MicRecorder {
    async fn record(&mut self, duration: Duration) -> RecordedAudio {
        match self.capture(duration).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!("Audio capture failed, continuing without audio: {e}");
                RecordedAudio::empty()
            }
        }
    }
}

/// Converts multi-channel audio to mono by averaging all channels.
fn downmix_to_mono(data: &[i16], samples_arc: &Arc<Mutex<Vec<i16>>>, num_channels: usize) {
    let mut samples = match samples_arc.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match num_channels {
        1 => {
            samples.extend_from_slice(data);
        }
        2 => {
            for chunk in data.chunks_exact(2) {
                let left = chunk[0] as i32;
                let right = chunk[1] as i32;
                let mono = ((left + right) / 2) as i16;
                samples.push(mono);
            }
        }
        _ => {
            for chunk in data.chunks_exact(num_channels) {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                let mono = (sum / num_channels as i32) as i16;
                samples.push(mono);
            }
        }
    }
}

/// Packages mono PCM samples as an in-memory 16-bit WAV.
fn package_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let wav_spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, wav_spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    let wav = cursor.into_inner();
    tracing::debug!("Packaged {} byte WAV", wav.len());
    Ok(wav)
}

/// Finds an audio input device by name or numeric index.
fn find_device_by_name(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device> {
    if let Ok(index) = device_spec.parse::<usize>() {
        let mut devices: Vec<_> = host
            .input_devices()
            .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
            .collect();

        if index < devices.len() {
            return Ok(devices.swap_remove(index));
        } else {
            return Err(anyhow!(
                "Device index {} is out of range (0-{})",
                index,
                devices.len().saturating_sub(1)
            ));
        }
    }

    let devices = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?;

    for device in devices {
        if let Ok(name) = device.name() {
            if name == device_spec {
                return Ok(device);
            }
        }
    }

    Err(anyhow!(
        "Audio input device '{device_spec}' not found. Use 'tessio list-devices' to see available devices."
    ))
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
/// On non-Linux platforms, this is a no-op since ALSA doesn't exist.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_downmix_averages_pairs() {
        let samples = Arc::new(Mutex::new(Vec::new()));
        downmix_to_mono(&[100, 200, -50, 50], &samples, 2);
        assert_eq!(*samples.lock().unwrap(), vec![150, 0]);
    }

    #[test]
    fn packaged_wav_round_trips_through_hound() {
        let wav = package_wav(&[0, 1000, -1000, 32767], 16000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16000);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 1000, -1000, 32767]);
    }
}
