//! Response upload over the presigned-URL flow.
//!
//! Uploading is a two-step exchange: ask the assessment API for a presigned
//! storage URL for this attempt, then PUT the packaged WAV to that URL. The
//! stored bucket/key pair is what gets recorded as the response; the audio
//! bytes themselves never pass through the API server.

use crate::player::AudioReference;
use crate::speaking::{RecordedAudio, ResponseUploader};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for the presign endpoint.
#[derive(Debug, Serialize)]
struct PresignRequest<'a> {
    user_email: &'a str,
    filename: &'a str,
}

/// Presign endpoint response: where to PUT and where the object will live.
#[derive(Debug, Deserialize)]
struct PresignResponse {
    presigned_url: String,
    key: String,
    bucket: String,
}

/// Uploads recordings through the assessment API's presigned-URL endpoint.
pub struct HttpUploader {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    user_email: String,
    session_id: String,
}

impl HttpUploader {
    pub fn new(
        base_url: String,
        auth_token: Option<String>,
        user_email: String,
        session_id: String,
    ) -> anyhow::Result<Self> {
        // Uploads carry a full recording window of audio; give them room.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            user_email,
            session_id,
        })
    }

    async fn presign(&self, filename: &str) -> anyhow::Result<PresignResponse> {
        let url = format!(
            "{}/api/v1/tests/{}/upload-url",
            self.base_url, self.session_id
        );
        let mut request = self.client.post(&url).json(&PresignRequest {
            user_email: &self.user_email,
            filename,
        });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(format_error(status.as_u16(), &error_body)));
        }

        response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse upload-url response: {e}"))
    }

    async fn put_object(&self, presigned_url: &str, wav: Vec<u8>) -> anyhow::Result<()> {
        let response = self
            .client
            .put(presigned_url)
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(map_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(format_error(status.as_u16(), &error_body)));
        }
        Ok(())
    }
}

impl ResponseUploader for HttpUploader {
    async fn upload(
        &mut self,
        question_id: &str,
        audio: &RecordedAudio,
    ) -> anyhow::Result<AudioReference> {
        let filename = response_filename(question_id, chrono::Utc::now());
        tracing::debug!("Requesting upload URL for {filename}");
        let presign = self.presign(&filename).await?;

        tracing::debug!(
            "Uploading {} bytes to {}/{}",
            audio.wav.len(),
            presign.bucket,
            presign.key
        );
        self.put_object(&presign.presigned_url, audio.wav.clone())
            .await?;

        tracing::info!("Response stored at {}/{}", presign.bucket, presign.key);
        Ok(AudioReference {
            bucket: presign.bucket,
            key: presign.key,
        })
    }
}

/// Object name for one recording attempt. Timestamped so a retried question
/// never clobbers an earlier attempt's object.
fn response_filename(question_id: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}_{}.wav", question_id, now.format("%Y%m%d_%H%M%S"))
}

fn map_network_error(e: reqwest::Error) -> anyhow::Error {
    if e.is_connect() {
        anyhow::anyhow!("Failed to connect to the assessment API. Check your internet connection.")
    } else if e.is_timeout() {
        anyhow::anyhow!("Upload request timed out. The server is not responding.")
    } else {
        anyhow::anyhow!("Upload network error: {e}")
    }
}

/// Formats HTTP error codes into human-readable messages.
fn format_error(status: u16, error_body: &str) -> String {
    match status {
        401 => "Session token is invalid or expired. Re-run with a fresh token.".to_string(),
        403 => "You don't have permission to upload for this attempt. Check your session id and email.".to_string(),
        404 => "Attempt not found. Check the configured session id.".to_string(),
        429 => "Too many requests. You've hit the API rate limit. Please wait and retry.".to_string(),
        500 | 502 | 503 | 504 => "The assessment API is experiencing issues. Please retry.".to_string(),
        _ => format!("Upload API error (status {status}): {error_body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_carries_question_id_and_timestamp() {
        let at = chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            response_filename("b3-c1", at),
            "b3-c1_20260314_092653.wav"
        );
    }

    #[test]
    fn status_codes_map_to_actionable_messages() {
        assert!(format_error(401, "").contains("token"));
        assert!(format_error(404, "").contains("session id"));
        assert!(format_error(503, "").contains("retry"));
        assert!(format_error(418, "teapot").contains("418"));
    }
}
