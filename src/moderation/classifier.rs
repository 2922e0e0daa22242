//! NSFW classification gate over an external content classifier.
//!
//! The gate fails open: a classifier error or timeout yields a non-explicit
//! verdict and a log line, never a blocked message.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ModerationPolicy;
use crate::error::ClassificationError;

use super::media::MediaContent;

/// One detection reported by the classifier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    #[serde(alias = "class")]
    pub label: String,
    pub score: f32,
}

#[cfg(test)]
impl Detection {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// External classifier: one still image in, detections out.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<Vec<Detection>, ClassificationError>;
}

/// Outcome of a classification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Scanned,
    /// Format cannot be rasterized (vector stickers, non-media documents).
    Unsupported,
    /// Fetch or classifier failed, or timed out.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NsfwVerdict {
    pub is_explicit: bool,
    pub matched_label: Option<String>,
    pub score: f32,
    pub status: ScanStatus,
    pub frames_scanned: usize,
}

impl NsfwVerdict {
    fn clean(frames_scanned: usize) -> Self {
        Self {
            is_explicit: false,
            matched_label: None,
            score: 0.0,
            status: ScanStatus::Scanned,
            frames_scanned,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            status: ScanStatus::Unsupported,
            ..Self::clean(0)
        }
    }

    pub fn failed() -> Self {
        Self {
            status: ScanStatus::Failed,
            ..Self::clean(0)
        }
    }
}

/// Turns raw detections into a binary explicit/clean verdict.
pub struct MediaClassificationGate {
    classifier: std::sync::Arc<dyn ContentClassifier>,
    labels: HashSet<String>,
    threshold: f32,
    max_frames: usize,
    timeout: Duration,
}

impl MediaClassificationGate {
    pub fn new(
        classifier: std::sync::Arc<dyn ContentClassifier>,
        labels: impl IntoIterator<Item = String>,
        threshold: f32,
        max_frames: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            labels: labels.into_iter().collect(),
            threshold,
            max_frames: max_frames.max(1),
            timeout,
        }
    }

    pub fn from_policy(
        classifier: std::sync::Arc<dyn ContentClassifier>,
        policy: &ModerationPolicy,
    ) -> Self {
        Self::new(
            classifier,
            policy.nsfw_labels.iter().cloned(),
            policy.nsfw_threshold,
            policy.max_frames,
            policy.classify_timeout(),
        )
    }

    /// Classify media. Never fails: errors become [`ScanStatus::Failed`].
    pub async fn classify(&self, media: &MediaContent) -> NsfwVerdict {
        match tokio::time::timeout(self.timeout, self.scan(media)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!("Classification failed, allowing media: {}", e);
                NsfwVerdict::failed()
            }
            Err(_) => {
                warn!(
                    "Classification failed, allowing media: {}",
                    ClassificationError::Timeout(self.timeout)
                );
                NsfwVerdict::failed()
            }
        }
    }

    /// Scan sampled frames in order and stop at the first explicit one.
    async fn scan(&self, media: &MediaContent) -> Result<NsfwVerdict, ClassificationError> {
        let frames = media.sampled_frames(self.max_frames);
        debug!("Scanning {} of {} frames", frames.len(), media.frame_count());
        let mut scanned = 0;

        for (index, frame) in frames.into_iter().enumerate() {
            let detections = self.classifier.classify(frame).await?;
            scanned += 1;

            if let Some((label, score)) = self.top_match(&detections) {
                debug!("Frame {} matched {} ({:.2})", index, label, score);
                return Ok(NsfwVerdict {
                    is_explicit: true,
                    matched_label: Some(label.to_string()),
                    score,
                    status: ScanStatus::Scanned,
                    frames_scanned: scanned,
                });
            }
        }

        Ok(NsfwVerdict::clean(scanned))
    }

    /// Highest-scoring NSFW label of a frame, if it clears the threshold.
    fn top_match<'a>(&self, detections: &'a [Detection]) -> Option<(&'a str, f32)> {
        detections
            .iter()
            .filter(|d| self.labels.contains(&d.label))
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .filter(|d| d.score > self.threshold)
            .map(|d| (d.label.as_str(), d.score))
    }
}

/// Response shapes accepted from the classifier service.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifierResponse {
    List(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

/// Classifier reached over HTTP: `POST <url>` with a multipart `file` field.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ContentClassifier for HttpClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Vec<Detection>, ClassificationError> {
        let part = reqwest::multipart::Part::bytes(image.to_vec()).file_name("media");
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassificationError::Classifier(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClassificationError::Classifier(format!(
                "classifier returned {}",
                resp.status()
            )));
        }

        let body: ClassifierResponse = resp
            .json()
            .await
            .map_err(|e| ClassificationError::Classifier(e.to_string()))?;

        Ok(match body {
            ClassifierResponse::List(d) => d,
            ClassifierResponse::Wrapped { detections } => detections,
        })
    }
}
