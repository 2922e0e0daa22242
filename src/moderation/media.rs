//! Media payloads and the fetcher seam.

use async_trait::async_trait;

use crate::error::FetchError;

use super::types::Attachment;

/// Raw media resolved from an attachment reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaContent {
    /// One rasterizable image.
    Still(Vec<u8>),
    /// Decoded frames of multi-frame media, in playback order.
    Frames(Vec<Vec<u8>>),
}

impl MediaContent {
    pub fn frame_count(&self) -> usize {
        match self {
            Self::Still(_) => 1,
            Self::Frames(frames) => frames.len(),
        }
    }

    /// Frames to classify, at most `cap`, evenly spread over the sequence.
    pub fn sampled_frames(&self, cap: usize) -> Vec<&[u8]> {
        match self {
            Self::Still(bytes) => vec![bytes.as_slice()],
            Self::Frames(frames) => sample_indices(frames.len(), cap)
                .into_iter()
                .map(|i| frames[i].as_slice())
                .collect(),
        }
    }
}

/// Pick at most `cap` indices out of `total` at an even stride.
///
/// The first and last frames are always included when `cap >= 2`.
pub fn sample_indices(total: usize, cap: usize) -> Vec<usize> {
    if total == 0 || cap == 0 {
        return Vec::new();
    }
    if total <= cap {
        return (0..total).collect();
    }
    if cap == 1 {
        return vec![total / 2];
    }
    (0..cap).map(|i| i * (total - 1) / (cap - 1)).collect()
}

/// Resolves an attachment reference to raw bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn resolve(&self, attachment: &Attachment) -> Result<MediaContent, FetchError>;
}
