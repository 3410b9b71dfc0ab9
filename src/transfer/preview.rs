//! Progressive preview policy
//!
//! Decides when a receiver should materialize a partial artifact from the
//! bytes received so far, based on the declared MIME type and size.

use std::sync::Arc;

use super::artifact::PreviewArtifact;
use super::types::TransferMetadata;

/// Upper bound for the image preview threshold: 50KB
pub const IMAGE_PREVIEW_MAX_THRESHOLD: u64 = 50_000;

/// Re-materialization interval for audio/video: 256KB
pub const MEDIA_PREVIEW_INTERVAL: u64 = 256 * 1024;

/// Upper bound for the document re-materialization interval: 100KB
pub const DOCUMENT_PREVIEW_MAX_INTERVAL: u64 = 100 * 1024;

/// Structured document types eligible for progressive preview
const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/json",
    "text/plain",
    "text/markdown",
];

/// Coarse MIME category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Audio,
    Video,
    Document,
    Other,
}

impl MediaCategory {
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.starts_with("image/") {
            Self::Image
        } else if essence.starts_with("audio/") {
            Self::Audio
        } else if essence.starts_with("video/") {
            Self::Video
        } else if DOCUMENT_TYPES.contains(&essence.as_str()) {
            Self::Document
        } else {
            Self::Other
        }
    }

    /// Whether partial content of this category is worth previewing
    pub fn is_streamable(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// When to materialize previews
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPolicy {
    /// Never
    Disabled,
    /// On every chunk once `min_bytes` have arrived
    Threshold { min_bytes: u64 },
    /// Each time another `every` bytes have arrived
    Interval { every: u64 },
}

impl PreviewPolicy {
    pub fn for_metadata(metadata: &TransferMetadata) -> Self {
        let size = metadata.size;
        match MediaCategory::from_mime(&metadata.mime_type) {
            MediaCategory::Image => Self::Threshold {
                min_bytes: size.div_ceil(10).min(IMAGE_PREVIEW_MAX_THRESHOLD),
            },
            MediaCategory::Audio | MediaCategory::Video => Self::Interval {
                every: MEDIA_PREVIEW_INTERVAL,
            },
            MediaCategory::Document => Self::Interval {
                every: size.div_ceil(20).min(DOCUMENT_PREVIEW_MAX_INTERVAL).max(1),
            },
            MediaCategory::Other => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Tracks the live preview of one transfer attempt
#[derive(Debug)]
pub struct PreviewTracker {
    policy: PreviewPolicy,
    last_materialized_at: Option<u64>,
    current: Option<Arc<PreviewArtifact>>,
    generation: u64,
}

impl Default for PreviewTracker {
    fn default() -> Self {
        Self::new(PreviewPolicy::Disabled)
    }
}

impl PreviewTracker {
    pub fn new(policy: PreviewPolicy) -> Self {
        Self {
            policy,
            last_materialized_at: None,
            current: None,
            generation: 0,
        }
    }

    pub fn policy(&self) -> PreviewPolicy {
        self.policy
    }

    /// Whether a preview should be (re)built at `received_bytes`
    pub fn is_due(&self, received_bytes: u64) -> bool {
        if received_bytes == 0 {
            return false;
        }
        match self.policy {
            PreviewPolicy::Disabled => false,
            PreviewPolicy::Threshold { min_bytes } => received_bytes >= min_bytes,
            PreviewPolicy::Interval { every } => {
                received_bytes >= self.last_materialized_at.unwrap_or(0).saturating_add(every)
            }
        }
    }

    /// Replace the current preview; the superseded one is released
    pub fn store(&mut self, mime_type: &str, data: bytes::Bytes) -> Arc<PreviewArtifact> {
        self.generation += 1;
        let received_bytes = data.len() as u64;
        let preview = Arc::new(PreviewArtifact {
            mime_type: mime_type.to_string(),
            data,
            generation: self.generation,
        });
        self.last_materialized_at = Some(received_bytes);
        self.current = Some(preview.clone());
        preview
    }

    /// Current preview, if any
    pub fn current(&self) -> Option<&Arc<PreviewArtifact>> {
        self.current.as_ref()
    }

    /// How many previews were built this attempt
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop the current preview
    pub fn release(&mut self) {
        if let Some(preview) = self.current.take() {
            tracing::debug!(generation = preview.generation, "Released preview artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(mime: &str, size: u64) -> TransferMetadata {
        TransferMetadata::new("f", mime, size)
    }

    #[test]
    fn test_categories() {
        assert_eq!(MediaCategory::from_mime("image/png"), MediaCategory::Image);
        assert_eq!(MediaCategory::from_mime("Video/MP4"), MediaCategory::Video);
        assert_eq!(MediaCategory::from_mime("audio/ogg"), MediaCategory::Audio);
        assert_eq!(MediaCategory::from_mime("application/pdf"), MediaCategory::Document);
        assert_eq!(
            MediaCategory::from_mime("text/plain; charset=utf-8"),
            MediaCategory::Document
        );
        assert_eq!(MediaCategory::from_mime("application/zip"), MediaCategory::Other);
        assert!(!MediaCategory::from_mime("").is_streamable());
    }

    #[test]
    fn test_image_threshold() {
        assert_eq!(
            PreviewPolicy::for_metadata(&meta("image/jpeg", 100_000)),
            PreviewPolicy::Threshold { min_bytes: 10_000 }
        );
        assert_eq!(
            PreviewPolicy::for_metadata(&meta("image/jpeg", 10_000_000)),
            PreviewPolicy::Threshold { min_bytes: IMAGE_PREVIEW_MAX_THRESHOLD }
        );
    }

    #[test]
    fn test_document_interval() {
        assert_eq!(
            PreviewPolicy::for_metadata(&meta("application/pdf", 200_000)),
            PreviewPolicy::Interval { every: 10_000 }
        );
        assert_eq!(
            PreviewPolicy::for_metadata(&meta("application/pdf", 50_000_000)),
            PreviewPolicy::Interval { every: DOCUMENT_PREVIEW_MAX_INTERVAL }
        );
        assert_eq!(
            PreviewPolicy::for_metadata(&meta("application/zip", 50_000_000)),
            PreviewPolicy::Disabled
        );
    }

    #[test]
    fn test_interval_tracking() {
        let mut tracker = PreviewTracker::new(PreviewPolicy::Interval { every: 100 });

        assert!(!tracker.is_due(99));
        assert!(tracker.is_due(100));

        tracker.store("video/mp4", bytes::Bytes::from(vec![0u8; 120]));
        assert!(!tracker.is_due(200));
        assert!(tracker.is_due(220));
        assert_eq!(tracker.generation(), 1);

        tracker.release();
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_threshold_is_due_every_chunk_after() {
        let mut tracker = PreviewTracker::new(PreviewPolicy::Threshold { min_bytes: 10 });
        assert!(!tracker.is_due(9));
        tracker.store("image/png", bytes::Bytes::from(vec![0u8; 10]));
        assert!(tracker.is_due(11));
    }
}
