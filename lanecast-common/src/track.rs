//! Track records stored in lane queues

use serde::{Deserialize, Serialize};

/// A queued or playing item: source URL plus display and requester metadata.
///
/// Serialized as JSON into the store; field names are shared with the
/// HTTP-facing process and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub requested_by_id: String,
}

/// Metadata resolved for a source URL after enqueue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub duration_seconds: u32,
    pub thumbnail: String,
}

impl TrackEntry {
    /// Entry as created at enqueue time: the URL doubles as the title until
    /// metadata is backfilled.
    pub fn placeholder(
        url: impl Into<String>,
        requested_by: impl Into<String>,
        requested_by_id: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            title: url.clone(),
            url,
            artist: String::new(),
            duration_seconds: 0,
            thumbnail: String::new(),
            requested_by: requested_by.into(),
            requested_by_id: requested_by_id.into(),
        }
    }

    /// New entry carrying resolved metadata; requester fields are kept.
    pub fn with_metadata(&self, meta: &TrackMetadata) -> Self {
        let title = if meta.title.is_empty() {
            self.title.clone()
        } else {
            meta.title.clone()
        };
        Self {
            url: self.url.clone(),
            title,
            artist: meta.artist.clone(),
            duration_seconds: meta.duration_seconds,
            thumbnail: meta.thumbnail.clone(),
            requested_by: self.requested_by.clone(),
            requested_by_id: self.requested_by_id.clone(),
        }
    }

    /// True while the title is still the enqueue-time placeholder
    pub fn is_placeholder(&self) -> bool {
        self.title == self.url
    }

    /// Human readable label, `Title - Artist` when the artist is known
    pub fn display_title(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artist)
        }
    }
}
