//! Parsed playlist documents
//!
//! Documents are transient: one is produced per fetch and consumed within the
//! same poll cycle.

use indexmap::IndexMap;

use super::variant::VariantKey;

/// A parsed upstream playlist.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistDocument {
    /// Master playlist listing the variants of the stream.
    Manifest(Manifest),
    /// Media playlist listing the segments of a single variant.
    SegmentListing(SegmentListing),
}

impl PlaylistDocument {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Manifest(_) => "manifest",
            Self::SegmentListing(_) => "segment_listing",
        }
    }
}

/// Variant key -> absolute sub-playlist address, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub variants: IndexMap<VariantKey, String>,
}

/// One segment reference exactly as written in a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub uri: String,
    /// `#EXTINF` duration in seconds.
    pub duration: f32,
}

impl SegmentRef {
    pub fn new(uri: impl Into<String>, duration: f32) -> Self {
        Self {
            uri: uri.into(),
            duration,
        }
    }
}

/// Ordered segments of one variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentListing {
    /// Proxy prefix for relative segment references: the directory of the
    /// address the listing was fetched from.
    pub base: String,
    pub segments: Vec<SegmentRef>,
}

impl SegmentListing {
    pub fn new(base: impl Into<String>, segments: Vec<SegmentRef>) -> Self {
        Self {
            base: base.into(),
            segments,
        }
    }
}
