//! Append-only segment sequence for one variant
//!
//! Live origins repeat a trailing window of segments on every poll, and
//! different origins repeat different windows. Membership is therefore checked
//! against every segment ever appended, not just the latest window. Entries
//! are never removed or reordered: players rely on segments already handed
//! out staying where they were.

use std::collections::HashSet;

use crate::models::SegmentListing;

/// A segment kept in a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    /// Reference as written by the origin; the dedupe key.
    pub uri: String,
    pub duration: f32,
    /// Proxy prefix the segment was first seen under.
    pub prefix: String,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentSequence {
    entries: Vec<SegmentEntry>,
    seen: HashSet<String>,
}

impl SegmentSequence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the entries of `incoming` that have never been seen, in the
    /// order the listing gives them. Returns the newly appended entries.
    pub fn merge_new(&mut self, incoming: &SegmentListing) -> &[SegmentEntry] {
        let start = self.entries.len();

        for segment in &incoming.segments {
            if self.seen.contains(&segment.uri) {
                continue;
            }
            self.seen.insert(segment.uri.clone());
            self.entries.push(SegmentEntry {
                uri: segment.uri.clone(),
                duration: segment.duration,
                prefix: incoming.base.clone(),
            });
        }

        &self.entries[start..]
    }

    #[must_use]
    pub fn entries(&self) -> &[SegmentEntry] {
        &self.entries
    }

    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.uri.clone()).collect()
    }

    /// `#EXT-X-TARGETDURATION` value: the longest segment rounded up, at least 1.
    #[must_use]
    pub fn target_duration(&self) -> u64 {
        let longest = self
            .entries
            .iter()
            .map(|e| e.duration)
            .fold(0.0_f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let secs = longest.ceil() as u64;
        secs.max(1)
    }
}
