//! M3U8 text for synthesized playlists
//!
//! Only proxy ids ever appear in the output; origin addresses stay inside the
//! alias registry.

use std::fmt::Write;

use crate::models::VariantKey;

/// Path prefix of variant playlists, relative to the manifest.
pub const VARIANT_PATH: &str = "main/subplaylist";

/// Path prefix of segments, relative to a variant playlist.
pub const SEGMENT_PATH: &str = "segment";

const HEADER: &str = "#EXTM3U\n#EXT-X-VERSION:3\n";

/// A segment line of a synthesized variant playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSegment {
    pub id: String,
    pub duration: f32,
}

/// Render a master playlist. `variants` must already be in output order.
#[must_use]
pub fn render_manifest(variants: &[(String, VariantKey)]) -> String {
    let mut out = String::from(HEADER);

    for (id, key) in variants {
        let _ = write!(
            out,
            "#EXT-X-STREAM-INF:PROGRAM-ID={},BANDWIDTH={}",
            key.program_id, key.bandwidth
        );
        if !key.resolution.is_empty() {
            let _ = write!(out, ",RESOLUTION={}", key.resolution);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{VARIANT_PATH}/{id}");
    }

    out
}

/// Render a live media playlist.
///
/// The backing sequence never drops segments, so the media sequence number
/// is always 0 and the playlist is never ended.
#[must_use]
pub fn render_variant(target_duration: u64, segments: &[RenderedSegment]) -> String {
    let mut out = String::from(HEADER);
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target_duration}");
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:0");

    for segment in segments {
        let _ = writeln!(out, "#EXTINF:{:.3},", segment.duration);
        let _ = writeln!(out, "{SEGMENT_PATH}/{}", segment.id);
    }

    out
}
