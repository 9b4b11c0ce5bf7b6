//! Playlist parsing
//!
//! Adapter around the `m3u8-rs` crate that converts parsed playlists into
//! [`PlaylistDocument`]s. Sub-playlist addresses are resolved against the
//! address the document was fetched from; segment references are kept as
//! written, with the fetch directory recorded as the listing's proxy prefix.

use indexmap::IndexMap;
use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, QuotedOrUnquoted, VariantStream};
use tracing::debug;
use url::Url;

use crate::error::ParseError;
use crate::models::{
    Manifest, PlaylistDocument, SegmentListing, SegmentRef, VariantKey, DEFAULT_PROGRAM_ID,
};

/// Turns a fetched body into a document.
pub trait PlaylistParser: Send + Sync {
    fn parse(&self, origin: &str, body: &[u8]) -> Result<PlaylistDocument, ParseError>;
}

/// Default parser for HLS (M3U8) playlists.
#[derive(Debug, Clone, Copy, Default)]
pub struct M3u8Parser;

impl PlaylistParser for M3u8Parser {
    fn parse(&self, origin: &str, body: &[u8]) -> Result<PlaylistDocument, ParseError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::Empty);
        }
        if std::str::from_utf8(body).is_err() {
            return Err(ParseError::InvalidUtf8);
        }

        let base = Url::parse(origin).map_err(|e| ParseError::InvalidAddress {
            address: origin.to_string(),
            reason: e.to_string(),
        })?;

        let playlist = m3u8_rs::parse_playlist_res(body)
            .map_err(|e| ParseError::Malformed(format!("{e:?}")))?;

        match playlist {
            Playlist::MasterPlaylist(master) => Ok(PlaylistDocument::Manifest(
                manifest_from_master(&master, &base)?,
            )),
            Playlist::MediaPlaylist(media) => Ok(PlaylistDocument::SegmentListing(
                listing_from_media(&media, &base),
            )),
        }
    }
}

fn manifest_from_master(master: &MasterPlaylist, base: &Url) -> Result<Manifest, ParseError> {
    let mut variants = IndexMap::with_capacity(master.variants.len());

    for variant in &master.variants {
        if variant.is_i_frame {
            debug!(uri = %variant.uri, "Skipping I-frame variant");
            continue;
        }

        let address = base
            .join(&variant.uri)
            .map_err(|e| ParseError::InvalidAddress {
                address: variant.uri.clone(),
                reason: e.to_string(),
            })?;

        variants.insert(variant_key(variant), address.to_string());
    }

    Ok(Manifest { variants })
}

fn variant_key(variant: &VariantStream) -> VariantKey {
    let resolution = variant
        .resolution
        .as_ref()
        .map(|r| format!("{}x{}", r.width, r.height))
        .unwrap_or_default();

    VariantKey::new(program_id(variant), variant.bandwidth, resolution)
}

/// `PROGRAM-ID` is not part of RFC 8216, so `m3u8-rs` leaves it in the
/// untyped attribute map.
fn program_id(variant: &VariantStream) -> u64 {
    variant
        .other_attributes
        .as_ref()
        .and_then(|attrs| attrs.get("PROGRAM-ID"))
        .and_then(|value| match value {
            QuotedOrUnquoted::Unquoted(s) | QuotedOrUnquoted::Quoted(s) => s.trim().parse().ok(),
        })
        .unwrap_or(DEFAULT_PROGRAM_ID)
}

fn listing_from_media(media: &MediaPlaylist, base: &Url) -> SegmentListing {
    let segments = media
        .segments
        .iter()
        .map(|segment| SegmentRef::new(segment.uri.clone(), segment.duration))
        .collect();

    SegmentListing::new(directory_of(base), segments)
}

/// The address with its last path component removed, without a trailing
/// slash. Query and fragment are dropped: segments are resolved against the
/// directory only, so a query-string token on the media playlist (signed
/// URLs) does not reach segment requests. Such origins are not supported.
fn directory_of(address: &Url) -> String {
    let mut dir = address.clone();
    dir.set_query(None);
    dir.set_fragment(None);
    if let Ok(mut segments) = dir.path_segments_mut() {
        segments.pop();
    }
    dir.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=1400000,RESOLUTION=1280x720
http://cdn.example.com/high/index.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:10
#EXTINF:4.000,
seg10.ts
#EXTINF:3.500,
seg11.ts
";

    #[test]
    fn test_parse_master_resolves_relative_addresses() {
        let doc = M3u8Parser
            .parse("http://origin-a/live/master.m3u8", MASTER.as_bytes())
            .unwrap();

        let PlaylistDocument::Manifest(manifest) = doc else {
            panic!("expected manifest, got {}", doc.kind());
        };
        let entries: Vec<_> = manifest.variants.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(*entries[0].0, VariantKey::new(1, 800_000, "640x360"));
        assert_eq!(entries[0].1, "http://origin-a/live/low/index.m3u8");
        assert_eq!(*entries[1].0, VariantKey::new(1, 1_400_000, "1280x720"));
        assert_eq!(entries[1].1, "http://cdn.example.com/high/index.m3u8");
    }

    #[test]
    fn test_parse_master_defaults() {
        let body = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=64000
audio.m3u8
";
        let doc = M3u8Parser.parse("http://origin-a/live/master.m3u8", body.as_bytes()).unwrap();
        let PlaylistDocument::Manifest(manifest) = doc else {
            panic!("expected manifest");
        };
        let key = manifest.variants.keys().next().unwrap();
        assert_eq!(key.program_id, DEFAULT_PROGRAM_ID);
        assert_eq!(key.bandwidth, 64_000);
        assert_eq!(key.resolution, "");
    }

    #[test]
    fn test_parse_media_keeps_raw_references() {
        let doc = M3u8Parser
            .parse("http://origin-a/live/low/index.m3u8?token=abc", MEDIA.as_bytes())
            .unwrap();

        let PlaylistDocument::SegmentListing(listing) = doc else {
            panic!("expected segment listing");
        };
        assert_eq!(listing.base, "http://origin-a/live/low");
        let uris: Vec<_> = listing.segments.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["seg10.ts", "seg11.ts"]);
        assert!((listing.segments[1].duration - 3.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_empty_body_fails() {
        let err = M3u8Parser.parse("http://origin-a/live/master.m3u8", b"  \n").unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }

    #[test]
    fn test_parse_garbage_fails() {
        let err = M3u8Parser
            .parse("http://origin-a/live/master.m3u8", b"<html>oops</html>")
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_parse_invalid_origin_fails() {
        let err = M3u8Parser.parse("not a url", MASTER.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidAddress { .. }));
    }

    #[test]
    fn test_directory_of() {
        let url = Url::parse("http://origin-a/live/low/index.m3u8").unwrap();
        assert_eq!(directory_of(&url), "http://origin-a/live/low");

        let root = Url::parse("http://origin-a/index.m3u8").unwrap();
        assert_eq!(directory_of(&root), "http://origin-a");

        let signed = Url::parse("http://origin-a/live/low/index.m3u8?token=abc#t").unwrap();
        assert_eq!(directory_of(&signed), "http://origin-a/live/low");
    }
}
