// hlsmerge core
//
// Aggregates redundant live HLS origins into one synthesized playlist.
//
// Architecture:
// - models: variant identity and parsed playlist documents
// - parser / fetch: turning origin responses into documents
// - sequence / alias: append-only per-variant state and opaque proxy ids
// - engine: the poll loop and the read side used by the HTTP layer

pub mod alias;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod parser;
pub mod render;
pub mod sequence;

pub use alias::AliasRegistry;
pub use config::{Config, FetchConfig, LoggingConfig, ServerConfig, StreamConfig};
pub use engine::{AggregationEngine, CycleOutcome, EngineStatsSnapshot};
pub use error::{Error, FetchError, ParseError, Result};
pub use fetch::{FetchedPlaylist, HttpFetcher, PlaylistFetcher};
pub use models::{Manifest, PlaylistDocument, SegmentListing, SegmentRef, VariantKey};
pub use parser::{M3u8Parser, PlaylistParser};
pub use sequence::{SegmentEntry, SegmentSequence};
