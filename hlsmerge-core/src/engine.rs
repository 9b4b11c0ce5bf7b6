//! Multi-origin aggregation engine
//!
//! One engine per logical stream. Every tick it polls all origins, picks one
//! surviving master playlist at random, fetches each variant's media playlist
//! and appends unseen segments to that variant's sequence. Clients read
//! synthesized playlists at any time; reads never wait for a running cycle.
//!
//! Failure policy:
//! - A failed origin (transport, status, empty body, parse) is dropped for the
//!   cycle; any surviving master playlist is enough to make progress.
//! - If nothing survives, the cycle changes nothing.
//! - The first failed variant fetch stops the cycle; later variants are
//!   retried on the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::alias::AliasRegistry;
use crate::config::{FetchConfig, StreamConfig};
use crate::error::{FetchError, ParseError, Result};
use crate::fetch::PlaylistFetcher;
use crate::models::{Manifest, PlaylistDocument, SegmentListing, VariantKey};
use crate::parser::{M3u8Parser, PlaylistParser};
use crate::render::{render_manifest, render_variant, RenderedSegment};
use crate::sequence::SegmentSequence;

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every variant of the selected manifest was merged.
    Merged { variants: usize, appended: usize },
    /// A variant fetch failed; variants before it were merged.
    Aborted {
        merged_variants: usize,
        appended: usize,
        failed_variant: VariantKey,
    },
    /// No origin produced a usable document.
    NoSources,
    /// Only top-level media playlists survived. Single-variant streams
    /// without a master playlist are not merged.
    UnsupportedListing,
}

#[derive(Debug, Default)]
struct EngineStats {
    cycles: AtomicU64,
    no_source_cycles: AtomicU64,
    unsupported_listings: AtomicU64,
    aborted_cycles: AtomicU64,
    dropped_sources: AtomicU64,
    segments_appended: AtomicU64,
}

/// Point-in-time counters for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    pub cycles: u64,
    pub no_source_cycles: u64,
    pub unsupported_listings: u64,
    pub aborted_cycles: u64,
    pub dropped_sources: u64,
    pub segments_appended: u64,
    pub variants: usize,
    pub segment_aliases: usize,
}

pub struct AggregationEngine {
    name: String,
    origins: Vec<String>,
    poll_interval: Duration,
    fetch_timeout: Duration,
    fetcher: Arc<dyn PlaylistFetcher>,
    parser: Arc<dyn PlaylistParser>,
    aliases: AliasRegistry,
    sequences: DashMap<VariantKey, SegmentSequence>,
    /// Serializes poll cycles. Readers never take it.
    cycle_lock: Mutex<()>,
    stats: EngineStats,
}

impl AggregationEngine {
    pub fn new(stream: &StreamConfig, fetcher: Arc<dyn PlaylistFetcher>) -> Self {
        Self {
            name: stream.name.clone(),
            origins: stream.origins.clone(),
            poll_interval: stream.poll_interval(),
            fetch_timeout: FetchConfig::default().timeout(),
            fetcher,
            parser: Arc::new(M3u8Parser),
            aliases: AliasRegistry::new(),
            sequences: DashMap::new(),
            cycle_lock: Mutex::new(()),
            stats: EngineStats::default(),
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn PlaylistParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Upper bound for a single fetch, on top of whatever the transport enforces.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// Spawn the polling task. The first cycle runs immediately.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let span = info_span!("stream", name = %self.name);
        tokio::spawn(
            async move {
                self.run_poll_loop(shutdown).await;
            }
            .instrument(span),
        )
    }

    async fn run_poll_loop(&self, shutdown: CancellationToken) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            origins = self.origins.len(),
            interval = ?self.poll_interval,
            "Poll loop started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Poll loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    let outcome = self.poll_once().await;
                    trace!(?outcome, "Poll cycle finished");
                }
            }
        }
    }

    /// Run one full poll cycle. Concurrent callers are serialized.
    pub async fn poll_once(&self) -> CycleOutcome {
        let _cycle = self.cycle_lock.lock().await;
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let documents = self.fetch_all().await;

        let manifest = match self.select_one(documents) {
            Ok(manifest) => manifest,
            Err(outcome) => return outcome,
        };

        self.expand_and_merge(manifest).await
    }

    /// FETCH_ALL: every origin concurrently, failures dropped.
    async fn fetch_all(&self) -> Vec<PlaylistDocument> {
        let results = join_all(self.origins.iter().map(|origin| self.fetch_document(origin))).await;

        results
            .into_iter()
            .zip(&self.origins)
            .filter_map(|(result, origin)| match result {
                Ok(document) => {
                    debug!(%origin, kind = document.kind(), "Origin answered");
                    Some(document)
                }
                Err(e) => {
                    self.stats.dropped_sources.fetch_add(1, Ordering::Relaxed);
                    warn!(%origin, error = %e, "Dropping origin for this cycle");
                    None
                }
            })
            .collect()
    }

    /// SELECT_ONE: uniform random choice among surviving master playlists.
    fn select_one(
        &self,
        documents: Vec<PlaylistDocument>,
    ) -> std::result::Result<Manifest, CycleOutcome> {
        let total = documents.len();
        let mut manifests: Vec<Manifest> = documents
            .into_iter()
            .filter_map(|document| match document {
                PlaylistDocument::Manifest(manifest) => Some(manifest),
                PlaylistDocument::SegmentListing(_) => None,
            })
            .collect();

        if manifests.is_empty() {
            if total == 0 {
                self.stats.no_source_cycles.fetch_add(1, Ordering::Relaxed);
                warn!("No origin answered, keeping previous state");
                return Err(CycleOutcome::NoSources);
            }
            self.stats.unsupported_listings.fetch_add(1, Ordering::Relaxed);
            warn!(
                listings = total,
                "Origins served media playlists without a master playlist; not merged"
            );
            return Err(CycleOutcome::UnsupportedListing);
        }

        let index = rand::random_range(0..manifests.len());
        debug!(candidates = manifests.len(), index, "Selected manifest");
        Ok(manifests.swap_remove(index))
    }

    /// EXPAND_VARIANTS + MERGE.
    async fn expand_and_merge(&self, manifest: Manifest) -> CycleOutcome {
        let variants: Vec<(VariantKey, String)> = manifest.variants.into_iter().collect();

        let listings = join_all(
            variants
                .iter()
                .map(|(_, address)| self.fetch_listing(address)),
        )
        .await;

        let mut merged_variants = 0;
        let mut appended = 0;

        for ((key, address), listing) in variants.into_iter().zip(listings) {
            self.ensure_variant(&key);

            match listing {
                Ok(listing) => {
                    appended += self.merge_listing(&key, &listing);
                    merged_variants += 1;
                }
                Err(e) => {
                    self.stats.aborted_cycles.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .segments_appended
                        .fetch_add(appended as u64, Ordering::Relaxed);
                    warn!(
                        variant = %key,
                        %address,
                        error = %e,
                        "Variant fetch failed, skipping remaining variants this cycle"
                    );
                    return CycleOutcome::Aborted {
                        merged_variants,
                        appended,
                        failed_variant: key,
                    };
                }
            }
        }

        self.stats
            .segments_appended
            .fetch_add(appended as u64, Ordering::Relaxed);
        if appended > 0 {
            debug!(variants = merged_variants, appended, "Merged new segments");
        }

        CycleOutcome::Merged {
            variants: merged_variants,
            appended,
        }
    }

    /// Make `key` visible: sequence first, then the alias, so a resolvable
    /// variant id always has a sequence behind it.
    fn ensure_variant(&self, key: &VariantKey) {
        if !self.sequences.contains_key(key) {
            self.sequences.entry(key.clone()).or_default();
            let id = self.aliases.register_variant(key);
            info!(variant = %key, %id, "New variant");
        }
    }

    /// Atomic per-key extend. Returns the number of appended segments.
    fn merge_listing(&self, key: &VariantKey, listing: &SegmentListing) -> usize {
        let mut sequence = self.sequences.entry(key.clone()).or_default();
        let appended = sequence.merge_new(listing);
        for entry in appended {
            self.aliases.register_segment(&entry.uri, &entry.prefix);
        }
        appended.len()
    }

    async fn fetch_listing(&self, address: &str) -> Result<SegmentListing> {
        match self.fetch_document(address).await? {
            PlaylistDocument::SegmentListing(listing) => Ok(listing),
            other => Err(ParseError::UnexpectedDocument {
                expected: "segment_listing",
                found: other.kind(),
            }
            .into()),
        }
    }

    async fn fetch_document(&self, address: &str) -> Result<PlaylistDocument> {
        let fetched = time::timeout(self.fetch_timeout, self.fetcher.fetch(address))
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout))??;

        Ok(self.parser.parse(&fetched.address, &fetched.body)?)
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    /// Master playlist listing every known variant.
    #[must_use]
    pub fn synthesize_manifest(&self) -> String {
        render_manifest(&self.aliases.variants())
    }

    /// Media playlist for a variant id, `None` if the id is unknown.
    #[must_use]
    pub fn synthesize_variant(&self, variant_id: &str) -> Option<String> {
        let key = self.aliases.resolve_variant(variant_id)?;

        let (target_duration, segments) = {
            let sequence = self.sequences.get(&key)?;
            let segments: Vec<RenderedSegment> = sequence
                .entries()
                .iter()
                .map(|entry| RenderedSegment {
                    id: self.aliases.register_segment(&entry.uri, &entry.prefix),
                    duration: entry.duration,
                })
                .collect();
            (sequence.target_duration(), segments)
        };

        Some(render_variant(target_duration, &segments))
    }

    /// Alias of [`Self::synthesize_variant`] for the serving layer.
    #[must_use]
    pub fn get_variant_playlist(&self, variant_id: &str) -> Option<String> {
        self.synthesize_variant(variant_id)
    }

    pub fn register_segment_alias(&self, source: &str, proxy_prefix: &str) -> String {
        self.aliases.register_segment(source, proxy_prefix)
    }

    #[must_use]
    pub fn resolve_segment_alias(&self, id: &str) -> Option<String> {
        self.aliases.resolve_segment(id)
    }

    #[must_use]
    pub fn resolve_variant(&self, id: &str) -> Option<VariantKey> {
        self.aliases.resolve_variant(id)
    }

    /// Snapshot of a variant's segment references.
    #[must_use]
    pub fn segments_for(&self, key: &VariantKey) -> Option<Vec<String>> {
        self.sequences.get(key).map(|sequence| sequence.uris())
    }

    #[must_use]
    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            cycles: self.stats.cycles.load(Ordering::Relaxed),
            no_source_cycles: self.stats.no_source_cycles.load(Ordering::Relaxed),
            unsupported_listings: self.stats.unsupported_listings.load(Ordering::Relaxed),
            aborted_cycles: self.stats.aborted_cycles.load(Ordering::Relaxed),
            dropped_sources: self.stats.dropped_sources.load(Ordering::Relaxed),
            segments_appended: self.stats.segments_appended.load(Ordering::Relaxed),
            variants: self.aliases.variant_count(),
            segment_aliases: self.aliases.segment_count(),
        }
    }
}
