pub mod playlist;
pub mod variant;

pub use playlist::{Manifest, PlaylistDocument, SegmentListing, SegmentRef};
pub use variant::{derive_alias_id, VariantKey, DEFAULT_PROGRAM_ID};
