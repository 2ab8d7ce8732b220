use std::path::PathBuf;

use thiserror::Error;

use crate::photo::AssetId;

/// Why a single photo could not be produced at the requested size.
///
/// Failures are scoped to one identifier; callers skip to the next photo.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadFailure {
    /// The file could not be read or decoded into pixels.
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// The library finished the request without an image or an error.
    #[error("library delivered no image for asset {0}")]
    DeliveryNil(AssetId),

    /// An asset identifier was requested but no library is attached.
    #[error("no photo library attached to resolve asset {0}")]
    LibraryUnavailable(AssetId),

    /// The background worker running the decode did not complete.
    #[error("decode worker failed: {0}")]
    Worker(String),
}
