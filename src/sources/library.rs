//! The structured photo library: the interface the platform service exposes,
//! and the capability source built on top of it.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use image::RgbaImage;
use tracing::{debug, info, instrument};

use super::{DEFAULT_MAX_PHOTOS, PhotoSource};
use crate::photo::{AssetId, PhotoIdentifier, SourceKind, TargetSize};

/// Read authorization the process holds for the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Limited,
    Denied,
    Restricted,
    NotDetermined,
}

impl AuthorizationStatus {
    /// Whether assets can be enumerated with this status.
    pub const fn grants_read(self) -> bool {
        matches!(self, Self::Authorized | Self::Limited)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

/// Asset enumeration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetQuery {
    pub media_type: MediaType,
    /// Sort by the library's creation date, newest first.
    pub newest_first: bool,
    pub limit: usize,
}

impl AssetQuery {
    pub const fn newest_images(limit: usize) -> Self {
        Self {
            media_type: MediaType::Image,
            newest_first: true,
            limit,
        }
    }
}

/// How the library should produce pixels for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Wait for the final high-quality rendition instead of a degraded preview.
    pub high_quality: bool,
    /// Allow fetching originals that are only stored remotely.
    pub network_access_allowed: bool,
    /// Scale to fit inside the target, preserving aspect ratio.
    pub aspect_fit: bool,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            high_quality: true,
            network_access_allowed: true,
            aspect_fit: true,
        }
    }
}

/// The platform's managed photo database.
///
/// Implementations wrap the native service; delivery is asynchronous and may
/// finish without an image.
pub trait PhotoLibrary: Send + Sync {
    fn authorization_status(&self) -> AuthorizationStatus;

    fn request_authorization(&self) -> AuthorizationStatus;

    fn fetch_assets(&self, query: &AssetQuery) -> Vec<AssetId>;

    fn request_image(
        &self,
        asset: &AssetId,
        target: TargetSize,
        options: DeliveryOptions,
    ) -> BoxFuture<'static, Option<RgbaImage>>;
}

/// Stand-in where the host has no structured library.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLibrary;

impl PhotoLibrary for UnavailableLibrary {
    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::NotDetermined
    }

    fn request_authorization(&self) -> AuthorizationStatus {
        AuthorizationStatus::Denied
    }

    fn fetch_assets(&self, _query: &AssetQuery) -> Vec<AssetId> {
        Vec::new()
    }

    fn request_image(
        &self,
        _asset: &AssetId,
        _target: TargetSize,
        _options: DeliveryOptions,
    ) -> BoxFuture<'static, Option<RgbaImage>> {
        futures::future::ready(None).boxed()
    }
}

/// First tier of the cascade: assets from the structured library.
pub struct StructuredLibrarySource {
    library: Arc<dyn PhotoLibrary>,
    max_photos: usize,
}

impl StructuredLibrarySource {
    pub fn new(library: Arc<dyn PhotoLibrary>) -> Self {
        Self::with_limit(library, DEFAULT_MAX_PHOTOS)
    }

    pub fn with_limit(library: Arc<dyn PhotoLibrary>, max_photos: usize) -> Self {
        Self {
            library,
            max_photos,
        }
    }

    /// Ask for read access if the user was never prompted.
    ///
    /// Returns whether the library is readable afterwards.
    pub fn request_access(&self) -> bool {
        let status = self.library.authorization_status();
        let status = match status {
            AuthorizationStatus::NotDetermined => {
                let granted = self.library.request_authorization();
                info!(?granted, "photo library authorization requested");
                granted
            }
            other => other,
        };
        status.grants_read()
    }
}

impl PhotoSource for StructuredLibrarySource {
    fn kind(&self) -> SourceKind {
        SourceKind::StructuredLibrary
    }

    fn is_available(&self) -> bool {
        self.library.authorization_status().grants_read()
    }

    #[instrument(skip(self), fields(cap = self.max_photos))]
    fn enumerate(&self) -> Vec<PhotoIdentifier> {
        if !self.is_available() {
            return Vec::new();
        }
        let assets = self
            .library
            .fetch_assets(&AssetQuery::newest_images(self.max_photos));
        debug!(count = assets.len(), "fetched library assets");
        assets
            .into_iter()
            .take(self.max_photos)
            .map(PhotoIdentifier::Asset)
            .collect()
    }
}
