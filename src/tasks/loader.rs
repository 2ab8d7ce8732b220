//! Image retrieval: cache lookups in front of off-thread decoding.
//!
//! Hits return straight from the in-memory store. Misses decode on tokio's
//! blocking pool (files) or ask the photo library (assets), then populate the
//! store. Two concurrent misses for one key may both decode; the store keeps a
//! single entry per key.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use image::RgbaImage;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::cache::{CacheKey, ImageCache};
use crate::error::LoadFailure;
use crate::events::Retrieved;
use crate::photo::{AssetId, PhotoIdentifier, TargetSize};
use crate::processing::decode::load_for_display;
use crate::sources::{DeliveryOptions, PhotoLibrary};

/// Turns a file into display-sized pixels. Runs on a blocking thread.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path, target: TargetSize) -> anyhow::Result<RgbaImage>;
}

/// Scaled JPEG decode, then full decode + resize.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl ImageDecoder for FileDecoder {
    fn decode(&self, path: &Path, target: TargetSize) -> anyhow::Result<RgbaImage> {
        load_for_display(path, target)
    }
}

#[derive(Clone)]
pub struct ImageLoader {
    cache: Arc<ImageCache>,
    decoder: Arc<dyn ImageDecoder>,
    library: Option<Arc<dyn PhotoLibrary>>,
}

impl ImageLoader {
    pub fn new(cache: Arc<ImageCache>) -> Self {
        Self {
            cache,
            decoder: Arc::new(FileDecoder),
            library: None,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_library(mut self, library: Arc<dyn PhotoLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Fetch `identifier` at `target`, from the cache when possible.
    #[instrument(skip_all, fields(id = %identifier, size = %target))]
    pub async fn retrieve(
        &self,
        identifier: &PhotoIdentifier,
        target: TargetSize,
    ) -> Result<Arc<RgbaImage>, LoadFailure> {
        let key = CacheKey::new(identifier, target);
        if let Some(hit) = self.cache.get(&key) {
            trace!("cache hit");
            return Ok(hit);
        }

        let image = match identifier {
            PhotoIdentifier::File(path) => self.decode_file(path, target).await?,
            PhotoIdentifier::Asset(asset) => self.deliver_asset(asset, target).await?,
        };
        let image = Arc::new(image);
        self.cache.insert(key, Arc::clone(&image));
        debug!(w = image.width(), h = image.height(), "loaded");
        Ok(image)
    }

    /// Retrieve on a spawned task and send exactly one [`Retrieved`] to `reply`,
    /// even when the decoder or the library panics.
    pub fn dispatch(
        &self,
        ticket: u64,
        identifier: PhotoIdentifier,
        target: TargetSize,
        reply: Sender<Retrieved>,
    ) -> JoinHandle<()> {
        let loader = self.clone();
        tokio::spawn(async move {
            let result = loader.retrieve_contained(&identifier, target).await;
            let delivery = Retrieved {
                ticket,
                identifier,
                result,
            };
            if reply.send(delivery).await.is_err() {
                debug!(ticket, "retrieval receiver dropped");
            }
        })
    }

    /// Warm the cache for an upcoming photo; failures are only logged.
    pub fn prefetch(&self, identifier: PhotoIdentifier, target: TargetSize) -> JoinHandle<()> {
        let loader = self.clone();
        tokio::spawn(async move {
            if let Err(err) = loader.retrieve_contained(&identifier, target).await {
                debug!(id = %identifier, "prefetch failed: {err}");
            }
        })
    }

    /// [`ImageLoader::retrieve`] with a panic turned into a failure for this
    /// identifier alone.
    async fn retrieve_contained(
        &self,
        identifier: &PhotoIdentifier,
        target: TargetSize,
    ) -> Result<Arc<RgbaImage>, LoadFailure> {
        match AssertUnwindSafe(self.retrieve(identifier, target))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "retrieval panicked".to_string());
                warn!(id = %identifier, "retrieval panicked: {reason}");
                Err(LoadFailure::Worker(reason))
            }
        }
    }

    async fn decode_file(&self, path: &Path, target: TargetSize) -> Result<RgbaImage, LoadFailure> {
        let decoder = Arc::clone(&self.decoder);
        let job_path: PathBuf = path.to_path_buf();
        match tokio::task::spawn_blocking(move || decoder.decode(&job_path, target)).await {
            Ok(Ok(image)) => Ok(image),
            Ok(Err(err)) => {
                debug!(path = %path.display(), "decode failed: {err:#}");
                Err(LoadFailure::Decode {
                    path: path.to_path_buf(),
                    reason: format!("{err:#}"),
                })
            }
            Err(err) => Err(LoadFailure::Worker(err.to_string())),
        }
    }

    async fn deliver_asset(
        &self,
        asset: &AssetId,
        target: TargetSize,
    ) -> Result<RgbaImage, LoadFailure> {
        let Some(library) = &self.library else {
            return Err(LoadFailure::LibraryUnavailable(asset.clone()));
        };
        library
            .request_image(asset, target, DeliveryOptions::default())
            .await
            .ok_or_else(|| LoadFailure::DeliveryNil(asset.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLimits;
    use crate::sources::{AssetQuery, AuthorizationStatus};
    use futures::future::{BoxFuture, FutureExt};
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Paints a solid image at the target size; fails for names containing "bad".
    #[derive(Default)]
    struct StubDecoder {
        calls: AtomicUsize,
    }

    impl ImageDecoder for StubDecoder {
        fn decode(&self, path: &Path, target: TargetSize) -> anyhow::Result<RgbaImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = path.to_string_lossy();
            anyhow::ensure!(!name.contains("bad"), "corrupt image data");
            let shade = (name.len() % 255) as u8;
            Ok(RgbaImage::from_pixel(
                target.width,
                target.height,
                Rgba([shade, 0, 0, 255]),
            ))
        }
    }

    struct StubLibrary {
        deliver: bool,
        requests: AtomicUsize,
    }

    impl PhotoLibrary for StubLibrary {
        fn authorization_status(&self) -> AuthorizationStatus {
            AuthorizationStatus::Authorized
        }

        fn request_authorization(&self) -> AuthorizationStatus {
            AuthorizationStatus::Authorized
        }

        fn fetch_assets(&self, _query: &AssetQuery) -> Vec<AssetId> {
            Vec::new()
        }

        fn request_image(
            &self,
            _asset: &AssetId,
            target: TargetSize,
            options: DeliveryOptions,
        ) -> BoxFuture<'static, Option<RgbaImage>> {
            assert!(options.network_access_allowed && options.high_quality);
            self.requests.fetch_add(1, Ordering::SeqCst);
            let image = self
                .deliver
                .then(|| RgbaImage::new(target.width, target.height / 2));
            async move {
                tokio::task::yield_now().await;
                image
            }
            .boxed()
        }
    }

    /// Panics while delivering any asset whose handle starts with "boom".
    struct ExplodingLibrary;

    impl PhotoLibrary for ExplodingLibrary {
        fn authorization_status(&self) -> AuthorizationStatus {
            AuthorizationStatus::Authorized
        }

        fn request_authorization(&self) -> AuthorizationStatus {
            AuthorizationStatus::Authorized
        }

        fn fetch_assets(&self, _query: &AssetQuery) -> Vec<AssetId> {
            Vec::new()
        }

        fn request_image(
            &self,
            asset: &AssetId,
            target: TargetSize,
            _options: DeliveryOptions,
        ) -> BoxFuture<'static, Option<RgbaImage>> {
            let explode = asset.as_str().starts_with("boom");
            async move {
                tokio::task::yield_now().await;
                if explode {
                    panic!("library delivery blew up");
                }
                Some(RgbaImage::new(target.width, target.height))
            }
            .boxed()
        }
    }

    fn loader_with(decoder: Arc<StubDecoder>) -> ImageLoader {
        ImageLoader::new(Arc::new(ImageCache::default())).with_decoder(decoder)
    }

    fn file(name: &str) -> PhotoIdentifier {
        PhotoIdentifier::File(PathBuf::from(format!("/photos/{name}")))
    }

    #[tokio::test]
    async fn second_retrieval_is_served_from_cache() {
        let decoder = Arc::new(StubDecoder::default());
        let loader = loader_with(decoder.clone());
        let size = TargetSize::new(8, 6);

        let first = loader.retrieve(&file("a.jpg"), size).await.unwrap();
        let second = loader.retrieve(&file("a.jpg"), size).await.unwrap();

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.as_raw(), second.as_raw());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn a_new_size_is_a_new_entry() {
        let decoder = Arc::new(StubDecoder::default());
        let loader = loader_with(decoder.clone());

        loader.retrieve(&file("a.jpg"), TargetSize::new(8, 6)).await.unwrap();
        let big = loader.retrieve(&file("a.jpg"), TargetSize::new(16, 12)).await.unwrap();

        assert_eq!(big.dimensions(), (16, 12));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.cache().len(), 2);
    }

    #[tokio::test]
    async fn decode_failure_is_scoped_to_one_identifier() {
        let decoder = Arc::new(StubDecoder::default());
        let loader = loader_with(decoder);
        let size = TargetSize::new(4, 4);

        let err = loader.retrieve(&file("bad.jpg"), size).await.unwrap_err();
        assert!(matches!(err, LoadFailure::Decode { ref path, .. } if path.ends_with("bad.jpg")));
        assert!(loader.cache().is_empty());

        assert!(loader.retrieve(&file("good.jpg"), size).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_misses_leave_one_entry() {
        let decoder = Arc::new(StubDecoder::default());
        let loader = loader_with(decoder.clone());
        let size = TargetSize::new(5, 5);
        let id = file("same.jpg");

        let (a, b) = tokio::join!(loader.retrieve(&id, size), loader.retrieve(&id, size));
        assert_eq!(a.unwrap().as_raw(), b.unwrap().as_raw());
        assert_eq!(loader.cache().len(), 1);
        assert!((1..=2).contains(&decoder.calls.load(Ordering::SeqCst)));
    }

    #[tokio::test]
    async fn store_stays_bounded_through_the_loader() {
        let decoder = Arc::new(StubDecoder::default());
        let cache = Arc::new(ImageCache::new(CacheLimits::default()));
        let loader = ImageLoader::new(cache.clone()).with_decoder(decoder);

        for n in 0..60 {
            loader
                .retrieve(&file(&format!("{n}.jpg")), TargetSize::new(2, 2))
                .await
                .unwrap();
            assert!(cache.len() <= 50);
        }
        assert_eq!(cache.len(), 50);
    }

    #[tokio::test]
    async fn assets_are_delivered_by_the_library() {
        let library = Arc::new(StubLibrary {
            deliver: true,
            requests: AtomicUsize::new(0),
        });
        let loader = ImageLoader::new(Arc::new(ImageCache::default())).with_library(library.clone());
        let asset = PhotoIdentifier::Asset(AssetId::new("A-1"));

        let img = loader.retrieve(&asset, TargetSize::new(40, 40)).await.unwrap();
        assert_eq!(img.dimensions(), (40, 20));
        loader.retrieve(&asset, TargetSize::new(40, 40)).await.unwrap();
        assert_eq!(library.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn library_without_image_is_a_failure() {
        let library = Arc::new(StubLibrary {
            deliver: false,
            requests: AtomicUsize::new(0),
        });
        let loader = ImageLoader::new(Arc::new(ImageCache::default())).with_library(library);
        let err = loader
            .retrieve(&PhotoIdentifier::Asset(AssetId::new("gone")), TargetSize::new(4, 4))
            .await
            .unwrap_err();
        assert_eq!(err, LoadFailure::DeliveryNil(AssetId::new("gone")));
    }

    #[tokio::test]
    async fn assets_need_a_library() {
        let loader = ImageLoader::new(Arc::new(ImageCache::default()));
        let err = loader
            .retrieve(&PhotoIdentifier::Asset(AssetId::new("x")), TargetSize::new(4, 4))
            .await
            .unwrap_err();
        assert_eq!(err, LoadFailure::LibraryUnavailable(AssetId::new("x")));
    }

    #[tokio::test]
    async fn dispatch_delivers_exactly_once_with_ticket() {
        let loader = loader_with(Arc::new(StubDecoder::default()));
        let (tx, mut rx) = mpsc::channel(4);

        loader
            .dispatch(7, file("a.jpg"), TargetSize::new(3, 3), tx.clone())
            .await
            .unwrap();
        loader
            .dispatch(8, file("bad.jpg"), TargetSize::new(3, 3), tx)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.ticket, 7);
        assert!(first.result.is_ok());
        let second = rx.recv().await.unwrap();
        assert_eq!(second.ticket, 8);
        assert_eq!(second.identifier, file("bad.jpg"));
        assert!(second.result.is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn prefetch_warms_the_cache() {
        let decoder = Arc::new(StubDecoder::default());
        let loader = loader_with(decoder.clone());
        let size = TargetSize::new(3, 3);

        loader.prefetch(file("next.jpg"), size).await.unwrap();
        assert!(loader.cache().contains(&CacheKey::new(&file("next.jpg"), size)));
        loader.retrieve(&file("next.jpg"), size).await.unwrap();
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_library_still_delivers_one_failure() {
        let loader = ImageLoader::new(Arc::new(ImageCache::default()))
            .with_library(Arc::new(ExplodingLibrary));
        let (tx, mut rx) = mpsc::channel(4);
        let boom = PhotoIdentifier::Asset(AssetId::new("boom"));
        let fine = PhotoIdentifier::Asset(AssetId::new("fine"));

        loader
            .dispatch(1, boom.clone(), TargetSize::new(4, 4), tx.clone())
            .await
            .unwrap();
        loader
            .dispatch(2, fine, TargetSize::new(4, 4), tx)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.ticket, 1);
        assert_eq!(first.identifier, boom);
        assert!(matches!(first.result, Err(LoadFailure::Worker(ref reason)) if reason.contains("blew up")));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.ticket, 2);
        assert!(second.result.is_ok());
        assert!(rx.recv().await.is_none());
        assert_eq!(loader.cache().len(), 1);
    }
}
