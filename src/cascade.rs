//! Ordered fallback over the capability sources.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::config::Configuration;
use crate::photo::PhotoLoadResult;
use crate::sources::{
    FolderSource, LibraryPackageSource, PhotoLibrary, PhotoSource, StructuredLibrarySource,
};

/// Sources in fixed priority order; the first non-empty one wins.
pub struct SourceCascade {
    sources: Vec<Box<dyn PhotoSource>>,
}

impl SourceCascade {
    pub fn new(sources: Vec<Box<dyn PhotoSource>>) -> Self {
        Self { sources }
    }

    /// Library, library package, pictures folder, secondary folders.
    pub fn from_config(cfg: &Configuration, home: PathBuf, library: Arc<dyn PhotoLibrary>) -> Self {
        let seed = cfg.shuffle_seed;
        let sources: Vec<Box<dyn PhotoSource>> = vec![
            Box::new(StructuredLibrarySource::with_limit(library, cfg.max_photos)),
            Box::new(
                LibraryPackageSource::in_home(&home, &cfg.library_package_name)
                    .with_max_depth(cfg.package_max_depth)
                    .with_max_photos(cfg.max_photos)
                    .with_shuffle_seed(seed),
            ),
            Box::new(
                FolderSource::pictures(&home)
                    .with_max_depth(cfg.pictures_max_depth)
                    .with_max_photos(cfg.max_photos)
                    .with_shuffle_seed(seed),
            ),
            Box::new(
                FolderSource::secondary_in(&home, cfg.secondary_folders.as_slice())
                    .with_max_depth(cfg.secondary_max_depth)
                    .with_max_photos(cfg.max_photos)
                    .with_shuffle_seed(seed),
            ),
        ];
        Self::new(sources)
    }

    pub fn sources(&self) -> &[Box<dyn PhotoSource>] {
        &self.sources
    }

    /// Probe every source in order and return the first non-empty result.
    ///
    /// Blocks on filesystem I/O; see [`SourceCascade::resolve_off_thread`].
    #[instrument(skip(self), fields(tiers = self.sources.len()))]
    pub fn resolve(&self) -> PhotoLoadResult {
        for source in &self.sources {
            let kind = source.kind();
            if !source.is_available() {
                debug!(source = %kind, "source unavailable; skipping");
                continue;
            }
            let identifiers = source.enumerate();
            if identifiers.is_empty() {
                debug!(source = %kind, "source available but empty; falling through");
                continue;
            }
            info!(source = %kind, count = identifiers.len(), "loaded photos");
            return PhotoLoadResult::new(kind, identifiers);
        }
        info!("no photos found from any source");
        PhotoLoadResult::empty()
    }

    /// Run [`SourceCascade::resolve`] on the blocking pool and hand the result
    /// back to the awaiting task.
    pub async fn resolve_off_thread(self: Arc<Self>) -> PhotoLoadResult {
        match tokio::task::spawn_blocking(move || self.resolve()).await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "photo source scan did not complete");
                PhotoLoadResult::empty()
            }
        }
    }
}

/// Message shown when the cascade comes back empty.
pub fn no_photos_guidance() -> &'static str {
    "No Photos Found\n\n\
     Grant access to the Photos library (run with --request-access),\n\
     or add photos to ~/Pictures folder."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photo::{AssetId, PhotoIdentifier, SourceKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        kind: SourceKind,
        available: bool,
        items: Vec<PhotoIdentifier>,
        enumerations: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn boxed(
            kind: SourceKind,
            available: bool,
            items: Vec<PhotoIdentifier>,
        ) -> (Box<dyn PhotoSource>, Arc<AtomicUsize>) {
            let enumerations = Arc::new(AtomicUsize::new(0));
            let source = Self {
                kind,
                available,
                items,
                enumerations: enumerations.clone(),
            };
            (Box::new(source), enumerations)
        }
    }

    impl PhotoSource for FakeSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn enumerate(&self) -> Vec<PhotoIdentifier> {
            self.enumerations.fetch_add(1, Ordering::SeqCst);
            self.items.clone()
        }
    }

    fn files(names: &[&str]) -> Vec<PhotoIdentifier> {
        names
            .iter()
            .map(|n| PhotoIdentifier::File(PathBuf::from(*n)))
            .collect()
    }

    #[test]
    fn highest_priority_non_empty_source_wins() {
        let (library, _) = FakeSource::boxed(
            SourceKind::StructuredLibrary,
            true,
            vec![PhotoIdentifier::Asset(AssetId::new("a1"))],
        );
        let (pictures, pictures_calls) =
            FakeSource::boxed(SourceKind::UserPicturesFolder, true, files(&["/p/1.jpg"]));

        let result = SourceCascade::new(vec![library, pictures]).resolve();
        assert_eq!(result.source(), SourceKind::StructuredLibrary);
        assert_eq!(result.count(), 1);
        assert_eq!(pictures_calls.load(Ordering::SeqCst), 0, "lower tiers must not be scanned");
    }

    #[test]
    fn available_but_empty_falls_through() {
        let (package, _) = FakeSource::boxed(SourceKind::LibraryPackageFiles, true, Vec::new());
        let (pictures, _) =
            FakeSource::boxed(SourceKind::UserPicturesFolder, true, files(&["/p/1.jpg", "/p/2.jpg"]));

        let result = SourceCascade::new(vec![package, pictures]).resolve();
        assert_eq!(result.source(), SourceKind::UserPicturesFolder);
        assert_eq!(result.identifiers(), files(&["/p/1.jpg", "/p/2.jpg"]).as_slice());
    }

    #[test]
    fn unavailable_sources_are_never_enumerated() {
        let (library, library_calls) = FakeSource::boxed(
            SourceKind::StructuredLibrary,
            false,
            vec![PhotoIdentifier::Asset(AssetId::new("a1"))],
        );
        let (secondary, _) =
            FakeSource::boxed(SourceKind::SecondaryFolders, true, files(&["/d/1.png"]));

        let result = SourceCascade::new(vec![library, secondary]).resolve();
        assert_eq!(result.source(), SourceKind::SecondaryFolders);
        assert_eq!(library_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn all_empty_yields_the_empty_result() {
        let (a, _) = FakeSource::boxed(SourceKind::StructuredLibrary, false, Vec::new());
        let (b, _) = FakeSource::boxed(SourceKind::LibraryPackageFiles, true, Vec::new());
        let (c, _) = FakeSource::boxed(SourceKind::UserPicturesFolder, false, Vec::new());
        let (d, _) = FakeSource::boxed(SourceKind::SecondaryFolders, true, Vec::new());

        let result = SourceCascade::new(vec![a, b, c, d]).resolve();
        assert!(!result.has_photos());
        assert_eq!(result.source(), SourceKind::None);
        assert!(no_photos_guidance().contains("No Photos Found"));
    }

    #[tokio::test]
    async fn resolves_on_the_blocking_pool() {
        let (pictures, _) =
            FakeSource::boxed(SourceKind::UserPicturesFolder, true, files(&["/p/1.jpg"]));
        let cascade = Arc::new(SourceCascade::new(vec![pictures]));
        let result = cascade.resolve_off_thread().await;
        assert_eq!(result.count(), 1);
    }
}
