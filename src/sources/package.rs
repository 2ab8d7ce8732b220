use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::{
    DEFAULT_MAX_PHOTOS, PhotoSource, ScanLimits, is_readable_dir, scan_directory,
    shuffle_for_display,
};
use crate::photo::{PhotoIdentifier, SourceKind};

/// Bundle name of the default library under `~/Pictures`.
pub const DEFAULT_PACKAGE_NAME: &str = "Photos Library.photoslibrary";

/// First-level fan-out of the `originals` directory.
const HEX_DIRECTORIES: [&str; 16] = [
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "A", "B", "C", "D", "E", "F",
];

/// Reads original files straight out of the library bundle, bypassing the
/// library's own API.
#[derive(Debug, Clone)]
pub struct LibraryPackageSource {
    package: PathBuf,
    max_depth: usize,
    max_photos: usize,
    shuffle_seed: Option<u64>,
}

impl LibraryPackageSource {
    pub fn new(package: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            max_depth: 2,
            max_photos: DEFAULT_MAX_PHOTOS,
            shuffle_seed: None,
        }
    }

    /// `<home>/Pictures/<name>`.
    pub fn in_home(home: &Path, package_name: &str) -> Self {
        Self::new(home.join("Pictures").join(package_name))
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_photos(mut self, max_photos: usize) -> Self {
        self.max_photos = max_photos;
        self
    }

    pub fn with_shuffle_seed(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    pub fn originals(&self) -> PathBuf {
        self.package.join("originals")
    }
}

impl PhotoSource for LibraryPackageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LibraryPackageFiles
    }

    fn is_available(&self) -> bool {
        self.package.is_dir() && is_readable_dir(&self.originals())
    }

    #[instrument(skip(self), fields(package = %self.package.display()))]
    fn enumerate(&self) -> Vec<PhotoIdentifier> {
        if !self.is_available() {
            return Vec::new();
        }
        let originals = self.originals();
        let mut found: Vec<PathBuf> = Vec::new();
        for hex in HEX_DIRECTORIES {
            let dir = originals.join(hex);
            if !dir.exists() {
                continue;
            }
            let limits = ScanLimits {
                max_depth: self.max_depth,
                max_photos: self.max_photos - found.len(),
                skip_packages: false,
            };
            let batch = scan_directory(&dir, &limits);
            debug!(dir = hex, count = batch.len(), "scanned originals shard");
            found.extend(batch);
            if found.len() >= self.max_photos {
                break;
            }
        }
        found.truncate(self.max_photos);
        shuffle_for_display(&mut found, self.shuffle_seed);
        found.into_iter().map(PhotoIdentifier::File).collect()
    }
}
