use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::{
    DEFAULT_MAX_PHOTOS, PhotoSource, ScanLimits, is_readable_dir, scan_directory,
    shuffle_for_display,
};
use crate::photo::{PhotoIdentifier, SourceKind};

/// Folders under the home directory scanned by the last tier.
pub const DEFAULT_SECONDARY_FOLDERS: &[&str] = &["Desktop", "Downloads"];

/// Recursive scan over a fixed list of folders.
#[derive(Debug, Clone)]
pub struct FolderSource {
    kind: SourceKind,
    roots: Vec<PathBuf>,
    max_depth: usize,
    max_photos: usize,
    shuffle_seed: Option<u64>,
}

impl FolderSource {
    pub fn new(kind: SourceKind, roots: Vec<PathBuf>, max_depth: usize) -> Self {
        Self {
            kind,
            roots,
            max_depth,
            max_photos: DEFAULT_MAX_PHOTOS,
            shuffle_seed: None,
        }
    }

    /// `<home>/Pictures`, five levels deep.
    pub fn pictures(home: &Path) -> Self {
        Self::new(SourceKind::UserPicturesFolder, vec![home.join("Pictures")], 5)
    }

    /// Desktop and Downloads under `home`, three levels deep.
    pub fn secondary(home: &Path) -> Self {
        Self::secondary_in(home, DEFAULT_SECONDARY_FOLDERS)
    }

    pub fn secondary_in<S: AsRef<str>>(home: &Path, folders: &[S]) -> Self {
        let roots = folders.iter().map(|f| home.join(f.as_ref())).collect();
        Self::new(SourceKind::SecondaryFolders, roots, 3)
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

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl PhotoSource for FolderSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.roots.iter().any(|root| is_readable_dir(root))
    }

    #[instrument(skip(self), fields(kind = %self.kind, depth = self.max_depth))]
    fn enumerate(&self) -> Vec<PhotoIdentifier> {
        let mut found: Vec<PathBuf> = Vec::new();
        for root in &self.roots {
            if !is_readable_dir(root) {
                debug!(root = %root.display(), "folder missing or unreadable; skipping");
                continue;
            }
            let limits = ScanLimits {
                max_depth: self.max_depth,
                max_photos: self.max_photos - found.len(),
                skip_packages: true,
            };
            let batch = scan_directory(root, &limits);
            debug!(root = %root.display(), count = batch.len(), "scanned folder");
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
