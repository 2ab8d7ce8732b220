//! Capability sources tried by the cascade, and the directory walk they share.

use std::fs;
use std::path::{Path, PathBuf};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::photo::{PhotoIdentifier, SourceKind, is_supported};

pub mod folders;
pub mod library;
pub mod package;

pub use folders::FolderSource;
pub use library::{
    AssetQuery, AuthorizationStatus, DeliveryOptions, MediaType, PhotoLibrary,
    StructuredLibrarySource, UnavailableLibrary,
};
pub use package::LibraryPackageSource;

/// Default cap on identifiers returned by any one source.
pub const DEFAULT_MAX_PHOTOS: usize = 10_000;

/// Extension of library bundles; file scans never descend into them.
pub const PACKAGE_EXTENSION: &str = "photoslibrary";

/// One origin of photos.
///
/// `is_available` must stay cheap (existence and permission checks); the
/// cascade only calls `enumerate` once availability passed.
pub trait PhotoSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn is_available(&self) -> bool;

    fn enumerate(&self) -> Vec<PhotoIdentifier>;
}

/// Bounds for [`scan_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Deepest directory that is listed; the root is depth 0 and a directory
    /// at depth `d` is listed while `d <= max_depth`.
    pub max_depth: usize,
    /// Stop once this many images were collected.
    pub max_photos: usize,
    /// Do not descend into nested `.photoslibrary` bundles.
    pub skip_packages: bool,
}

/// Collect supported image files below `root`.
///
/// Hidden entries are skipped. Unreadable directories are logged and skipped
/// without aborting the rest of the walk.
pub fn scan_directory(root: &Path, limits: &ScanLimits) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if limits.max_photos == 0 {
        return found;
    }

    // Files inside a directory at depth `d` sit at walk depth `d + 1`.
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(limits.max_depth.saturating_add(1))
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !should_skip(e, limits.skip_packages));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_supported(entry.path()) {
                    found.push(entry.into_path());
                    if found.len() >= limits.max_photos {
                        debug!(root = %root.display(), cap = limits.max_photos, "scan cap reached");
                        break;
                    }
                }
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                warn!(%path, error = %err, "skipping unreadable entry during scan");
            }
        }
    }
    found
}

fn should_skip(entry: &DirEntry, skip_packages: bool) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let hidden = entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'));
    if hidden {
        return true;
    }
    skip_packages
        && entry.file_type().is_dir()
        && entry
            .path()
            .extension()
            .is_some_and(|ext| ext == PACKAGE_EXTENSION)
}

/// Existing, readable directory. Opens the directory but does not list it.
pub(crate) fn is_readable_dir(path: &Path) -> bool {
    path.is_dir() && fs::read_dir(path).is_ok()
}

/// Randomise presentation order. Not for anything security related.
pub(crate) fn shuffle_for_display(paths: &mut [PathBuf], seed: Option<u64>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    paths.shuffle(&mut rng);
}
