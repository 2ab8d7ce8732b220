//! Identifiers and result types shared by the sources, the cascade and the loader.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// Extensions (lowercase, without dot) the file-based sources collect.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["heic", "jpeg", "jpg", "png", "gif", "tiff", "tif", "bmp"];

/// Return `true` if `path` has a supported image extension (case-insensitive).
#[must_use]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Opaque handle for a photo inside the structured library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A displayable photo: either a file on disk or a structured-library asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhotoIdentifier {
    File(PathBuf),
    Asset(AssetId),
}

impl PhotoIdentifier {
    /// Stable string form used to build cache keys.
    pub fn stable_key(&self) -> String {
        match self {
            Self::File(path) => format!("file://{}", path.display()),
            Self::Asset(id) => format!("asset://{id}"),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Asset(_) => None,
        }
    }

    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl fmt::Display for PhotoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Asset(id) => write!(f, "asset:{id}"),
        }
    }
}

/// Which tier of the cascade produced a [`PhotoLoadResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    StructuredLibrary,
    LibraryPackageFiles,
    UserPicturesFolder,
    SecondaryFolders,
    None,
}

impl SourceKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::StructuredLibrary => "Photos Library",
            Self::LibraryPackageFiles => "Photos Library Files",
            Self::UserPicturesFolder => "Pictures Folder",
            Self::SecondaryFolders => "Other Locations",
            Self::None => "None",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered photo identifiers plus the source that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoLoadResult {
    identifiers: Vec<PhotoIdentifier>,
    source: SourceKind,
}

impl PhotoLoadResult {
    pub fn new(source: SourceKind, identifiers: Vec<PhotoIdentifier>) -> Self {
        debug_assert!(
            identifiers.is_empty() || source != SourceKind::None,
            "photos must be tagged with the source that produced them"
        );
        let result = Self { identifiers, source };
        debug_assert!(result.is_homogeneous(), "mixed identifier kinds in one result");
        result
    }

    /// The result returned when no source produced anything.
    pub const fn empty() -> Self {
        Self {
            identifiers: Vec::new(),
            source: SourceKind::None,
        }
    }

    pub fn has_photos(&self) -> bool {
        !self.identifiers.is_empty()
    }

    pub fn count(&self) -> usize {
        self.identifiers.len()
    }

    pub const fn source(&self) -> SourceKind {
        self.source
    }

    pub fn identifiers(&self) -> &[PhotoIdentifier] {
        &self.identifiers
    }

    pub fn get(&self, index: usize) -> Option<&PhotoIdentifier> {
        self.identifiers.get(index)
    }

    /// All file paths or all library assets, never a mix.
    pub fn is_homogeneous(&self) -> bool {
        match self.identifiers.first() {
            None => true,
            Some(first) => {
                let files = first.is_file();
                self.identifiers.iter().all(|id| id.is_file() == files)
            }
        }
    }
}

/// Requested display size in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round a fractional (e.g. point-scaled) display size to whole pixels.
    pub fn rounded(width: f64, height: f64) -> Self {
        let clamp = |v: f64| v.round().clamp(0.0, f64::from(u32::MAX)) as u32;
        Self {
            width: clamp(width),
            height: clamp(height),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
