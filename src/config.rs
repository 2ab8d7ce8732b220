use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::cache::CacheLimits;
use crate::photo::TargetSize;
use crate::sources::DEFAULT_MAX_PHOTOS;
use crate::sources::folders::DEFAULT_SECONDARY_FOLDERS;
use crate::sources::package::DEFAULT_PACKAGE_NAME;
use crate::tasks::slideshow::SlideshowOptions;

/// Logical size of the surface photos are shown on.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayOptions {
    pub width: f64,
    pub height: f64,
    /// Backing pixels per logical unit (2.0 on high-density screens).
    pub scale_factor: f64,
}

impl DisplayOptions {
    /// Pixel size to decode for, rounded to whole pixels.
    pub fn target_size(&self) -> TargetSize {
        TargetSize::rounded(self.width * self.scale_factor, self.height * self.scale_factor)
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            scale_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SlideshowConfig {
    /// Time a photo stays on screen, e.g. `10s` or `2m`.
    #[serde(with = "humantime_serde")]
    pub dwell: Duration,
    pub repeat: bool,
    pub prefetch: bool,
}

impl SlideshowConfig {
    const fn default_dwell() -> Duration {
        Duration::from_secs(10)
    }

    pub const fn options(&self) -> SlideshowOptions {
        SlideshowOptions {
            dwell: self.dwell,
            repeat: self.repeat,
            prefetch: self.prefetch,
        }
    }
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            dwell: Self::default_dwell(),
            repeat: true,
            prefetch: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory the package and folder sources are resolved against.
    /// Falls back to the current user's home directory.
    pub home_dir: Option<PathBuf>,
    /// File name of the library package under `<home>/Pictures`.
    pub library_package_name: String,
    /// Folders under the home directory scanned as the last resort.
    pub secondary_folders: Vec<String>,
    /// Cap on identifiers returned by any one source.
    pub max_photos: usize,
    pub pictures_max_depth: usize,
    pub secondary_max_depth: usize,
    pub package_max_depth: usize,
    /// Optional deterministic seed for the display order of file results.
    pub shuffle_seed: Option<u64>,
    pub cache: CacheLimits,
    pub display: DisplayOptions,
    pub slideshow: SlideshowConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&s).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.max_photos > 0, "max-photos must be greater than zero");
        ensure!(
            !self.library_package_name.trim().is_empty(),
            "library-package-name must not be empty"
        );
        ensure!(
            self.display.width > 0.0 && self.display.height > 0.0,
            "display width and height must be greater than zero"
        );
        ensure!(
            self.display.scale_factor > 0.0,
            "display.scale-factor must be positive"
        );
        ensure!(
            !self.display.target_size().is_empty(),
            "display size rounds to zero pixels"
        );
        ensure!(
            self.cache.max_entries > 0,
            "cache.max-entries must be greater than zero"
        );
        ensure!(
            self.cache.max_cost_bytes > 0,
            "cache.max-cost-bytes must be greater than zero"
        );
        for folder in &self.secondary_folders {
            ensure!(
                !folder.trim().is_empty(),
                "secondary-folders entries must not be empty"
            );
        }
        Ok(self)
    }

    /// The configured home directory, or the current user's.
    pub fn resolve_home(&self) -> Result<PathBuf> {
        match &self.home_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir().context("could not determine the home directory"),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            home_dir: None,
            library_package_name: DEFAULT_PACKAGE_NAME.to_string(),
            secondary_folders: DEFAULT_SECONDARY_FOLDERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_photos: DEFAULT_MAX_PHOTOS,
            pictures_max_depth: 5,
            secondary_max_depth: 3,
            package_max_depth: 2,
            shuffle_seed: None,
            cache: CacheLimits::default(),
            display: DisplayOptions::default(),
            slideshow: SlideshowConfig::default(),
        }
    }
}
