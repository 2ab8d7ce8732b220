use std::sync::Arc;

use image::RgbaImage;

use crate::error::LoadFailure;
use crate::photo::PhotoIdentifier;

/// Outcome of one dispatched retrieval. Exactly one is sent per dispatch.
#[derive(Debug)]
pub struct Retrieved {
    /// Caller-chosen correlation tag, echoed back unchanged.
    pub ticket: u64,
    pub identifier: PhotoIdentifier,
    pub result: Result<Arc<RgbaImage>, LoadFailure>,
}

/// Emitted by the slideshow when a photo becomes the current frame.
#[derive(Debug, Clone)]
pub struct Displayed {
    pub index: usize,
    pub identifier: PhotoIdentifier,
    pub image: Arc<RgbaImage>,
}
