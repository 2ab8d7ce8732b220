//! Decode an image file into an RGBA8 buffer that fits a display box.
//!
//! Order of attempts:
//! 1. scaled JPEG decode (DCT scaling, cheap for large originals),
//! 2. full decode followed by a fit resize,
//! 3. the full-size decode when resizing fails.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use fast_image_resize as fir;
use image::{
    DynamicImage, GrayImage, ImageBuffer, ImageFormat, ImageReader, Rgb, RgbImage, Rgba, RgbaImage,
    imageops,
};
use jpeg_decoder::{Decoder as JpegDecoder, PixelFormat};
use tracing::{debug, warn};

use super::layout::fit_dimensions;
use crate::photo::TargetSize;

/// Produce pixels for `path` no larger than `target`, preserving aspect ratio.
pub fn load_for_display(path: &Path, target: TargetSize) -> Result<RgbaImage> {
    if target.is_empty() {
        bail!("target size {target} has no area");
    }

    match decode_thumbnail(path, target) {
        Ok(Some(img)) => {
            debug!(path = %path.display(), w = img.width(), h = img.height(), "scaled decode");
            return Ok(img);
        }
        Ok(None) => {}
        Err(err) => {
            debug!(path = %path.display(), "scaled decode failed: {err:#}; falling back");
        }
    }

    let full = decode_rgba8_apply_exif(path)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(fit_or_keep(path, full, target, resize_to_fit))
}

/// Apply `resize`; any failure keeps the full-size decode.
fn fit_or_keep<F>(path: &Path, full: RgbaImage, target: TargetSize, resize: F) -> RgbaImage
where
    F: FnOnce(&RgbaImage, TargetSize) -> Result<Option<RgbaImage>>,
{
    match resize(&full, target) {
        Ok(Some(resized)) => resized,
        Ok(None) => full,
        Err(err) => {
            warn!(path = %path.display(), "resize failed: {err:#}; using full-size image");
            full
        }
    }
}

/// Scaled JPEG decode. `None` when the format has no scaled path or the
/// image already fits.
pub fn decode_thumbnail(path: &Path, target: TargetSize) -> Result<Option<RgbaImage>> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    if reader.format() != Some(ImageFormat::Jpeg) {
        return Ok(None);
    }
    let (raw_w, raw_h) = reader.into_dimensions()?;
    let orientation = read_orientation(path).unwrap_or(1);
    let swap = matches!(orientation, 5..=8);
    let (disp_w, disp_h) = if swap { (raw_h, raw_w) } else { (raw_w, raw_h) };

    let Some((fit_w, fit_h)) = fit_dimensions(disp_w, disp_h, target) else {
        return Ok(None);
    };
    let (req_w, req_h) = if swap { (fit_h, fit_w) } else { (fit_w, fit_h) };

    let scaled = decode_jpeg_scaled(path, req_w, req_h)?;
    let oriented = apply_orientation(scaled, orientation);
    let fitted = resize_to_fit(&oriented, target)?;
    Ok(Some(fitted.unwrap_or(oriented)))
}

/// Full decode to RGBA8 with EXIF orientation applied when present.
pub fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let orientation = read_orientation(path).unwrap_or(1);
    Ok(apply_orientation(img.to_rgba8(), orientation))
}

/// Downscale `img` to fit `target`; `None` when no resize is needed.
pub fn resize_to_fit(img: &RgbaImage, target: TargetSize) -> Result<Option<RgbaImage>> {
    match fit_dimensions(img.width(), img.height(), target) {
        Some((w, h)) => resize_rgba(img, w, h).map(Some),
        None => Ok(None),
    }
}

fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        // transpose
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        // transverse
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    u16::try_from(value).ok()
}

fn decode_jpeg_scaled(path: &Path, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    use jpeg_decoder::Error as JpegError;

    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut decoder = JpegDecoder::new(BufReader::new(file));
    let request_w = target_w.clamp(1, u32::from(u16::MAX)) as u16;
    let request_h = target_h.clamp(1, u32::from(u16::MAX)) as u16;
    let unsupported = |err: JpegError| match err {
        JpegError::Unsupported(feature) => anyhow!("unsupported JPEG feature: {feature:?}"),
        other => anyhow!(other),
    };
    decoder.scale(request_w, request_h).map_err(unsupported)?;
    let pixels = decoder.decode().map_err(unsupported)?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("missing image info while decoding {}", path.display()))?;

    scaled_output_to_rgba(
        pixels,
        u32::from(info.width),
        u32::from(info.height),
        info.pixel_format,
    )
}

/// Wrap scaled decoder output in an `image` buffer and widen it to RGBA8.
fn scaled_output_to_rgba(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbaImage> {
    let mismatch = || anyhow!("scaled JPEG buffer does not match {width}x{height} {format:?}");
    let image = match format {
        PixelFormat::RGB24 => {
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, pixels).ok_or_else(mismatch)?)
        }
        PixelFormat::L8 => {
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, pixels).ok_or_else(mismatch)?)
        }
        PixelFormat::CMYK32 => {
            let cmyk = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels)
                .ok_or_else(mismatch)?;
            let rgb = RgbImage::from_fn(width, height, |x, y| {
                let [c, m, ye, k] = cmyk.get_pixel(x, y).0;
                let mul = |v: u8| ((u16::from(255 - v) * u16::from(255 - k) + 127) / 255) as u8;
                Rgb([mul(c), mul(m), mul(ye)])
            });
            DynamicImage::ImageRgb8(rgb)
        }
        PixelFormat::L16 => bail!("16-bit grayscale JPEGs have no scaled decode"),
    };
    Ok(image.into_rgba8())
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow!("failed to construct resized RGBA image"))
}
