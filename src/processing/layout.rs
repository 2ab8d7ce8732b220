use crate::photo::TargetSize;

/// Uniform scale that fits `src` inside `target`, capped at 1.0.
pub fn fit_scale(src_w: u32, src_h: u32, target: TargetSize) -> f64 {
    let iw = f64::from(src_w.max(1));
    let ih = f64::from(src_h.max(1));
    let scale = (f64::from(target.width) / iw)
        .min(f64::from(target.height) / ih)
        .min(1.0);
    if scale.is_finite() { scale.max(0.0) } else { 1.0 }
}

/// Output size for fitting `src` inside `target`, or `None` when the image
/// already fits and must be shown as-is.
pub fn fit_dimensions(src_w: u32, src_h: u32, target: TargetSize) -> Option<(u32, u32)> {
    let scale = fit_scale(src_w, src_h, target);
    if scale >= 1.0 {
        return None;
    }
    let w = (f64::from(src_w) * scale)
        .round()
        .clamp(1.0, f64::from(target.width.max(1)));
    let h = (f64::from(src_h) * scale)
        .round()
        .clamp(1.0, f64::from(target.height.max(1)));
    Some((w as u32, h as u32))
}
