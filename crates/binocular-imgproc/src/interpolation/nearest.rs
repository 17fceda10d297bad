use super::interpolate::{fetch, BorderMode};
use binocular_image::{Image, ImageDtype};

/// Kernel for nearest neighbor interpolation
pub(crate) fn nearest_neighbor_interpolation<T: ImageDtype, const C: usize>(
    image: &Image<T, C>,
    u: f32,
    v: f32,
    c: usize,
    border: BorderMode,
) -> f32 {
    if !u.is_finite() || !v.is_finite() {
        return match border {
            BorderMode::Constant(val) => val,
            BorderMode::Replicate => 0.0,
        };
    }
    fetch(image, u.round() as i64, v.round() as i64, c, border)
}
