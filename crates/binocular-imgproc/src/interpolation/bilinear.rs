use super::interpolate::{fetch, BorderMode};
use binocular_image::{Image, ImageDtype};

/// Kernel for bilinear interpolation
///
/// Each of the four neighbours outside the image is read through the border policy,
/// so samples straddling the edge blend with the border value.
pub(crate) fn bilinear_interpolation<T: ImageDtype, const C: usize>(
    image: &Image<T, C>,
    u: f32,
    v: f32,
    c: usize,
    border: BorderMode,
) -> f32 {
    if !u.is_finite() || !v.is_finite() || image.cols() == 0 || image.rows() == 0 {
        return match border {
            BorderMode::Constant(val) => val,
            BorderMode::Replicate => 0.0,
        };
    }

    let u0 = u.floor();
    let v0 = v.floor();
    let frac_u = u - u0;
    let frac_v = v - v0;
    let (iu, iv) = (u0 as i64, v0 as i64);

    let p00 = fetch(image, iu, iv, c, border);
    let p01 = fetch(image, iu + 1, iv, c, border);
    let p10 = fetch(image, iu, iv + 1, c, border);
    let p11 = fetch(image, iu + 1, iv + 1, c, border);

    let frac_uu = 1.0 - frac_u;
    let frac_vv = 1.0 - frac_v;

    p00 * frac_uu * frac_vv + p01 * frac_u * frac_vv + p10 * frac_uu * frac_v + p11 * frac_u * frac_v
}

#[cfg(test)]
mod tests {
    use super::*;
    use binocular_image::ImageError;

    #[test]
    fn bilinear_inside_and_border() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new([2, 2].into(), vec![0.0, 10.0, 20.0, 30.0])?;
        let center = bilinear_interpolation(&image, 0.5, 0.5, 0, BorderMode::Constant(0.0));
        approx::assert_relative_eq!(center, 15.0);

        // half way past the right edge blends with the border value
        let edge = bilinear_interpolation(&image, 1.5, 0.0, 0, BorderMode::Constant(0.0));
        approx::assert_relative_eq!(edge, 5.0);

        let replicated = bilinear_interpolation(&image, 1.5, 0.0, 0, BorderMode::Replicate);
        approx::assert_relative_eq!(replicated, 10.0);

        let far = bilinear_interpolation(&image, -5.0, 9.0, 0, BorderMode::Constant(7.0));
        approx::assert_relative_eq!(far, 7.0);
        Ok(())
    }
}
