use super::{CameraExtrinsic, CameraIntrinsic};
use crate::parallel;
use binocular_image::{Image, ImageError, ImageSize};

/// Maximum number of fixed-point iterations when inverting the distortion model.
const UNDISTORT_MAX_ITERATIONS: usize = 20;

/// Errors raised when building a distortion model.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DistortionError {
    /// The coefficient vector has a length other than 4, 5 or 8.
    #[error("Distortion vector must have 4, 5 or 8 coefficients, got {0}")]
    InvalidCoefficientCount(usize),
}

/// Represents the polynomial distortion parameters of a camera
///
/// The radial term is the rational function
/// `(1 + k1 r² + k2 r⁴ + k3 r⁶) / (1 + k4 r² + k5 r⁴ + k6 r⁶)` and `p1`, `p2` are the
/// tangential coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PolynomialDistortion {
    /// The first radial distortion coefficient
    pub k1: f64,
    /// The second radial distortion coefficient
    pub k2: f64,
    /// The third radial distortion coefficient
    pub k3: f64,
    /// The fourth radial distortion coefficient
    pub k4: f64,
    /// The fifth radial distortion coefficient
    pub k5: f64,
    /// The sixth radial distortion coefficient
    pub k6: f64,
    /// The first tangential distortion coefficient
    pub p1: f64,
    /// The second tangential distortion coefficient
    pub p2: f64,
}

impl PolynomialDistortion {
    /// Build the model from a coefficient vector ordered `[k1, k2, p1, p2, k3, k4, k5, k6]`.
    ///
    /// Vectors of length 4 and 5 leave the missing terms at zero.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self, DistortionError> {
        if !matches!(coeffs.len(), 4 | 5 | 8) {
            return Err(DistortionError::InvalidCoefficientCount(coeffs.len()));
        }
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Ok(Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        })
    }

    /// The coefficient vector `[k1, k2, p1, p2, k3]`, extended with `[k4, k5, k6]`
    /// when any rational term is non-zero.
    pub fn coefficients(&self) -> Vec<f64> {
        let mut coeffs = vec![self.k1, self.k2, self.p1, self.p2, self.k3];
        if self.k4 != 0.0 || self.k5 != 0.0 || self.k6 != 0.0 {
            coeffs.extend_from_slice(&[self.k4, self.k5, self.k6]);
        }
        coeffs
    }
}

/// Apply the distortion model to a point in normalized image coordinates.
#[inline]
pub fn distort_normalized(x: f64, y: f64, distortion: &PolynomialDistortion) -> (f64, f64) {
    let d = distortion;
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;

    // radial distortion
    let kr = (1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6) / (1.0 + d.k4 * r2 + d.k5 * r4 + d.k6 * r6);

    // tangential distortion
    let xd = x * kr + 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
    let yd = y * kr + d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;

    (xd, yd)
}

/// Distort a point using polynomial distortion
///
/// # Arguments
///
/// * `x` - The x coordinate of the point
/// * `y` - The y coordinate of the point
/// * `intrinsic` - The intrinsic parameters of the camera
/// * `distortion` - The distortion parameters of the camera
///
/// # Returns
///
/// * `x` - The x coordinate of the distorted point
/// * `y` - The y coordinate of the distorted point
pub fn distort_point_polynomial(
    x: f64,
    y: f64,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> (f64, f64) {
    let (x, y) = intrinsic.normalize(x, y);
    let (xd, yd) = distort_normalized(x, y, distortion);
    intrinsic.denormalize(xd, yd)
}

/// Invert the distortion model for a point in normalized image coordinates.
///
/// Uses fixed-point iteration; the input is returned unchanged if the radial
/// term becomes non-positive.
pub fn undistort_normalized(xd: f64, yd: f64, distortion: &PolynomialDistortion) -> (f64, f64) {
    let d = distortion;
    let (mut x, mut y) = (xd, yd);
    for _ in 0..UNDISTORT_MAX_ITERATIONS {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let icdist =
            (1.0 + d.k4 * r2 + d.k5 * r4 + d.k6 * r6) / (1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6);
        if icdist < 0.0 {
            return (xd, yd);
        }
        let delta_x = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
        let delta_y = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
        x = (xd - delta_x) * icdist;
        y = (yd - delta_y) * icdist;
    }
    (x, y)
}

/// Undistort pixel coordinates, optionally rotating them and projecting with a new camera.
///
/// # Arguments
///
/// * `points` - Distorted pixel coordinates.
/// * `intrinsic` - The intrinsic parameters of the camera that observed the points.
/// * `distortion` - The distortion parameters of that camera.
/// * `rotation` - Optional rectifying rotation applied in normalized coordinates.
/// * `new_intrinsic` - Optional camera to project with; without it the output is normalized.
pub fn undistort_points(
    points: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
    rotation: Option<&[[f64; 3]; 3]>,
    new_intrinsic: Option<&CameraIntrinsic>,
) -> Vec<[f64; 2]> {
    points
        .iter()
        .map(|p| {
            let (xd, yd) = intrinsic.normalize(p[0], p[1]);
            let (mut x, mut y) = undistort_normalized(xd, yd, distortion);
            if let Some(r) = rotation {
                let xx = r[0][0] * x + r[0][1] * y + r[0][2];
                let yy = r[1][0] * x + r[1][1] * y + r[1][2];
                let ww = r[2][0] * x + r[2][1] * y + r[2][2];
                x = xx / ww;
                y = yy / ww;
            }
            match new_intrinsic {
                Some(k) => {
                    let (u, v) = k.denormalize(x, y);
                    [u, v]
                }
                None => [x, y],
            }
        })
        .collect()
}

/// Generate the undistort and rectify map for a polynomial distortion model
///
/// For every pixel of the output image, the ray of `new_intrinsic` is rotated back by
/// the transpose of `extrinsic.rotation`, distorted and projected with `intrinsic`.
/// The translation of the extrinsic does not affect the map.
///
/// # Arguments
///
/// * `intrinsic` - The intrinsic parameters of the camera
/// * `extrinsic` - The rectifying rotation of the camera
/// * `new_intrinsic` - The intrinsic parameters of the output (rectified) camera
/// * `distortion` - The distortion parameters of the camera
/// * `size` - The size of the output image
///
/// # Returns
///
/// * `map_x` - The x map for undistorting and rectifying the image
/// * `map_y` - The y map for undistorting and rectifying the image
pub fn generate_correction_map_polynomial(
    intrinsic: &CameraIntrinsic,
    extrinsic: &CameraExtrinsic,
    new_intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
    size: &ImageSize,
) -> Result<(Image<f32, 1>, Image<f32, 1>), ImageError> {
    let mut map_x = Image::from_size_val(*size, 0.0f32)?;
    let mut map_y = Image::from_size_val(*size, 0.0f32)?;
    let r = &extrinsic.rotation;

    parallel::par_fill_grid(&mut map_x, &mut map_y, |col, row| {
        let (xn, yn) = new_intrinsic.normalize(col as f64, row as f64);

        // inverse rotation: R^T * [xn, yn, 1]
        let xx = r[0][0] * xn + r[1][0] * yn + r[2][0];
        let yy = r[0][1] * xn + r[1][1] * yn + r[2][1];
        let ww = r[0][2] * xn + r[1][2] * yn + r[2][2];
        if ww.abs() < f64::EPSILON {
            return (-1.0, -1.0);
        }

        let (xd, yd) = distort_normalized(xx / ww, yy / ww, distortion);
        let (u, v) = intrinsic.denormalize(xd, yd);
        (u as f32, v as f32)
    });

    Ok((map_x, map_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intrinsic() -> CameraIntrinsic {
        CameraIntrinsic {
            fx: 577.48583984375,
            fy: 652.8748779296875,
            cx: 577.48583984375,
            cy: 386.1428833007813,
        }
    }

    fn distortion() -> PolynomialDistortion {
        PolynomialDistortion {
            k1: -0.21,
            k2: 0.05,
            k3: -0.002,
            p1: 0.0007,
            p2: -0.0003,
            ..Default::default()
        }
    }

    #[test]
    fn test_distort_point_identity() {
        let (x, y) = distort_point_polynomial(
            100.0,
            20.0,
            &intrinsic(),
            &PolynomialDistortion::default(),
        );
        assert_relative_eq!(x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(y, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_distort_point_polynomial() {
        let intrinsic = intrinsic();
        let distortion = PolynomialDistortion {
            k1: 0.1,
            ..Default::default()
        };
        // a point one focal length to the right of the principal point: r^2 = 1
        let (x, y) = distort_point_polynomial(
            intrinsic.cx + intrinsic.fx,
            intrinsic.cy,
            &intrinsic,
            &distortion,
        );
        assert_relative_eq!(x, intrinsic.cx + 1.1 * intrinsic.fx, epsilon = 1e-9);
        assert_relative_eq!(y, intrinsic.cy, epsilon = 1e-9);
    }

    #[test]
    fn test_undistort_inverts_distort() {
        let distortion = distortion();
        for &(x, y) in &[(0.1, -0.2), (-0.35, 0.25), (0.0, 0.0), (0.4, 0.3)] {
            let (xd, yd) = distort_normalized(x, y, &distortion);
            let (xu, yu) = undistort_normalized(xd, yd, &distortion);
            assert_relative_eq!(xu, x, epsilon = 1e-8);
            assert_relative_eq!(yu, y, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_undistort_points_with_projection() {
        let intrinsic = intrinsic();
        let distortion = distortion();
        let (u, v) = distort_point_polynomial(700.0, 300.0, &intrinsic, &distortion);
        let out = undistort_points(&[[u, v]], &intrinsic, &distortion, None, Some(&intrinsic));
        assert_relative_eq!(out[0][0], 700.0, epsilon = 1e-6);
        assert_relative_eq!(out[0][1], 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_coefficients_round_trip() -> Result<(), DistortionError> {
        let distortion = distortion();
        let coeffs = distortion.coefficients();
        assert_eq!(coeffs.len(), 5);
        assert_eq!(PolynomialDistortion::from_coefficients(&coeffs)?, distortion);

        let rational = PolynomialDistortion {
            k5: 0.01,
            ..distortion
        };
        assert_eq!(rational.coefficients().len(), 8);

        let four = PolynomialDistortion::from_coefficients(&[0.1, 0.2, 0.3, 0.4])?;
        assert_eq!(four.k3, 0.0);
        assert_eq!(four.p2, 0.4);

        assert_eq!(
            PolynomialDistortion::from_coefficients(&[0.0; 6]),
            Err(DistortionError::InvalidCoefficientCount(6))
        );
        Ok(())
    }

    #[test]
    fn test_undistort_rectify_map_polynomial() -> Result<(), ImageError> {
        let intrinsic = intrinsic();
        let size = ImageSize {
            width: 8,
            height: 4,
        };

        let (map_x, map_y) = generate_correction_map_polynomial(
            &intrinsic,
            &CameraExtrinsic::default(),
            &intrinsic,
            &PolynomialDistortion::default(),
            &size,
        )?;

        assert_eq!(map_x.size(), size);
        assert_eq!(map_y.size(), size);

        // no distortion and no rotation is the identity map
        assert_relative_eq!(map_x.as_slice()[5], 5.0, epsilon = 1e-4);
        assert_relative_eq!(map_y.as_slice()[2 * 8 + 3], 2.0, epsilon = 1e-4);

        Ok(())
    }

    #[test]
    fn test_rectify_map_rotation() -> Result<(), ImageError> {
        let intrinsic = CameraIntrinsic {
            fx: 100.0,
            fy: 100.0,
            cx: 50.0,
            cy: 50.0,
        };
        // small rotation about the y axis moves the sampled column
        let angle: f64 = 0.1;
        let rotation = [
            [angle.cos(), 0.0, angle.sin()],
            [0.0, 1.0, 0.0],
            [-angle.sin(), 0.0, angle.cos()],
        ];
        let extrinsic = CameraExtrinsic {
            rotation,
            translation: [0.0; 3],
        };
        let size = ImageSize {
            width: 101,
            height: 101,
        };
        let (map_x, map_y) = generate_correction_map_polynomial(
            &intrinsic,
            &extrinsic,
            &intrinsic,
            &PolynomialDistortion::default(),
            &size,
        )?;

        // the principal ray of the output camera is R^T * z = (-sin, 0, cos)
        let center = 50 * 101 + 50;
        let expected_x = 50.0 - 100.0 * angle.tan();
        assert_relative_eq!(map_x.as_slice()[center] as f64, expected_x, epsilon = 1e-3);
        assert_relative_eq!(map_y.as_slice()[center] as f64, 50.0, epsilon = 1e-3);
        Ok(())
    }
}
