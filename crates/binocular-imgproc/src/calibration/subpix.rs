use binocular_image::{Image, ImageDtype};
use serde::{Deserialize, Serialize};

use crate::interpolation::{interpolate_pixel, BorderMode, InterpolationMode};

/// Parameters of the iterative sub-pixel corner refinement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubPixParams {
    /// Half size of the search window; the window spans `2 * win_size + 1` pixels.
    pub win_size: usize,
    /// Maximum number of iterations per corner.
    pub max_iterations: usize,
    /// Stop once the corner moves less than this many pixels in one iteration.
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            win_size: 5,
            max_iterations: 30,
            epsilon: 0.1,
        }
    }
}

impl SubPixParams {
    /// Set the half window size.
    pub fn with_win_size(mut self, win_size: usize) -> Self {
        self.win_size = win_size;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold in pixels.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Refine corner locations to sub-pixel accuracy.
///
/// At a saddle corner `q` every image gradient `g_i` in the neighbourhood is orthogonal
/// to `p_i - q`. The refined corner solves the Gaussian weighted normal equations
/// `sum(g_i g_i^T) q = sum(g_i g_i^T p_i)` and repeats until the update is below
/// `params.epsilon` or `params.max_iterations` is reached. A corner that drifts further
/// than the window from its start is restored to the start.
///
/// # Arguments
///
/// * `image` - Single channel image.
/// * `corners` - Initial corner estimates in pixel coordinates, refined in place.
/// * `params` - Window size and termination criteria.
pub fn corner_subpix<T: ImageDtype>(
    image: &Image<T, 1>,
    corners: &mut [[f64; 2]],
    params: &SubPixParams,
) {
    let win = params.win_size as i64;
    let side = (2 * win + 1) as usize;
    let eps2 = params.epsilon * params.epsilon;

    // gaussian weights over the window
    let coeff = 1.0 / (win * win).max(1) as f64;
    let weights_1d = (0..side)
        .map(|i| {
            let x = i as f64 - win as f64;
            (-x * x * coeff).exp()
        })
        .collect::<Vec<_>>();

    let (cols, rows) = (image.cols() as f64, image.rows() as f64);

    // the patch is one pixel larger on each side for central differences
    let patch_side = side + 2;
    let mut patch = vec![0.0f64; patch_side * patch_side];

    for corner in corners.iter_mut() {
        let start = *corner;
        let mut ci = start;

        for _ in 0..params.max_iterations {
            for (k, value) in patch.iter_mut().enumerate() {
                let py = (k / patch_side) as f64 - (win + 1) as f64;
                let px = (k % patch_side) as f64 - (win + 1) as f64;
                *value = interpolate_pixel(
                    image,
                    (ci[0] + px) as f32,
                    (ci[1] + py) as f32,
                    0,
                    InterpolationMode::Bilinear,
                    BorderMode::Replicate,
                ) as f64;
            }

            let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for i in 0..side {
                let py = i as f64 - win as f64;
                for j in 0..side {
                    let px = j as f64 - win as f64;
                    let m = weights_1d[i] * weights_1d[j];
                    let at = |r: usize, q: usize| patch[r * patch_side + q];
                    let gx = at(i + 1, j + 2) - at(i + 1, j);
                    let gy = at(i + 2, j + 1) - at(i, j + 1);
                    let gxx = gx * gx * m;
                    let gxy = gx * gy * m;
                    let gyy = gy * gy * m;
                    a += gxx;
                    b += gxy;
                    c += gyy;
                    bb1 += gxx * px + gxy * py;
                    bb2 += gxy * px + gyy * py;
                }
            }

            let det = a * c - b * b;
            if det.abs() <= f64::EPSILON * f64::EPSILON {
                break;
            }
            let scale = 1.0 / det;
            let next = [
                ci[0] + c * scale * bb1 - b * scale * bb2,
                ci[1] - b * scale * bb1 + a * scale * bb2,
            ];
            let err = (next[0] - ci[0]).powi(2) + (next[1] - ci[1]).powi(2);
            ci = next;

            if ci[0] < 0.0 || ci[0] >= cols || ci[1] < 0.0 || ci[1] >= rows || err <= eps2 {
                break;
            }
        }

        if (ci[0] - start[0]).abs() > win as f64
            || (ci[1] - start[1]).abs() > win as f64
            || !ci[0].is_finite()
            || !ci[1].is_finite()
        {
            ci = start;
        }
        *corner = ci;
    }
}
