use binocular_image::ImageSize;
use binocular_imgproc::calibration::{distortion::undistort_points, CameraIntrinsic};
use serde::{Deserialize, Serialize};

use crate::error::CalibError;
use crate::intrinsic::IntrinsicModel;
use crate::linalg;

/// Options of the stereo rectification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectifyFlags {
    /// Give both rectified cameras the same principal point, so that points at
    /// infinity have zero disparity. Otherwise only the coordinate across the
    /// baseline is shared.
    pub zero_disparity: bool,
}

impl Default for RectifyFlags {
    fn default() -> Self {
        Self {
            zero_disparity: true,
        }
    }
}

/// Rectifying rotations and projections of a stereo pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectificationModel {
    /// Rotation of the left camera into the rectified frame.
    pub r1: [[f64; 3]; 3],
    /// Rotation of the right camera into the rectified frame.
    pub r2: [[f64; 3]; 3],
    /// Projection matrix of the rectified left camera.
    pub p1: [[f64; 4]; 3],
    /// Projection matrix of the rectified right camera, in the left rectified frame.
    pub p2: [[f64; 4]; 3],
    /// Disparity to depth mapping `[x, y, d, 1] -> [X, Y, Z, W]`.
    pub q: [[f64; 4]; 4],
}

impl RectificationModel {
    /// Camera of the rectified left image.
    pub fn left_camera(&self) -> CameraIntrinsic {
        camera_of(&self.p1)
    }

    /// Camera of the rectified right image.
    pub fn right_camera(&self) -> CameraIntrinsic {
        camera_of(&self.p2)
    }

    /// Focal length shared by both rectified cameras.
    pub fn focal_length(&self) -> f64 {
        self.p1[0][0]
    }

    /// `true` when the cameras are side by side, `false` when stacked vertically.
    pub fn is_horizontal(&self) -> bool {
        self.p2[1][3] == 0.0
    }

    /// Map a pixel and its disparity to a 3d point in the left rectified frame.
    ///
    /// Returns `None` when the homogeneous scale vanishes.
    pub fn reproject(&self, x: f64, y: f64, disparity: f64) -> Option<[f64; 3]> {
        let q = &self.q;
        let v = [x, y, disparity, 1.0];
        let row = |r: usize| (0..4).map(|c| q[r][c] * v[c]).sum::<f64>();
        let w = row(3);
        if w.abs() < f64::EPSILON {
            return None;
        }
        Some([row(0) / w, row(1) / w, row(2) / w])
    }
}

fn camera_of(p: &[[f64; 4]; 3]) -> CameraIntrinsic {
    CameraIntrinsic {
        fx: p[0][0],
        fy: p[1][1],
        cx: p[0][2],
        cy: p[1][2],
    }
}

/// Compute the rectification of a calibrated stereo pair.
///
/// The relative rotation is split in halves between both cameras, then a common
/// rotation aligns the baseline with the image x axis (or y axis for a mostly vertical
/// baseline). Both rectified cameras share the smaller focal length across the
/// baseline, inflated for barrel distortion, and principal points that center the
/// undistorted image corners.
///
/// # Arguments
///
/// * `left` - Model of the left camera.
/// * `right` - Model of the right camera.
/// * `image_size` - Size of both images.
/// * `rotation` - Rotation from the left to the right camera frame.
/// * `translation` - Translation from the left to the right camera frame.
/// * `flags` - Rectification options.
///
/// # Errors
///
/// Returns [`CalibError::DegenerateGeometry`] when the baseline vanishes or lies along
/// the optical axis.
pub fn stereo_rectify(
    left: &IntrinsicModel,
    right: &IntrinsicModel,
    image_size: ImageSize,
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
    flags: &RectifyFlags,
) -> Result<RectificationModel, CalibError> {
    let (nx, ny) = (image_size.width as f64, image_size.height as f64);
    if image_size.width == 0 || image_size.height == 0 {
        return Err(CalibError::DegenerateGeometry(format!(
            "empty image size {image_size}"
        )));
    }

    // half of the relative rotation for each camera
    let om = linalg::rodrigues_inverse(rotation);
    let r_r = linalg::rodrigues(&[-0.5 * om[0], -0.5 * om[1], -0.5 * om[2]]);
    let t = linalg::mat33_vec3(&r_r, translation);

    let nt = linalg::norm3(&t);
    if nt < 1e-12 {
        return Err(CalibError::DegenerateGeometry("zero baseline".into()));
    }
    let idx = if t[0].abs() > t[1].abs() { 0 } else { 1 };
    let c = t[idx];
    if c.abs() < 1e-6 * nt {
        return Err(CalibError::DegenerateGeometry(
            "baseline is parallel to the optical axis".into(),
        ));
    }

    // rotate the baseline onto the image axis
    let mut uu = [0.0; 3];
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = linalg::cross3(&t, &uu);
    let nw = linalg::norm3(&ww);
    if nw > 0.0 {
        let scale = (c.abs() / nt).clamp(-1.0, 1.0).acos() / nw;
        ww = [ww[0] * scale, ww[1] * scale, ww[2] * scale];
    }
    let w_r = linalg::rodrigues(&ww);

    let r1 = linalg::matmul33(&w_r, &linalg::transpose33(&r_r));
    let r2 = linalg::matmul33(&w_r, &r_r);
    let t_new = linalg::mat33_vec3(&r2, translation);

    // common focal length across the baseline
    let mut fc_new = f64::MAX;
    for model in [left, right] {
        let k = model.k_matrix();
        let mut fc = k[idx ^ 1][idx ^ 1];
        let k1 = model.distortion.k1;
        if k1 < 0.0 {
            fc *= 1.0 + k1 * (nx * nx + ny * ny) / (4.0 * fc * fc);
        }
        fc_new = fc_new.min(fc);
    }

    // principal points centering the undistorted image corners
    let corners = [[0.0, 0.0], [nx - 1.0, 0.0], [0.0, ny - 1.0], [nx - 1.0, ny - 1.0]];
    let rectified_camera = CameraIntrinsic {
        fx: fc_new,
        fy: fc_new,
        cx: 0.0,
        cy: 0.0,
    };
    let mut cc = [[0.0; 2]; 2];
    for (k, (model, r)) in [(left, &r1), (right, &r2)].into_iter().enumerate() {
        let pts = undistort_points(
            &corners,
            &model.camera,
            &model.distortion,
            Some(r),
            Some(&rectified_camera),
        );
        let (sx, sy) = pts
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        cc[k] = [(nx - 1.0) * 0.5 - sx / 4.0, (ny - 1.0) * 0.5 - sy / 4.0];
    }
    if flags.zero_disparity {
        let mean = [(cc[0][0] + cc[1][0]) * 0.5, (cc[0][1] + cc[1][1]) * 0.5];
        cc = [mean, mean];
    } else {
        // only the coordinate across the baseline is shared
        let axis = idx ^ 1;
        let mean = (cc[0][axis] + cc[1][axis]) * 0.5;
        cc[0][axis] = mean;
        cc[1][axis] = mean;
    }

    let projection = |cc: &[f64; 2]| {
        [
            [fc_new, 0.0, cc[0], 0.0],
            [0.0, fc_new, cc[1], 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ]
    };
    let p1 = projection(&cc[0]);
    let mut p2 = projection(&cc[1]);
    p2[idx][3] = t_new[idx] * fc_new;

    let tx = t_new[idx];
    let q = [
        [1.0, 0.0, 0.0, -cc[0][0]],
        [0.0, 1.0, 0.0, -cc[0][1]],
        [0.0, 0.0, 0.0, fc_new],
        [0.0, 0.0, -1.0 / tx, (cc[0][idx] - cc[1][idx]) / tx],
    ];

    let model = RectificationModel { r1, r2, p1, p2, q };
    let finite = r1.iter().chain(r2.iter()).flatten().all(|v| v.is_finite())
        && p1.iter().chain(p2.iter()).flatten().all(|v| v.is_finite())
        && q.iter().flatten().all(|v| v.is_finite());
    if !finite || fc_new <= 0.0 {
        return Err(CalibError::DegenerateGeometry(format!(
            "rectified focal length {fc_new}"
        )));
    }

    log::info!(
        "rectified focal length {fc_new:.3}, baseline {tx:.4} along {}",
        if idx == 0 { "x" } else { "y" }
    );
    Ok(model)
}
