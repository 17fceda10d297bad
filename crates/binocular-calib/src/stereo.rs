use binocular_image::ImageSize;
use serde::{Deserialize, Serialize};

use crate::error::CalibError;
use crate::intrinsic::{
    estimate_view_pose, reprojection_residuals, validate_views, view_squared_error,
    IntrinsicModel, NUM_POSE_PARAMS,
};
use crate::linalg;
use crate::optim::{LeastSquaresProblem, LevenbergMarquardt, ResidualBlock};

/// Relative pose of the right camera with respect to the left camera.
///
/// A point `X_l` in left camera coordinates maps to `X_r = R * X_l + T`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtrinsicModel {
    /// Rotation `R` from the left to the right camera frame.
    pub rotation: [[f64; 3]; 3],
    /// Translation `T` from the left to the right camera frame.
    pub translation: [f64; 3],
    /// Essential matrix `E = [T]x R`.
    pub essential: [[f64; 3]; 3],
    /// Fundamental matrix `F = K2^-T E K1^-1`, scaled so that `F[2][2] = 1`.
    pub fundamental: [[f64; 3]; 3],
}

impl ExtrinsicModel {
    /// Derive the essential and fundamental matrices of a relative pose.
    pub fn from_pose(
        rotation: [[f64; 3]; 3],
        translation: [f64; 3],
        left: &IntrinsicModel,
        right: &IntrinsicModel,
    ) -> Result<Self, CalibError> {
        let essential = linalg::matmul33(&linalg::skew3(&translation), &rotation);

        let k1_inv = linalg::inverse33(&left.k_matrix())
            .ok_or_else(|| CalibError::Degenerate("singular left camera matrix".into()))?;
        let k2_inv = linalg::inverse33(&right.k_matrix())
            .ok_or_else(|| CalibError::Degenerate("singular right camera matrix".into()))?;
        let mut fundamental = linalg::matmul33(
            &linalg::transpose33(&k2_inv),
            &linalg::matmul33(&essential, &k1_inv),
        );
        let f22 = fundamental[2][2];
        if f22.abs() > f64::EPSILON {
            for row in fundamental.iter_mut() {
                for v in row.iter_mut() {
                    *v /= f22;
                }
            }
        }

        Ok(Self {
            rotation,
            translation,
            essential,
            fundamental,
        })
    }

    /// Length of the baseline.
    pub fn baseline(&self) -> f64 {
        linalg::norm3(&self.translation)
    }
}

/// Options of the stereo refinement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StereoFlags {
    /// Keep both camera matrices at their single camera estimates.
    pub fix_intrinsic: bool,
    /// Share the focal lengths between both cameras when they are refined.
    pub same_focal_length: bool,
}

impl Default for StereoFlags {
    fn default() -> Self {
        Self {
            fix_intrinsic: true,
            same_focal_length: true,
        }
    }
}

/// Result of a stereo calibration.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoCalibration {
    /// Model of the left camera after the refinement.
    pub left: IntrinsicModel,
    /// Model of the right camera after the refinement.
    pub right: IntrinsicModel,
    /// Relative pose with essential and fundamental matrices.
    pub extrinsic: ExtrinsicModel,
    /// RMS reprojection error over both cameras, in pixels.
    pub rms_error: f64,
    /// Per view RMS reprojection error of the left and right camera, in pixels.
    pub per_view_errors: Vec<[f64; 2]>,
}

const OM: usize = 0;
const TRANSLATION: usize = 3;
const LEFT_CAMERA: usize = 6;
const RIGHT_CAMERA: usize = 10;
const FIRST_VIEW: usize = 14;

/// Reprojection residuals of both cameras over all views.
///
/// Parameters: `[om, T, fx1, fy1, cx1, cy1, fx2, fy2, cx2, cy2]` followed by the left
/// board pose of every view. Distortion is not a parameter.
struct StereoProblem<'a> {
    object_points: &'a [Vec<[f64; 3]>],
    left_points: &'a [Vec<[f64; 2]>],
    right_points: &'a [Vec<[f64; 2]>],
    left: IntrinsicModel,
    right: IntrinsicModel,
    tie_focal_length: bool,
    blocks: Vec<ResidualBlock>,
}

impl StereoProblem<'_> {
    fn models(&self, params: &[f64]) -> (IntrinsicModel, IntrinsicModel) {
        let mut left = self.left;
        let mut right = self.right;
        let l = &params[LEFT_CAMERA..RIGHT_CAMERA];
        let r = &params[RIGHT_CAMERA..FIRST_VIEW];
        left.camera.fx = l[0];
        left.camera.fy = l[1];
        left.camera.cx = l[2];
        left.camera.cy = l[3];
        right.camera.fx = if self.tie_focal_length { l[0] } else { r[0] };
        right.camera.fy = if self.tie_focal_length { l[1] } else { r[1] };
        right.camera.cx = r[2];
        right.camera.cy = r[3];
        (left, right)
    }
}

fn vec3(p: &[f64]) -> [f64; 3] {
    [p[0], p[1], p[2]]
}

/// Board pose in the right camera from the left pose and the relative pose.
fn right_pose(
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
    rvec_left: &[f64; 3],
    tvec_left: &[f64; 3],
) -> ([f64; 3], [f64; 3]) {
    let r_left = linalg::rodrigues(rvec_left);
    let r_right = linalg::matmul33(rotation, &r_left);
    let t = linalg::mat33_vec3(rotation, tvec_left);
    (
        linalg::rodrigues_inverse(&r_right),
        [
            t[0] + translation[0],
            t[1] + translation[1],
            t[2] + translation[2],
        ],
    )
}

impl LeastSquaresProblem for StereoProblem<'_> {
    fn num_params(&self) -> usize {
        FIRST_VIEW + NUM_POSE_PARAMS * self.object_points.len()
    }

    fn blocks(&self) -> &[ResidualBlock] {
        &self.blocks
    }

    fn evaluate_block(&self, block: usize, params: &[f64], residuals: &mut [f64]) {
        let (left, right) = self.models(params);
        let rotation = linalg::rodrigues(&vec3(&params[OM..]));
        let translation = vec3(&params[TRANSLATION..]);
        let pose = &params[FIRST_VIEW + NUM_POSE_PARAMS * block..];
        let (rvec, tvec) = (vec3(pose), vec3(&pose[3..]));

        let object = &self.object_points[block];
        let (res_left, res_right) = residuals.split_at_mut(2 * object.len());
        reprojection_residuals(
            &left,
            &rvec,
            &tvec,
            object,
            &self.left_points[block],
            res_left,
        );
        let (rvec_r, tvec_r) = right_pose(&rotation, &translation, &rvec, &tvec);
        reprojection_residuals(
            &right,
            &rvec_r,
            &tvec_r,
            object,
            &self.right_points[block],
            res_right,
        );
    }
}

/// Estimate the relative pose of two calibrated cameras from simultaneous board views.
///
/// Each view's board pose is estimated independently in both cameras; the median of the
/// per view relative poses seeds a joint refinement of the relative pose and all left
/// board poses. Distortion coefficients are never refined here. With
/// `flags.fix_intrinsic` the camera matrices are held constant too.
///
/// # Arguments
///
/// * `object_points` - Board corners of each view in board coordinates (z = 0).
/// * `left_points` - Corners of each view detected in the left image.
/// * `right_points` - Corners of each view detected in the right image, same order.
/// * `left` - Model of the left camera.
/// * `right` - Model of the right camera.
/// * `image_size` - Size of each camera's image.
/// * `flags` - Refinement options.
/// * `solver` - Settings of the non-linear solver.
#[allow(clippy::too_many_arguments)]
pub fn stereo_calibrate(
    object_points: &[Vec<[f64; 3]>],
    left_points: &[Vec<[f64; 2]>],
    right_points: &[Vec<[f64; 2]>],
    left: &IntrinsicModel,
    right: &IntrinsicModel,
    image_size: ImageSize,
    flags: &StereoFlags,
    solver: &LevenbergMarquardt,
) -> Result<StereoCalibration, CalibError> {
    let num_views = validate_views(object_points, left_points)?;
    validate_views(object_points, right_points)?;
    if image_size.width == 0 || image_size.height == 0 {
        return Err(CalibError::Degenerate(format!("empty image size {image_size}")));
    }
    if num_views < 3 {
        log::warn!("stereo calibration with only {num_views} views, the result may be unstable");
    }

    // initial relative pose: median over views
    let mut left_poses = Vec::with_capacity(num_views);
    let mut oms = Vec::with_capacity(num_views);
    let mut translations = Vec::with_capacity(num_views);
    for ((obj, pl), pr) in object_points.iter().zip(left_points).zip(right_points) {
        let (rl, tl) = estimate_view_pose(left, obj, pl, solver)?;
        let (rr, tr) = estimate_view_pose(right, obj, pr, solver)?;
        let r = linalg::matmul33(
            &linalg::rodrigues(&rr),
            &linalg::transpose33(&linalg::rodrigues(&rl)),
        );
        let rt = linalg::mat33_vec3(&r, &tl);
        oms.push(linalg::rodrigues_inverse(&r));
        translations.push([tr[0] - rt[0], tr[1] - rt[1], tr[2] - rt[2]]);
        left_poses.push((rl, tl));
    }
    let om = linalg::median3(&oms).ok_or(CalibError::NoObservations)?;
    let translation = linalg::median3(&translations).ok_or(CalibError::NoObservations)?;

    let mut params = Vec::with_capacity(FIRST_VIEW + NUM_POSE_PARAMS * num_views);
    params.extend_from_slice(&om);
    params.extend_from_slice(&translation);
    for model in [left, right] {
        let c = &model.camera;
        params.extend_from_slice(&[c.fx, c.fy, c.cx, c.cy]);
    }
    for (rl, tl) in &left_poses {
        params.extend_from_slice(rl);
        params.extend_from_slice(tl);
    }

    let tie_focal_length = !flags.fix_intrinsic && flags.same_focal_length;
    let mut fixed = vec![false; params.len()];
    if flags.fix_intrinsic {
        fixed[LEFT_CAMERA..FIRST_VIEW].fill(true);
    } else if tie_focal_length {
        fixed[RIGHT_CAMERA] = true;
        fixed[RIGHT_CAMERA + 1] = true;
    }

    let problem = StereoProblem {
        object_points,
        left_points,
        right_points,
        left: *left,
        right: *right,
        tie_focal_length,
        blocks: object_points
            .iter()
            .enumerate()
            .map(|(view, obj)| {
                let offset = FIRST_VIEW + NUM_POSE_PARAMS * view;
                ResidualBlock {
                    params: (0..FIRST_VIEW)
                        .chain(offset..offset + NUM_POSE_PARAMS)
                        .collect(),
                    num_residuals: 4 * obj.len(),
                }
            })
            .collect(),
    };

    let summary = solver.minimize(&problem, &mut params, &fixed)?;
    log::debug!(
        "stereo refinement: cost {:.6e} -> {:.6e} in {} iterations ({:?})",
        summary.initial_cost,
        summary.final_cost,
        summary.iterations,
        summary.termination_reason
    );
    if params.iter().any(|p| !p.is_finite()) {
        return Err(CalibError::Degenerate("non-finite stereo parameters".into()));
    }

    let (left_model, right_model) = problem.models(&params);
    let rotation = linalg::rodrigues(&vec3(&params[OM..]));
    let translation = vec3(&params[TRANSLATION..]);
    let extrinsic = ExtrinsicModel::from_pose(rotation, translation, &left_model, &right_model)?;

    let mut per_view_errors = Vec::with_capacity(num_views);
    let (mut total_error, mut total_points) = (0.0, 0usize);
    for (view, obj) in object_points.iter().enumerate() {
        let pose = &params[FIRST_VIEW + NUM_POSE_PARAMS * view..];
        let (rvec, tvec) = (vec3(pose), vec3(&pose[3..]));
        let (rvec_r, tvec_r) = right_pose(&rotation, &translation, &rvec, &tvec);
        let err_left = view_squared_error(&left_model, &rvec, &tvec, obj, &left_points[view]);
        let err_right =
            view_squared_error(&right_model, &rvec_r, &tvec_r, obj, &right_points[view]);
        let n = obj.len() as f64;
        per_view_errors.push([(err_left / n).sqrt(), (err_right / n).sqrt()]);
        total_error += err_left + err_right;
        total_points += 2 * obj.len();
    }
    let rms_error = (total_error / total_points as f64).sqrt();

    log::info!(
        "stereo calibration from {num_views} views: rms {rms_error:.4} px, baseline {:.4}",
        extrinsic.baseline()
    );
    if rms_error > 1.0 {
        log::warn!("high stereo reprojection error {rms_error:.3} px");
    }

    Ok(StereoCalibration {
        left: left_model,
        right: right_model,
        extrinsic,
        rms_error,
        per_view_errors,
    })
}
