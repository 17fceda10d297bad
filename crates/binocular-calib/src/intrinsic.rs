use binocular_image::ImageSize;
use binocular_imgproc::calibration::{
    distortion::{distort_normalized, undistort_points, PolynomialDistortion},
    CameraIntrinsic,
};
use serde::{Deserialize, Serialize};

use crate::error::CalibError;
use crate::homography::find_homography_dlt;
use crate::linalg;
use crate::optim::{LeastSquaresProblem, LevenbergMarquardt, ResidualBlock};

/// Number of camera parameters in the packed vector: `fx, fy, cx, cy` and eight distortion terms.
pub(crate) const NUM_INTRINSIC_PARAMS: usize = 12;

/// Number of pose parameters per view: Rodrigues vector and translation.
pub(crate) const NUM_POSE_PARAMS: usize = 6;

/// Camera matrix and lens distortion of a single camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntrinsicModel {
    /// Focal lengths and principal point.
    pub camera: CameraIntrinsic,
    /// Radial and tangential distortion.
    pub distortion: PolynomialDistortion,
}

impl IntrinsicModel {
    /// The 3x3 camera matrix.
    pub fn k_matrix(&self) -> [[f64; 3]; 3] {
        self.camera.k_matrix()
    }

    /// Project a point given in board coordinates into the image.
    ///
    /// # Arguments
    ///
    /// * `rvec` - Rodrigues vector of the board to camera rotation.
    /// * `tvec` - Board to camera translation.
    /// * `point` - The 3d point in board coordinates.
    pub fn project(&self, rvec: &[f64; 3], tvec: &[f64; 3], point: &[f64; 3]) -> [f64; 2] {
        let r = linalg::rodrigues(rvec);
        self.project_with_rotation(&r, tvec, point)
    }

    pub(crate) fn project_with_rotation(
        &self,
        r: &[[f64; 3]; 3],
        tvec: &[f64; 3],
        point: &[f64; 3],
    ) -> [f64; 2] {
        let pc = linalg::mat33_vec3(r, point);
        let (x, y, z) = (pc[0] + tvec[0], pc[1] + tvec[1], pc[2] + tvec[2]);
        let iz = if z.abs() > f64::EPSILON { 1.0 / z } else { 1.0 };
        let (xd, yd) = distort_normalized(x * iz, y * iz, &self.distortion);
        let (u, v) = self.camera.denormalize(xd, yd);
        [u, v]
    }

    /// Pack into `[fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6]`.
    pub(crate) fn to_params(&self) -> [f64; NUM_INTRINSIC_PARAMS] {
        let (c, d) = (&self.camera, &self.distortion);
        [
            c.fx, c.fy, c.cx, c.cy, d.k1, d.k2, d.p1, d.p2, d.k3, d.k4, d.k5, d.k6,
        ]
    }

    pub(crate) fn from_params(p: &[f64]) -> Self {
        Self {
            camera: CameraIntrinsic {
                fx: p[0],
                fy: p[1],
                cx: p[2],
                cy: p[3],
            },
            distortion: PolynomialDistortion {
                k1: p[4],
                k2: p[5],
                p1: p[6],
                p2: p[7],
                k3: p[8],
                k4: p[9],
                k5: p[10],
                k6: p[11],
            },
        }
    }
}

/// Which camera parameters are held constant during the intrinsic refinement.
///
/// The default holds `k4` and `k5` (and, without the rational model, `k6`) at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrinsicFlags {
    /// Keep the principal point at the image center.
    pub fix_principal_point: bool,
    /// Keep `fx / fy` at its initial value.
    pub fix_aspect_ratio: bool,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// Hold `k1` constant.
    pub fix_k1: bool,
    /// Hold `k2` constant.
    pub fix_k2: bool,
    /// Hold `k3` constant.
    pub fix_k3: bool,
    /// Hold `k4` constant.
    pub fix_k4: bool,
    /// Hold `k5` constant.
    pub fix_k5: bool,
    /// Hold `k6` constant.
    pub fix_k6: bool,
    /// Enable the rational terms `k4..k6`.
    pub rational_model: bool,
}

impl Default for IntrinsicFlags {
    fn default() -> Self {
        Self {
            fix_principal_point: false,
            fix_aspect_ratio: false,
            zero_tangent_dist: false,
            fix_k1: false,
            fix_k2: false,
            fix_k3: false,
            fix_k4: true,
            fix_k5: true,
            fix_k6: false,
            rational_model: false,
        }
    }
}

impl IntrinsicFlags {
    /// Fixed mask over the packed camera parameters.
    fn fixed_mask(&self) -> [bool; NUM_INTRINSIC_PARAMS] {
        let rational = self.rational_model;
        [
            self.fix_aspect_ratio,
            false,
            self.fix_principal_point,
            self.fix_principal_point,
            self.fix_k1,
            self.fix_k2,
            self.zero_tangent_dist,
            self.zero_tangent_dist,
            self.fix_k3,
            self.fix_k4 || !rational,
            self.fix_k5 || !rational,
            self.fix_k6 || !rational,
        ]
    }
}

/// Result of a single camera calibration.
#[derive(Clone, Debug, PartialEq)]
pub struct IntrinsicCalibration {
    /// The estimated camera model.
    pub model: IntrinsicModel,
    /// Size of the images the model was estimated from.
    pub image_size: ImageSize,
    /// RMS reprojection error over all points of all views, in pixels.
    pub rms_error: f64,
    /// RMS reprojection error of each view, in pixels.
    pub per_view_errors: Vec<f64>,
    /// Rodrigues vector of the board pose in each view.
    pub rotations: Vec<[f64; 3]>,
    /// Translation of the board in each view.
    pub translations: Vec<[f64; 3]>,
}

/// Check the shape of a set of observations and return the number of views.
pub(crate) fn validate_views(
    object_points: &[Vec<[f64; 3]>],
    image_points: &[Vec<[f64; 2]>],
) -> Result<usize, CalibError> {
    if object_points.is_empty() {
        return Err(CalibError::NoObservations);
    }
    if object_points.len() != image_points.len() {
        return Err(CalibError::MismatchedLengths(
            "views",
            object_points.len(),
            image_points.len(),
        ));
    }
    for (view, (obj, img)) in object_points.iter().zip(image_points).enumerate() {
        if obj.len() != img.len() {
            return Err(CalibError::MismatchedLengths("points", obj.len(), img.len()));
        }
        if obj.len() < 4 {
            return Err(CalibError::InsufficientPoints(view, obj.len(), 4));
        }
        if obj.iter().any(|p| p[2].abs() > 1e-9) {
            return Err(CalibError::NonPlanarObject(view));
        }
    }
    Ok(object_points.len())
}

/// Reprojection residuals of a set of views.
///
/// Parameters: the packed camera followed by one pose per view. With a fixed aspect
/// ratio, `fx` is derived from `fy`.
struct ReprojectionProblem<'a> {
    object_points: &'a [Vec<[f64; 3]>],
    image_points: &'a [Vec<[f64; 2]>],
    aspect_ratio: Option<f64>,
    blocks: Vec<ResidualBlock>,
}

impl<'a> ReprojectionProblem<'a> {
    fn new(
        object_points: &'a [Vec<[f64; 3]>],
        image_points: &'a [Vec<[f64; 2]>],
        aspect_ratio: Option<f64>,
    ) -> Self {
        let blocks = object_points
            .iter()
            .enumerate()
            .map(|(view, obj)| {
                let offset = NUM_INTRINSIC_PARAMS + NUM_POSE_PARAMS * view;
                ResidualBlock {
                    params: (0..NUM_INTRINSIC_PARAMS)
                        .chain(offset..offset + NUM_POSE_PARAMS)
                        .collect(),
                    num_residuals: 2 * obj.len(),
                }
            })
            .collect();
        Self {
            object_points,
            image_points,
            aspect_ratio,
            blocks,
        }
    }

    fn model(&self, params: &[f64]) -> IntrinsicModel {
        let mut model = IntrinsicModel::from_params(&params[..NUM_INTRINSIC_PARAMS]);
        if let Some(aspect) = self.aspect_ratio {
            model.camera.fx = aspect * model.camera.fy;
        }
        model
    }
}

impl LeastSquaresProblem for ReprojectionProblem<'_> {
    fn num_params(&self) -> usize {
        NUM_INTRINSIC_PARAMS + NUM_POSE_PARAMS * self.object_points.len()
    }

    fn blocks(&self) -> &[ResidualBlock] {
        &self.blocks
    }

    fn evaluate_block(&self, block: usize, params: &[f64], residuals: &mut [f64]) {
        let model = self.model(params);
        let offset = NUM_INTRINSIC_PARAMS + NUM_POSE_PARAMS * block;
        let pose = &params[offset..offset + NUM_POSE_PARAMS];
        reprojection_residuals(
            &model,
            &[pose[0], pose[1], pose[2]],
            &[pose[3], pose[4], pose[5]],
            &self.object_points[block],
            &self.image_points[block],
            residuals,
        );
    }
}

/// Write `project(X_i) - x_i` for every point of a view into `residuals`.
pub(crate) fn reprojection_residuals(
    model: &IntrinsicModel,
    rvec: &[f64; 3],
    tvec: &[f64; 3],
    object: &[[f64; 3]],
    image: &[[f64; 2]],
    residuals: &mut [f64],
) {
    let r = linalg::rodrigues(rvec);
    for (i, (obj, img)) in object.iter().zip(image).enumerate() {
        let p = model.project_with_rotation(&r, tvec, obj);
        residuals[2 * i] = p[0] - img[0];
        residuals[2 * i + 1] = p[1] - img[1];
    }
}

/// Sum of squared reprojection errors of one view.
pub(crate) fn view_squared_error(
    model: &IntrinsicModel,
    rvec: &[f64; 3],
    tvec: &[f64; 3],
    object: &[[f64; 3]],
    image: &[[f64; 2]],
) -> f64 {
    let mut residuals = vec![0.0; 2 * object.len()];
    reprojection_residuals(model, rvec, tvec, object, image, &mut residuals);
    residuals.iter().map(|r| r * r).sum()
}

/// Pose of a single view with a fixed camera model.
struct PoseProblem<'a> {
    model: &'a IntrinsicModel,
    object: &'a [[f64; 3]],
    image: &'a [[f64; 2]],
    blocks: [ResidualBlock; 1],
}

impl LeastSquaresProblem for PoseProblem<'_> {
    fn num_params(&self) -> usize {
        NUM_POSE_PARAMS
    }

    fn blocks(&self) -> &[ResidualBlock] {
        &self.blocks
    }

    fn evaluate_block(&self, _block: usize, params: &[f64], residuals: &mut [f64]) {
        reprojection_residuals(
            self.model,
            &[params[0], params[1], params[2]],
            &[params[3], params[4], params[5]],
            self.object,
            self.image,
            residuals,
        );
    }
}

/// Estimate the board pose of one view for a known camera.
///
/// The distorted pixels are mapped to normalized coordinates, a homography from the
/// board plane gives the initial `[r1 r2 t]` and the pose is refined by minimizing the
/// reprojection error.
pub(crate) fn estimate_view_pose(
    model: &IntrinsicModel,
    object: &[[f64; 3]],
    image: &[[f64; 2]],
    solver: &LevenbergMarquardt,
) -> Result<([f64; 3], [f64; 3]), CalibError> {
    let normalized = undistort_points(image, &model.camera, &model.distortion, None, None);
    let plane = object.iter().map(|p| [p[0], p[1]]).collect::<Vec<_>>();
    let homo = find_homography_dlt(&plane, &normalized)?;
    let (rvec, tvec) = pose_from_homography(&homo)?;

    let mut params = [rvec[0], rvec[1], rvec[2], tvec[0], tvec[1], tvec[2]];
    let problem = PoseProblem {
        model,
        object,
        image,
        blocks: [ResidualBlock {
            params: (0..NUM_POSE_PARAMS).collect(),
            num_residuals: 2 * object.len(),
        }],
    };
    solver.minimize(&problem, &mut params, &[false; NUM_POSE_PARAMS])?;

    if params.iter().any(|p| !p.is_finite()) {
        return Err(CalibError::Degenerate("non-finite view pose".into()));
    }
    Ok((
        [params[0], params[1], params[2]],
        [params[3], params[4], params[5]],
    ))
}

/// Decompose a board to normalized image homography into a pose.
fn pose_from_homography(homo: &[[f64; 3]; 3]) -> Result<([f64; 3], [f64; 3]), CalibError> {
    let col = |j: usize| [homo[0][j], homo[1][j], homo[2][j]];
    let (h1, h2, h3) = (col(0), col(1), col(2));
    let norm = 0.5 * (linalg::norm3(&h1) + linalg::norm3(&h2));
    if norm < f64::EPSILON {
        return Err(CalibError::Degenerate("homography has no rotation part".into()));
    }
    let mut lambda = 1.0 / norm;
    // the board must lie in front of the camera
    if h3[2] * lambda < 0.0 {
        lambda = -lambda;
    }

    let scale = |v: [f64; 3]| [v[0] * lambda, v[1] * lambda, v[2] * lambda];
    let (r1, r2, t) = (scale(h1), scale(h2), scale(h3));
    let r3 = linalg::cross3(&r1, &r2);
    let r = [
        [r1[0], r2[0], r3[0]],
        [r1[1], r2[1], r3[1]],
        [r1[2], r2[2], r3[2]],
    ];
    let rotation = linalg::closest_rotation(&r);
    Ok((linalg::rodrigues_inverse(&rotation), t))
}

/// Closed-form focal lengths from the vanishing points of the board homographies.
///
/// The principal point is taken at the image center. Each view contributes the
/// orthogonality constraints of `(h, v)` and of the diagonals `(h + v, h - v)`.
fn initial_camera(
    object_points: &[Vec<[f64; 3]>],
    image_points: &[Vec<[f64; 2]>],
    image_size: ImageSize,
    flags: &IntrinsicFlags,
) -> Result<CameraIntrinsic, CalibError> {
    let cx = (image_size.width as f64 - 1.0) * 0.5;
    let cy = (image_size.height as f64 - 1.0) * 0.5;

    // normal equations of the 2-column system a * [1/fx², 1/fy²] = b
    let (mut ata, mut atb) = ([[0.0f64; 2]; 2], [0.0f64; 2]);
    for (obj, img) in object_points.iter().zip(image_points) {
        let plane = obj.iter().map(|p| [p[0], p[1]]).collect::<Vec<_>>();
        let mut homo = find_homography_dlt(&plane, img)?;

        // move the principal point to the origin
        for j in 0..3 {
            homo[0][j] -= homo[2][j] * cx;
            homo[1][j] -= homo[2][j] * cy;
        }

        let unit = |v: [f64; 3]| {
            let n = linalg::norm3(&v).max(f64::EPSILON);
            [v[0] / n, v[1] / n, v[2] / n]
        };
        let h = [homo[0][0], homo[1][0], homo[2][0]];
        let v = [homo[0][1], homo[1][1], homo[2][1]];
        let d1 = unit([
            (h[0] + v[0]) * 0.5,
            (h[1] + v[1]) * 0.5,
            (h[2] + v[2]) * 0.5,
        ]);
        let d2 = unit([
            (h[0] - v[0]) * 0.5,
            (h[1] - v[1]) * 0.5,
            (h[2] - v[2]) * 0.5,
        ]);
        let (h, v) = (unit(h), unit(v));

        for (row, rhs) in [
            ([h[0] * v[0], h[1] * v[1]], -h[2] * v[2]),
            ([d1[0] * d2[0], d1[1] * d2[1]], -d1[2] * d2[2]),
        ] {
            for i in 0..2 {
                for j in 0..2 {
                    ata[i][j] += row[i] * row[j];
                }
                atb[i] += row[i] * rhs;
            }
        }
    }

    let det = ata[0][0] * ata[1][1] - ata[0][1] * ata[1][0];
    if det.abs() < 1e-300 {
        return Err(CalibError::Degenerate(
            "board views do not constrain the focal length".into(),
        ));
    }
    let f0 = (ata[1][1] * atb[0] - ata[0][1] * atb[1]) / det;
    let f1 = (ata[0][0] * atb[1] - ata[1][0] * atb[0]) / det;
    let mut fx = (1.0 / f0).abs().sqrt();
    let mut fy = (1.0 / f1).abs().sqrt();
    if flags.fix_aspect_ratio {
        let tf = 0.5 * (fx + fy);
        fx = tf;
        fy = tf;
    }
    if !fx.is_finite() || !fy.is_finite() || fx <= 0.0 || fy <= 0.0 {
        return Err(CalibError::Degenerate(format!(
            "invalid initial focal length ({fx}, {fy})"
        )));
    }

    Ok(CameraIntrinsic { fx, fy, cx, cy })
}

/// Calibrate a single camera from views of a planar board.
///
/// The camera matrix is initialised in closed form from the board homographies, every
/// board pose is estimated for that camera and all parameters are refined jointly by
/// minimizing the reprojection error.
///
/// # Arguments
///
/// * `object_points` - Board corners of each view in board coordinates (z = 0).
/// * `image_points` - The matching detected corners of each view in pixels.
/// * `image_size` - Size of the calibrated images.
/// * `flags` - Parameters held constant during the refinement.
/// * `solver` - Settings of the non-linear solver.
///
/// # Errors
///
/// Fails on empty or mismatched observations, non planar boards, and when the views do
/// not constrain the model.
pub fn calibrate_camera(
    object_points: &[Vec<[f64; 3]>],
    image_points: &[Vec<[f64; 2]>],
    image_size: ImageSize,
    flags: &IntrinsicFlags,
    solver: &LevenbergMarquardt,
) -> Result<IntrinsicCalibration, CalibError> {
    let num_views = validate_views(object_points, image_points)?;
    if image_size.width == 0 || image_size.height == 0 {
        return Err(CalibError::Degenerate(format!("empty image size {image_size}")));
    }
    if num_views < 3 {
        log::warn!("calibrating with only {num_views} views, the result may be unstable");
    }

    let camera = initial_camera(object_points, image_points, image_size, flags)?;
    let initial = IntrinsicModel {
        camera,
        distortion: PolynomialDistortion::default(),
    };
    log::debug!(
        "initial camera: fx {:.3} fy {:.3} cx {:.3} cy {:.3}",
        camera.fx,
        camera.fy,
        camera.cx,
        camera.cy
    );

    let mut params = Vec::with_capacity(NUM_INTRINSIC_PARAMS + NUM_POSE_PARAMS * num_views);
    params.extend_from_slice(&initial.to_params());
    for (obj, img) in object_points.iter().zip(image_points) {
        let (rvec, tvec) = estimate_view_pose(&initial, obj, img, solver)?;
        params.extend_from_slice(&rvec);
        params.extend_from_slice(&tvec);
    }

    let aspect_ratio = flags
        .fix_aspect_ratio
        .then_some(camera.fx / camera.fy);
    let problem = ReprojectionProblem::new(object_points, image_points, aspect_ratio);
    let mut fixed = vec![false; params.len()];
    fixed[..NUM_INTRINSIC_PARAMS].copy_from_slice(&flags.fixed_mask());

    let summary = solver.minimize(&problem, &mut params, &fixed)?;
    log::debug!(
        "intrinsic refinement: cost {:.6e} -> {:.6e} in {} iterations ({:?})",
        summary.initial_cost,
        summary.final_cost,
        summary.iterations,
        summary.termination_reason
    );

    if params.iter().any(|p| !p.is_finite()) {
        return Err(CalibError::Degenerate("non-finite camera parameters".into()));
    }
    let model = problem.model(&params);
    if model.camera.fx <= 0.0 || model.camera.fy <= 0.0 {
        return Err(CalibError::Degenerate(format!(
            "non-positive focal length ({}, {})",
            model.camera.fx, model.camera.fy
        )));
    }

    let mut rotations = Vec::with_capacity(num_views);
    let mut translations = Vec::with_capacity(num_views);
    let mut per_view_errors = Vec::with_capacity(num_views);
    let (mut total_error, mut total_points) = (0.0, 0usize);
    for (view, (obj, img)) in object_points.iter().zip(image_points).enumerate() {
        let pose = &params[NUM_INTRINSIC_PARAMS + NUM_POSE_PARAMS * view..][..NUM_POSE_PARAMS];
        let rvec = [pose[0], pose[1], pose[2]];
        let tvec = [pose[3], pose[4], pose[5]];
        let err = view_squared_error(&model, &rvec, &tvec, obj, img);
        per_view_errors.push((err / obj.len() as f64).sqrt());
        total_error += err;
        total_points += obj.len();
        rotations.push(rvec);
        translations.push(tvec);
    }
    let rms_error = (total_error / total_points as f64).sqrt();

    log::info!(
        "calibrated camera from {num_views} views: rms {rms_error:.4} px, fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
        model.camera.fx,
        model.camera.fy,
        model.camera.cx,
        model.camera.cy
    );
    if rms_error > 1.0 {
        log::warn!("high reprojection error {rms_error:.3} px");
    }

    Ok(IntrinsicCalibration {
        model,
        image_size,
        rms_error,
        per_view_errors,
        rotations,
        translations,
    })
}
