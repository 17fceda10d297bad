use std::path::Path;

use binocular_calib::{
    calibrate_camera, stereo_calibrate, stereo_rectify, CalibError, IntrinsicCalibration,
    StereoCalibration,
};
use binocular_image::{Image, ImageSize};
use binocular_imgproc::crop::split_side_by_side;
use binocular_stereo::{
    compute_disparity, point_cloud_from_disparity, DisparityMap, PointCloud, Rectifier,
    SgbmParams, MAX_Z,
};

use crate::config::PipelineConfig;
use crate::document::{ExtrinsicsBundle, IntrinsicsBundle};
use crate::error::PipelineError;
use crate::observation::Camera;
use crate::preview::{PreviewControl, PreviewSink};
use crate::scan::PatternScanner;
use crate::session::CalibrationSession;

/// Reprojection error above which a calibration is reported as suspicious, in pixels.
const HIGH_RMS: f64 = 1.0;

/// Progress of a [`StereoPipeline`]. Stages only move forward, one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    /// Nothing is calibrated.
    Uncalibrated,
    /// Both cameras have intrinsics.
    IntrinsicsReady,
    /// The relative pose and the rectification are known.
    StereoReady,
    /// Remap tables are built and frames can be rectified.
    Rectifying,
    /// Rectified frames are being matched.
    Matching,
}

/// A rectified frame pair.
#[derive(Clone, Debug, PartialEq)]
pub struct RectifiedPair {
    /// The rectified left image.
    pub left: Image<u8, 3>,
    /// The rectified right image.
    pub right: Image<u8, 3>,
}

/// A rectified pair with its disparity.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthFrame {
    /// The rectified images.
    pub rectified: RectifiedPair,
    /// Disparity of the left image.
    pub disparity: DisparityMap,
}

/// The stage-gated calibration, rectification and matching pipeline.
///
/// A run starts uncalibrated and moves through the single camera calibrations, the
/// stereo calibration, building the remap tables and matching frames. Calling a stage
/// before its predecessor succeeded returns [`PipelineError::StageOrder`]. A failed
/// stage leaves the pipeline where it was and nothing is persisted for it.
///
/// A pipeline can also resume from bundles written by an earlier run with
/// [`StereoPipeline::from_intrinsics`] or [`StereoPipeline::from_bundle`].
pub struct StereoPipeline {
    config: PipelineConfig,
    stage: PipelineStage,
    left_calibration: Option<IntrinsicCalibration>,
    right_calibration: Option<IntrinsicCalibration>,
    stereo_calibration: Option<StereoCalibration>,
    intrinsics: Option<IntrinsicsBundle>,
    extrinsics: Option<ExtrinsicsBundle>,
    rectifier: Option<Rectifier>,
    sgbm: Option<SgbmParams>,
}

impl StereoPipeline {
    /// An uncalibrated pipeline.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stage: PipelineStage::Uncalibrated,
            left_calibration: None,
            right_calibration: None,
            stereo_calibration: None,
            intrinsics: None,
            extrinsics: None,
            rectifier: None,
            sgbm: None,
        }
    }

    /// Resume with the intrinsics of an earlier run; the board of the bundle replaces
    /// the configured one.
    pub fn from_intrinsics(config: PipelineConfig, bundle: IntrinsicsBundle) -> Self {
        let mut pipeline = Self::new(config.with_board(bundle.board));
        pipeline.intrinsics = Some(bundle);
        pipeline.stage = PipelineStage::IntrinsicsReady;
        pipeline
    }

    /// Resume with the full calibration of an earlier run.
    pub fn from_bundle(config: PipelineConfig, bundle: ExtrinsicsBundle) -> Self {
        let mut pipeline = Self::new(config);
        pipeline.extrinsics = Some(bundle);
        pipeline.stage = PipelineStage::StereoReady;
        pipeline
    }

    /// The current stage.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// The run configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Intrinsics of both cameras, once calibrated or loaded.
    pub fn intrinsics(&self) -> Option<&IntrinsicsBundle> {
        self.intrinsics.as_ref()
    }

    /// The full calibration, once calibrated or loaded.
    pub fn extrinsics(&self) -> Option<&ExtrinsicsBundle> {
        self.extrinsics.as_ref()
    }

    /// Diagnostics of a single camera calibration of this run.
    pub fn camera_calibration(&self, camera: Camera) -> Option<&IntrinsicCalibration> {
        match camera {
            Camera::Left => self.left_calibration.as_ref(),
            Camera::Right => self.right_calibration.as_ref(),
        }
    }

    /// Diagnostics of the stereo calibration of this run.
    pub fn stereo_calibration(&self) -> Option<&StereoCalibration> {
        self.stereo_calibration.as_ref()
    }

    /// The remap tables, once rectifying.
    pub fn rectifier(&self) -> Option<&Rectifier> {
        self.rectifier.as_ref()
    }

    /// The matcher parameters, once rectifying.
    pub fn sgbm_params(&self) -> Option<&SgbmParams> {
        self.sgbm.as_ref()
    }

    /// Scan dual-lens frames for the configured board.
    pub fn scanner<'a, F>(&self, frames: F) -> PatternScanner<'a, F::IntoIter>
    where
        F: IntoIterator<Item = Image<u8, 3>>,
    {
        PatternScanner::new(frames, self.config.board, self.config.chessboard)
    }

    fn require(
        &self,
        requested: PipelineStage,
        allowed: &[PipelineStage],
    ) -> Result<(), PipelineError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(PipelineError::StageOrder {
                requested,
                current: self.stage,
            })
        }
    }

    fn calibrate_one(
        &self,
        session: &CalibrationSession,
        camera: Camera,
        image_size: ImageSize,
    ) -> Result<IntrinsicCalibration, PipelineError> {
        let (object_points, image_points) = session.camera_points(camera);
        let calibration = calibrate_camera(
            &object_points,
            &image_points,
            image_size,
            &self.config.intrinsic_flags,
            &self.config.solver,
        )?;
        log::info!("{camera:?} calibration error: {:.4}", calibration.rms_error);
        if calibration.rms_error > HIGH_RMS {
            log::warn!(
                "{camera:?} calibration error {:.3} px is high, check the observations",
                calibration.rms_error
            );
        }
        Ok(calibration)
    }

    /// Calibrate both cameras from the observations of `session`.
    ///
    /// Moves from `Uncalibrated` to `IntrinsicsReady`.
    pub fn calibrate_intrinsics(
        &mut self,
        session: &CalibrationSession,
    ) -> Result<&IntrinsicsBundle, PipelineError> {
        self.require(PipelineStage::IntrinsicsReady, &[PipelineStage::Uncalibrated])?;
        let image_size = session
            .image_size()
            .ok_or(PipelineError::Calibration(CalibError::NoObservations))?;

        log::info!(
            "Starting calibration with {} left and {} right images",
            session.observations(Camera::Left).len(),
            session.observations(Camera::Right).len()
        );
        let right = self.calibrate_one(session, Camera::Right, image_size)?;
        let left = self.calibrate_one(session, Camera::Left, image_size)?;

        let bundle = IntrinsicsBundle {
            left: left.model,
            right: right.model,
            board: *session.board(),
        };
        self.left_calibration = Some(left);
        self.right_calibration = Some(right);
        self.stage = PipelineStage::IntrinsicsReady;
        log::info!("intrinsic calibration done");
        Ok(self.intrinsics.insert(bundle))
    }

    /// Calibrate the relative pose from the paired observations of `session`, then
    /// compute the rectification.
    ///
    /// Moves from `IntrinsicsReady` to `StereoReady`.
    pub fn calibrate_stereo(
        &mut self,
        session: &CalibrationSession,
    ) -> Result<&ExtrinsicsBundle, PipelineError> {
        self.require(PipelineStage::StereoReady, &[PipelineStage::IntrinsicsReady])?;
        let intrinsics = self.intrinsics.ok_or(PipelineError::StageOrder {
            requested: PipelineStage::StereoReady,
            current: self.stage,
        })?;
        let image_size = session
            .image_size()
            .ok_or(PipelineError::Calibration(CalibError::NoObservations))?;

        let (object_points, left_points, right_points) = session.pair_points();
        log::info!("Starting stereo calibration with {} pairs", object_points.len());
        let stereo = stereo_calibrate(
            &object_points,
            &left_points,
            &right_points,
            &intrinsics.left,
            &intrinsics.right,
            image_size,
            &self.config.stereo_flags,
            &self.config.solver,
        )?;
        log::info!("stereo calibration error: {:.4}", stereo.rms_error);
        if stereo.rms_error > HIGH_RMS {
            log::warn!(
                "stereo calibration error {:.3} px is high, check the observations",
                stereo.rms_error
            );
        }

        let rectification = stereo_rectify(
            &stereo.left,
            &stereo.right,
            image_size,
            &stereo.extrinsic.rotation,
            &stereo.extrinsic.translation,
            &self.config.rectify_flags,
        )?;

        let bundle = ExtrinsicsBundle {
            left: stereo.left,
            right: stereo.right,
            extrinsic: stereo.extrinsic,
            rectification,
        };
        self.stereo_calibration = Some(stereo);
        self.stage = PipelineStage::StereoReady;
        log::info!("stereo calibration done");
        Ok(self.extrinsics.insert(bundle))
    }

    /// Build the remap tables for camera images of `image_size`.
    ///
    /// Moves from `StereoReady` to `Rectifying`.
    pub fn start_rectifying(&mut self, image_size: ImageSize) -> Result<&Rectifier, PipelineError> {
        self.require(PipelineStage::Rectifying, &[PipelineStage::StereoReady])?;
        let bundle = self.extrinsics.ok_or(PipelineError::StageOrder {
            requested: PipelineStage::Rectifying,
            current: self.stage,
        })?;

        let sgbm = self.config.sgbm_for_width(image_size.width);
        sgbm.validate()?;
        let rectifier = Rectifier::new(&bundle.left, &bundle.right, &bundle.rectification, image_size)?;
        log::info!(
            "rectifying {image_size} with focal length {:.2}, computing disparity with {} disparities",
            bundle.rectification.focal_length(),
            sgbm.num_disparities
        );

        self.sgbm = Some(sgbm);
        self.stage = PipelineStage::Rectifying;
        Ok(self.rectifier.insert(rectifier))
    }

    /// Split a dual-lens frame and rectify both halves.
    ///
    /// From `StereoReady` the remap tables are built first, sized by this frame.
    pub fn rectify_frame(&mut self, frame: &Image<u8, 3>) -> Result<RectifiedPair, PipelineError> {
        self.require(
            PipelineStage::Rectifying,
            &[
                PipelineStage::StereoReady,
                PipelineStage::Rectifying,
                PipelineStage::Matching,
            ],
        )?;
        let (left, right) = split_side_by_side(frame)?;
        if self.stage == PipelineStage::StereoReady {
            self.start_rectifying(left.size())?;
        }
        let rectifier = self.rectifier.as_ref().ok_or(PipelineError::StageOrder {
            requested: PipelineStage::Rectifying,
            current: self.stage,
        })?;
        if left.size() != rectifier.size() {
            return Err(PipelineError::Input(format!(
                "frame has camera size {} but the remap tables are {}",
                left.size(),
                rectifier.size()
            )));
        }

        let (left, right) = rectifier.rectify_pair(&left, &right)?;
        Ok(RectifiedPair { left, right })
    }

    /// Compute the disparity of a rectified pair.
    ///
    /// Moves from `Rectifying` to `Matching`.
    pub fn match_pair(&mut self, pair: &RectifiedPair) -> Result<DisparityMap, PipelineError> {
        self.require(
            PipelineStage::Matching,
            &[PipelineStage::Rectifying, PipelineStage::Matching],
        )?;
        let sgbm = self.sgbm.ok_or(PipelineError::StageOrder {
            requested: PipelineStage::Matching,
            current: self.stage,
        })?;
        let disparity = compute_disparity(&pair.left, &pair.right, &sgbm)?;
        self.stage = PipelineStage::Matching;
        Ok(disparity)
    }

    /// Rectify and match one dual-lens frame.
    pub fn process_frame(&mut self, frame: &Image<u8, 3>) -> Result<DepthFrame, PipelineError> {
        let rectified = self.rectify_frame(frame)?;
        let disparity = self.match_pair(&rectified)?;
        Ok(DepthFrame {
            rectified,
            disparity,
        })
    }

    /// Reproject a matched frame to a point cloud colored by the rectified left image.
    ///
    /// Pixels outside the left camera's view and depths beyond [`MAX_Z`] are dropped.
    pub fn point_cloud(&self, frame: &DepthFrame) -> Result<PointCloud, PipelineError> {
        self.require(PipelineStage::Matching, &[PipelineStage::Matching])?;
        let (Some(bundle), Some(rectifier)) = (&self.extrinsics, &self.rectifier) else {
            return Err(PipelineError::StageOrder {
                requested: PipelineStage::Matching,
                current: self.stage,
            });
        };
        Ok(point_cloud_from_disparity(
            &frame.disparity,
            &bundle.rectification.q,
            &frame.rectified.left,
            Some(rectifier.mask()),
            MAX_Z,
        )?)
    }

    /// Play a video through the rectify and match stages.
    ///
    /// Every `frame_stride`-th frame is rectified and matched; the rectified pair and
    /// the disparity, scaled by the disparity range, go to `preview`. Returns the number
    /// of processed frames.
    pub fn run_video<F>(&mut self, frames: F, mut preview: impl PreviewSink) -> Result<usize, PipelineError>
    where
        F: IntoIterator<Item = Image<u8, 3>>,
    {
        let stride = self.config.frame_stride.max(1);
        let mut processed = 0;
        for (frame_index, frame) in frames.into_iter().enumerate() {
            if frame_index % stride != 0 {
                continue;
            }
            let depth = self.process_frame(&frame)?;
            processed += 1;
            log::debug!(
                "{frame_index}. {} of {} pixels matched",
                depth.disparity.count_valid(),
                depth.disparity.size().area()
            );

            let mut control = preview.rectified(frame_index, &depth.rectified.left, &depth.rectified.right);
            if control == PreviewControl::Continue {
                control = preview.disparity(frame_index, &depth.disparity.to_u8_scaled()?);
            }
            if control == PreviewControl::Abort {
                log::info!("video aborted by the preview at frame {frame_index}");
                break;
            }
        }
        log::info!("processed {processed} frames");
        Ok(processed)
    }

    /// Write the intrinsics of this run.
    pub fn save_intrinsics(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let bundle = self.intrinsics.as_ref().ok_or(PipelineError::StageOrder {
            requested: PipelineStage::IntrinsicsReady,
            current: self.stage,
        })?;
        bundle.save(path)
    }

    /// Write the full calibration of this run.
    pub fn save_extrinsics(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let bundle = self.extrinsics.as_ref().ok_or(PipelineError::StageOrder {
            requested: PipelineStage::StereoReady,
            current: self.stage,
        })?;
        bundle.save(path)
    }
}
