use binocular_calib::{IntrinsicFlags, LevenbergMarquardt, RectifyFlags, StereoFlags};
use binocular_imgproc::calibration::{chessboard::ChessboardParams, subpix::SubPixParams};
use binocular_stereo::SgbmParams;
use serde::{Deserialize, Serialize};

use crate::board::BoardSpec;

/// Default matching block of the still-image runs.
pub const DEFAULT_BLOCK_SIZE: usize = 7;

/// Parameters of a full calibration and depth run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The calibration board.
    pub board: BoardSpec,
    /// Chessboard detector parameters, including the corner refinement.
    pub chessboard: ChessboardParams,
    /// Policy of the single camera calibrations.
    pub intrinsic_flags: IntrinsicFlags,
    /// Policy of the stereo calibration.
    pub stereo_flags: StereoFlags,
    /// Policy of the rectification.
    pub rectify_flags: RectifyFlags,
    /// Non-linear solver of every calibration stage.
    pub solver: LevenbergMarquardt,
    /// Matcher parameters; `None` derives them from the image width.
    pub sgbm: Option<SgbmParams>,
    /// Block size used when the matcher parameters are derived.
    pub block_size: usize,
    /// Only every `frame_stride`-th frame of a video is processed.
    pub frame_stride: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            board: BoardSpec::default(),
            chessboard: ChessboardParams::default(),
            intrinsic_flags: IntrinsicFlags::default(),
            stereo_flags: StereoFlags::default(),
            rectify_flags: RectifyFlags::default(),
            solver: LevenbergMarquardt::default(),
            sgbm: None,
            block_size: DEFAULT_BLOCK_SIZE,
            frame_stride: 1,
        }
    }
}

impl PipelineConfig {
    /// The settings of the video player: every 4th frame, matcher tuned for video.
    pub fn video() -> Self {
        Self {
            sgbm: Some(SgbmParams::video_preset(DEFAULT_BLOCK_SIZE)),
            frame_stride: 4,
            ..Default::default()
        }
    }

    /// Set the calibration board.
    pub fn with_board(mut self, board: BoardSpec) -> Self {
        self.board = board;
        self
    }

    /// Set the corner refinement applied after detection.
    pub fn with_subpix(mut self, subpix: SubPixParams) -> Self {
        self.chessboard = self.chessboard.with_subpix(subpix);
        self
    }

    /// Set the matcher parameters.
    pub fn with_sgbm(mut self, sgbm: SgbmParams) -> Self {
        self.sgbm = Some(sgbm);
        self
    }

    /// Set the frame stride.
    pub fn with_frame_stride(mut self, frame_stride: usize) -> Self {
        self.frame_stride = frame_stride.max(1);
        self
    }

    /// Matcher parameters for camera images `width` pixels wide.
    pub fn sgbm_for_width(&self, width: usize) -> SgbmParams {
        self.sgbm
            .unwrap_or_else(|| SgbmParams::for_width(width, self.block_size))
    }
}
