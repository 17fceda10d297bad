use binocular_calib::CalibError;
use binocular_image::ImageError;
use binocular_stereo::StereoError;

use crate::pipeline::PipelineStage;

/// An error type for the pipeline module.
///
/// Besides `Input`, the `Io` and `Json` variants also report unreadable sources or
/// bundles.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Missing or malformed input: frames of the wrong size, missing bundle keys,
    /// matrices of the wrong shape.
    #[error("Invalid input: {0}")]
    Input(String),

    /// The observations do not support a usable calibration.
    #[error("Calibration failed: {0}")]
    Calibration(CalibError),

    /// Rectification is impossible for the calibrated relative pose.
    #[error("Degenerate stereo geometry: {0}")]
    GeometryDegenerate(String),

    /// A stage was invoked before its predecessor succeeded.
    #[error("Stage {requested:?} cannot run in stage {current:?}")]
    StageOrder {
        /// The stage the call would move to.
        requested: PipelineStage,
        /// The stage the pipeline is in.
        current: PipelineStage,
    },

    /// Error from the image layer.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Error from rectification or matching.
    #[error(transparent)]
    Stereo(#[from] StereoError),

    /// Reading or writing a file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A calibration document could not be encoded or decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<CalibError> for PipelineError {
    fn from(err: CalibError) -> Self {
        match err {
            CalibError::DegenerateGeometry(msg) => PipelineError::GeometryDegenerate(msg),
            other => PipelineError::Calibration(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calib_error_mapping() {
        let err = PipelineError::from(CalibError::DegenerateGeometry("zero baseline".into()));
        assert!(matches!(err, PipelineError::GeometryDegenerate(ref m) if m == "zero baseline"));

        let err = PipelineError::from(CalibError::NoObservations);
        assert!(matches!(err, PipelineError::Calibration(CalibError::NoObservations)));
    }
}
