use crate::optim::OptimizerError;

/// An error type for the calibration module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CalibError {
    /// Calibration was requested without any observation.
    #[error("No observations were provided")]
    NoObservations,

    /// Two sequences that must be matched 1:1 have different lengths.
    #[error("Mismatched number of {0}: {1} vs {2}")]
    MismatchedLengths(&'static str, usize, usize),

    /// A view has too few points to constrain a homography.
    #[error("View {0} has {1} points, at least {2} are required")]
    InsufficientPoints(usize, usize, usize),

    /// The object points of a view do not lie on the z = 0 plane.
    #[error("Object points of view {0} are not planar (z != 0)")]
    NonPlanarObject(usize),

    /// The observations do not constrain a usable model.
    #[error("Degenerate calibration: {0}")]
    Degenerate(String),

    /// Rectification cannot be computed for the given relative pose.
    #[error("Degenerate stereo geometry: {0}")]
    DegenerateGeometry(String),

    /// The non-linear refinement failed.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
}
