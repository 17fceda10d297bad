use binocular_imgproc::calibration::chessboard::PatternSize;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A planar chessboard calibration target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    /// Interior corners per row.
    pub width: usize,
    /// Interior corners per column.
    pub height: usize,
    /// Side of a square, in the unit of the calibrated translations.
    pub square_size: f64,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            width: 8,
            height: 6,
            square_size: 1.0,
        }
    }
}

impl BoardSpec {
    /// Create a board, checking that it has at least 2x2 corners and a positive square.
    pub fn new(width: usize, height: usize, square_size: f64) -> Result<Self, PipelineError> {
        if width < 2 || height < 2 {
            return Err(PipelineError::Input(format!(
                "board needs at least 2x2 interior corners, got {width}x{height}"
            )));
        }
        if !(square_size.is_finite() && square_size > 0.0) {
            return Err(PipelineError::Input(format!(
                "square size must be positive, got {square_size}"
            )));
        }
        Ok(Self {
            width,
            height,
            square_size,
        })
    }

    /// The corner grid searched by the detector.
    pub fn pattern(&self) -> PatternSize {
        PatternSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Number of interior corners.
    pub fn corner_count(&self) -> usize {
        self.width * self.height
    }

    /// The interior corners on the `z = 0` plane, row-major from the first corner.
    pub fn object_points(&self) -> Vec<[f64; 3]> {
        (0..self.height)
            .flat_map(|i| {
                (0..self.width)
                    .map(move |j| [j as f64 * self.square_size, i as f64 * self.square_size, 0.0])
            })
            .collect()
    }
}
