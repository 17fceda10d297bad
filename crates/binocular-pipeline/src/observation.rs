use binocular_image::ImageSize;

use crate::error::PipelineError;

/// Which lens of the rig.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Camera {
    /// The left half of a dual-lens frame.
    Left,
    /// The right half of a dual-lens frame.
    Right,
}

/// Detected corners of one camera in one frame, matched 1:1 with the board corners.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternObservation {
    frame_index: usize,
    object_points: Vec<[f64; 3]>,
    image_points: Vec<[f64; 2]>,
}

impl PatternObservation {
    /// Pair detected corners with the board corners.
    ///
    /// # Errors
    ///
    /// Returns an input error when the two sequences have different lengths.
    pub fn new(
        frame_index: usize,
        object_points: Vec<[f64; 3]>,
        image_points: Vec<[f64; 2]>,
    ) -> Result<Self, PipelineError> {
        if object_points.len() != image_points.len() {
            return Err(PipelineError::Input(format!(
                "frame {frame_index}: {} image corners for {} board corners",
                image_points.len(),
                object_points.len()
            )));
        }
        Ok(Self {
            frame_index,
            object_points,
            image_points,
        })
    }

    /// Index of the source frame.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Board corners, row-major.
    pub fn object_points(&self) -> &[[f64; 3]] {
        &self.object_points
    }

    /// Detected corners in pixels, in board order.
    pub fn image_points(&self) -> &[[f64; 2]] {
        &self.image_points
    }

    /// Number of corners.
    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    /// `true` if the observation has no corners.
    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }
}

/// The detections of one dual-lens frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DualObservation {
    /// Index of the source frame.
    pub frame_index: usize,
    /// Size of one camera image.
    pub image_size: ImageSize,
    /// Corners found in the left image.
    pub left: Option<PatternObservation>,
    /// Corners found in the right image.
    pub right: Option<PatternObservation>,
}

impl DualObservation {
    /// `true` when the pattern was found by both cameras.
    pub fn is_pair(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    /// The detection of one camera.
    pub fn camera(&self, camera: Camera) -> Option<&PatternObservation> {
        match camera {
            Camera::Left => self.left.as_ref(),
            Camera::Right => self.right.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths_must_match() {
        let res = PatternObservation::new(3, vec![[0.0; 3]; 4], vec![[0.0; 2]; 3]);
        assert!(matches!(res, Err(PipelineError::Input(_))));
    }

    #[test]
    fn test_dual_observation() -> Result<(), PipelineError> {
        let obs = PatternObservation::new(7, vec![[0.0; 3]; 4], vec![[1.0; 2]; 4])?;
        let dual = DualObservation {
            frame_index: 7,
            image_size: [320, 240].into(),
            left: Some(obs.clone()),
            right: None,
        };
        assert!(!dual.is_pair());
        assert_eq!(dual.camera(Camera::Left), Some(&obs));
        assert_eq!(dual.camera(Camera::Right), None);
        assert_eq!(obs.len(), 4);
        assert_eq!(obs.frame_index(), 7);
        Ok(())
    }
}
