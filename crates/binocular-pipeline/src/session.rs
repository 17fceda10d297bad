use binocular_image::ImageSize;

use crate::board::BoardSpec;
use crate::error::PipelineError;
use crate::observation::{Camera, DualObservation, PatternObservation};

/// Observations accumulated over one pass of a video.
///
/// A session is created at the start of a calibration batch, filled in frame order and
/// handed to the calibration stages. Each camera keeps every frame where it found the
/// pattern; frames where both did are also kept as stereo pairs.
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    board: BoardSpec,
    image_size: Option<ImageSize>,
    left: Vec<PatternObservation>,
    right: Vec<PatternObservation>,
    pairs: Vec<(PatternObservation, PatternObservation)>,
    last_frame: Option<usize>,
}

impl CalibrationSession {
    /// Start an empty session for `board`.
    pub fn new(board: BoardSpec) -> Self {
        Self {
            board,
            image_size: None,
            left: Vec::new(),
            right: Vec::new(),
            pairs: Vec::new(),
            last_frame: None,
        }
    }

    /// The calibration board.
    pub fn board(&self) -> &BoardSpec {
        &self.board
    }

    /// Size of one camera image, known after the first observation.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// Add the detections of one frame.
    ///
    /// # Errors
    ///
    /// Frames must arrive in strictly increasing order and share the image size of the
    /// first one; corner counts must match the board.
    pub fn add(&mut self, observation: DualObservation) -> Result<(), PipelineError> {
        if let Some(last) = self.last_frame {
            if observation.frame_index <= last {
                return Err(PipelineError::Input(format!(
                    "frame {} added after frame {last}",
                    observation.frame_index
                )));
            }
        }
        match self.image_size {
            Some(size) if size != observation.image_size => {
                return Err(PipelineError::Input(format!(
                    "frame {} has camera size {} but the session uses {size}",
                    observation.frame_index, observation.image_size
                )));
            }
            _ => {}
        }
        for camera in [Camera::Left, Camera::Right] {
            if let Some(obs) = observation.camera(camera) {
                if obs.len() != self.board.corner_count() {
                    return Err(PipelineError::Input(format!(
                        "frame {}: {} {camera:?} corners for a {}x{} board",
                        observation.frame_index,
                        obs.len(),
                        self.board.width,
                        self.board.height
                    )));
                }
            }
        }

        self.image_size = Some(observation.image_size);
        self.last_frame = Some(observation.frame_index);
        if let (Some(l), Some(r)) = (&observation.left, &observation.right) {
            self.pairs.push((l.clone(), r.clone()));
        }
        if let Some(l) = observation.left {
            self.left.push(l);
        }
        if let Some(r) = observation.right {
            self.right.push(r);
        }
        Ok(())
    }

    /// Drain a scan into the session.
    ///
    /// Returns the number of added frames. The scan's first error aborts the batch.
    pub fn extend_from_scan<I>(&mut self, scan: I) -> Result<usize, PipelineError>
    where
        I: IntoIterator<Item = Result<DualObservation, PipelineError>>,
    {
        let mut added = 0;
        for observation in scan {
            self.add(observation?)?;
            added += 1;
        }
        log::info!(
            "session holds {} left, {} right and {} paired observations",
            self.left.len(),
            self.right.len(),
            self.pairs.len()
        );
        Ok(added)
    }

    /// Observations of one camera, in frame order.
    pub fn observations(&self, camera: Camera) -> &[PatternObservation] {
        match camera {
            Camera::Left => &self.left,
            Camera::Right => &self.right,
        }
    }

    /// Frames where both cameras found the pattern, in frame order.
    pub fn pairs(&self) -> &[(PatternObservation, PatternObservation)] {
        &self.pairs
    }

    /// Object and image points of one camera, in the layout of the calibrators.
    pub fn camera_points(&self, camera: Camera) -> (Vec<Vec<[f64; 3]>>, Vec<Vec<[f64; 2]>>) {
        self.observations(camera)
            .iter()
            .map(|o| (o.object_points().to_vec(), o.image_points().to_vec()))
            .unzip()
    }

    /// Object points and the left and right image points of the pairs.
    #[allow(clippy::type_complexity)]
    pub fn pair_points(&self) -> (Vec<Vec<[f64; 3]>>, Vec<Vec<[f64; 2]>>, Vec<Vec<[f64; 2]>>) {
        let mut object = Vec::with_capacity(self.pairs.len());
        let mut left = Vec::with_capacity(self.pairs.len());
        let mut right = Vec::with_capacity(self.pairs.len());
        for (l, r) in &self.pairs {
            object.push(l.object_points().to_vec());
            left.push(l.image_points().to_vec());
            right.push(r.image_points().to_vec());
        }
        (object, left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> BoardSpec {
        BoardSpec {
            width: 2,
            height: 2,
            square_size: 1.0,
        }
    }

    fn observation(frame_index: usize, left: bool, right: bool) -> Result<DualObservation, PipelineError> {
        let make = |x: f64| PatternObservation::new(frame_index, board().object_points(), vec![[x, 0.0]; 4]);
        Ok(DualObservation {
            frame_index,
            image_size: [64, 48].into(),
            left: left.then(|| make(1.0)).transpose()?,
            right: right.then(|| make(2.0)).transpose()?,
        })
    }

    #[test]
    fn test_accumulate() -> Result<(), PipelineError> {
        let mut session = CalibrationSession::new(board());
        let added = session.extend_from_scan([
            observation(0, true, true),
            observation(3, true, false),
            observation(5, false, true),
        ])?;
        assert_eq!(added, 3);
        assert_eq!(session.observations(Camera::Left).len(), 2);
        assert_eq!(session.observations(Camera::Right).len(), 2);
        assert_eq!(session.pairs().len(), 1);
        assert_eq!(session.image_size(), Some([64, 48].into()));

        let (object, image) = session.camera_points(Camera::Right);
        assert_eq!(object.len(), 2);
        assert_eq!(image[1][0], [2.0, 0.0]);

        let (object, left, right) = session.pair_points();
        assert_eq!((object.len(), left.len(), right.len()), (1, 1, 1));
        assert_eq!(left[0][0], [1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_frames_must_be_monotonic() -> Result<(), PipelineError> {
        let mut session = CalibrationSession::new(board());
        session.add(observation(4, true, true)?)?;
        assert!(matches!(session.add(observation(4, true, false)?), Err(PipelineError::Input(_))));
        assert!(matches!(session.add(observation(2, true, false)?), Err(PipelineError::Input(_))));
        session.add(observation(5, false, true)?)?;
        Ok(())
    }

    #[test]
    fn test_wrong_corner_count() -> Result<(), PipelineError> {
        let mut session = CalibrationSession::new(BoardSpec::new(3, 2, 1.0)?);
        assert!(matches!(session.add(observation(0, true, false)?), Err(PipelineError::Input(_))));
        assert!(session.observations(Camera::Left).is_empty());
        Ok(())
    }
}
