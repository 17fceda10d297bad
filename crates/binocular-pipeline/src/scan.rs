use binocular_image::{Image, ImageSize};
use binocular_imgproc::{
    calibration::chessboard::{detect_chessboard, ChessboardParams},
    color::gray_from_rgb_u8,
    crop::split_side_by_side,
};
use serde::{Deserialize, Serialize};

use crate::board::BoardSpec;
use crate::error::PipelineError;
use crate::observation::{Camera, DualObservation, PatternObservation};
use crate::preview::{NoPreview, PreviewControl, PreviewSink};

/// Which frames the scanner yields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Frames where at least one camera found the pattern; each camera keeps its own
    /// detections.
    #[default]
    Independent,
    /// Only frames where both cameras found the pattern.
    Pairs,
}

/// Detection counts of a scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Frames pulled from the source.
    pub frames_read: usize,
    /// Frames searched for the pattern.
    pub frames_scanned: usize,
    /// Frames where the left camera found the pattern.
    pub left_found: usize,
    /// Frames where the right camera found the pattern.
    pub right_found: usize,
    /// Frames where both cameras found the pattern.
    pub both_found: usize,
}

/// Lazily searches dual-lens frames for the calibration board.
///
/// Each frame is split into its left and right halves, converted to luminance and
/// searched once. Detection misses are counted and skipped. The iterator is finite and
/// not restartable, and holds at most one frame at a time.
///
/// The size of the first frame fixes the camera image size; a later frame of another
/// size yields an input error and ends the scan.
pub struct PatternScanner<'a, I> {
    frames: I,
    object_points: Vec<[f64; 3]>,
    board: BoardSpec,
    params: ChessboardParams,
    mode: ScanMode,
    stride: usize,
    preview: Box<dyn PreviewSink + 'a>,
    image_size: Option<ImageSize>,
    next_index: usize,
    stats: ScanStats,
    done: bool,
}

impl<'a, I> PatternScanner<'a, I>
where
    I: Iterator<Item = Image<u8, 3>>,
{
    /// Scan `frames` for `board`.
    pub fn new<F>(frames: F, board: BoardSpec, params: ChessboardParams) -> Self
    where
        F: IntoIterator<IntoIter = I>,
    {
        Self {
            frames: frames.into_iter(),
            object_points: board.object_points(),
            board,
            params,
            mode: ScanMode::default(),
            stride: 1,
            preview: Box::new(NoPreview),
            image_size: None,
            next_index: 0,
            stats: ScanStats::default(),
            done: false,
        }
    }

    /// Set which frames are yielded.
    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Only search every `n`-th frame, starting with the first.
    pub fn every_nth(mut self, n: usize) -> Self {
        self.stride = n.max(1);
        self
    }

    /// Report detections to a preview sink.
    pub fn with_preview(mut self, sink: impl PreviewSink + 'a) -> Self {
        self.preview = Box::new(sink);
        self
    }

    /// Counts so far.
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Camera image size, known after the first frame.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// The searched board.
    pub fn board(&self) -> &BoardSpec {
        &self.board
    }

    fn detect(
        &mut self,
        frame_index: usize,
        camera: Camera,
        image: &Image<u8, 3>,
    ) -> Result<(Option<PatternObservation>, PreviewControl), PipelineError> {
        let mut gray = Image::from_size_val(image.size(), 0u8)?;
        gray_from_rgb_u8(image, &mut gray)?;

        let Some(corners) = detect_chessboard(&gray, self.board.pattern(), &self.params) else {
            log::debug!("{frame_index}. No {camera:?} corners found");
            return Ok((None, PreviewControl::Continue));
        };
        log::debug!(
            "{frame_index}. Found {} {} corners",
            corners.len(),
            match camera {
                Camera::Left => "left",
                Camera::Right => "right",
            }
        );

        let control = self.preview.corners(frame_index, camera, image, &corners);
        let observation = PatternObservation::new(frame_index, self.object_points.clone(), corners)?;
        Ok((Some(observation), control))
    }

    fn scan_frame(
        &mut self,
        frame_index: usize,
        frame: &Image<u8, 3>,
    ) -> Result<(Option<DualObservation>, PreviewControl), PipelineError> {
        let (left, right) = split_side_by_side(frame)?;
        match self.image_size {
            None => self.image_size = Some(left.size()),
            Some(size) if size != left.size() => {
                return Err(PipelineError::Input(format!(
                    "frame {frame_index} has camera size {} but the run started with {size}",
                    left.size()
                )));
            }
            Some(_) => {}
        }
        self.stats.frames_scanned += 1;

        let (right_obs, right_control) = self.detect(frame_index, Camera::Right, &right)?;
        let (left_obs, left_control) = self.detect(frame_index, Camera::Left, &left)?;
        let control = if right_control == PreviewControl::Abort || left_control == PreviewControl::Abort {
            PreviewControl::Abort
        } else {
            PreviewControl::Continue
        };

        self.stats.left_found += left_obs.is_some() as usize;
        self.stats.right_found += right_obs.is_some() as usize;

        let observation = DualObservation {
            frame_index,
            image_size: left.size(),
            left: left_obs,
            right: right_obs,
        };
        if observation.is_pair() {
            self.stats.both_found += 1;
            log::debug!("{frame_index}. Found both checkerboards");
        }

        let keep = match self.mode {
            ScanMode::Independent => observation.left.is_some() || observation.right.is_some(),
            ScanMode::Pairs => observation.is_pair(),
        };
        Ok((keep.then_some(observation), control))
    }

    fn finish(&mut self) {
        self.done = true;
        log::info!(
            "scanned {} of {} frames: found {} left, {} right and {} paired patterns",
            self.stats.frames_scanned,
            self.stats.frames_read,
            self.stats.left_found,
            self.stats.right_found,
            self.stats.both_found
        );
    }
}

impl<I> Iterator for PatternScanner<'_, I>
where
    I: Iterator<Item = Image<u8, 3>>,
{
    type Item = Result<DualObservation, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(frame) = self.frames.next() else {
                self.finish();
                return None;
            };
            let frame_index = self.next_index;
            self.next_index += 1;
            self.stats.frames_read += 1;
            if frame_index % self.stride != 0 {
                continue;
            }

            match self.scan_frame(frame_index, &frame) {
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
                Ok((observation, control)) => {
                    if control == PreviewControl::Abort {
                        log::info!("scan aborted by the preview at frame {frame_index}");
                        self.finish();
                    }
                    if let Some(observation) = observation {
                        return Some(Ok(observation));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Render a fronto-parallel board with `square` pixel squares and its first
    /// interior corner at `origin` into a white RGB image.
    pub(crate) fn render_board(
        size: ImageSize,
        board: &BoardSpec,
        square: f64,
        origin: [f64; 2],
    ) -> Vec<u8> {
        let samples = 4;
        let mut data = vec![255u8; size.area() * 3];
        for y in 0..size.height {
            for x in 0..size.width {
                let mut acc = 0u32;
                for sy in 0..samples {
                    for sx in 0..samples {
                        let u = x as f64 + (sx as f64 + 0.5) / samples as f64 - 0.5 - origin[0];
                        let v = y as f64 + (sy as f64 + 0.5) / samples as f64 - 0.5 - origin[1];
                        let (bu, bv) = (u / square + 1.0, v / square + 1.0);
                        let inside = bu >= 0.0
                            && bv >= 0.0
                            && bu < (board.width + 1) as f64
                            && bv < (board.height + 1) as f64;
                        let black = inside && (bu.floor() as i64 + bv.floor() as i64) % 2 == 0;
                        if !black {
                            acc += 255;
                        }
                    }
                }
                let value = (acc / (samples * samples) as u32) as u8;
                let i = (y * size.width + x) * 3;
                data[i..i + 3].fill(value);
            }
        }
        data
    }

    /// Join two RGB halves into one side-by-side frame.
    pub(crate) fn side_by_side(
        half: ImageSize,
        left: &[u8],
        right: &[u8],
    ) -> Result<Image<u8, 3>, PipelineError> {
        let row = half.width * 3;
        let mut data = Vec::with_capacity(left.len() * 2);
        for y in 0..half.height {
            data.extend_from_slice(&left[y * row..(y + 1) * row]);
            data.extend_from_slice(&right[y * row..(y + 1) * row]);
        }
        Ok(Image::new([half.width * 2, half.height].into(), data)?)
    }

    fn board() -> BoardSpec {
        BoardSpec {
            width: 5,
            height: 4,
            square_size: 0.02,
        }
    }

    fn half() -> ImageSize {
        ImageSize {
            width: 200,
            height: 150,
        }
    }

    /// Frame 0: both boards, frame 1: left board only, frame 2: blank.
    fn frames() -> Result<Vec<Image<u8, 3>>, PipelineError> {
        let left = render_board(half(), &board(), 24.0, [40.3, 35.6]);
        let right = render_board(half(), &board(), 24.0, [30.7, 35.2]);
        let blank = vec![255u8; half().area() * 3];
        Ok(vec![
            side_by_side(half(), &left, &right)?,
            side_by_side(half(), &left, &blank)?,
            side_by_side(half(), &blank, &blank)?,
        ])
    }

    #[test]
    fn test_independent_scan() -> Result<(), PipelineError> {
        let mut scanner = PatternScanner::new(frames()?, board(), ChessboardParams::default());
        let found = scanner.by_ref().collect::<Result<Vec<_>, _>>()?;

        assert_eq!(found.len(), 2);
        assert!(found[0].is_pair());
        assert_eq!(found[1].frame_index, 1);
        assert!(found[1].left.is_some() && found[1].right.is_none());
        assert_eq!(found[0].image_size, half());

        let left = found[0].camera(Camera::Left).ok_or(PipelineError::Input("left".into()))?;
        assert_eq!(left.len(), board().corner_count());
        assert!((left.image_points()[0][0] - 40.3).abs() < 0.2);
        assert!((left.image_points()[0][1] - 35.6).abs() < 0.2);
        assert_eq!(left.object_points()[1], [0.02, 0.0, 0.0]);

        assert_eq!(
            scanner.stats(),
            ScanStats {
                frames_read: 3,
                frames_scanned: 3,
                left_found: 2,
                right_found: 1,
                both_found: 1,
            }
        );
        Ok(())
    }

    #[test]
    fn test_pairs_scan_and_stride() -> Result<(), PipelineError> {
        let found = PatternScanner::new(frames()?, board(), ChessboardParams::default())
            .with_mode(ScanMode::Pairs)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].frame_index, 0);

        let mut scanner =
            PatternScanner::new(frames()?, board(), ChessboardParams::default()).every_nth(2);
        let found = scanner.by_ref().collect::<Result<Vec<_>, _>>()?;
        assert_eq!(found.len(), 1);
        assert_eq!(scanner.stats().frames_scanned, 2);
        assert_eq!(scanner.stats().frames_read, 3);
        Ok(())
    }

    #[test]
    fn test_frame_size_change_is_an_error() -> Result<(), PipelineError> {
        let mut frames = frames()?;
        frames.insert(1, Image::from_size_val([100, 50].into(), 255)?);
        let mut scanner = PatternScanner::new(frames, board(), ChessboardParams::default());

        assert!(matches!(scanner.next(), Some(Ok(_))));
        assert!(matches!(scanner.next(), Some(Err(PipelineError::Input(_)))));
        assert!(scanner.next().is_none());
        Ok(())
    }

    struct AbortAfterFirst {
        calls: usize,
    }

    impl PreviewSink for AbortAfterFirst {
        fn corners(
            &mut self,
            _frame_index: usize,
            _camera: Camera,
            _image: &Image<u8, 3>,
            _corners: &[[f64; 2]],
        ) -> PreviewControl {
            self.calls += 1;
            PreviewControl::Abort
        }
    }

    #[test]
    fn test_preview_abort_ends_scan() -> Result<(), PipelineError> {
        let mut sink = AbortAfterFirst { calls: 0 };
        let found = PatternScanner::new(frames()?, board(), ChessboardParams::default())
            .with_preview(&mut sink)
            .collect::<Result<Vec<_>, _>>()?;
        // the aborting frame is still delivered
        assert_eq!(found.len(), 1);
        assert_eq!(sink.calls, 2);
        Ok(())
    }
}
