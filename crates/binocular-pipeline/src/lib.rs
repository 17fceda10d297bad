#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// calibration board layout.
pub mod board;

/// run configuration.
pub mod config;

pub mod document;

/// Error types for the pipeline module.
pub mod error;

/// corner observations of the calibration board.
pub mod observation;

/// the stage-gated pipeline.
pub mod pipeline;

/// optional display of intermediate results.
pub mod preview;

/// lazy board detection over dual-lens frames.
pub mod scan;

/// observation accumulation for a calibration batch.
pub mod session;

pub use crate::board::BoardSpec;
pub use crate::config::PipelineConfig;
pub use crate::document::{CalibrationDocument, ExtrinsicsBundle, Field, IntrinsicsBundle};
pub use crate::error::PipelineError;
pub use crate::observation::{Camera, DualObservation, PatternObservation};
pub use crate::pipeline::{DepthFrame, PipelineStage, RectifiedPair, StereoPipeline};
pub use crate::preview::{NoPreview, PreviewControl, PreviewSink};
pub use crate::scan::{PatternScanner, ScanMode, ScanStats};
pub use crate::session::CalibrationSession;
